//! Raw EDID block
//!
//! Only the blob is kept; timing descriptors are not parsed.

use std::fmt;

use log::{debug, trace};

const EDID_HEADER: [u8; 8] = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];
const EDID_BLOCK_LEN: usize = 128;

/// EDID bytes read from a connector's EDID blob property
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Edid {
    blob: Vec<u8>,
}

impl Edid {
    pub fn new(blob: Vec<u8>) -> Self {
        trace!("EDID blob: {} bytes", blob.len());
        Self { blob }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.blob
    }

    pub fn len(&self) -> usize {
        self.blob.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blob.is_empty()
    }

    /// Base block present with the fixed 8-byte header
    pub fn is_valid(&self) -> bool {
        if self.blob.len() < EDID_BLOCK_LEN {
            debug!("EDID too short: {} bytes", self.blob.len());
            return false;
        }
        self.blob[0..8] == EDID_HEADER
    }

    /// Extension block count (offset 126)
    pub fn extension_count(&self) -> usize {
        if !self.is_valid() {
            return 0;
        }
        self.blob[126] as usize
    }

    /// Three-letter PNP manufacturer id (bytes 8-9, big-endian 5-bit letters)
    pub fn manufacturer(&self) -> Option<String> {
        if !self.is_valid() {
            return None;
        }
        let raw = u16::from_be_bytes([self.blob[8], self.blob[9]]);
        let letters = [(raw >> 10) & 0x1F, (raw >> 5) & 0x1F, raw & 0x1F];
        letters
            .iter()
            .map(|&l| {
                if (1..=26).contains(&l) {
                    Some((b'A' + l as u8 - 1) as char)
                } else {
                    None
                }
            })
            .collect()
    }
}

impl fmt::Debug for Edid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edid")
            .field("len", &self.blob.len())
            .field("manufacturer", &self.manufacturer())
            .finish()
    }
}

/// Hex dump, eight bytes per line
impl fmt::Display for Edid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.blob.chunks(8) {
            let hex: Vec<String> = line.iter().map(|b| format!("{:02x}", b)).collect();
            writeln!(f, "{}", hex.join(" "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_block() -> Vec<u8> {
        let mut edid = vec![0u8; 128];
        edid[0..8].copy_from_slice(&EDID_HEADER);
        edid
    }

    #[test]
    fn test_empty_edid() {
        let edid = Edid::default();
        assert!(!edid.is_valid());
        assert_eq!(edid.extension_count(), 0);
        assert_eq!(edid.manufacturer(), None);
    }

    #[test]
    fn test_short_edid() {
        assert!(!Edid::new(vec![0u8; 64]).is_valid());
    }

    #[test]
    fn test_manufacturer_id() {
        // "GSM": G=7, S=19, M=13 -> 0b0_00111_10011_01101
        let mut blob = base_block();
        blob[8] = 0x1E;
        blob[9] = 0x6D;
        blob[126] = 1;
        let edid = Edid::new(blob);
        assert!(edid.is_valid());
        assert_eq!(edid.manufacturer().as_deref(), Some("GSM"));
        assert_eq!(edid.extension_count(), 1);
    }

    #[test]
    fn test_hex_dump_lines() {
        let edid = Edid::new(base_block());
        assert_eq!(edid.to_string().lines().count(), 16);
        assert!(edid.to_string().starts_with("00 ff ff ff ff ff ff 00"));
    }
}

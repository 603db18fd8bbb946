//! Software test patterns for mapped dumb buffers

use drm::buffer::DrmFourcc;
use log::{debug, warn};

use super::buffer::format_info;
use crate::config::PatternKind;
use crate::error::{DisplayError, Result};
use crate::utils::{rgb_to_565, rgb_to_yuv601};

/// Checkerboard cell size in pixels
const TILE_SIZE: u32 = 8;

fn is_lit(kind: PatternKind, x: u32, y: u32) -> bool {
    match kind {
        PatternKind::Tiles => ((x / TILE_SIZE) + (y / TILE_SIZE)) % 2 == 0,
        PatternKind::Plain => true,
        PatternKind::None => false,
    }
}

/// Fill `buf` (one mapped buffer, rows `pitch` bytes apart) with `kind`.
///
/// Handles the 32-bit RGB family, RGB565 and NV12/NV21. Tiles alternate
/// `color` with black.
pub fn fill_pattern(
    buf: &mut [u8],
    format: DrmFourcc,
    width: u32,
    height: u32,
    pitch: u32,
    kind: PatternKind,
    color: (u8, u8, u8),
) -> Result<()> {
    if kind == PatternKind::None {
        return Ok(());
    }
    debug!(
        "Filling {}x{} {:?} buffer with {:?} pattern",
        width, height, format, kind
    );

    let (r, g, b) = color;
    let pitch = pitch as usize;
    let row_bytes = format_info(format).map_or(0, |info| width as usize * (info.bpp as usize / 8));
    if pitch < row_bytes {
        warn!("Pitch {} too small for {} pixels of {:?}", pitch, width, format);
        return Err(DisplayError::UnsupportedFormat(format!(
            "{:?} pitch {} for width {}",
            format, pitch, width
        )));
    }
    let rows_needed = match format {
        DrmFourcc::Nv12 | DrmFourcc::Nv21 => height as usize * 3 / 2,
        _ => height as usize,
    };
    if buf.len() < pitch * rows_needed {
        warn!(
            "Buffer too small for {}x{} pattern ({} < {})",
            width,
            height,
            buf.len(),
            pitch * rows_needed
        );
        return Err(DisplayError::UnsupportedFormat(format!(
            "{:?} buffer of {} bytes",
            format,
            buf.len()
        )));
    }

    match format {
        DrmFourcc::Xrgb8888 | DrmFourcc::Argb8888 | DrmFourcc::Xbgr8888 | DrmFourcc::Abgr8888 => {
            let pixel = match format {
                DrmFourcc::Xbgr8888 | DrmFourcc::Abgr8888 => u32::from_le_bytes([r, g, b, 0xff]),
                _ => u32::from_le_bytes([b, g, r, 0xff]),
            };
            let black = 0xff00_0000u32.to_le_bytes();
            for y in 0..height {
                let row = &mut buf[y as usize * pitch..][..width as usize * 4];
                for (x, px) in row.chunks_exact_mut(4).enumerate() {
                    if is_lit(kind, x as u32, y) {
                        px.copy_from_slice(&pixel.to_le_bytes());
                    } else {
                        px.copy_from_slice(&black);
                    }
                }
            }
        }
        DrmFourcc::Rgb565 => {
            let pixel = rgb_to_565(r, g, b).to_le_bytes();
            for y in 0..height {
                let row = &mut buf[y as usize * pitch..][..width as usize * 2];
                for (x, px) in row.chunks_exact_mut(2).enumerate() {
                    if is_lit(kind, x as u32, y) {
                        px.copy_from_slice(&pixel);
                    } else {
                        px.copy_from_slice(&[0, 0]);
                    }
                }
            }
        }
        DrmFourcc::Nv12 | DrmFourcc::Nv21 => {
            let (lit_y, u, v) = rgb_to_yuv601(r, g, b);
            let (dark_y, dark_u, dark_v) = rgb_to_yuv601(0, 0, 0);
            let chroma = |lit: bool| {
                let (u, v) = if lit { (u, v) } else { (dark_u, dark_v) };
                match format {
                    DrmFourcc::Nv21 => [v, u],
                    _ => [u, v],
                }
            };

            let (luma, chroma_plane) = buf.split_at_mut(pitch * height as usize);
            for y in 0..height {
                let row = &mut luma[y as usize * pitch..][..width as usize];
                for (x, px) in row.iter_mut().enumerate() {
                    *px = if is_lit(kind, x as u32, y) { lit_y } else { dark_y };
                }
            }
            // 2x2 subsampled, interleaved
            for y in 0..height / 2 {
                let row = &mut chroma_plane[y as usize * pitch..][..(width / 2) as usize * 2];
                for (x, px) in row.chunks_exact_mut(2).enumerate() {
                    px.copy_from_slice(&chroma(is_lit(kind, x as u32 * 2, y * 2)));
                }
            }
        }
        other => {
            warn!("No test pattern for {:?}", other);
            return Err(DisplayError::UnsupportedFormat(format!("{:?}", other)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xrgb_tiles() {
        let (w, h, pitch) = (16u32, 8u32, 64u32);
        let mut buf = vec![0u8; (pitch * h) as usize];
        fill_pattern(&mut buf, DrmFourcc::Xrgb8888, w, h, pitch, PatternKind::Tiles, (0x11, 0x22, 0x33))
            .unwrap();
        // First tile lit, second dark
        assert_eq!(&buf[0..4], &[0x33, 0x22, 0x11, 0xff]);
        assert_eq!(&buf[8 * 4..8 * 4 + 4], &[0, 0, 0, 0xff]);
    }

    #[test]
    fn test_rgb565_plain() {
        let mut buf = vec![0u8; 4 * 2 * 2];
        fill_pattern(&mut buf, DrmFourcc::Rgb565, 4, 2, 8, PatternKind::Plain, (255, 0, 0)).unwrap();
        assert!(buf.chunks_exact(2).all(|px| px == [0x00, 0xf8]));
    }

    #[test]
    fn test_nv12_plain() {
        let (w, h) = (4u32, 2u32);
        let mut buf = vec![0u8; (w * h * 3 / 2) as usize];
        fill_pattern(&mut buf, DrmFourcc::Nv12, w, h, w, PatternKind::Plain, (255, 255, 255)).unwrap();
        assert!(buf[..8].iter().all(|&y| y == 235));
        assert_eq!(&buf[8..12], &[128, 128, 128, 128]);
    }

    #[test]
    fn test_nv21_swaps_chroma() {
        let mut nv12 = vec![0u8; 6];
        let mut nv21 = vec![0u8; 6];
        fill_pattern(&mut nv12, DrmFourcc::Nv12, 2, 2, 2, PatternKind::Plain, (255, 0, 0)).unwrap();
        fill_pattern(&mut nv21, DrmFourcc::Nv21, 2, 2, 2, PatternKind::Plain, (255, 0, 0)).unwrap();
        assert_eq!(nv12[4], nv21[5]);
        assert_eq!(nv12[5], nv21[4]);
    }

    #[test]
    fn test_small_buffer_rejected() {
        let mut buf = vec![0u8; 10];
        assert!(fill_pattern(&mut buf, DrmFourcc::Xrgb8888, 4, 4, 16, PatternKind::Plain, (1, 2, 3)).is_err());
    }

    #[test]
    fn test_short_pitch_rejected() {
        // Large enough overall, but rows overlap
        let mut buf = vec![0u8; 128];
        assert!(fill_pattern(&mut buf, DrmFourcc::Xrgb8888, 16, 4, 32, PatternKind::Plain, (1, 2, 3)).is_err());
        assert!(fill_pattern(&mut buf, DrmFourcc::Rgb565, 16, 4, 16, PatternKind::Tiles, (1, 2, 3)).is_err());
        assert!(fill_pattern(&mut buf, DrmFourcc::Nv12, 16, 4, 8, PatternKind::Plain, (1, 2, 3)).is_err());
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_none_leaves_buffer() {
        let mut buf = vec![7u8; 16];
        fill_pattern(&mut buf, DrmFourcc::Yuv444, 2, 2, 8, PatternKind::None, (1, 2, 3)).unwrap();
        assert!(buf.iter().all(|&b| b == 7));
    }
}

//! Mode negotiation
//!
//! Matching a requested resolution against a connector's mode list, the
//! plugged connector's mode range, and the CRTC a connector should drive.

use log::{debug, warn};

use super::backend::KmsBackend;
use super::resources::{Connector, Crtc, DisplayMode, Size};
use crate::constants::msgid;
use crate::error::{DisplayError, Result};

/// First mode named "<w>x<h>" in kernel order, with an exact refresh
/// match when `refresh` is non-zero
pub fn resolve_mode(modes: &[DisplayMode], size: Size, refresh: u32) -> Option<&DisplayMode> {
    let name = size.mode_name();
    modes.iter().find(|mode| mode.matches(&name, refresh))
}

/// Resolve a mode on a connector
pub fn resolve_connector_mode(
    connector: &Connector,
    width: u32,
    height: u32,
    refresh: u32,
) -> Result<DisplayMode> {
    resolve_mode(connector.modes(), Size::new(width, height), refresh)
        .cloned()
        .ok_or_else(|| {
            debug!(
                "Connector {} has no mode {}x{}@{}",
                connector.id, width, height, refresh
            );
            DisplayError::UnsupportedMode {
                mode: format!("{}x{}@{}", width, height, refresh),
                connector: connector.id,
            }
        })
}

pub fn is_mode_supported(connector: &Connector, width: u32, height: u32, refresh: u32) -> bool {
    resolve_mode(connector.modes(), Size::new(width, height), refresh).is_some()
}

/// Smallest and largest mode by pixel area (ties by width, then height)
pub fn size_range(modes: &[DisplayMode]) -> Option<(Size, Size)> {
    let key = |s: &Size| (s.w as u64 * s.h as u64, s.w, s.h);
    let sizes = modes.iter().map(DisplayMode::size);
    let min = sizes.clone().min_by_key(key)?;
    let max = sizes.max_by_key(key)?;
    Some((min, max))
}

/// Re-query the connector and return its `(min, max)` mode sizes.
///
/// The connector must be plugged right now; the cached state is refreshed
/// as a side effect.
pub fn mode_range<B: KmsBackend + ?Sized>(
    backend: &B,
    connector: &mut Connector,
) -> Result<(Size, Size)> {
    let info = backend.connector(connector.id).map_err(|e| {
        warn!(
            target: msgid::DEVICE_ERROR,
            "failed to query connector {}: {}", connector.id, e
        );
        DisplayError::kernel("GETCONNECTOR", e)
    })?;
    connector.refresh(info);

    if !connector.is_plugged() {
        return Err(DisplayError::DisplayNotConnected(connector.crtc_id));
    }
    size_range(connector.modes()).ok_or(DisplayError::DisplayNotConnected(connector.crtc_id))
}

/// CRTC a connector should drive, or 0 when there is no usable path.
///
/// The firmware-bound encoder's CRTC wins; otherwise the first CRTC whose
/// index bit is set in some usable encoder's possible mask.
pub fn find_crtc<B: KmsBackend + ?Sized>(
    backend: &B,
    connector: &Connector,
    crtcs: &[Crtc],
) -> u32 {
    let info = connector.info();

    if let Some(encoder_id) = info.current_encoder {
        match backend.encoder(encoder_id) {
            Ok(encoder) if encoder.crtc_id != 0 => {
                debug!(
                    "Connector {} already bound: encoder {} -> CRTC {}",
                    connector.id, encoder_id, encoder.crtc_id
                );
                return encoder.crtc_id;
            }
            Ok(_) => {}
            Err(e) => debug!("Encoder {} query failed: {}", encoder_id, e),
        }
    }

    for &encoder_id in &info.encoders {
        let encoder = match backend.encoder(encoder_id) {
            Ok(encoder) => encoder,
            Err(e) => {
                debug!("Encoder {} query failed: {}", encoder_id, e);
                continue;
            }
        };
        if let Some(crtc) = crtcs
            .iter()
            .find(|crtc| crtc.index < 32 && encoder.possible_crtcs & (1 << crtc.index) != 0)
        {
            debug!(
                "Connector {}: encoder {} can drive CRTC {} (index {})",
                connector.id, encoder_id, crtc.id, crtc.index
            );
            return crtc.id;
        }
    }

    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drm::resources::{ConnectionState, ConnectorInfo};

    fn connector(modes: Vec<DisplayMode>) -> Connector {
        Connector::new(ConnectorInfo {
            id: 40,
            kind: 16,
            state: ConnectionState::Connected,
            modes,
            current_encoder: None,
            encoders: vec![],
            edid: None,
        })
    }

    #[test]
    fn test_refresh_zero_takes_first_listed() {
        let conn = connector(vec![
            DisplayMode::new(1920, 1080, 60),
            DisplayMode::new(1920, 1080, 50),
        ]);
        let mode = resolve_connector_mode(&conn, 1920, 1080, 0).unwrap();
        assert_eq!(mode.vrefresh, 60);
        let mode = resolve_connector_mode(&conn, 1920, 1080, 50).unwrap();
        assert_eq!(mode.vrefresh, 50);
    }

    #[test]
    fn test_unknown_mode() {
        let conn = connector(vec![DisplayMode::new(1280, 720, 60)]);
        assert!(!is_mode_supported(&conn, 1920, 1080, 0));
        assert!(!is_mode_supported(&conn, 1280, 720, 30));
        assert!(matches!(
            resolve_connector_mode(&conn, 1920, 1080, 0),
            Err(DisplayError::UnsupportedMode { connector: 40, .. })
        ));
    }

    #[test]
    fn test_size_range_is_numeric() {
        // Kernel order is not sorted
        let modes = vec![
            DisplayMode::new(1280, 720, 60),
            DisplayMode::new(3840, 2160, 30),
            DisplayMode::new(640, 480, 60),
            DisplayMode::new(1920, 1080, 60),
        ];
        let (min, max) = size_range(&modes).unwrap();
        assert_eq!(min, Size::new(640, 480));
        assert_eq!(max, Size::new(3840, 2160));
    }

    #[test]
    fn test_size_range_ties() {
        // Equal area: wider wins for max
        let modes = vec![DisplayMode::new(800, 600, 60), DisplayMode::new(600, 800, 60)];
        let (min, max) = size_range(&modes).unwrap();
        assert_eq!(min, Size::new(600, 800));
        assert_eq!(max, Size::new(800, 600));
        assert!(size_range(&[]).is_none());
    }
}

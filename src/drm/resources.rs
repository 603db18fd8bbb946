//! Display resource model
//!
//! Value objects for the in-memory graph built from kernel resource
//! queries. Kernel ids are plain `u32`; 0 never names a live object.

use std::collections::BTreeSet;
use std::fmt;

use super::edid::Edid;

/// Width x height in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub w: u32,
    pub h: u32,
}

impl Size {
    pub const fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    pub fn is_zero(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Both dimensions inside `[min, max]`
    pub fn within(&self, min: Size, max: Size) -> bool {
        self.w >= min.w && self.h >= min.h && self.w <= max.w && self.h <= max.h
    }

    /// Kernel mode name for this size ("1920x1080")
    pub fn mode_name(&self) -> String {
        format!("{}x{}", self.w, self.h)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.w, self.h)
    }
}

/// Rectangle; the destination origin is signed so it may sit partly off screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{x:{}, y:{}, w:{}, h:{}}}", self.x, self.y, self.w, self.h)
    }
}

/// Logical window id handed out to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u32);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display mode as advertised by a connector
#[derive(Debug, Clone)]
pub struct DisplayMode {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub vrefresh: u32,
    pub preferred: bool,
    /// Opaque kernel timing, required for the mode-set call
    pub timing: Option<drm::control::Mode>,
}

impl DisplayMode {
    /// Mode without kernel timing (capability values, tests)
    pub fn new(width: u32, height: u32, vrefresh: u32) -> Self {
        Self {
            name: format!("{}x{}", width, height),
            width,
            height,
            vrefresh,
            preferred: false,
            timing: None,
        }
    }

    pub fn from_drm(mode: &drm::control::Mode) -> Self {
        let (width, height) = mode.size();
        Self {
            name: mode.name().to_string_lossy().into_owned(),
            width: width as u32,
            height: height as u32,
            vrefresh: mode.vrefresh(),
            preferred: mode
                .mode_type()
                .contains(drm::control::ModeTypeFlags::PREFERRED),
            timing: Some(*mode),
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Name match, plus exact refresh match when `vrefresh` is non-zero
    pub fn matches(&self, name: &str, vrefresh: u32) -> bool {
        self.name == name && (vrefresh == 0 || self.vrefresh == vrefresh)
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.vrefresh)
    }
}

/// Connector plug state as reported by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Unknown,
}

/// Fresh connector state from a kernel query
#[derive(Debug, Clone)]
pub struct ConnectorInfo {
    pub id: u32,
    /// Kernel connector type (DRM_MODE_CONNECTOR_*)
    pub kind: u32,
    pub state: ConnectionState,
    pub modes: Vec<DisplayMode>,
    /// Encoder currently driving the connector, if firmware bound one
    pub current_encoder: Option<u32>,
    pub encoders: Vec<u32>,
    pub edid: Option<Edid>,
}

/// Physical output
#[derive(Debug)]
pub struct Connector {
    pub id: u32,
    pub name: String,
    /// CRTC this connector is bound to (0 = unbound)
    pub crtc_id: u32,
    info: ConnectorInfo,
}

impl Connector {
    pub fn new(info: ConnectorInfo) -> Self {
        Self {
            id: info.id,
            name: connector_type_name(info.kind).to_string(),
            crtc_id: 0,
            info,
        }
    }

    /// Replace the cached query result with a fresh one
    pub fn refresh(&mut self, info: ConnectorInfo) {
        self.info = info;
    }

    /// Result of the last query; plug state must be re-queried before use
    pub fn info(&self) -> &ConnectorInfo {
        &self.info
    }

    pub fn modes(&self) -> &[DisplayMode] {
        &self.info.modes
    }

    pub fn edid(&self) -> Option<&Edid> {
        self.info.edid.as_ref()
    }

    /// Plugged means connected with at least one mode
    pub fn is_plugged(&self) -> bool {
        self.info.state == ConnectionState::Connected && !self.info.modes.is_empty()
    }

    /// Unique sizes in kernel order
    pub fn supported_sizes(&self) -> Vec<Size> {
        let mut sizes: Vec<Size> = Vec::new();
        for mode in &self.info.modes {
            let size = mode.size();
            if !sizes.contains(&size) {
                sizes.push(size);
            }
        }
        sizes
    }
}

/// Encoder state from a kernel query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderInfo {
    pub id: u32,
    /// CRTC currently driven (0 = none)
    pub crtc_id: u32,
    /// Bit n set = CRTC with index n may be used
    pub possible_crtcs: u32,
}

/// Plane state from a kernel query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneInfo {
    pub id: u32,
    pub possible_crtcs: u32,
}

impl PlaneInfo {
    pub fn supports_crtc_index(&self, index: u32) -> bool {
        index < 32 && self.possible_crtcs & (1 << index) != 0
    }
}

/// Display pipeline stage
#[derive(Debug)]
pub struct Crtc {
    pub id: u32,
    /// Bit position in possible-CRTC masks
    pub index: u32,
    pub connectors: BTreeSet<u32>,
    pub(crate) scanout: Option<super::display::Scanout>,
}

impl Crtc {
    pub fn new(id: u32, index: u32) -> Self {
        Self {
            id,
            index,
            connectors: BTreeSet::new(),
            scanout: None,
        }
    }

    /// Framebuffer currently scanned out (0 = none)
    pub fn scanout_fb(&self) -> u32 {
        self.scanout.as_ref().map(|s| s.fb_id).unwrap_or(0)
    }

    /// Buffer backing the scanout framebuffer
    pub fn scanout_buffer(&self) -> Option<&super::buffer::BufferObject> {
        self.scanout.as_ref().map(|s| &s.bo)
    }

    pub fn scanout_buffer_mut(&mut self) -> Option<&mut super::buffer::BufferObject> {
        self.scanout.as_mut().map(|s| &mut s.bo)
    }
}

/// Kernel connector type name
pub fn connector_type_name(kind: u32) -> &'static str {
    match kind {
        1 => "VGA",
        2 => "DVI-I",
        3 => "DVI-D",
        4 => "DVI-A",
        5 => "composite",
        6 => "s-video",
        7 => "LVDS",
        8 => "component",
        9 => "9-pin DIN",
        10 => "DP",
        11 => "HDMI-A",
        12 => "HDMI-B",
        13 => "TV",
        14 => "eDP",
        15 => "Virtual",
        16 => "DSI",
        17 => "DPI",
        18 => "Writeback",
        19 => "SPI",
        20 => "USB",
        _ => "unknown",
    }
}

//! Global constants for kmsvideo
//!
//! Consolidates timing, capability defaults, vendor property codes and the
//! log message-id vocabulary to eliminate magic numbers throughout the codebase.

// ============================================================================
// Timing Constants
// ============================================================================

/// Hotplug monitor poll interval in milliseconds
pub const HOTPLUG_POLL_INTERVAL_MS: u64 = 250;

// ============================================================================
// Device Discovery
// ============================================================================

/// udev subsystem carrying display devices
pub const DRM_SUBSYSTEM: &str = "drm";

/// Device nodes whose path contains this marker are display cards
/// (render nodes and control nodes are skipped)
pub const CARD_NODE_MARKER: &str = "card";

// ============================================================================
// Capability Defaults
// ============================================================================

/// Default maximum resolution when the capability file does not provide one
pub const DEFAULT_MAX_WIDTH: u32 = 1920;
pub const DEFAULT_MAX_HEIGHT: u32 = 1080;

/// Default minimum resolution
pub const DEFAULT_MIN_WIDTH: u32 = 0;
pub const DEFAULT_MIN_HEIGHT: u32 = 0;

/// Default refresh rate for both bounds (Hz)
pub const DEFAULT_REFRESH_HZ: u32 = 60;

/// Default logical plane set
pub const DEFAULT_PLANE_NAME: &str = "MAIN";

/// Capability file name, joined with the build-time config directory
pub const DEVICE_CAP_FILE_NAME: &str = "device-cap.json";

/// Build-time config directory (override with KMSVIDEO_CONFIG_DIR at compile time)
pub const CONFIG_DIR_PATH: &str = match option_env!("KMSVIDEO_CONFIG_DIR") {
    Some(dir) => dir,
    None => "/etc/kmsvideo",
};

// ============================================================================
// Plane Properties
// ============================================================================

/// Vendor-specific plane property: bind framebuffer (value = fb id, 0 detaches)
pub const PROP_SET_PLANE_FB: u32 = 0xff01;

/// Vendor-specific plane property: global z-order (value = packed window ids)
pub const PROP_SET_Z_ORDER: u32 = 0xff02;

/// Vendor-specific plane property: scaling (value = address of scale params)
pub const PROP_SET_SCALING: u32 = 0xff03;

/// Width of one window slot in the packed z-order argument
pub const Z_ORDER_SLOT_BITS: u32 = 16;

/// Number of window slots that fit the 64-bit z-order argument
pub const Z_ORDER_MAX_WINDOWS: usize = (u64::BITS / Z_ORDER_SLOT_BITS) as usize;

// ============================================================================
// Log Message IDs
// ============================================================================

/// Message ids used as the `target:` of log records
pub mod msgid {
    // config file related
    pub const LOAD_CONFIG: &str = "LOAD_CONFIG";
    pub const CONFIG_FILE_READ_FAILED: &str = "CONFIG_FILE_READ_FAILED";
    pub const CONFFILE_MISCONFIGURED: &str = "CONFIG_FILE_MISCONFIGURED";

    // drm setup
    pub const BUFFER_CREATION_FAILED: &str = "BUFFER_CREATION_FAILED";
    pub const FB_CREATION_FAILED: &str = "FB_CREATION_FAILED";
    pub const INVALID_DISPLAY_MODE: &str = "INVALID_DISPLAY_MODE";
    pub const DISPLAY_NOT_CONNECTED: &str = "DISPLAY_NOT_CONNECTED";
    pub const DEVICE_STATUS: &str = "DEVICE_STATUS";
    pub const UDEV_ERROR: &str = "UDEV_ERROR";
    pub const DEVICE_ERROR: &str = "DEVICE_ERROR";
    pub const DRM_MODESET_ERROR: &str = "DRM_MODESET_ERROR";
    pub const FATAL_ERROR: &str = "FATAL_ERROR";

    // video
    pub const INVALID_SINK: &str = "INVALID_SINK";
    pub const VIDEO_DISCONNECT_FAILED: &str = "VIDEO_DISCONNECT_FAILED";
    pub const VIDEO_SCALING_FAILED: &str = "VIDEO_SCALING_FAILED";
    pub const SET_ZORDER_FAILED: &str = "SET_ZORDER_FAILED";
    pub const VIDEO_BLANKING_FAILED: &str = "VIDEO_BLANKING_FAILED";
    pub const VIDEO_UNBLANKING_FAILED: &str = "VIDEO_UNBLANKING_FAILED";
    pub const DRM_SET_PLANE_FAILED: &str = "DRM_SET_PLANE_FAILED";
    pub const DRM_SET_PROP_FAILED: &str = "DRM_SET_PROP_FAILED";
    pub const MODE_CHANGE_FAILED: &str = "MODE_CHANGE_FAILED";
}

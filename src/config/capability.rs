//! Static device capability
//!
//! Loaded once from `device-cap.json`:
//!
//! ```json
//! {
//!   "videoCapabilities": {
//!     "maxResolution": { "w": 1920, "h": 1080, "freq": 60 },
//!     "minResolution": { "w": 640, "h": 480, "freq": 60 }
//!   },
//!   "planes": ["MAIN", "SUB"]
//! }
//! ```
//!
//! Every field is optional; each one that is missing or malformed keeps
//! its default.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{
    msgid, CONFIG_DIR_PATH, DEFAULT_MAX_HEIGHT, DEFAULT_MAX_WIDTH, DEFAULT_MIN_HEIGHT,
    DEFAULT_MIN_WIDTH, DEFAULT_PLANE_NAME, DEFAULT_REFRESH_HZ, DEVICE_CAP_FILE_NAME,
};
use crate::drm::Size;

/// Resolution bound with refresh rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub w: u32,
    pub h: u32,
    pub freq: u32,
}

impl Resolution {
    pub const fn new(w: u32, h: u32, freq: u32) -> Self {
        Self { w, h, freq }
    }

    pub fn size(&self) -> Size {
        Size::new(self.w, self.h)
    }
}

/// Hard resolution bounds and logical plane names of the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapability {
    max_resolution: Resolution,
    min_resolution: Resolution,
    plane_names: BTreeSet<String>,
}

impl Default for DeviceCapability {
    fn default() -> Self {
        Self {
            max_resolution: Resolution::new(DEFAULT_MAX_WIDTH, DEFAULT_MAX_HEIGHT, DEFAULT_REFRESH_HZ),
            min_resolution: Resolution::new(DEFAULT_MIN_WIDTH, DEFAULT_MIN_HEIGHT, DEFAULT_REFRESH_HZ),
            plane_names: BTreeSet::from([DEFAULT_PLANE_NAME.to_string()]),
        }
    }
}

impl DeviceCapability {
    /// Default file location: `KMSVIDEO_DEVICE_CAP`, else the build-time
    /// config directory joined with `device-cap.json`
    pub fn default_path() -> PathBuf {
        match std::env::var_os("KMSVIDEO_DEVICE_CAP") {
            Some(path) => PathBuf::from(path),
            None => Path::new(CONFIG_DIR_PATH).join(DEVICE_CAP_FILE_NAME),
        }
    }

    /// Load from `path`; unreadable or malformed files yield the defaults
    pub fn load(path: &Path) -> Self {
        info!(
            target: msgid::LOAD_CONFIG,
            "Loading static DeviceCapability from file {}",
            path.display()
        );
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                error!(
                    target: msgid::CONFIG_FILE_READ_FAILED,
                    "Failed to read DeviceCapability file, using defaults. File: {}. Error: {}",
                    path.display(),
                    e
                );
                return Self::default();
            }
        };
        Self::from_json(&content)
    }

    /// Parse a capability document
    pub fn from_json(content: &str) -> Self {
        let mut capability = Self::default();

        let root: Value = match serde_json::from_str(content) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => {
                error!(
                    target: msgid::CONFIG_FILE_READ_FAILED,
                    "DeviceCapability document is not an object, using defaults"
                );
                return capability;
            }
            Err(e) => {
                error!(
                    target: msgid::CONFIG_FILE_READ_FAILED,
                    "Failed to parse DeviceCapability file, using defaults: {}", e
                );
                return capability;
            }
        };

        if let Some(video) = root.get("videoCapabilities") {
            match video.get("maxResolution") {
                Some(value) => parse_resolution(&mut capability.max_resolution, value),
                None => error!(
                    target: msgid::CONFFILE_MISCONFIGURED,
                    "Failed to read maxResolution from DeviceCapability file, using default"
                ),
            }
            match video.get("minResolution") {
                Some(value) => parse_resolution(&mut capability.min_resolution, value),
                None => error!(
                    target: msgid::CONFFILE_MISCONFIGURED,
                    "Failed to read minResolution from DeviceCapability file, using default"
                ),
            }
        }

        if let Some(planes) = root.get("planes") {
            parse_planes(&mut capability.plane_names, planes);
        }

        debug!("{:?}", capability);
        capability
    }

    pub fn max_resolution(&self) -> Resolution {
        self.max_resolution
    }

    pub fn min_resolution(&self) -> Resolution {
        self.min_resolution
    }

    /// Logical plane names, sorted
    pub fn plane_names(&self) -> &BTreeSet<String> {
        &self.plane_names
    }

    /// Both dimensions inside `[min, max]`
    pub fn is_valid_size(&self, size: Size) -> bool {
        size.within(self.min_resolution.size(), self.max_resolution.size())
    }
}

fn parse_resolution(resolution: &mut Resolution, value: &Value) {
    match Resolution::deserialize(value) {
        Ok(parsed) => *resolution = parsed,
        Err(e) => error!(
            target: msgid::CONFFILE_MISCONFIGURED,
            "Failed to read resolution ({}), using defaults", e
        ),
    }
}

fn parse_planes(names: &mut BTreeSet<String>, value: &Value) {
    let Some(items) = value.as_array() else {
        error!(
            target: msgid::CONFFILE_MISCONFIGURED,
            "Failed to read plane names, setting defaults"
        );
        return;
    };
    let parsed: BTreeSet<String> = items
        .iter()
        .filter_map(|item| item.as_str().map(str::to_string))
        .collect();
    if parsed.len() != items.len() {
        error!(
            target: msgid::CONFFILE_MISCONFIGURED,
            "Ignoring non-string plane names"
        );
    }
    *names = parsed;
}

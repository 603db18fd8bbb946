//! Configuration file management
//!
//! Loads the TOML runtime settings and re-exports the static device
//! capability. Default config path: ~/.config/kmsvideo/config.toml

pub mod capability;

pub use capability::{DeviceCapability, Resolution};

use anyhow::{anyhow, Context, Result};
use drm::buffer::DrmFourcc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::msgid;
use crate::utils::parse_hex_color;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Display settings
    pub display: DisplaySettings,
    /// Test pattern settings
    pub pattern: PatternSettings,
}

/// Display settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Scanout pixel format as a fourcc code (e.g. "XR24", "RG16", "NV12")
    pub scanout_format: String,
    /// Only open device nodes whose path contains this string (empty = all)
    pub device: String,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            scanout_format: "XR24".to_string(),
            device: String::new(),
        }
    }
}

/// Test pattern kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    /// Checkerboard of the color and black
    Tiles,
    /// Solid color
    Plain,
    /// Leave the buffer as allocated
    None,
}

impl std::str::FromStr for PatternKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tiles" => Ok(PatternKind::Tiles),
            "plain" => Ok(PatternKind::Plain),
            "none" => Ok(PatternKind::None),
            _ => Err(anyhow!("unknown pattern '{}' (tiles, plain, none)", s)),
        }
    }
}

/// Test pattern settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternSettings {
    pub kind: PatternKind,
    /// Pattern color (RRGGBB)
    pub color: String,
}

impl Default for PatternSettings {
    fn default() -> Self {
        Self {
            kind: PatternKind::Tiles,
            color: "3465a4".to_string(),
        }
    }
}

impl PatternSettings {
    /// Parsed color; invalid values fall back to white
    pub fn rgb(&self) -> (u8, u8, u8) {
        parse_hex_color(&self.color).unwrap_or_else(|| {
            warn!(
                target: msgid::CONFFILE_MISCONFIGURED,
                "Invalid pattern color '{}', using white", self.color
            );
            (0xff, 0xff, 0xff)
        })
    }
}

impl DisplaySettings {
    /// Scanout format; unknown codes fall back to XRGB8888
    pub fn fourcc(&self) -> DrmFourcc {
        parse_fourcc(&self.scanout_format).unwrap_or_else(|e| {
            warn!(target: msgid::CONFFILE_MISCONFIGURED, "{}, using XR24", e);
            DrmFourcc::Xrgb8888
        })
    }

    /// Device node filter
    pub fn matches_node(&self, node: &str) -> bool {
        self.device.is_empty() || node.contains(&self.device)
    }
}

/// Parse a four-character code ("XR24") into a format
pub fn parse_fourcc(code: &str) -> Result<DrmFourcc> {
    let bytes: [u8; 4] = code
        .as_bytes()
        .try_into()
        .map_err(|_| anyhow!("fourcc '{}' must be four characters", code))?;
    DrmFourcc::try_from(u32::from_le_bytes(bytes))
        .map_err(|_| anyhow!("unknown fourcc '{}'", code))
}

impl Settings {
    /// System-wide config path
    const SYSTEM_CONFIG_PATH: &'static str = "/etc/kmsvideo/config.toml";

    /// Get the path that would be used for loading config
    /// Returns None if using built-in defaults
    pub fn config_path() -> Option<PathBuf> {
        // 1. KMSVIDEO_CONFIG environment variable
        if let Ok(path) = std::env::var("KMSVIDEO_CONFIG") {
            let p = std::path::Path::new(&path);
            if p.exists() {
                return Some(p.to_path_buf());
            }
        }

        // 2. User config: ~/.config/kmsvideo/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("kmsvideo").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }
        }

        // 3. System config: /etc/kmsvideo/config.toml
        let system_config = std::path::Path::new(Self::SYSTEM_CONFIG_PATH);
        if system_config.exists() {
            return Some(system_config.to_path_buf());
        }

        None
    }

    /// Load configuration with priority:
    /// 1. KMSVIDEO_CONFIG environment variable
    /// 2. ~/.config/kmsvideo/config.toml (user config)
    /// 3. /etc/kmsvideo/config.toml (system config)
    /// 4. Built-in defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            match Self::load_from_file(path.to_string_lossy().as_ref()) {
                Ok(settings) => {
                    info!(target: msgid::LOAD_CONFIG, "Loaded config: {}", path.display());
                    return settings;
                }
                Err(e) => {
                    warn!(
                        target: msgid::CONFIG_FILE_READ_FAILED,
                        "Failed to load config {}: {:#}",
                        path.display(),
                        e
                    );
                }
            }
        }
        info!("Using built-in default config");
        Self::default()
    }

    /// Load settings from specified path
    fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;
        Ok(settings)
    }
}

//! kmsvideo - KMS display resource manager
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              Video Service               │
//! │   windows → planes, z-order, scaling     │
//! ├──────────────────────────────────────────┤
//! │  Device Table  ←  Hotplug (udev)         │
//! │       ↓                                  │
//! │  Device: connectors / CRTCs / planes     │
//! │       ↓                                  │
//! │  KmsBackend (DRM ioctls, dumb buffers)   │
//! └──────────────────────────────────────────┘
//! ```

pub mod config;
pub mod constants;
#[cfg(target_os = "linux")]
pub mod context;
pub mod drm;
pub mod error;
pub mod utils;
pub mod video;

pub use config::{DeviceCapability, Settings};
#[cfg(target_os = "linux")]
pub use context::Context;
pub use error::{DisplayError, Result};
pub use video::{DeviceObserver, LogicalPlane, VideoService};

//! DRM/KMS display management

pub mod backend;
pub mod buffer;
pub mod card;
pub mod device;
pub mod display;
pub mod edid;
pub mod enumerator;
#[cfg(target_os = "linux")]
pub mod hotplug;
mod ioctl_helpers;
pub mod mode;
pub mod pattern;
pub mod resources;

pub use backend::{DumbAllocation, KmsBackend, PlaneLayout, ResourceIds, ScaleParams};
pub use buffer::{create_buffer, destroy_buffer, map_buffer, unmap_buffer, BufferObject};
pub use card::Card;
pub use device::Device;
pub use display::Scanout;
pub use edid::Edid;
pub use enumerator::DeviceTable;
#[cfg(target_os = "linux")]
pub use hotplug::{list_device_nodes, HotplugEvent, HotplugMonitor};
pub use mode::{find_crtc, is_mode_supported, resolve_connector_mode};
pub use pattern::fill_pattern;
pub use resources::{
    ConnectionState, Connector, ConnectorInfo, Crtc, DisplayMode, EncoderInfo, PlaneInfo, Rect,
    Size, WindowId,
};

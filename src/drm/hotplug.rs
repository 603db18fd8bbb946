//! DRM hotplug detection
//!
//! Monitors udev events for DRM devices (monitor plug/unplug) and lists
//! the current device nodes. Polled from the main loop; never blocks.

use anyhow::{Context, Result};
use log::{debug, info, trace};
use std::os::unix::io::{AsRawFd, RawFd};

use crate::constants::DRM_SUBSYSTEM;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotplugEvent {
    /// Connector state on `devnode` changed (connect/disconnect/mode change)
    DeviceChanged { devnode: String },
}

/// Non-blocking udev monitor socket
pub struct HotplugMonitor {
    socket: udev::MonitorSocket,
}

impl HotplugMonitor {
    /// Subscribe to kernel uevents of the display subsystem
    pub fn new() -> Result<Self> {
        let socket = udev::MonitorBuilder::new()
            .context("udev monitor unavailable")?
            .match_subsystem(DRM_SUBSYSTEM)
            .with_context(|| format!("Failed to filter on subsystem {}", DRM_SUBSYSTEM))?
            .listen()
            .context("Failed to bind udev monitor socket")?;

        info!("Listening for {} hotplug events", DRM_SUBSYSTEM);
        Ok(Self { socket })
    }

    /// Monitor socket, for callers that poll it themselves
    pub fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    /// Check for a hotplug event (non-blocking)
    ///
    /// Returns at most one event per call; further pending events stay
    /// queued on the socket for the next tick.
    pub fn poll(&mut self) -> Option<HotplugEvent> {
        for event in self.socket.iter() {
            trace!(
                "udev event {:?} on {:?}",
                event.event_type(),
                event.devpath().to_string_lossy()
            );
            // Connector changes arrive as "change" with HOTPLUG=1
            let is_change = event.action().map(|a| a == "change").unwrap_or(false);
            let is_hotplug = event
                .property_value("HOTPLUG")
                .map(|v| v == "1")
                .unwrap_or(false);
            if !is_change || !is_hotplug {
                continue;
            }
            let Some(devnode) = event.devnode() else {
                continue;
            };
            let devnode = devnode.to_string_lossy().into_owned();
            debug!("DRM device event: {}", devnode);
            return Some(HotplugEvent::DeviceChanged { devnode });
        }
        None
    }
}

/// Device nodes currently present in the DRM subsystem
pub fn list_device_nodes() -> Result<Vec<String>> {
    let mut enumerator = udev::Enumerator::new().context("Failed to create udev enumerator")?;
    enumerator
        .match_subsystem(DRM_SUBSYSTEM)
        .context("Failed to match drm subsystem")?;

    let mut nodes: Vec<String> = enumerator
        .scan_devices()
        .context("Failed to scan drm devices")?
        .filter_map(|device| {
            device
                .devnode()
                .map(|node| node.to_string_lossy().into_owned())
        })
        .collect();
    nodes.sort();

    debug!("DRM device nodes: {:?}", nodes);
    Ok(nodes)
}

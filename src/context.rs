//! Process context
//!
//! Built once at startup and passed by reference to whatever needs the
//! display. Owns the video service and the hotplug monitor.

use anyhow::{Context as _, Result};
use log::{info, warn};

use crate::config::{DeviceCapability, Settings};
use crate::constants::msgid;
use crate::drm::{list_device_nodes, Card, DeviceTable, HotplugEvent, HotplugMonitor};
use crate::video::VideoService;

pub struct Context {
    settings: Settings,
    video: VideoService<Card>,
    hotplug: Option<HotplugMonitor>,
}

impl Context {
    /// Enumerate the display devices, start the primary one and begin
    /// listening for hotplug events.
    ///
    /// A missing hotplug monitor is logged and tolerated; display setup
    /// errors are not.
    pub fn new(settings: Settings, capability: DeviceCapability) -> Result<Self> {
        let nodes: Vec<String> = list_device_nodes()?
            .into_iter()
            .filter(|node| settings.display.matches_node(node))
            .collect();
        info!("Display device nodes: {:?}", nodes);

        let devices = DeviceTable::enumerate(
            &nodes,
            |node: &str| Card::open(node),
            capability.max_resolution().size(),
            settings.display.fourcc(),
        );
        let video = VideoService::new(devices, capability).context("Display setup failed")?;

        let hotplug = match HotplugMonitor::new() {
            Ok(monitor) => Some(monitor),
            Err(e) => {
                warn!(target: msgid::UDEV_ERROR, "Hotplug detection disabled: {:#}", e);
                None
            }
        };

        Ok(Self {
            settings,
            video,
            hotplug,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn video(&self) -> &VideoService<Card> {
        &self.video
    }

    pub fn video_mut(&mut self) -> &mut VideoService<Card> {
        &mut self.video
    }

    pub fn hotplug(&self) -> Option<&HotplugMonitor> {
        self.hotplug.as_ref()
    }

    /// One hotplug tick: handle at most one pending event.
    ///
    /// Returns true when an event was processed.
    pub fn poll_hotplug(&mut self) -> bool {
        let Some(monitor) = self.hotplug.as_mut() else {
            return false;
        };
        match monitor.poll() {
            Some(HotplugEvent::DeviceChanged { devnode }) => {
                info!(target: msgid::DEVICE_STATUS, "Hotplug on {}", devnode);
                self.video.handle_hotplug(&devnode);
                true
            }
            None => false,
        }
    }
}

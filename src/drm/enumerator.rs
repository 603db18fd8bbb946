//! Display device table
//!
//! Opens every card node, keeps the devices whose resource graph could be
//! built, and drives mode negotiation on the primary one (the first device
//! that loaded). Hotplug refreshes come through [`DeviceTable::update_device`].

use drm::buffer::DrmFourcc;
use log::{debug, error, info, warn};

use super::backend::KmsBackend;
use super::device::Device;
use super::resources::Size;
use crate::constants::{msgid, CARD_NODE_MARKER};
use crate::error::{DisplayError, Result};

/// Devices keyed by node path, in enumeration order
pub struct DeviceTable<B: KmsBackend> {
    devices: Vec<Device<B>>,
    /// Size requested at startup (capability maximum)
    initial: Size,
    /// Size of the last successful mode change
    configured: Size,
    /// Last range reported to the observer
    last_range: Option<(Size, Size)>,
}

impl<B: KmsBackend> DeviceTable<B> {
    /// Open every card node with `open` and load its resource graph.
    ///
    /// Nodes without the card marker are skipped. A node that fails to open
    /// or load is logged and skipped; enumeration continues.
    pub fn enumerate<I, S, F>(nodes: I, mut open: F, initial: Size, format: DrmFourcc) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnMut(&str) -> anyhow::Result<B>,
    {
        let mut devices = Vec::new();
        for node in nodes {
            let node = node.as_ref();
            if !node.contains(CARD_NODE_MARKER) {
                debug!("Skipping non-card node {}", node);
                continue;
            }

            let backend = match open(node) {
                Ok(backend) => backend,
                Err(e) => {
                    error!(target: msgid::DEVICE_ERROR, "Failed to open {}: {:#}", node, e);
                    continue;
                }
            };
            match Device::load(node, backend, initial, format) {
                Ok(device) => devices.push(device),
                Err(e) => error!(target: msgid::DEVICE_ERROR, "Skipping {}: {}", node, e),
            }
        }

        if let Some(primary) = devices.first() {
            info!("Primary display device: {}", primary.name());
        } else {
            warn!(target: msgid::DEVICE_ERROR, "No usable display device found");
        }

        Self {
            devices,
            initial,
            configured: initial,
            last_range: None,
        }
    }

    /// Set up the primary device and mode-set every CRTC that has connectors.
    ///
    /// Returns the primary connector's mode range when it is plugged.
    /// Mode-set failures are logged; only fatal setup errors propagate.
    pub fn start(&mut self) -> Result<Option<(Size, Size)>> {
        let device = self.devices.first_mut().ok_or(DisplayError::NoPrimaryDevice)?;
        device.setup()?;

        let range = self.renegotiate(0);
        self.last_range = range;

        let device = &mut self.devices[0];
        let size = device.size();
        let crtc_ids: Vec<u32> = device
            .crtcs()
            .iter()
            .filter(|c| !c.connectors.is_empty())
            .map(|c| c.id)
            .collect();
        for crtc_id in crtc_ids {
            if let Err(e) = device.set_active_mode(crtc_id, size.w, size.h, 0) {
                warn!(
                    target: msgid::DRM_MODESET_ERROR,
                    "Initial mode-set of CRTC {} failed: {}", crtc_id, e
                );
            }
        }
        Ok(range)
    }

    /// Refresh after a hotplug event on `node`.
    ///
    /// Returns the new `(min, max)` range when it differs from the last one
    /// reported. The primary display is mode-set again when its target size
    /// or range changed.
    pub fn update_device(&mut self, node: &str) -> Option<(Size, Size)> {
        let Some(index) = self.devices.iter().position(|d| d.name() == node) else {
            error!(
                target: msgid::DEVICE_ERROR,
                "Cannot handle new DRM device detected {}", node
            );
            return None;
        };

        let previous = self.devices[index].size();
        self.devices[index].refresh_connectors();
        let range = self.renegotiate(index);
        let changed = range.is_some() && range != self.last_range;
        self.last_range = range;

        let device = &mut self.devices[index];
        if index == 0 && (changed || device.size() != previous) {
            let size = device.size();
            match device.display_crtc().map(|c| c.id) {
                Some(crtc_id) => {
                    if let Err(e) = device.set_active_mode(crtc_id, size.w, size.h, 0) {
                        error!(
                            target: msgid::MODE_CHANGE_FAILED,
                            "Re-applying {} after hotplug failed: {}", size, e
                        );
                    }
                }
                None => debug!("No display CRTC on {}", node),
            }
        }

        if changed {
            range
        } else {
            None
        }
    }

    /// Recompute the range and target size of device `index`
    fn renegotiate(&mut self, index: usize) -> Option<(Size, Size)> {
        let configured = self.configured;
        let device = &mut self.devices[index];

        let range = match device.mode_range() {
            Ok(range) => Some(range),
            Err(e) => {
                info!(target: msgid::DEVICE_STATUS, "{}: {}", device.name(), e);
                None
            }
        };

        device.size = match range {
            Some((_, max))
                if !max.is_zero() && (max.w < configured.w || max.h < configured.h) =>
            {
                max
            }
            _ => configured,
        };
        if let Some((min, max)) = range {
            debug!(
                "{}: range {} - {}, target {}",
                device.name(),
                min,
                max,
                device.size
            );
        }
        range
    }

    /// Mode-set the primary device to `width`x`height`.
    ///
    /// CRTCs with bound connectors are tried in order; the first success
    /// becomes the configured size. Idle CRTCs are skipped.
    pub fn change_mode(&mut self, width: u32, height: u32, refresh: u32) -> Result<()> {
        let device = self.devices.first_mut().ok_or(DisplayError::NoPrimaryDevice)?;
        let crtc_ids: Vec<u32> = device
            .crtcs()
            .iter()
            .filter(|c| !c.connectors.is_empty())
            .map(|c| c.id)
            .collect();

        let mut last_err = match device.crtcs().first() {
            Some(crtc) => DisplayError::NoConnectors(crtc.id),
            None => DisplayError::CrtcNotFound(0),
        };
        for crtc_id in crtc_ids {
            match device.set_active_mode(crtc_id, width, height, refresh) {
                Ok(()) => {
                    device.size = Size::new(width, height);
                    self.configured = device.size;
                    return Ok(());
                }
                Err(e) => {
                    debug!("CRTC {} rejected {}x{}: {}", crtc_id, width, height, e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    pub fn primary(&self) -> Option<&Device<B>> {
        self.devices.first()
    }

    pub fn primary_mut(&mut self) -> Option<&mut Device<B>> {
        self.devices.first_mut()
    }

    pub fn get(&self, node: &str) -> Option<&Device<B>> {
        self.devices.iter().find(|d| d.name() == node)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device<B>> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn initial_size(&self) -> Size {
        self.initial
    }

    pub fn configured_size(&self) -> Size {
        self.configured
    }
}

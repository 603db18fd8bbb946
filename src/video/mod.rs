//! Video service
//!
//! Logical windows (one per configured plane name) mapped onto physical
//! planes of the primary display, plus resolution control. Every
//! operation targets the single display driven by the first connector.

use std::collections::BTreeMap;

use log::{debug, error, info, warn};

use crate::config::DeviceCapability;
use crate::constants::{
    msgid, PROP_SET_PLANE_FB, PROP_SET_SCALING, PROP_SET_Z_ORDER, Z_ORDER_MAX_WINDOWS,
    Z_ORDER_SLOT_BITS,
};
use crate::drm::{DeviceTable, KmsBackend, Rect, ScaleParams, Size, WindowId};
use crate::error::{DisplayError, Result};

/// Receives display capability changes detected on hotplug
pub trait DeviceObserver {
    fn device_updated(&mut self, min: Size, max: Size);
}

impl<F: FnMut(Size, Size)> DeviceObserver for F {
    fn device_updated(&mut self, min: Size, max: Size) {
        self(min, max)
    }
}

/// Window exposed to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalPlane {
    pub wid: WindowId,
    pub name: String,
    pub min: Size,
    pub max: Size,
}

/// Physical plane behind a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sink {
    pub plane_id: u32,
    pub connected: bool,
}

/// Pack window ids into the z-order argument, 16 bits each, the first id
/// in the most significant occupied slot.
///
/// More than four windows do not fit and are rejected. Ids wider than 16
/// bits are truncated.
pub fn pack_z_order(windows: &[WindowId]) -> Result<u64> {
    if windows.len() > Z_ORDER_MAX_WINDOWS {
        return Err(DisplayError::ZOrderOverflow(windows.len()));
    }
    let slot_mask = (1u64 << Z_ORDER_SLOT_BITS) - 1;
    Ok(windows.iter().fold(0u64, |packed, wid| {
        let id = wid.0 as u64;
        if id > slot_mask {
            warn!(
                target: msgid::SET_ZORDER_FAILED,
                "window id {} truncated to {:#x} in z-order", wid, id & slot_mask
            );
        }
        (packed << Z_ORDER_SLOT_BITS) | (id & slot_mask)
    }))
}

/// Video plane service over the primary display device
pub struct VideoService<B: KmsBackend> {
    devices: DeviceTable<B>,
    capability: DeviceCapability,
    logical_planes: Vec<LogicalPlane>,
    /// Physical planes reserved for windows, in pool order
    physical_planes: Vec<u32>,
    sinks: BTreeMap<WindowId, Sink>,
    observer: Option<Box<dyn DeviceObserver>>,
}

impl<B: KmsBackend> VideoService<B> {
    /// Start the display and reserve one physical plane per logical plane.
    ///
    /// Window ids follow the sorted plane names. Windows beyond the plane
    /// pool get no sink. Fatal device setup errors propagate.
    pub fn new(mut devices: DeviceTable<B>, capability: DeviceCapability) -> Result<Self> {
        let range = devices.start()?;

        let min = capability.min_resolution().size();
        let max = capability.max_resolution().size();
        let logical_planes: Vec<LogicalPlane> = capability
            .plane_names()
            .iter()
            .enumerate()
            .map(|(index, name)| LogicalPlane {
                wid: WindowId(index as u32),
                name: name.clone(),
                min,
                max,
            })
            .collect();

        let pool = devices.primary().map(|d| d.get_planes()).unwrap_or_default();
        let mut physical_planes = Vec::new();
        let mut sinks = BTreeMap::new();
        for (plane, &plane_id) in logical_planes.iter().zip(pool.iter()) {
            physical_planes.push(plane_id);
            sinks.insert(
                plane.wid,
                Sink {
                    plane_id,
                    connected: false,
                },
            );
            debug!("Window {} ({}) -> plane {}", plane.wid, plane.name, plane_id);
        }
        if sinks.len() < logical_planes.len() {
            warn!(
                target: msgid::DEVICE_ERROR,
                "{} logical planes but only {} physical planes",
                logical_planes.len(),
                pool.len()
            );
        }

        let mut service = Self {
            devices,
            capability,
            logical_planes,
            physical_planes,
            sinks,
            observer: None,
        };
        if let Some((min, max)) = range {
            service.handle_device_update(min, max);
        }
        info!(
            "Video service ready: {} windows, planes {:?}",
            service.sinks.len(),
            service.physical_planes
        );
        Ok(service)
    }

    /// Register the receiver of capability changes (replaces any previous one)
    pub fn set_observer(&mut self, observer: Box<dyn DeviceObserver>) {
        self.observer = Some(observer);
    }

    pub fn devices(&self) -> &DeviceTable<B> {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut DeviceTable<B> {
        &mut self.devices
    }

    pub fn capability(&self) -> &DeviceCapability {
        &self.capability
    }

    pub fn sink(&self, wid: WindowId) -> Option<&Sink> {
        self.sinks.get(&wid)
    }

    /// Physical planes reserved for windows
    pub fn physical_planes(&self) -> &[u32] {
        &self.physical_planes
    }

    fn valid_sink(&self, wid: WindowId) -> Result<&Sink> {
        self.sinks.get(&wid).ok_or_else(|| {
            error!(target: msgid::INVALID_SINK, "Invalid sink {}", wid);
            DisplayError::InvalidWindow(wid)
        })
    }

    /// Plane of a connected sink
    fn connected_plane(&self, wid: WindowId) -> Result<u32> {
        let sink = self.valid_sink(wid)?;
        if !sink.connected {
            debug!("Sink {} is not connected", wid);
            return Err(DisplayError::SinkNotConnected(wid));
        }
        Ok(sink.plane_id)
    }

    fn primary_mut(&mut self) -> Result<&mut crate::drm::Device<B>> {
        self.devices.primary_mut().ok_or(DisplayError::NoPrimaryDevice)
    }

    /// Bind a window to its plane and return the plane id
    pub fn connect(&mut self, wid: WindowId) -> Result<u32> {
        self.valid_sink(wid)?;
        let sink = self
            .sinks
            .get_mut(&wid)
            .ok_or(DisplayError::InvalidWindow(wid))?;
        if sink.connected {
            debug!("Sink {} already connected", wid);
        } else {
            sink.connected = true;
            info!("Window {} connected to plane {}", wid, sink.plane_id);
        }
        Ok(sink.plane_id)
    }

    /// Detach the framebuffer from the window's plane and unbind it.
    ///
    /// If the detach fails the window stays connected.
    pub fn disconnect(&mut self, wid: WindowId) -> Result<()> {
        debug!("disconnect called for wid {}", wid);
        let plane_id = self.connected_plane(wid)?;

        self.primary_mut()?
            .set_plane_property(plane_id, PROP_SET_PLANE_FB, 0)
            .map_err(|e| {
                error!(
                    target: msgid::VIDEO_DISCONNECT_FAILED,
                    "Failed to set properties for wid {}: {}", wid, e
                );
                e
            })?;

        if let Some(sink) = self.sinks.get_mut(&wid) {
            sink.connected = false;
        }
        info!("Window {} disconnected", wid);
        Ok(())
    }

    /// Scale `input` of the window's source onto `output` on screen
    pub fn apply_scaling(
        &mut self,
        wid: WindowId,
        source: Rect,
        input: Rect,
        output: Rect,
    ) -> Result<()> {
        debug!(
            "applyScaling with source {}, input {}, output {}",
            source, input, output
        );
        let plane_id = self.connected_plane(wid)?;
        let params = ScaleParams::new(output, input);

        self.primary_mut()?
            .set_plane_scaling(plane_id, PROP_SET_SCALING, &params)
            .map_err(|e| {
                error!(
                    target: msgid::VIDEO_SCALING_FAILED,
                    "Failed to apply scaling for plane {}: {}", plane_id, e
                );
                e
            })
    }

    /// Global front-to-back window order, first entry on top
    pub fn set_composition_params(&mut self, z_order: &[WindowId]) -> Result<()> {
        for (index, &wid) in z_order.iter().enumerate() {
            debug!("zorder {} for wid {}", index, wid);
            self.valid_sink(wid)?;
        }
        let packed = pack_z_order(z_order).map_err(|e| {
            error!(target: msgid::SET_ZORDER_FAILED, "{}", e);
            e
        })?;

        // Any plane accepts the global z-order command
        let plane_id = *self
            .physical_planes
            .first()
            .ok_or_else(|| DisplayError::NoPlane("z-order".to_string()))?;

        self.primary_mut()?
            .set_plane_property(plane_id, PROP_SET_Z_ORDER, packed)
            .map_err(|e| {
                error!(
                    target: msgid::SET_ZORDER_FAILED,
                    "Failed to apply zorder for sink: {}", e
                );
                e
            })
    }

    /// Blank shows nothing in `output`; unblank restores `input` into it
    pub fn set_window_blanking(
        &mut self,
        wid: WindowId,
        blank: bool,
        input: Rect,
        output: Rect,
    ) -> Result<()> {
        let plane_id = self.connected_plane(wid).map_err(|e| {
            error!(target: msgid::VIDEO_BLANKING_FAILED, "Sink {}: {}", wid, e);
            e
        })?;

        let (params, failure_id) = if blank {
            (ScaleParams::blanked(output), msgid::VIDEO_BLANKING_FAILED)
        } else {
            (ScaleParams::new(output, input), msgid::VIDEO_UNBLANKING_FAILED)
        };

        self.primary_mut()?
            .set_plane_scaling(plane_id, PROP_SET_SCALING, &params)
            .map_err(|e| {
                error!(
                    target: failure_id,
                    "Failed to {} wid {}: {}",
                    if blank { "blank" } else { "unblank" },
                    wid,
                    e
                );
                e
            })
    }

    /// Legacy plane placement of the window's plane showing `fb_id`
    pub fn set_plane(&mut self, wid: WindowId, fb_id: u32, dst: Rect, src: Rect) -> Result<()> {
        let plane_id = self.valid_sink(wid)?.plane_id;
        self.primary_mut()?.set_plane(plane_id, fb_id, dst, src)
    }

    /// Change the display resolution.
    ///
    /// Sizes outside the capability bounds are rejected without touching
    /// the current mode.
    pub fn set_display_resolution(&mut self, size: Size) -> Result<()> {
        self.set_display_mode(size, 0)
    }

    /// Like [`set_display_resolution`](Self::set_display_resolution) with a
    /// refresh rate; 0 picks the first mode of that size.
    pub fn set_display_mode(&mut self, size: Size, refresh: u32) -> Result<()> {
        if !self.capability.is_valid_size(size) {
            error!(
                target: msgid::MODE_CHANGE_FAILED,
                "Invalid resolution specified {}", size
            );
            return Err(DisplayError::OutOfBounds {
                requested: size,
                min: self.capability.min_resolution().size(),
                max: self.capability.max_resolution().size(),
            });
        }

        self.devices.change_mode(size.w, size.h, refresh).map_err(|e| {
            error!(
                target: msgid::MODE_CHANGE_FAILED,
                "Resolution change failed {}: {}", size, e
            );
            e
        })
    }

    /// Unique display sizes within the capability bounds
    pub fn get_supported_resolutions(&self) -> Vec<Size> {
        let modes = self
            .devices
            .primary()
            .map(|d| d.supported_modes())
            .unwrap_or_default();
        modes
            .into_iter()
            .filter(|&size| self.capability.is_valid_size(size))
            .collect()
    }

    /// Current display size at the origin
    pub fn display_resolution(&self) -> Rect {
        let size = self.devices.primary().map(|d| d.size()).unwrap_or_default();
        Rect::new(0, 0, size.w, size.h)
    }

    /// Capability `(min, max)`
    pub fn video_capabilities(&self) -> (Size, Size) {
        (
            self.capability.min_resolution().size(),
            self.capability.max_resolution().size(),
        )
    }

    pub fn video_planes(&self) -> &[LogicalPlane] {
        &self.logical_planes
    }

    /// Clamp each window's size range to the capability bounds and notify
    /// the observer
    pub fn handle_device_update(&mut self, min: Size, max: Size) {
        let cap_min = self.capability.min_resolution().size();
        let cap_max = self.capability.max_resolution().size();
        for plane in &mut self.logical_planes {
            plane.max = Size::new(max.w.min(cap_max.w), max.h.min(cap_max.h));
            plane.min = Size::new(min.w.max(cap_min.w), min.h.max(cap_min.h));
        }
        info!(target: msgid::DEVICE_STATUS, "Display range {} - {}", min, max);

        if let Some(observer) = self.observer.as_mut() {
            observer.device_updated(min, max);
        }
    }

    /// Refresh after a hotplug event on `node`
    pub fn handle_hotplug(&mut self, node: &str) {
        if let Some((min, max)) = self.devices.update_device(node) {
            self.handle_device_update(min, max);
        }
    }
}

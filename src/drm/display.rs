//! DRM display management
//!
//! Mode setting on a CRTC and legacy plane updates

use log::{debug, error, info};

use super::backend::{to_fixed, KmsBackend, ScaleParams};
use super::buffer::{self, BufferObject};
use super::device::Device;
use super::mode;
use super::resources::{DisplayMode, Rect, Size};
use crate::constants::msgid;
use crate::error::{DisplayError, Result};

/// Framebuffer scanned out by a CRTC and the buffer behind it
#[derive(Debug)]
pub struct Scanout {
    pub fb_id: u32,
    pub bo: BufferObject,
}

impl Scanout {
    /// Remove the framebuffer, then free the buffer
    pub(crate) fn release<B: KmsBackend + ?Sized>(self, backend: &mut B) -> Result<()> {
        let Scanout { fb_id, bo } = self;
        let removed = backend
            .remove_framebuffer(fb_id)
            .map_err(|e| DisplayError::kernel("MODE_RMFB", e));
        buffer::destroy_buffer(backend, Some(bo))?;
        removed
    }

    fn size(&self) -> Size {
        Size::new(self.bo.width(), self.bo.height())
    }
}

/// Allocate a buffer of `size` in `format` and wrap it in a framebuffer
fn create_scanout<B: KmsBackend + ?Sized>(
    backend: &mut B,
    format: drm::buffer::DrmFourcc,
    size: Size,
) -> Result<Scanout> {
    let bo = buffer::create_buffer(backend, format, size.w, size.h)?;
    match backend.add_framebuffer(size.w, size.h, format, bo.layout()) {
        Ok(fb_id) => Ok(Scanout { fb_id, bo }),
        Err(e) => {
            error!(
                target: msgid::FB_CREATION_FAILED,
                "failed to add fb ({}): {}", size, e
            );
            buffer::destroy_buffer(backend, Some(bo))?;
            Err(DisplayError::kernel("MODE_ADDFB2", e))
        }
    }
}

impl<B: KmsBackend> Device<B> {
    /// Mode-set `crtc_id` to `width`x`height` (any refresh when `refresh` is 0).
    ///
    /// Every bound connector that is plugged right now must support the
    /// mode; the first one that does not aborts before anything is applied.
    /// The scanout buffer is replaced only when its size differs.
    pub fn set_active_mode(
        &mut self,
        crtc_id: u32,
        width: u32,
        height: u32,
        refresh: u32,
    ) -> Result<()> {
        let size = Size::new(width, height);
        debug!("Mode-set CRTC {} to {}@{}", crtc_id, size, refresh);

        let crtc_index = self
            .crtcs
            .iter()
            .position(|c| c.id == crtc_id)
            .ok_or(DisplayError::CrtcNotFound(crtc_id))?;

        if self.crtcs[crtc_index].connectors.is_empty() {
            info!(
                target: msgid::DEVICE_STATUS,
                "No connectors set for crtc {}", crtc_id
            );
            return Err(DisplayError::NoConnectors(crtc_id));
        }

        let mut chosen: Option<DisplayMode> = None;
        let mut plugged = Vec::new();
        for &connector_id in &self.crtcs[crtc_index].connectors {
            let connector = self
                .connectors
                .iter_mut()
                .find(|c| c.id == connector_id)
                .ok_or(DisplayError::ConnectorNotFound(connector_id))?;

            match self.backend.connector(connector_id) {
                Ok(info) => connector.refresh(info),
                Err(e) => {
                    debug!("ignoring connector {}: {}", connector_id, e);
                    continue;
                }
            }
            if !connector.is_plugged() {
                debug!("ignoring unused connector {}", connector_id);
                continue;
            }

            let found = mode::resolve_connector_mode(connector, width, height, refresh)
                .map_err(|e| {
                    error!(
                        target: msgid::INVALID_DISPLAY_MODE,
                        "Mode {} is not supported by {}", size, connector_id
                    );
                    e
                })?;
            chosen.get_or_insert(found);
            plugged.push(connector_id);
        }

        let Some(mode) = chosen else {
            error!(
                target: msgid::DISPLAY_NOT_CONNECTED,
                "no plugged connector for crtc {}", crtc_id
            );
            return Err(DisplayError::DisplayNotConnected(crtc_id));
        };

        // Never two live scanout buffers per CRTC: destroy before create
        let crtc = &mut self.crtcs[crtc_index];
        if crtc.scanout.as_ref().map(Scanout::size) != Some(size) {
            if let Some(old) = crtc.scanout.take() {
                debug!("Replacing {} scanout of CRTC {}", old.size(), crtc_id);
                old.release(&mut self.backend)?;
            }
            let scanout = create_scanout(&mut self.backend, self.format, size).map_err(|e| {
                error!(
                    target: msgid::BUFFER_CREATION_FAILED,
                    "failed to create frame buffer ({}): {}", size, e
                );
                e
            })?;
            crtc.scanout = Some(scanout);
        }

        let fb_id = crtc.scanout_fb();
        self.backend
            .set_crtc(crtc_id, fb_id, &plugged, &mode)
            .map_err(|e| {
                error!(target: msgid::DRM_MODESET_ERROR, "Failed to set mode {}: {}", mode, e);
                DisplayError::kernel("SETCRTC", e)
            })?;

        info!("CRTC {}: {} on fb {} -> connectors {:?}", crtc_id, mode, fb_id, plugged);
        Ok(())
    }

    /// Planes that may be attached to the display CRTC
    pub fn get_planes(&self) -> Vec<u32> {
        let Some(crtc) = self.display_crtc() else {
            return Vec::new();
        };
        self.planes
            .iter()
            .filter(|p| p.supports_crtc_index(crtc.index))
            .map(|p| p.id)
            .collect()
    }

    /// Unique mode sizes of the first connector, in kernel order
    pub fn supported_modes(&self) -> Vec<Size> {
        self.connectors
            .first()
            .map(|c| c.supported_sizes())
            .unwrap_or_default()
    }

    /// Legacy plane placement on the display CRTC. `src` is in whole pixels.
    pub fn set_plane(&mut self, plane_id: u32, fb_id: u32, dst: Rect, src: Rect) -> Result<()> {
        debug!(
            "Applying set plane to output {} for source {}, planeId {}",
            dst, src, plane_id
        );
        let crtc_id = self.display_crtc_id()?;

        let src_fixed = (
            to_fixed(src.x.max(0) as u32),
            to_fixed(src.y.max(0) as u32),
            to_fixed(src.w),
            to_fixed(src.h),
        );
        self.backend
            .set_plane(plane_id, crtc_id, fb_id, dst, src_fixed)
            .map_err(|e| {
                error!(target: msgid::DRM_SET_PLANE_FAILED, "{}", e);
                DisplayError::kernel("SETPLANE", e)
            })
    }

    /// Write a vendor plane property
    pub fn set_plane_property(&mut self, plane_id: u32, property: u32, value: u64) -> Result<()> {
        debug!(
            "property type={:#x}, plane id = {}, value = {:#x}",
            property, plane_id, value
        );
        self.backend
            .set_plane_property(plane_id, property, value)
            .map_err(|e| {
                error!(target: msgid::DRM_SET_PROP_FAILED, "{}", e);
                DisplayError::kernel("OBJ_SETPROPERTY", e)
            })
    }

    /// Write the vendor scaling property
    pub fn set_plane_scaling(
        &mut self,
        plane_id: u32,
        property: u32,
        params: &ScaleParams,
    ) -> Result<()> {
        debug!("plane {} scale params {:?}", plane_id, params);
        self.backend
            .set_plane_scaling(plane_id, property, params)
            .map_err(|e| {
                error!(target: msgid::DRM_SET_PROP_FAILED, "{}", e);
                DisplayError::kernel("OBJ_SETPROPERTY", e)
            })
    }
}

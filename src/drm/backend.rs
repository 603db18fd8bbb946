//! Kernel mode-setting seam
//!
//! Every kernel call the display core makes goes through [`KmsBackend`].
//! [`super::card::Card`] implements it over a `/dev/dri/card*` node; tests
//! substitute a recording fake. Calls are synchronous and block the loop.

use std::io;

use drm::buffer::DrmFourcc;
use memmap2::MmapMut;

use super::resources::{ConnectorInfo, DisplayMode, EncoderInfo, PlaneInfo, Rect};

/// Resource ids in kernel order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceIds {
    pub crtcs: Vec<u32>,
    pub connectors: Vec<u32>,
    pub encoders: Vec<u32>,
}

/// Result of a dumb buffer allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumbAllocation {
    pub handle: u32,
    pub pitch: u32,
    pub size: u64,
}

/// Per-plane handles/pitches/offsets for ADDFB2
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaneLayout {
    pub handles: [u32; 4],
    pub pitches: [u32; 4],
    pub offsets: [u32; 4],
}

impl PlaneLayout {
    /// Number of populated planes
    pub fn plane_count(&self) -> usize {
        self.handles.iter().take_while(|&&h| h != 0).count()
    }
}

/// Scaling rectangle pair handed to the vendor scaling property.
///
/// Source values are 16.16 fixed point. Field order is the driver's ABI
/// (source height before width).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScaleParams {
    pub crtc_x: i32,
    pub crtc_y: i32,
    pub crtc_w: u32,
    pub crtc_h: u32,
    pub src_x: u32,
    pub src_y: u32,
    pub src_h: u32,
    pub src_w: u32,
}

impl ScaleParams {
    pub fn new(output: Rect, input: Rect) -> Self {
        Self {
            crtc_x: output.x,
            crtc_y: output.y,
            crtc_w: output.w,
            crtc_h: output.h,
            src_x: to_fixed(input.x.max(0) as u32),
            src_y: to_fixed(input.y.max(0) as u32),
            src_h: to_fixed(input.h),
            src_w: to_fixed(input.w),
        }
    }

    /// Output placement with an empty source (blanked window)
    pub fn blanked(output: Rect) -> Self {
        Self::new(output, Rect::default())
    }
}

/// Integer to 16.16 fixed point (saturating)
pub fn to_fixed(v: u32) -> u32 {
    v.checked_shl(16)
        .filter(|_| v <= 0xFFFF)
        .unwrap_or(u32::MAX)
}

/// Kernel operations used by the display core
pub trait KmsBackend {
    fn resources(&self) -> io::Result<ResourceIds>;
    fn plane_ids(&self) -> io::Result<Vec<u32>>;

    /// Always a fresh query
    fn connector(&self, id: u32) -> io::Result<ConnectorInfo>;
    fn encoder(&self, id: u32) -> io::Result<EncoderInfo>;
    fn plane(&self, id: u32) -> io::Result<PlaneInfo>;

    /// DRM_CAP_DUMB_BUFFER
    fn dumb_buffer_capability(&self) -> io::Result<bool>;

    fn create_dumb(&mut self, width: u32, height: u32, bpp: u32) -> io::Result<DumbAllocation>;
    fn map_dumb(&mut self, handle: u32, size: u64) -> io::Result<MmapMut>;
    fn destroy_dumb(&mut self, handle: u32) -> io::Result<()>;

    fn add_framebuffer(
        &mut self,
        width: u32,
        height: u32,
        format: DrmFourcc,
        layout: &PlaneLayout,
    ) -> io::Result<u32>;
    fn remove_framebuffer(&mut self, fb_id: u32) -> io::Result<()>;

    /// Legacy mode-set of `crtc` scanning out `fb_id` to `connectors`
    fn set_crtc(
        &mut self,
        crtc: u32,
        fb_id: u32,
        connectors: &[u32],
        mode: &DisplayMode,
    ) -> io::Result<()>;

    /// Legacy plane placement; `src` is (x, y, w, h) in 16.16 fixed point
    fn set_plane(
        &mut self,
        plane: u32,
        crtc: u32,
        fb_id: u32,
        dst: Rect,
        src: (u32, u32, u32, u32),
    ) -> io::Result<()>;

    fn set_plane_property(&mut self, plane: u32, property: u32, value: u64) -> io::Result<()>;

    /// Scaling goes through the vendor scaling property, whose value is the
    /// address of `params` for the duration of the call
    fn set_plane_scaling(
        &mut self,
        plane: u32,
        property: u32,
        params: &ScaleParams,
    ) -> io::Result<()> {
        let value = params as *const ScaleParams as u64;
        self.set_plane_property(plane, property, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_fixed() {
        assert_eq!(to_fixed(0), 0);
        assert_eq!(to_fixed(1), 0x1_0000);
        assert_eq!(to_fixed(1920), 1920 << 16);
        assert_eq!(to_fixed(0x1_0000), u32::MAX);
    }

    #[test]
    fn test_scale_params_order() {
        let p = ScaleParams::new(Rect::new(-10, 20, 1280, 720), Rect::new(0, 0, 1920, 1080));
        assert_eq!(p.crtc_x, -10);
        assert_eq!(p.crtc_w, 1280);
        assert_eq!(p.src_w, 1920 << 16);
        assert_eq!(p.src_h, 1080 << 16);
    }

    #[test]
    fn test_blanked_has_empty_source() {
        let p = ScaleParams::blanked(Rect::new(0, 0, 640, 480));
        assert_eq!((p.src_x, p.src_y, p.src_w, p.src_h), (0, 0, 0, 0));
        assert_eq!(p.crtc_h, 480);
    }
}

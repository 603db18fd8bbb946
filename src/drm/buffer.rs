//! Dumb buffer management
//!
//! Linear "dumb" allocations sized per pixel format, with the per-plane
//! handle/pitch/offset layout ADDFB2 needs. Color-order variants share a
//! layout (NV12/NV21, YUV420/YVU420, ...).

use drm::buffer::DrmFourcc;
use log::{debug, error, warn};
use memmap2::MmapMut;

use super::backend::{KmsBackend, PlaneLayout};
use crate::constants::msgid;
use crate::error::{DisplayError, Result};

/// How a format's planes sit inside one allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    /// Single plane (RGB and packed YUV)
    Packed,
    /// Luma plane followed by interleaved chroma at the same pitch
    SemiPlanar,
    /// Luma plus two chroma planes at half pitch
    Planar,
}

/// Allocation parameters for a pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    pub bpp: u32,
    /// Allocation height = height * num / den
    pub height_num: u32,
    pub height_den: u32,
    pub layout: LayoutKind,
}

impl FormatInfo {
    const fn new(bpp: u32, height_num: u32, height_den: u32, layout: LayoutKind) -> Self {
        Self {
            bpp,
            height_num,
            height_den,
            layout,
        }
    }

    /// None when the allocation height does not fit in 32 bits
    pub fn virtual_height(&self, height: u32) -> Option<u32> {
        height.checked_mul(self.height_num).map(|h| h / self.height_den)
    }
}

/// Allocation parameters, or None for formats dumb buffers are not used for
pub fn format_info(format: DrmFourcc) -> Option<FormatInfo> {
    use DrmFourcc::*;
    use LayoutKind::*;

    let info = match format {
        // YUV 4:2:0 semi-planar / planar
        Nv12 | Nv21 => FormatInfo::new(8, 3, 2, SemiPlanar),
        Yuv420 | Yvu420 => FormatInfo::new(8, 3, 2, Planar),
        // YUV 4:2:2 semi-planar
        Nv16 | Nv61 => FormatInfo::new(8, 2, 1, SemiPlanar),

        // 16 bpp RGB and packed YUV
        Argb4444 | Xrgb4444 | Abgr4444 | Xbgr4444 | Rgba4444 | Rgbx4444 | Bgra4444
        | Bgrx4444 | Argb1555 | Xrgb1555 | Abgr1555 | Xbgr1555 | Rgba5551 | Rgbx5551
        | Bgra5551 | Bgrx5551 | Rgb565 | Bgr565 | Uyvy | Vyuy | Yuyv | Yvyu => {
            FormatInfo::new(16, 1, 1, Packed)
        }

        Bgr888 | Rgb888 => FormatInfo::new(24, 1, 1, Packed),

        Argb8888 | Xrgb8888 | Abgr8888 | Xbgr8888 | Rgba8888 | Rgbx8888 | Bgra8888
        | Bgrx8888 | Argb2101010 | Xrgb2101010 | Abgr2101010 | Xbgr2101010 | Rgba1010102
        | Rgbx1010102 | Bgra1010102 | Bgrx1010102 => FormatInfo::new(32, 1, 1, Packed),

        _ => return None,
    };
    Some(info)
}

/// Handles/pitches/offsets for a buffer of `height` visible rows, or None
/// when a chroma offset overflows
pub fn plane_layout(kind: LayoutKind, handle: u32, pitch: u32, height: u32) -> Option<PlaneLayout> {
    let mut layout = PlaneLayout::default();
    layout.handles[0] = handle;
    layout.pitches[0] = pitch;
    layout.offsets[0] = 0;

    match kind {
        LayoutKind::Packed => {}
        LayoutKind::SemiPlanar => {
            layout.handles[1] = handle;
            layout.pitches[1] = pitch;
            layout.offsets[1] = pitch.checked_mul(height)?;
        }
        LayoutKind::Planar => {
            layout.handles[1] = handle;
            layout.pitches[1] = pitch / 2;
            layout.offsets[1] = pitch.checked_mul(height)?;
            layout.handles[2] = handle;
            layout.pitches[2] = layout.pitches[1];
            layout.offsets[2] = layout.pitches[1]
                .checked_mul(height)
                .and_then(|chroma| layout.offsets[1].checked_add(chroma / 2))?;
        }
    }
    Some(layout)
}

/// Linear memory region backing a framebuffer.
///
/// Move-only; release it with [`destroy_buffer`] on the backend that
/// created it.
pub struct BufferObject {
    handle: u32,
    size: u64,
    pitch: u32,
    width: u32,
    height: u32,
    format: DrmFourcc,
    layout: PlaneLayout,
    map: Option<MmapMut>,
}

impl BufferObject {
    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn pitch(&self) -> u32 {
        self.pitch
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> DrmFourcc {
        self.format
    }

    pub fn layout(&self) -> &PlaneLayout {
        &self.layout
    }

    pub fn is_mapped(&self) -> bool {
        self.map.is_some()
    }

    /// Mapped bytes, if mapped
    pub fn mapped(&mut self) -> Option<&mut [u8]> {
        self.map.as_deref_mut()
    }
}

impl std::fmt::Debug for BufferObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferObject")
            .field("handle", &self.handle)
            .field("size", &self.size)
            .field("pitch", &self.pitch)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("mapped", &self.map.is_some())
            .finish()
    }
}

impl Drop for BufferObject {
    fn drop(&mut self) {
        if self.handle != 0 {
            warn!(
                "Dumb buffer {} dropped without destroy_buffer (kernel allocation leaked until close)",
                self.handle
            );
        }
    }
}

/// Allocate a dumb buffer for `format` and compute its plane layout.
///
/// Unsupported formats fail before any allocation is requested.
pub fn create_buffer<B: KmsBackend + ?Sized>(
    backend: &mut B,
    format: DrmFourcc,
    width: u32,
    height: u32,
) -> Result<BufferObject> {
    let info = format_info(format).ok_or_else(|| {
        error!(target: msgid::BUFFER_CREATION_FAILED, "unsupported format {:?}", format);
        DisplayError::UnsupportedFormat(format!("{:?}", format))
    })?;

    let virtual_height = info.virtual_height(height).ok_or_else(|| {
        error!(
            target: msgid::BUFFER_CREATION_FAILED,
            "{}x{} {:?} buffer is too large", width, height, format
        );
        DisplayError::UnsupportedFormat(format!("{:?} at {}x{}", format, width, height))
    })?;
    let alloc = backend
        .create_dumb(width, virtual_height, info.bpp)
        .map_err(|e| {
            error!(
                target: msgid::BUFFER_CREATION_FAILED,
                "failed to create dumb buffer ({}x{} bpp {}): {}", width, virtual_height, info.bpp, e
            );
            DisplayError::kernel("MODE_CREATE_DUMB", e)
        })?;

    let Some(layout) = plane_layout(info.layout, alloc.handle, alloc.pitch, height) else {
        error!(
            target: msgid::BUFFER_CREATION_FAILED,
            "plane offsets of {}x{} {:?} (pitch {}) overflow", width, height, format, alloc.pitch
        );
        if let Err(e) = backend.destroy_dumb(alloc.handle) {
            warn!("failed to destroy dumb buffer {}: {}", alloc.handle, e);
        }
        return Err(DisplayError::UnsupportedFormat(format!(
            "{:?} at {}x{}",
            format, width, height
        )));
    };

    debug!(
        "Dumb buffer created: handle={}, {}x{} ({:?}, virtual height {}), pitch={}, size={}",
        alloc.handle, width, height, format, virtual_height, alloc.pitch, alloc.size
    );

    Ok(BufferObject {
        handle: alloc.handle,
        size: alloc.size,
        pitch: alloc.pitch,
        width,
        height,
        format,
        layout,
        map: None,
    })
}

/// Free the kernel allocation. `None` is a no-op.
pub fn destroy_buffer<B: KmsBackend + ?Sized>(
    backend: &mut B,
    bo: Option<BufferObject>,
) -> Result<()> {
    let Some(mut bo) = bo else {
        return Ok(());
    };

    unmap_buffer(&mut bo);
    let handle = std::mem::take(&mut bo.handle);
    backend.destroy_dumb(handle).map_err(|e| {
        error!(
            target: msgid::DRM_MODESET_ERROR,
            "failed to destroy dumb buffer {}: {}", handle, e
        );
        DisplayError::kernel("MODE_DESTROY_DUMB", e)
    })?;
    debug!("Dumb buffer {} destroyed", handle);
    Ok(())
}

/// Map the buffer for CPU access; an existing mapping is reused.
pub fn map_buffer<'a, B: KmsBackend + ?Sized>(
    backend: &mut B,
    bo: &'a mut BufferObject,
) -> Result<&'a mut [u8]> {
    let map = match bo.map.take() {
        Some(map) => map,
        None => backend.map_dumb(bo.handle, bo.size).map_err(|e| {
            error!(
                target: msgid::DRM_MODESET_ERROR,
                "failed to map dumb buffer {}: {}", bo.handle, e
            );
            DisplayError::kernel("MODE_MAP_DUMB", e)
        })?,
    };
    Ok(&mut bo.map.insert(map)[..])
}

/// Drop the CPU mapping, if any
pub fn unmap_buffer(bo: &mut BufferObject) {
    if bo.map.take().is_some() {
        debug!("Dumb buffer {} unmapped", bo.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nv12_allocation_params() {
        let info = format_info(DrmFourcc::Nv12).unwrap();
        assert_eq!(info.bpp, 8);
        assert_eq!(info.virtual_height(1080), Some(1620));
    }

    #[test]
    fn test_nv16_doubles_height() {
        let info = format_info(DrmFourcc::Nv61).unwrap();
        assert_eq!(info.virtual_height(1080), Some(2160));
        assert_eq!(info.layout, LayoutKind::SemiPlanar);
    }

    #[test]
    fn test_bpp_by_family() {
        assert_eq!(format_info(DrmFourcc::Rgb565).unwrap().bpp, 16);
        assert_eq!(format_info(DrmFourcc::Yuyv).unwrap().bpp, 16);
        assert_eq!(format_info(DrmFourcc::Rgb888).unwrap().bpp, 24);
        assert_eq!(format_info(DrmFourcc::Xrgb8888).unwrap().bpp, 32);
        assert_eq!(format_info(DrmFourcc::Bgra1010102).unwrap().bpp, 32);
        assert_eq!(format_info(DrmFourcc::Xrgb8888).unwrap().virtual_height(720), Some(720));
    }

    #[test]
    fn test_oversized_dimensions_overflow() {
        let nv12 = format_info(DrmFourcc::Nv12).unwrap();
        assert_eq!(nv12.virtual_height(u32::MAX / 2), None);
        assert!(plane_layout(LayoutKind::SemiPlanar, 1, 70_000, 70_000).is_none());
        assert!(plane_layout(LayoutKind::Planar, 1, 70_000, 70_000).is_none());
        assert!(plane_layout(LayoutKind::Packed, 1, 70_000, 70_000).is_some());
    }

    #[test]
    fn test_unsupported_format() {
        assert!(format_info(DrmFourcc::Yuv444).is_none());
    }

    #[test]
    fn test_semi_planar_layout() {
        let layout = plane_layout(LayoutKind::SemiPlanar, 7, 1920, 1080).unwrap();
        assert_eq!(layout.handles, [7, 7, 0, 0]);
        assert_eq!(layout.pitches, [1920, 1920, 0, 0]);
        assert_eq!(layout.offsets, [0, 1920 * 1080, 0, 0]);
        assert_eq!(layout.plane_count(), 2);
    }

    #[test]
    fn test_planar_layout_halves_chroma_pitch() {
        let layout = plane_layout(LayoutKind::Planar, 3, 1920, 1080).unwrap();
        assert_eq!(layout.pitches, [1920, 960, 960, 0]);
        assert_eq!(layout.offsets[1], 1920 * 1080);
        assert_eq!(layout.offsets[2], 1920 * 1080 + 960 * 540);
        assert_eq!(layout.plane_count(), 3);
    }

    #[test]
    fn test_packed_layout_single_plane() {
        let layout = plane_layout(LayoutKind::Packed, 9, 7680, 1080).unwrap();
        assert_eq!(layout.plane_count(), 1);
        assert_eq!(layout.pitches[0], 7680);
    }
}

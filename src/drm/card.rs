//! DRM card node
//!
//! Opens a display card (/dev/dri/card*) and implements [`KmsBackend`]
//! over the `drm` crate plus raw ioctls for dumb buffers.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use drm::buffer::DrmFourcc;
use drm::control::{
    connector, crtc, encoder, framebuffer, plane, property, Device as ControlDevice,
    RawResourceHandle, ResourceHandles,
};
use drm::{Device as BasicDevice, DriverCapability};
use log::{debug, info, trace};
use memmap2::{MmapMut, MmapOptions};

use super::backend::{DumbAllocation, KmsBackend, PlaneLayout, ResourceIds};
use super::edid::Edid;
use super::ioctl_helpers;
use super::resources::{ConnectionState, ConnectorInfo, DisplayMode, EncoderInfo, PlaneInfo, Rect};

/// DRM card wrapper
pub struct Card {
    path: PathBuf,
    file: File,
    resources: ResourceHandles,
}

// Trait implementations required by drm crate
impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl BasicDevice for Card {}
impl ControlDevice for Card {}

impl Card {
    /// Open DRM card
    ///
    /// # Arguments
    /// * `path` - Device path (e.g., "/dev/dri/card0")
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening DRM device: {}", path.display());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("Cannot open DRM device {}", path.display()))?;

        // Create temporary device wrapper to get resources
        struct TempDevice<'a>(&'a File);
        impl AsFd for TempDevice<'_> {
            fn as_fd(&self) -> BorrowedFd<'_> {
                self.0.as_fd()
            }
        }
        impl BasicDevice for TempDevice<'_> {}
        impl ControlDevice for TempDevice<'_> {}

        let resources = TempDevice(&file)
            .resource_handles()
            .with_context(|| format!("Failed to get DRM resources for {}", path.display()))?;

        info!(
            "DRM resources: connectors={}, crtcs={}, encoders={}, framebuffers={}",
            resources.connectors().len(),
            resources.crtcs().len(),
            resources.encoders().len(),
            resources.framebuffers().len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            resources,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get RawFd (needed for raw ioctls)
    pub fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Bitmask of CRTC indices from a kernel CRTC filter
    fn crtc_mask(&self, filter: drm::control::CrtcListFilter) -> u32 {
        let allowed = self.resources.filter_crtcs(filter);
        self.resources
            .crtcs()
            .iter()
            .enumerate()
            .filter(|(_, handle)| allowed.contains(handle))
            .fold(0u32, |mask, (index, _)| mask | (1 << index))
    }

    /// Read the connector's EDID blob property, if present
    fn read_edid(&self, handle: connector::Handle) -> io::Result<Option<Edid>> {
        let props = self.get_properties(handle)?;
        let (ids, values) = props.as_props_and_values();
        for (&id, &value) in ids.iter().zip(values.iter()) {
            let info = self.get_property(id)?;
            if info.name().to_bytes() != b"EDID" {
                continue;
            }
            if !matches!(info.value_type(), property::ValueType::Blob) || value == 0 {
                return Ok(None);
            }
            let blob = self.get_property_blob(value)?;
            return Ok(Some(Edid::new(blob)));
        }
        Ok(None)
    }
}

/// Kernel id to a typed `drm` handle
fn raw_handle<T: From<RawResourceHandle>>(id: u32) -> io::Result<T> {
    drm::control::from_u32(id).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("invalid object id {}", id))
    })
}

/// Kernel connector type number (DRM_MODE_CONNECTOR_*)
fn interface_kind(interface: connector::Interface) -> u32 {
    use connector::Interface;

    match interface {
        Interface::VGA => 1,
        Interface::DVII => 2,
        Interface::DVID => 3,
        Interface::DVIA => 4,
        Interface::Composite => 5,
        Interface::SVideo => 6,
        Interface::LVDS => 7,
        Interface::Component => 8,
        Interface::DisplayPort => 10,
        Interface::HDMIA => 11,
        Interface::HDMIB => 12,
        Interface::TV => 13,
        Interface::EmbeddedDisplayPort => 14,
        Interface::Virtual => 15,
        Interface::DSI => 16,
        _ => 0,
    }
}

impl KmsBackend for Card {
    fn resources(&self) -> io::Result<ResourceIds> {
        let res = self.resource_handles()?;
        Ok(ResourceIds {
            crtcs: res.crtcs().iter().map(|&h| u32::from(h)).collect(),
            connectors: res.connectors().iter().map(|&h| u32::from(h)).collect(),
            encoders: res.encoders().iter().map(|&h| u32::from(h)).collect(),
        })
    }

    fn plane_ids(&self) -> io::Result<Vec<u32>> {
        Ok(self
            .plane_handles()?
            .into_iter()
            .map(u32::from)
            .collect())
    }

    fn connector(&self, id: u32) -> io::Result<ConnectorInfo> {
        let handle: connector::Handle = raw_handle(id)?;
        let info = self.get_connector(handle, false)?;

        let state = match info.state() {
            connector::State::Connected => ConnectionState::Connected,
            connector::State::Disconnected => ConnectionState::Disconnected,
            _ => ConnectionState::Unknown,
        };
        let edid = match self.read_edid(handle) {
            Ok(edid) => edid,
            Err(e) => {
                debug!("No EDID for connector {}: {}", id, e);
                None
            }
        };
        trace!(
            "Connector {}: {:?}, {} modes",
            id,
            info.interface(),
            info.modes().len()
        );

        Ok(ConnectorInfo {
            id,
            kind: interface_kind(info.interface()),
            state,
            modes: info.modes().iter().map(DisplayMode::from_drm).collect(),
            current_encoder: info.current_encoder().map(u32::from),
            encoders: info.encoders().iter().map(|&h| u32::from(h)).collect(),
            edid,
        })
    }

    fn encoder(&self, id: u32) -> io::Result<EncoderInfo> {
        let handle: encoder::Handle = raw_handle(id)?;
        let info = self.get_encoder(handle)?;
        Ok(EncoderInfo {
            id,
            crtc_id: info.crtc().map(u32::from).unwrap_or(0),
            possible_crtcs: self.crtc_mask(info.possible_crtcs()),
        })
    }

    fn plane(&self, id: u32) -> io::Result<PlaneInfo> {
        let handle: plane::Handle = raw_handle(id)?;
        let info = self.get_plane(handle)?;
        Ok(PlaneInfo {
            id,
            possible_crtcs: self.crtc_mask(info.possible_crtcs()),
        })
    }

    fn dumb_buffer_capability(&self) -> io::Result<bool> {
        Ok(self.get_driver_capability(DriverCapability::DumbBuffer)? != 0)
    }

    fn create_dumb(&mut self, width: u32, height: u32, bpp: u32) -> io::Result<DumbAllocation> {
        ioctl_helpers::create_dumb(self.as_raw_fd(), width, height, bpp)
    }

    fn map_dumb(&mut self, handle: u32, size: u64) -> io::Result<MmapMut> {
        let offset = ioctl_helpers::map_dumb_offset(self.as_raw_fd(), handle)?;
        // SAFETY: the range is the kernel's mapping of a dumb buffer we own;
        // it stays valid until the buffer is destroyed, which unmaps first.
        unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(size as usize)
                .map_mut(&self.file)
        }
    }

    fn destroy_dumb(&mut self, handle: u32) -> io::Result<()> {
        ioctl_helpers::destroy_dumb(self.as_raw_fd(), handle)
    }

    fn add_framebuffer(
        &mut self,
        width: u32,
        height: u32,
        format: DrmFourcc,
        layout: &PlaneLayout,
    ) -> io::Result<u32> {
        let fb_id = ioctl_helpers::add_fb2(self.as_raw_fd(), width, height, format, layout)?;
        debug!(
            "Framebuffer created: id={}, {}x{} {:?}, pitches={:?}",
            fb_id, width, height, format, layout.pitches
        );
        Ok(fb_id)
    }

    fn remove_framebuffer(&mut self, fb_id: u32) -> io::Result<()> {
        ioctl_helpers::remove_fb(self.as_raw_fd(), fb_id)
    }

    fn set_crtc(
        &mut self,
        crtc: u32,
        fb_id: u32,
        connectors: &[u32],
        mode: &DisplayMode,
    ) -> io::Result<()> {
        let timing = mode.timing.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("mode {} has no kernel timing", mode),
            )
        })?;
        let crtc: crtc::Handle = raw_handle(crtc)?;
        let fb: framebuffer::Handle = raw_handle(fb_id)?;
        let connectors = connectors
            .iter()
            .map(|&id| raw_handle(id))
            .collect::<io::Result<Vec<connector::Handle>>>()?;

        ControlDevice::set_crtc(self, crtc, Some(fb), (0, 0), &connectors, Some(timing))
    }

    fn set_plane(
        &mut self,
        plane: u32,
        crtc: u32,
        fb_id: u32,
        dst: Rect,
        src: (u32, u32, u32, u32),
    ) -> io::Result<()> {
        let plane: plane::Handle = raw_handle(plane)?;
        let crtc: crtc::Handle = raw_handle(crtc)?;
        let fb: Option<framebuffer::Handle> = drm::control::from_u32(fb_id);
        ControlDevice::set_plane(
            self,
            plane,
            crtc,
            fb,
            0,
            (dst.x, dst.y, dst.w, dst.h),
            src,
        )
    }

    fn set_plane_property(&mut self, plane: u32, prop: u32, value: u64) -> io::Result<()> {
        let plane: plane::Handle = raw_handle(plane)?;
        let prop: property::Handle = raw_handle(prop)?;
        ControlDevice::set_property(self, plane, prop, value)
    }
}

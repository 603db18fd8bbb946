//! Safe wrappers for the raw DRM ioctls the `drm` crate does not cover
//! with a plain-id API (dumb buffers, ADDFB2, RMFB).
//!
//! Each wrapper retries on EINTR, like libdrm's `drmIoctl`.

use std::io;
use std::os::unix::io::RawFd;

use drm::buffer::DrmFourcc;

use super::backend::{DumbAllocation, PlaneLayout};

#[repr(C)]
#[derive(Default)]
struct drm_mode_create_dumb {
    height: u32,
    width: u32,
    bpp: u32,
    flags: u32,
    handle: u32,
    pitch: u32,
    size: u64,
}

#[repr(C)]
#[derive(Default)]
struct drm_mode_map_dumb {
    handle: u32,
    pad: u32,
    offset: u64,
}

#[repr(C)]
#[derive(Default)]
struct drm_mode_destroy_dumb {
    handle: u32,
}

#[repr(C)]
#[derive(Default)]
struct drm_mode_fb_cmd2 {
    fb_id: u32,
    width: u32,
    height: u32,
    pixel_format: u32,
    flags: u32,
    handles: [u32; 4],
    pitches: [u32; 4],
    offsets: [u32; 4],
    modifier: [u64; 4],
}

// Linux: include/uapi/drm/drm.h
const DRM_IOCTL_BASE: u8 = b'd';

const DRM_IOCTL_MODE_RMFB: libc::c_ulong =
    nix::request_code_readwrite!(DRM_IOCTL_BASE, 0xAF, std::mem::size_of::<u32>())
        as libc::c_ulong;
const DRM_IOCTL_MODE_CREATE_DUMB: libc::c_ulong = nix::request_code_readwrite!(
    DRM_IOCTL_BASE,
    0xB2,
    std::mem::size_of::<drm_mode_create_dumb>()
) as libc::c_ulong;
const DRM_IOCTL_MODE_MAP_DUMB: libc::c_ulong = nix::request_code_readwrite!(
    DRM_IOCTL_BASE,
    0xB3,
    std::mem::size_of::<drm_mode_map_dumb>()
) as libc::c_ulong;
const DRM_IOCTL_MODE_DESTROY_DUMB: libc::c_ulong = nix::request_code_readwrite!(
    DRM_IOCTL_BASE,
    0xB4,
    std::mem::size_of::<drm_mode_destroy_dumb>()
) as libc::c_ulong;
const DRM_IOCTL_MODE_ADDFB2: libc::c_ulong = nix::request_code_readwrite!(
    DRM_IOCTL_BASE,
    0xB8,
    std::mem::size_of::<drm_mode_fb_cmd2>()
) as libc::c_ulong;

/// Execute an ioctl command with a mutable argument, retrying on EINTR.
///
/// The caller must ensure the argument type matches what `cmd` expects.
fn ioctl_with_mut_arg<T>(fd: RawFd, cmd: libc::c_ulong, arg: &mut T) -> io::Result<()> {
    loop {
        let ret = unsafe { libc::ioctl(fd, cmd, arg as *mut T) };
        if ret >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
        // EINTR: retry the ioctl
    }
}

/// DRM_IOCTL_MODE_CREATE_DUMB
pub fn create_dumb(fd: RawFd, width: u32, height: u32, bpp: u32) -> io::Result<DumbAllocation> {
    let mut arg = drm_mode_create_dumb {
        width,
        height,
        bpp,
        ..Default::default()
    };
    ioctl_with_mut_arg(fd, DRM_IOCTL_MODE_CREATE_DUMB, &mut arg)?;
    Ok(DumbAllocation {
        handle: arg.handle,
        pitch: arg.pitch,
        size: arg.size,
    })
}

/// DRM_IOCTL_MODE_MAP_DUMB, returns the fake mmap offset
pub fn map_dumb_offset(fd: RawFd, handle: u32) -> io::Result<u64> {
    let mut arg = drm_mode_map_dumb {
        handle,
        ..Default::default()
    };
    ioctl_with_mut_arg(fd, DRM_IOCTL_MODE_MAP_DUMB, &mut arg)?;
    Ok(arg.offset)
}

/// DRM_IOCTL_MODE_DESTROY_DUMB
pub fn destroy_dumb(fd: RawFd, handle: u32) -> io::Result<()> {
    let mut arg = drm_mode_destroy_dumb { handle };
    ioctl_with_mut_arg(fd, DRM_IOCTL_MODE_DESTROY_DUMB, &mut arg)
}

/// DRM_IOCTL_MODE_ADDFB2
pub fn add_fb2(
    fd: RawFd,
    width: u32,
    height: u32,
    format: DrmFourcc,
    layout: &PlaneLayout,
) -> io::Result<u32> {
    let mut cmd = drm_mode_fb_cmd2 {
        width,
        height,
        pixel_format: format as u32,
        handles: layout.handles,
        pitches: layout.pitches,
        offsets: layout.offsets,
        ..Default::default()
    };
    ioctl_with_mut_arg(fd, DRM_IOCTL_MODE_ADDFB2, &mut cmd)?;
    Ok(cmd.fb_id)
}

/// DRM_IOCTL_MODE_RMFB
pub fn remove_fb(fd: RawFd, fb_id: u32) -> io::Result<()> {
    let mut id = fb_id;
    ioctl_with_mut_arg(fd, DRM_IOCTL_MODE_RMFB, &mut id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_sizes_match_uapi() {
        assert_eq!(std::mem::size_of::<drm_mode_create_dumb>(), 32);
        assert_eq!(std::mem::size_of::<drm_mode_map_dumb>(), 16);
        assert_eq!(std::mem::size_of::<drm_mode_fb_cmd2>(), 104);
    }

    #[test]
    fn test_request_codes() {
        // _IOWR('d', 0xB2, 32)
        assert_eq!(DRM_IOCTL_MODE_CREATE_DUMB, 0xC02064B2);
        // _IOWR('d', 0xAF, 4)
        assert_eq!(DRM_IOCTL_MODE_RMFB, 0xC00464AF);
    }
}

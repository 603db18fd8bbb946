//! Recording in-memory KMS backend
//!
//! Topology of `FakeBackend::single_display()`:
//!
//! ```text
//! connector 41 (HDMI, plugged) -> encoder 51 -> CRTC 31 (index 0)
//!                                               CRTC 32 (index 1, idle)
//! planes 61, 62 -> index 0    plane 63 -> index 1
//! ```
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io;

use drm::buffer::DrmFourcc;
use memmap2::MmapMut;

use kmsvideo::config::DeviceCapability;
use kmsvideo::drm::{
    ConnectionState, ConnectorInfo, DeviceTable, DisplayMode, DumbAllocation, EncoderInfo,
    KmsBackend, PlaneInfo, PlaneLayout, Rect, ResourceIds, Size,
};

pub const NODE: &str = "/dev/dri/card0";
pub const CONNECTOR: u32 = 41;
pub const SECOND_CONNECTOR: u32 = 42;
pub const ENCODER: u32 = 51;
pub const CRTC: u32 = 31;
pub const IDLE_CRTC: u32 = 32;

/// Mutating kernel calls, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateDumb { width: u32, height: u32, bpp: u32 },
    DestroyDumb(u32),
    AddFb { fb_id: u32, width: u32, height: u32 },
    RemoveFb(u32),
    SetCrtc { crtc: u32, fb_id: u32, connectors: Vec<u32>, mode: String },
    SetPlane { plane: u32, crtc: u32, fb_id: u32, dst: Rect, src: (u32, u32, u32, u32) },
    SetProperty { plane: u32, property: u32, value: u64 },
}

pub struct FakeBackend {
    pub crtcs: Vec<u32>,
    pub connectors: BTreeMap<u32, ConnectorInfo>,
    pub encoders: BTreeMap<u32, EncoderInfo>,
    pub planes: Vec<PlaneInfo>,
    pub dumb_buffers: bool,
    pub fail_set_property: bool,
    pub calls: Vec<Call>,
    next_handle: u32,
    next_fb: u32,
}

pub fn modes(list: &[(u32, u32, u32)]) -> Vec<DisplayMode> {
    list.iter()
        .map(|&(w, h, hz)| DisplayMode::new(w, h, hz))
        .collect()
}

pub fn standard_modes() -> Vec<DisplayMode> {
    modes(&[
        (1920, 1080, 60),
        (1920, 1080, 50),
        (1280, 720, 60),
        (1280, 720, 50),
        (640, 480, 60),
    ])
}

pub fn connector_info(id: u32, state: ConnectionState, modes: Vec<DisplayMode>) -> ConnectorInfo {
    ConnectorInfo {
        id,
        kind: 11, // HDMI-A
        state,
        modes,
        current_encoder: Some(ENCODER),
        encoders: vec![ENCODER],
        edid: None,
    }
}

impl FakeBackend {
    pub fn empty() -> Self {
        Self {
            crtcs: Vec::new(),
            connectors: BTreeMap::new(),
            encoders: BTreeMap::new(),
            planes: Vec::new(),
            dumb_buffers: true,
            fail_set_property: false,
            calls: Vec::new(),
            next_handle: 1,
            next_fb: 100,
        }
    }

    pub fn single_display() -> Self {
        let mut fake = Self::empty();
        fake.crtcs = vec![CRTC, IDLE_CRTC];
        fake.connectors.insert(
            CONNECTOR,
            connector_info(CONNECTOR, ConnectionState::Connected, standard_modes()),
        );
        fake.encoders.insert(
            ENCODER,
            EncoderInfo {
                id: ENCODER,
                crtc_id: CRTC,
                possible_crtcs: 0b11,
            },
        );
        fake.planes = vec![
            PlaneInfo { id: 61, possible_crtcs: 0b01 },
            PlaneInfo { id: 62, possible_crtcs: 0b01 },
            PlaneInfo { id: 63, possible_crtcs: 0b10 },
        ];
        fake
    }

    /// Another plugged connector behind the same encoder, so setup binds
    /// it to `CRTC` as well
    pub fn with_second_connector(mut self, modes: Vec<DisplayMode>) -> Self {
        self.connectors.insert(
            SECOND_CONNECTOR,
            connector_info(SECOND_CONNECTOR, ConnectionState::Connected, modes),
        );
        self
    }

    /// Replace what the next connector query reports
    pub fn plug(&mut self, modes: Vec<DisplayMode>) {
        if let Some(info) = self.connectors.get_mut(&CONNECTOR) {
            info.state = ConnectionState::Connected;
            info.modes = modes;
        }
    }

    pub fn unplug(&mut self) {
        if let Some(info) = self.connectors.get_mut(&CONNECTOR) {
            info.state = ConnectionState::Disconnected;
            info.modes.clear();
        }
    }

    pub fn mode_sets(&self) -> Vec<&Call> {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::SetCrtc { .. }))
            .collect()
    }
}

fn not_found(what: &str, id: u32) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{} {}", what, id))
}

impl KmsBackend for FakeBackend {
    fn resources(&self) -> io::Result<ResourceIds> {
        Ok(ResourceIds {
            crtcs: self.crtcs.clone(),
            connectors: self.connectors.keys().copied().collect(),
            encoders: self.encoders.keys().copied().collect(),
        })
    }

    fn plane_ids(&self) -> io::Result<Vec<u32>> {
        Ok(self.planes.iter().map(|p| p.id).collect())
    }

    fn connector(&self, id: u32) -> io::Result<ConnectorInfo> {
        self.connectors.get(&id).cloned().ok_or_else(|| not_found("connector", id))
    }

    fn encoder(&self, id: u32) -> io::Result<EncoderInfo> {
        self.encoders.get(&id).copied().ok_or_else(|| not_found("encoder", id))
    }

    fn plane(&self, id: u32) -> io::Result<PlaneInfo> {
        self.planes
            .iter()
            .find(|p| p.id == id)
            .copied()
            .ok_or_else(|| not_found("plane", id))
    }

    fn dumb_buffer_capability(&self) -> io::Result<bool> {
        Ok(self.dumb_buffers)
    }

    fn create_dumb(&mut self, width: u32, height: u32, bpp: u32) -> io::Result<DumbAllocation> {
        self.calls.push(Call::CreateDumb { width, height, bpp });
        let handle = self.next_handle;
        self.next_handle += 1;
        let pitch = width * ((bpp + 7) / 8);
        Ok(DumbAllocation {
            handle,
            pitch,
            size: pitch as u64 * height as u64,
        })
    }

    fn map_dumb(&mut self, _handle: u32, size: u64) -> io::Result<MmapMut> {
        MmapMut::map_anon(size as usize)
    }

    fn destroy_dumb(&mut self, handle: u32) -> io::Result<()> {
        self.calls.push(Call::DestroyDumb(handle));
        Ok(())
    }

    fn add_framebuffer(
        &mut self,
        width: u32,
        height: u32,
        _format: DrmFourcc,
        _layout: &PlaneLayout,
    ) -> io::Result<u32> {
        let fb_id = self.next_fb;
        self.next_fb += 1;
        self.calls.push(Call::AddFb { fb_id, width, height });
        Ok(fb_id)
    }

    fn remove_framebuffer(&mut self, fb_id: u32) -> io::Result<()> {
        self.calls.push(Call::RemoveFb(fb_id));
        Ok(())
    }

    fn set_crtc(
        &mut self,
        crtc: u32,
        fb_id: u32,
        connectors: &[u32],
        mode: &DisplayMode,
    ) -> io::Result<()> {
        self.calls.push(Call::SetCrtc {
            crtc,
            fb_id,
            connectors: connectors.to_vec(),
            mode: mode.to_string(),
        });
        Ok(())
    }

    fn set_plane(
        &mut self,
        plane: u32,
        crtc: u32,
        fb_id: u32,
        dst: Rect,
        src: (u32, u32, u32, u32),
    ) -> io::Result<()> {
        self.calls.push(Call::SetPlane { plane, crtc, fb_id, dst, src });
        Ok(())
    }

    fn set_plane_property(&mut self, plane: u32, property: u32, value: u64) -> io::Result<()> {
        if self.fail_set_property {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        self.calls.push(Call::SetProperty { plane, property, value });
        Ok(())
    }
}

/// Capability with two windows ("MAIN", "SUB") and the given bounds
pub fn capability(min: Size, max: Size) -> DeviceCapability {
    DeviceCapability::from_json(&format!(
        r#"{{
            "videoCapabilities": {{
                "maxResolution": {{"w": {}, "h": {}, "freq": 60}},
                "minResolution": {{"w": {}, "h": {}, "freq": 60}}
            }},
            "planes": ["MAIN", "SUB"]
        }}"#,
        max.w, max.h, min.w, min.h
    ))
}

/// Table holding one fake device at `NODE`
pub fn table(fake: FakeBackend, initial: Size) -> DeviceTable<FakeBackend> {
    let mut fake = Some(fake);
    DeviceTable::enumerate(
        [NODE],
        |_node: &str| fake.take().ok_or_else(|| anyhow::anyhow!("already opened")),
        initial,
        DrmFourcc::Xrgb8888,
    )
}

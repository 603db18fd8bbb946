//! DRM device resource graph
//!
//! One display adapter: the backend handle plus the connectors, encoders,
//! CRTCs and planes enumerated from a full resource query. The graph is
//! built once; afterwards only connector state is refreshed.

use drm::buffer::DrmFourcc;
use log::{debug, error, info, warn};

use super::backend::KmsBackend;
use super::buffer;
use super::mode;
use super::resources::{Connector, Crtc, EncoderInfo, PlaneInfo, Size};
use crate::constants::msgid;
use crate::error::{DisplayError, Result};

/// DRM device with its enumerated resources
pub struct Device<B: KmsBackend> {
    name: String,
    pub(crate) backend: B,
    pub(crate) connectors: Vec<Connector>,
    pub(crate) encoders: Vec<EncoderInfo>,
    pub(crate) crtcs: Vec<Crtc>,
    pub(crate) planes: Vec<PlaneInfo>,
    /// Current target display size
    pub(crate) size: Size,
    pub(crate) format: DrmFourcc,
}

impl<B: KmsBackend> Device<B> {
    /// Build the resource graph from a full kernel query.
    ///
    /// Fails if either the resource or the plane-resource query fails.
    /// Individual connectors, encoders or planes that cannot be queried
    /// are logged and left out.
    pub fn load(name: &str, backend: B, size: Size, format: DrmFourcc) -> Result<Self> {
        let res = backend.resources().map_err(|e| {
            error!(
                target: msgid::DEVICE_ERROR,
                "Failed to get drm resources for {}: {}", name, e
            );
            DisplayError::kernel("GETRESOURCES", e)
        })?;
        let plane_ids = backend.plane_ids().map_err(|e| {
            error!(
                target: msgid::DEVICE_ERROR,
                "Failed to get plane resources for {}: {}", name, e
            );
            DisplayError::kernel("GETPLANERESOURCES", e)
        })?;

        let crtcs: Vec<Crtc> = res
            .crtcs
            .iter()
            .enumerate()
            .map(|(index, &id)| Crtc::new(id, index as u32))
            .collect();

        let mut connectors = Vec::with_capacity(res.connectors.len());
        for &id in &res.connectors {
            match backend.connector(id) {
                Ok(info) => connectors.push(Connector::new(info)),
                Err(e) => warn!(target: msgid::DEVICE_ERROR, "Connector {} query failed: {}", id, e),
            }
        }

        let mut encoders = Vec::with_capacity(res.encoders.len());
        for &id in &res.encoders {
            match backend.encoder(id) {
                Ok(info) => encoders.push(info),
                Err(e) => warn!(target: msgid::DEVICE_ERROR, "Encoder {} query failed: {}", id, e),
            }
        }

        let mut planes = Vec::with_capacity(plane_ids.len());
        for id in plane_ids {
            match backend.plane(id) {
                Ok(info) => planes.push(info),
                Err(e) => warn!(target: msgid::DEVICE_ERROR, "Plane {} query failed: {}", id, e),
            }
        }

        info!(
            "{}: connectors={}, encoders={}, crtcs={}, planes={}",
            name,
            connectors.len(),
            encoders.len(),
            crtcs.len(),
            planes.len()
        );

        Ok(Self {
            name: name.to_string(),
            backend,
            connectors,
            encoders,
            crtcs,
            planes,
            size,
            format,
        })
    }

    /// Check dumb buffer support, then bind every connector to a CRTC.
    ///
    /// Missing dumb buffer support is fatal. Connectors without a usable
    /// CRTC are logged and stay unbound.
    pub fn setup(&mut self) -> Result<()> {
        match self.backend.dumb_buffer_capability() {
            Ok(true) => {}
            Ok(false) => {
                error!(target: msgid::FATAL_ERROR, "{} does not support dumb buffers", self.name);
                return Err(DisplayError::Fatal(format!(
                    "{} does not support dumb buffers",
                    self.name
                )));
            }
            Err(e) => {
                error!(target: msgid::FATAL_ERROR, "dumb buffer capability query failed: {}", e);
                return Err(DisplayError::Fatal(format!(
                    "{}: dumb buffer capability query failed: {}",
                    self.name, e
                )));
            }
        }

        for index in 0..self.connectors.len() {
            let crtc_id = mode::find_crtc(&self.backend, &self.connectors[index], &self.crtcs);
            let connector = &mut self.connectors[index];
            if crtc_id == 0 {
                error!(
                    target: msgid::DEVICE_ERROR,
                    "no valid crtc for connector {}", connector.id
                );
                continue;
            }

            connector.crtc_id = crtc_id;
            match self.crtcs.iter_mut().find(|c| c.id == crtc_id) {
                Some(crtc) => {
                    crtc.connectors.insert(connector.id);
                    debug!("Connector {} ({}) -> CRTC {}", connector.id, connector.name, crtc_id);
                }
                None => warn!(
                    target: msgid::DEVICE_ERROR,
                    "connector {} bound to unknown CRTC {}", connector.id, crtc_id
                ),
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn connectors(&self) -> &[Connector] {
        &self.connectors
    }

    pub fn encoders(&self) -> &[EncoderInfo] {
        &self.encoders
    }

    pub fn crtcs(&self) -> &[Crtc] {
        &self.crtcs
    }

    pub fn planes(&self) -> &[PlaneInfo] {
        &self.planes
    }

    /// Current target display size
    pub fn size(&self) -> Size {
        self.size
    }

    pub fn scanout_format(&self) -> DrmFourcc {
        self.format
    }

    pub fn crtc(&self, crtc_id: u32) -> Option<&Crtc> {
        self.crtcs.iter().find(|c| c.id == crtc_id)
    }

    /// CRTC driving the first enumerated connector (single-display outputs)
    pub fn display_crtc(&self) -> Option<&Crtc> {
        let connector = self.connectors.first()?;
        self.crtc(connector.crtc_id)
    }

    /// Id of the CRTC driving the first connector
    pub fn display_crtc_id(&self) -> Result<u32> {
        let connector = self
            .connectors
            .first()
            .ok_or(DisplayError::ConnectorNotFound(0))?;
        self.crtc(connector.crtc_id)
            .map(|c| c.id)
            .ok_or(DisplayError::NoOutputPath(connector.id))
    }

    /// Mode range of the first connector, re-queried from the kernel
    pub fn mode_range(&mut self) -> Result<(Size, Size)> {
        let connector = self
            .connectors
            .first_mut()
            .ok_or(DisplayError::ConnectorNotFound(0))?;
        mode::mode_range(&self.backend, connector)
    }

    /// Re-query every connector; failures keep the previous state
    pub fn refresh_connectors(&mut self) {
        for connector in &mut self.connectors {
            match self.backend.connector(connector.id) {
                Ok(info) => connector.refresh(info),
                Err(e) => warn!(
                    target: msgid::DEVICE_ERROR,
                    "Connector {} refresh failed: {}", connector.id, e
                ),
            }
        }
    }

    /// Map the scanout buffer of `crtc_id` for CPU access
    pub fn map_scanout(&mut self, crtc_id: u32) -> Result<&mut [u8]> {
        let crtc = self
            .crtcs
            .iter_mut()
            .find(|c| c.id == crtc_id)
            .ok_or(DisplayError::CrtcNotFound(crtc_id))?;
        let bo = crtc
            .scanout_buffer_mut()
            .ok_or(DisplayError::DisplayNotConnected(crtc_id))?;
        buffer::map_buffer(&mut self.backend, bo)
    }
}

impl<B: KmsBackend> Drop for Device<B> {
    fn drop(&mut self) {
        for crtc in &mut self.crtcs {
            let Some(scanout) = crtc.scanout.take() else {
                continue;
            };
            if let Err(e) = scanout.release(&mut self.backend) {
                warn!("{}: releasing scanout of CRTC {}: {}", self.name, crtc.id, e);
            }
        }
        debug!("Device {} closed", self.name);
    }
}

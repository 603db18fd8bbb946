//! Display error taxonomy
//!
//! Lookups that miss, requests the hardware rejects, and conditions that
//! make the resource graph unusable are kept apart so callers can decide
//! whether to re-request or abort startup. Nothing here is retried.

use std::io;

use thiserror::Error;

use crate::drm::resources::{Size, WindowId};

pub type Result<T, E = DisplayError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DisplayError {
    // ------------------------------------------------------------------
    // Resource not found
    // ------------------------------------------------------------------
    #[error("invalid window id {0}")]
    InvalidWindow(WindowId),

    #[error("window {0} is not connected")]
    SinkNotConnected(WindowId),

    #[error("no plane available for {0}")]
    NoPlane(String),

    #[error("CRTC {0} not found")]
    CrtcNotFound(u32),

    #[error("connector {0} not found")]
    ConnectorNotFound(u32),

    #[error("no usable CRTC for connector {0}")]
    NoOutputPath(u32),

    #[error("no primary display device")]
    NoPrimaryDevice,

    #[error("no connectors bound to CRTC {0}")]
    NoConnectors(u32),

    #[error("no plugged connector drives CRTC {0}")]
    DisplayNotConnected(u32),

    // ------------------------------------------------------------------
    // Hardware-rejected request
    // ------------------------------------------------------------------
    #[error("mode {mode} not supported by connector {connector}")]
    UnsupportedMode { mode: String, connector: u32 },

    #[error("resolution {requested} outside capability bounds [{min}, {max}]")]
    OutOfBounds {
        requested: Size,
        min: Size,
        max: Size,
    },

    #[error("unsupported pixel format {0}")]
    UnsupportedFormat(String),

    #[error("z-order of {0} windows exceeds the 4 slots of the packed argument")]
    ZOrderOverflow(usize),

    #[error("{op} failed: {source}")]
    Kernel {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    // ------------------------------------------------------------------
    // Initialization-fatal
    // ------------------------------------------------------------------
    #[error("fatal: {0}")]
    Fatal(String),
}

impl DisplayError {
    /// Wrap an io error from a kernel call
    pub fn kernel(op: &'static str, source: io::Error) -> Self {
        DisplayError::Kernel { op, source }
    }

    /// Startup must abort rather than continue with a half-built resource graph
    pub fn is_fatal(&self) -> bool {
        matches!(self, DisplayError::Fatal(_))
    }

    /// The caller addressed something that does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DisplayError::InvalidWindow(_)
                | DisplayError::SinkNotConnected(_)
                | DisplayError::NoPlane(_)
                | DisplayError::CrtcNotFound(_)
                | DisplayError::ConnectorNotFound(_)
                | DisplayError::NoOutputPath(_)
                | DisplayError::NoPrimaryDevice
                | DisplayError::NoConnectors(_)
                | DisplayError::DisplayNotConnected(_)
        )
    }
}

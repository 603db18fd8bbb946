//! Utility functions shared across kmsvideo
//!
//! Common helpers that don't fit in specialized modules.

pub mod color;
pub mod signals;

pub use color::{parse_hex_color, rgb_to_565, rgb_to_yuv601};
pub use signals::{setup_signal_handlers, shutdown_requested};

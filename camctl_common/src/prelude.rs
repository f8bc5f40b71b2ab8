//! Prelude module for common re-exports.
//!
//! ```rust
//! use camctl_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── Events ─────────────────────────────────────────────────────────
pub use crate::events::{Event, EventDecodeError, EventPtr, Topic};

// ─── Device ─────────────────────────────────────────────────────────
pub use crate::device::{
    CameraPath, Device, DeviceError, DeviceFactory, LightMeter, ShutterSpeed,
};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{DEFAULT_PORT, MAILBOX_CAPACITY, MIN_DELAY_MS};

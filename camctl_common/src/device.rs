//! Tethered camera contract.
//!
//! The controller never talks to hardware directly; it drives a `Device`
//! trait object obtained from a factory registered under a driver name.
//! Every call is synchronous and may block the calling actor thread for as
//! long as the device needs.
//!
//! Units used across the trait:
//! - shutter speed in microseconds (`-1` is the bulb setting)
//! - aperture as F-number x 100 (F/8 is `800`)
//! - ISO as the plain sensitivity value

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Errors reported by a [`Device`] implementation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    /// Operation requires an open session.
    #[error("Device not connected")]
    NotConnected,

    /// Transport or protocol failure talking to the device.
    #[error("Device communication error: {0}")]
    Communication(String),

    /// A bounded wait ran out before the device answered.
    #[error("Device operation timed out: {0}")]
    Timeout(String),

    /// The device does not expose this setting.
    #[error("Setting not supported: {0}")]
    Unsupported(&'static str),

    /// Requested value is not among the device's choices.
    #[error("Invalid value for {setting}: {value}")]
    InvalidValue { setting: &'static str, value: String },

    /// Local filesystem failure while storing a downloaded file.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Location of a file on the camera's own storage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CameraPath {
    pub folder: String,
    pub name: String,
}

impl CameraPath {
    pub fn new(folder: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for CameraPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.folder, self.name)
    }
}

/// Current shutter speed as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutterSpeed {
    /// Exposure time in microseconds.
    pub shutter_speed: i32,
    /// True when the camera itself is set to bulb and timing is host-driven.
    pub bulb: bool,
}

/// Light meter reading with the range the device reports it in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightMeter {
    pub value: f32,
    pub min: f32,
    pub max: f32,
}

/// Factory function type for creating device instances.
pub type DeviceFactory = fn() -> Box<dyn Device>;

/// Interface every camera backend implements.
///
/// Only `connect`, `disconnect`, `capture` and `download_file` are required
/// to do anything meaningful. Configuration accessors default to
/// `DeviceError::Unsupported` so that minimal backends stay small.
pub trait Device: Send {
    /// Driver identifier (e.g. "simulation").
    fn name(&self) -> &'static str;

    /// Open a session. Returns a human readable device identifier.
    fn connect(&mut self) -> Result<String, DeviceError>;

    /// Close the session. Never fails; closing an idle device is a no-op.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Take one picture and return where the camera stored it.
    ///
    /// Long exposures run a timed sequence (open, wait, close, then poll for
    /// completion) bounded by an overall timeout.
    fn capture(&mut self) -> Result<CameraPath, DeviceError>;

    /// Copy a file from the camera to `destination` on the local filesystem.
    fn download_file(&mut self, source: &CameraPath, destination: &Path)
    -> Result<(), DeviceError>;

    // ─── Exposure ───────────────────────────────────────────────────

    fn shutter_speed(&mut self) -> Result<ShutterSpeed, DeviceError> {
        Err(DeviceError::Unsupported("shutter_speed"))
    }

    fn shutter_speed_choices(&mut self) -> Result<Vec<i32>, DeviceError> {
        Err(DeviceError::Unsupported("shutter_speed"))
    }

    fn set_shutter_speed(&mut self, _microseconds: i32) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported("shutter_speed"))
    }

    fn aperture(&mut self) -> Result<i32, DeviceError> {
        Err(DeviceError::Unsupported("aperture"))
    }

    fn aperture_choices(&mut self) -> Result<Vec<i32>, DeviceError> {
        Err(DeviceError::Unsupported("aperture"))
    }

    fn set_aperture(&mut self, _aperture: i32) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported("aperture"))
    }

    fn iso(&mut self) -> Result<i32, DeviceError> {
        Err(DeviceError::Unsupported("iso"))
    }

    fn iso_choices(&mut self) -> Result<Vec<i32>, DeviceError> {
        Err(DeviceError::Unsupported("iso"))
    }

    fn set_iso(&mut self, _iso: i32) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported("iso"))
    }

    fn auto_iso(&mut self) -> Result<bool, DeviceError> {
        Err(DeviceError::Unsupported("auto_iso"))
    }

    fn set_auto_iso(&mut self, _enabled: bool) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported("auto_iso"))
    }

    fn exposure_program(&mut self) -> Result<String, DeviceError> {
        Err(DeviceError::Unsupported("exposure_program"))
    }

    fn light_meter(&mut self) -> Result<LightMeter, DeviceError> {
        Err(DeviceError::Unsupported("light_meter"))
    }

    // ─── Lens & body ────────────────────────────────────────────────

    fn battery_percent(&mut self) -> Result<i32, DeviceError> {
        Err(DeviceError::Unsupported("battery"))
    }

    /// Focal length in millimetres.
    fn focal_length(&mut self) -> Result<i32, DeviceError> {
        Err(DeviceError::Unsupported("focal_length"))
    }

    fn focus_mode(&mut self) -> Result<String, DeviceError> {
        Err(DeviceError::Unsupported("focus_mode"))
    }

    /// Cycle to the next focus mode the body offers.
    fn next_focus_mode(&mut self) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported("focus_mode"))
    }

    fn long_exposure_nr(&mut self) -> Result<bool, DeviceError> {
        Err(DeviceError::Unsupported("long_exp_nr"))
    }

    fn set_long_exposure_nr(&mut self, _enabled: bool) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported("long_exp_nr"))
    }

    fn vibration_reduction(&mut self) -> Result<bool, DeviceError> {
        Err(DeviceError::Unsupported("vr"))
    }

    fn set_vibration_reduction(&mut self, _enabled: bool) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported("vr"))
    }

    fn capture_target(&mut self) -> Result<String, DeviceError> {
        Err(DeviceError::Unsupported("capture_target"))
    }

    fn set_capture_target(&mut self, _target: &str) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported("capture_target"))
    }
}

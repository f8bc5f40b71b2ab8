//! Event vocabulary and topics.
//!
//! All events exchanged through the broker and over the remote link are
//! variants of the closed [`Event`] enum. Each variant has a stable numeric
//! discriminant that doubles as the `"event_id"` field of its JSON form:
//!
//! ```json
//! { "event_id": 34, "aperture": 800 }
//! ```
//!
//! The table below is the only place an event is declared; ids, names and
//! the JSON codec are generated from it.

use crate::consts::EVENT_ID_KEY;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Shared, immutable handle to a posted event.
pub type EventPtr = Arc<Event>;

/// Failure decoding an event from its JSON form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventDecodeError {
    #[error("event body is not a JSON object")]
    NotAnObject,

    #[error("missing or non-integer \"event_id\"")]
    MissingId,

    #[error("unknown event id {0}")]
    UnknownId(u64),

    #[error("missing field \"{0}\"")]
    MissingField(&'static str),

    #[error("invalid field \"{field}\": {reason}")]
    InvalidField { field: &'static str, reason: String },
}

fn field<T: DeserializeOwned>(
    obj: &Map<String, Value>,
    key: &'static str,
) -> Result<T, EventDecodeError> {
    let raw = obj.get(key).ok_or(EventDecodeError::MissingField(key))?;
    serde_json::from_value(raw.clone()).map_err(|e| EventDecodeError::InvalidField {
        field: key,
        reason: e.to_string(),
    })
}

macro_rules! define_events {
    (
        $(
            $(#[$meta:meta])*
            $id:literal => $name:ident $({ $($field:ident : $ty:ty),* $(,)? })?
        ),* $(,)?
    ) => {
        /// Every message understood by the controller.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Event {
            $(
                $(#[$meta])*
                $name $({ $($field: $ty),* })?,
            )*
        }

        impl Event {
            /// All known discriminants, in declaration order.
            pub const ALL_IDS: &'static [u16] = &[$($id),*];

            /// Stable numeric discriminant.
            pub fn id(&self) -> u16 {
                match self {
                    $( Event::$name { .. } => $id, )*
                }
            }

            /// Variant name, used in logs.
            pub fn name(&self) -> &'static str {
                match self {
                    $( Event::$name { .. } => stringify!($name), )*
                }
            }

            /// JSON object with `"event_id"` plus one key per field.
            pub fn to_json(&self) -> Value {
                let mut body = Map::new();
                body.insert(EVENT_ID_KEY.to_string(), Value::from(self.id()));
                match self {
                    $(
                        Event::$name { $($($field),*)? } => {
                            $($(
                                body.insert(
                                    stringify!($field).to_string(),
                                    serde_json::to_value($field).unwrap_or(Value::Null),
                                );
                            )*)?
                        }
                    )*
                }
                Value::Object(body)
            }

            /// Decode an event from its JSON object form.
            pub fn from_json(value: &Value) -> Result<Event, EventDecodeError> {
                let obj = value.as_object().ok_or(EventDecodeError::NotAnObject)?;
                let id = obj
                    .get(EVENT_ID_KEY)
                    .and_then(Value::as_u64)
                    .ok_or(EventDecodeError::MissingId)?;
                match id {
                    $(
                        $id => Ok(Event::$name {
                            $($($field: field(obj, stringify!($field))?),*)?
                        }),
                    )*
                    other => Err(EventDecodeError::UnknownId(other)),
                }
            }
        }
    };
}

define_events! {
    // ─── Camera commands & notifications ────────────────────────────
    10 => CameraCmdConnect,
    11 => CameraCmdDisconnect,
    12 => CameraCmdRecoverError,
    13 => CameraCmdCapture,
    /// Self-posted on entry to `Capturing`.
    14 => CameraCmdCaptureInternal,
    /// Sets the persistent "download after capture" flag.
    15 => CameraCmdDownload { download: bool },
    /// Self-posted on entry to `Downloading`.
    16 => CameraCmdDownloadInternal,
    17 => CameraConnected,
    18 => CameraReady,
    19 => CameraDisconnected,
    20 => CameraConnectionError,
    21 => CameraError,
    22 => CameraIgnoreError,
    /// Skips the full configuration refresh on every return to `Ready`.
    23 => CameraCmdLowLatency { low_latency: bool },
    24 => CameraCaptureDone { downloaded: bool, file: String },
    25 => GetCameraControllerState,
    26 => CameraControllerState { state: String, camera_connected: bool, download: bool },

    // ─── Configuration ──────────────────────────────────────────────
    27 => ConfigGetShutterSpeed,
    28 => ConfigGetChoicesShutterSpeed,
    29 => ConfigSetShutterSpeed { shutter_speed: i32 },
    30 => ConfigValueShutterSpeed { shutter_speed: i32, bulb: bool },
    31 => ConfigChoicesShutterSpeed { shutter_speed_choices: Vec<i32> },
    32 => ConfigGetAperture,
    33 => ConfigGetChoicesAperture,
    34 => ConfigSetAperture { aperture: i32 },
    35 => ConfigValueAperture { aperture: i32 },
    36 => ConfigChoicesAperture { aperture_choices: Vec<i32> },
    37 => ConfigGetIso,
    38 => ConfigGetChoicesIso,
    39 => ConfigSetIso { iso: i32 },
    40 => ConfigValueIso { iso: i32 },
    41 => ConfigChoicesIso { iso_choices: Vec<i32> },
    42 => ConfigGetBattery,
    43 => ConfigValueBattery { battery: i32 },
    44 => ConfigGetFocalLength,
    45 => ConfigValueFocalLength { focal_length: i32 },
    46 => ConfigGetFocusMode,
    47 => ConfigNextFocusMode,
    48 => ConfigValueFocusMode { focus_mode: String },
    49 => ConfigGetLongExpNr,
    50 => ConfigSetLongExpNr { long_exp_nr: bool },
    51 => ConfigValueLongExpNr { long_exp_nr: bool },
    52 => ConfigGetVibRed,
    53 => ConfigSetVibRed { vr: bool },
    54 => ConfigValueVibRed { vr: bool },
    55 => ConfigGetCaptureTarget,
    56 => ConfigSetCaptureTarget { target: String },
    57 => ConfigValueCaptureTarget { target: String },
    58 => ConfigGetExposureProgram,
    59 => ConfigValueExposureProgram { exposure_program: String },
    60 => ConfigGetLightMeter,
    61 => ConfigValueLightMeter { light_meter: f32, min: f32, max: f32 },
    62 => ConfigGetAutoIso,
    63 => ConfigSetAutoIso { auto_iso: bool },
    64 => ConfigValueAutoIso { auto_iso: bool },
    65 => ConfigGetAll,

    // ─── Modes ──────────────────────────────────────────────────────
    66 => GetCurrentMode,
    67 => ValueCurrentMode { mode: String },
    68 => ModeStopped,
    69 => ModeStop,
    70 => ModeIntervalometer { intervalms: i32, total_captures: i32 },
    71 => IntervalometerStart { intervalms: i32, total_captures: i32 },
    72 => IntervalometerDeadlineExpired,
    73 => IntervalometerState { state: String, intervalms: i32, num_captures: i32, total_captures: i32 },
    74 => EnableEventPassThrough,
    75 => DisableEventPassThrough,

    // ─── Liveness ───────────────────────────────────────────────────
    76 => HeartBeat,
}

impl Event {
    /// Wrap into the shared handle used by the broker.
    pub fn into_ptr(self) -> EventPtr {
        Arc::new(self)
    }

    /// Requests that read or change camera configuration.
    pub fn is_config_request(&self) -> bool {
        matches!(
            self,
            Event::ConfigGetShutterSpeed
                | Event::ConfigGetChoicesShutterSpeed
                | Event::ConfigGetAperture
                | Event::ConfigGetChoicesAperture
                | Event::ConfigGetIso
                | Event::ConfigGetChoicesIso
                | Event::ConfigGetBattery
                | Event::ConfigGetFocalLength
                | Event::ConfigGetFocusMode
                | Event::ConfigGetLongExpNr
                | Event::ConfigGetVibRed
                | Event::ConfigGetCaptureTarget
                | Event::ConfigGetExposureProgram
                | Event::ConfigGetLightMeter
                | Event::ConfigGetAutoIso
                | Event::ConfigGetAll
        ) || self.is_config_setter()
    }

    /// Requests that change camera configuration.
    pub fn is_config_setter(&self) -> bool {
        matches!(
            self,
            Event::ConfigSetShutterSpeed { .. }
                | Event::ConfigSetAperture { .. }
                | Event::ConfigSetIso { .. }
                | Event::ConfigNextFocusMode
                | Event::ConfigSetLongExpNr { .. }
                | Event::ConfigSetVibRed { .. }
                | Event::ConfigSetCaptureTarget { .. }
                | Event::ConfigSetAutoIso { .. }
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.id())
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Event::from_json(&value).map_err(serde::de::Error::custom)
    }
}

/// Channels partitioning the publish/subscribe space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Topic {
    /// Configuration values and choices broadcast by the camera controller.
    CameraConfig = 0,
    /// Commands for the camera controller.
    CameraCmd = 1,
    /// Lifecycle notifications from the camera controller.
    CameraEvent = 2,
    /// Everything received from remote or console clients.
    RemoteCmd = 3,
    ModeController = 4,
    ModeFsm = 5,
    /// Mode and intervalometer status for observers.
    ModeState = 6,
    Heartbeat = 7,
}

impl Topic {
    pub const ALL: [Topic; 8] = [
        Topic::CameraConfig,
        Topic::CameraCmd,
        Topic::CameraEvent,
        Topic::RemoteCmd,
        Topic::ModeController,
        Topic::ModeFsm,
        Topic::ModeState,
        Topic::Heartbeat,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Topic::CameraConfig => "CameraConfig",
            Topic::CameraCmd => "CameraCmd",
            Topic::CameraEvent => "CameraEvent",
            Topic::RemoteCmd => "RemoteCmd",
            Topic::ModeController => "ModeController",
            Topic::ModeFsm => "ModeFsm",
            Topic::ModeState => "ModeState",
            Topic::Heartbeat => "Heartbeat",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

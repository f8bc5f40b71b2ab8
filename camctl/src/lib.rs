//! # camctl
//!
//! Tethered camera controller built from independent actors exchanging
//! events through one broker.
//!
//! # Module Structure
//!
//! - [`app`] - `Controller`, wiring and lifecycle
//! - [`config`] - `camctl.toml` schema and validation
//! - [`console`] - text command parser and stdin loop
//! - [`device_registry`] - driver name to device factory
//! - [`devices`] - built-in device backends
//! - [`fsm`] - camera, mode, intervalometer and pass-through machines
//! - [`sniffer`] - debug logging of all broker traffic
//! - [`transport`] - length-prefixed JSON over TCP
//!
//! # Architecture
//!
//! ```text
//!  remote client ◄──TCP──► CommManager ──RemoteCmd──► PassThrough ──CameraCmd──┐
//!                               ▲                │                              ▼
//!                               │                ├──► ModeController    CameraController ──► Device
//!                               │                └──► Intervalometer ──CameraCmd──┘   │
//!                               └───── CameraConfig / CameraEvent / ModeState ◄────────┘
//! ```

pub mod app;
pub mod config;
pub mod console;
pub mod device_registry;
pub mod devices;
pub mod fsm;
pub mod sniffer;
pub mod transport;

pub use crate::app::{AppError, Controller};
pub use crate::config::ControllerConfig;
pub use crate::device_registry::DeviceRegistry;

//! camctl common library
//!
//! Types shared by every crate in the workspace: the event vocabulary and
//! topics exchanged through the broker, the camera device contract, system
//! constants and TOML configuration loading.
//!
//! # Module Structure
//!
//! - [`events`] - `Event` enum, JSON codec and `Topic`
//! - [`device`] - `Device` trait implemented by camera backends
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Queue sizes, timer granularity, default port
//! - [`prelude`] - Common re-exports for convenience

pub mod config;
pub mod consts;
pub mod device;
pub mod events;
pub mod prelude;

//! Remote control link.
//!
//! - [`codec`] - 4-byte big-endian length prefix + JSON body
//! - [`server`] - single-client TCP server with a reader and a writer actor
//! - [`comm`] - bridges the server and the event broker

pub mod codec;
pub mod comm;
pub mod server;

pub use codec::ProtocolError;
pub use comm::CommManager;
pub use server::{JsonTcpServer, ServerHandle, TransportError};

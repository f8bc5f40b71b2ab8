//! Runtime error types.

use thiserror::Error;

/// Errors raised by the actor runtime itself.
///
/// Event handling never produces errors; failures inside handlers are
/// converted into events by the handlers.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The OS refused to create a worker thread.
    #[error("Failed to spawn thread '{name}': {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

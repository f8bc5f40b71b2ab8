//! Built-in device backends.
//!
//! Hardware backends live outside this crate; the only driver compiled in
//! is the in-memory simulator used for development and tests.

pub mod simulation;

pub use simulation::SimulatedCamera;

//! Concrete state machines.
//!
//! Each machine implements [`camctl_runtime::hsm::StateMachine`] and runs
//! inside its own [`camctl_runtime::hsm_actor::StateMachineActor`]. The
//! `TOPICS` constant next to each machine lists what its actor subscribes
//! to.

pub mod camera;
pub mod intervalometer;
pub mod mode;
pub mod pass_through;

pub use camera::{CameraController, CameraSettings, CameraState};
pub use intervalometer::{Intervalometer, IntervalometerState};
pub use mode::{ModeController, ModeState};
pub use pass_through::{PassThrough, PassThroughState};

//! Orchestration core.
//!
//! This module contains:
//! - The controller that owns the sensor set and the dispatch loop
//! - The event bus wiring each sensor's events into that loop
//! - Recording session state and tag fan-out
//! - The front-end attachment contract

pub(crate) mod bus;
pub mod controller;
pub(crate) mod dispatch;
pub mod frontend;
pub mod session;
pub mod tags;

// Re-export commonly used types
pub use controller::{Completion, Controller, ControllerHandle, ExperimentCallbacks, SensorInfo};
pub use frontend::{FrontEnd, Notification};
pub use session::{ActiveSession, RecordingSession};
pub use tags::{KeyContingency, TagBroadcaster};

//! Sensor capability contract.
//!
//! Every device plugin hands the controller a boxed [`Sensor`]. The trait
//! covers lifecycle (recording, disconnect) and control (tags, actions,
//! type-addressed messages); outbound events travel through the sensor's
//! [`SensorEmitter`].

pub mod contract;
pub mod events;
pub mod types;

// Re-export commonly used types
pub use contract::{Sensor, SensorBase};
pub use events::{Listener, ListenerId, SensorEmitter, SensorEvent, SensorEventKind};
pub use types::{
    timestamp, ControlElement, DataCondition, Query, QueryCallback, SensorId, Tag, TagKind,
};

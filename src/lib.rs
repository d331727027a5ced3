//! Sensor Orchestrator - synchronized control of plugin-supplied sensors.
//!
//! This library coordinates heterogeneous data-acquisition devices during a
//! timed experiment: it starts and stops their recording in lockstep,
//! broadcasts timestamped tags to all of them, and relays their lifecycle
//! and error events to whichever front end is attached.
//!
//! # Architecture
//!
//! ```text
//!  Plugin Registry ──factory──▶ Controller ──start/stop/tag/action──▶ Sensors
//!                                 ▲    │                                 │
//!                    task queue   │    └──notifications──▶ Front ends    │
//!                                 │                                      │
//!                             Event Bus ◀──────────emit───────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sensor_orchestrator::{builtin_registry, Config, Controller, ExperimentCallbacks};
//!
//! let config = Config::default();
//! config.ensure_directories().expect("Failed to create directories");
//!
//! let mut controller = Controller::new(config, builtin_registry());
//! let handle = controller.handle();
//! controller.set_callbacks(ExperimentCallbacks::new().on_play(move || {
//!     let _ = handle.start_collecting_data("p01", "session");
//! }));
//! controller.add_sensor("marker_log").expect("plugin exists");
//!
//! // Blocks until something calls close()
//! controller.run();
//! ```

pub mod activity;
pub mod config;
pub mod core;
pub mod error;
pub mod plugin;
pub mod sensor;

// Re-export key types at crate root for convenience
pub use activity::{ActivityLog, ActivityStats, SharedActivityLog};
pub use config::Config;
pub use core::{
    Controller, ControllerHandle, ExperimentCallbacks, FrontEnd, Notification, SensorInfo,
};
pub use error::{ConfigError, ControllerError, ControllerResult};
pub use plugin::{builtin_registry, FactoryCallbacks, FaultReporter, PluginRegistry, SensorFactory};
pub use sensor::{Sensor, SensorBase, SensorEvent, SensorEventKind, SensorId, Tag, TagKind};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Plugin registry and built-in sensor plugins.

pub mod builtin;
pub mod registry;

// Re-export commonly used types
pub use builtin::{builtin_registry, MarkerLogSensor, NoopSensor, MARKER_LOG_PLUGIN, NOOP_PLUGIN};
pub use registry::{FactoryCallbacks, FaultReporter, PluginRegistry, SensorFactory};

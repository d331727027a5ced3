//! Error types for the orchestrator.

use thiserror::Error;

/// Configuration persistence errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),
}

/// Errors returned by [`Controller`](crate::core::Controller) operations.
///
/// None of these are fatal to the dispatch loop. They are logged where they
/// occur and returned so callers can decide whether to care.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// The requested sensor type is not in the plugin registry.
    #[error("Plugin {0} not found")]
    PluginNotFound(String),

    /// A recording session is already running.
    #[error("Data collection is already active")]
    SessionAlreadyActive,

    /// The save subdirectory would escape the save root.
    #[error("Invalid save subdirectory: {0}")]
    InvalidSavePath(String),

    /// The dispatch loop has terminated.
    #[error("Controller is closed")]
    Closed,
}

/// Convenience alias for controller results.
pub type ControllerResult<T> = std::result::Result<T, ControllerError>;

//! Activity statistics for auditing experiment runs.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, ActivityLog, ActivityStats,
    SharedActivityLog,
};

//! Activity statistics for the orchestrator.
//!
//! Counts what the controller did during a run (sensors attached, tags sent,
//! sessions recorded) so operators can audit an experiment afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Activity counters for the current run.
#[derive(Debug)]
pub struct ActivityLog {
    /// Sensors registered after a successful factory call
    sensors_added: AtomicU64,
    /// Sensors removed explicitly or after a fault
    sensors_removed: AtomicU64,
    /// Factory failures and device faults
    sensor_errors: AtomicU64,
    /// Tags fanned out to the sensor set
    tags_broadcast: AtomicU64,
    /// Recording sessions started
    sessions_started: AtomicU64,
    /// Data packets relayed to the experiment
    data_packets: AtomicU64,
    /// Run start time
    run_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl ActivityLog {
    /// Create a new activity log.
    pub fn new() -> Self {
        Self {
            sensors_added: AtomicU64::new(0),
            sensors_removed: AtomicU64::new(0),
            sensor_errors: AtomicU64::new(0),
            tags_broadcast: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            data_packets: AtomicU64::new(0),
            run_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create an activity log that continues from the stats stored at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            warn!("Could not load previous activity stats: {e}");
        }

        log
    }

    pub fn record_sensor_added(&self) {
        self.sensors_added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sensor_removed(&self) {
        self.sensors_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sensor_error(&self) {
        self.sensor_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tag_broadcast(&self) {
        self.tags_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_data_packet(&self) {
        self.data_packets.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> ActivityStats {
        ActivityStats {
            sensors_added: self.sensors_added.load(Ordering::Relaxed),
            sensors_removed: self.sensors_removed.load(Ordering::Relaxed),
            sensor_errors: self.sensor_errors.load(Ordering::Relaxed),
            tags_broadcast: self.tags_broadcast.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            data_packets: self.data_packets.load(Ordering::Relaxed),
            run_start: self.run_start,
            run_duration_secs: (Utc::now() - self.run_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Run Statistics:\n\
             - Sensors added: {}\n\
             - Sensors removed: {}\n\
             - Sensor errors: {}\n\
             - Tags broadcast: {}\n\
             - Recording sessions: {}\n\
             - Data packets relayed: {}\n\
             - Run duration: {} seconds",
            stats.sensors_added,
            stats.sensors_removed,
            stats.sensor_errors,
            stats.tags_broadcast,
            stats.sessions_started,
            stats.data_packets,
            stats.run_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                sensors_added: stats.sensors_added,
                sensors_removed: stats.sensors_removed,
                sensor_errors: stats.sensor_errors,
                tags_broadcast: stats.tags_broadcast,
                sessions_started: stats.sessions_started,
                data_packets: stats.data_packets,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.sensors_added
                    .store(persisted.sensors_added, Ordering::Relaxed);
                self.sensors_removed
                    .store(persisted.sensors_removed, Ordering::Relaxed);
                self.sensor_errors
                    .store(persisted.sensor_errors, Ordering::Relaxed);
                self.tags_broadcast
                    .store(persisted.tags_broadcast, Ordering::Relaxed);
                self.sessions_started
                    .store(persisted.sessions_started, Ordering::Relaxed);
                self.data_packets
                    .store(persisted.data_packets, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of activity statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityStats {
    pub sensors_added: u64,
    pub sensors_removed: u64,
    pub sensor_errors: u64,
    pub tags_broadcast: u64,
    pub sessions_started: u64,
    pub data_packets: u64,
    pub run_start: DateTime<Utc>,
    pub run_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    sensors_added: u64,
    sensors_removed: u64,
    sensor_errors: u64,
    tags_broadcast: u64,
    sessions_started: u64,
    data_packets: u64,
    last_updated: DateTime<Utc>,
}

/// Activity log shared between the controller and its owner.
pub type SharedActivityLog = Arc<ActivityLog>;

pub fn create_shared_log() -> SharedActivityLog {
    Arc::new(ActivityLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedActivityLog {
    Arc::new(ActivityLog::with_persistence(path))
}

//! Recording session state: Idle ⇄ Collecting.

use crate::error::ControllerError;
use std::path::{Component, Path, PathBuf};

/// Where the active session is being written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    /// `save_root/subdir`
    pub save_path: PathBuf,
    pub filename: String,
}

/// Tracks whether data collection is active and composes save paths.
#[derive(Debug)]
pub struct RecordingSession {
    save_root: PathBuf,
    active: Option<ActiveSession>,
}

impl RecordingSession {
    pub fn new(save_root: impl Into<PathBuf>) -> Self {
        Self {
            save_root: save_root.into(),
            active: None,
        }
    }

    pub fn save_root(&self) -> &Path {
        &self.save_root
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&ActiveSession> {
        self.active.as_ref()
    }

    /// Compose `save_root/subdir`. The subdirectory must stay under the root.
    pub fn compose_path(&self, subdir: &str) -> Result<PathBuf, ControllerError> {
        let relative = Path::new(subdir);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(ControllerError::InvalidSavePath(subdir.to_string()));
        }
        Ok(self.save_root.join(relative))
    }

    /// Idle → Collecting. Rejected while a session is already active.
    pub fn begin(&mut self, subdir: &str, filename: &str) -> Result<&ActiveSession, ControllerError> {
        if self.active.is_some() {
            return Err(ControllerError::SessionAlreadyActive);
        }
        let save_path = self.compose_path(subdir)?;
        Ok(self.active.insert(ActiveSession {
            save_path,
            filename: filename.to_string(),
        }))
    }

    /// Collecting → Idle. Harmless when already idle.
    pub fn end(&mut self) -> Option<ActiveSession> {
        self.active.take()
    }
}

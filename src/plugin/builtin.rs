//! Built-in plugins so the orchestrator can run without external devices.
//!
//! - `noop` accepts every request and only logs it.
//! - `marker_log` writes each tag received while recording as a JSON line to
//!   `save_path/filename.tags.jsonl`.

use crate::plugin::registry::{FactoryCallbacks, FaultReporter, PluginRegistry};
use crate::sensor::{ControlElement, Sensor, SensorBase, SensorEvent, Tag, TagKind};
use crossbeam_channel::{bounded, Sender};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

pub const NOOP_PLUGIN: &str = "noop";
pub const MARKER_LOG_PLUGIN: &str = "marker_log";

/// Registry containing every built-in plugin.
pub fn builtin_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry
        .register(NOOP_PLUGIN, noop_factory)
        .register(MARKER_LOG_PLUGIN, marker_log_factory);
    registry
}

/// A sensor that does nothing but log.
#[derive(Debug)]
pub struct NoopSensor {
    base: SensorBase,
    tags_seen: u64,
    recording: bool,
}

impl NoopSensor {
    pub fn new() -> Self {
        Self {
            base: SensorBase::new(NOOP_PLUGIN),
            tags_seen: 0,
            recording: false,
        }
    }

    pub fn tags_seen(&self) -> u64 {
        self.tags_seen
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }
}

impl Default for NoopSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for NoopSensor {
    fn base(&self) -> &SensorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SensorBase {
        &mut self.base
    }

    fn tag(&mut self, tag: Tag) {
        self.tags_seen += 1;
        debug!(sensor_id = %self.sensor_id(), tag = %tag.id, "noop tag");
    }

    fn start_recording(&mut self, save_path: &Path, filename: &str) {
        self.recording = true;
        debug!(sensor_id = %self.sensor_id(), path = %save_path.display(), filename, "noop start");
    }

    fn stop_recording(&mut self) {
        self.recording = false;
    }
}

fn noop_factory(_root_dir: &Path, callbacks: FactoryCallbacks) {
    callbacks.success(Box::new(NoopSensor::new()));
}

/// Control element that emits a manual impulse tag.
pub const MARK_ACTION: &str = "mark";

/// Writes received tags to a JSON-lines file while recording.
pub struct MarkerLogSensor {
    base: SensorBase,
    faults: Option<FaultReporter>,
    writer: Option<MarkerWriter>,
}

struct MarkerWriter {
    path: PathBuf,
    sender: Sender<Tag>,
    handle: JoinHandle<()>,
}

impl MarkerLogSensor {
    pub fn new(faults: Option<FaultReporter>) -> Self {
        Self {
            base: SensorBase::new(MARKER_LOG_PLUGIN)
                .with_control_elements(vec![ControlElement::new(MARK_ACTION, "Insert marker")]),
            faults,
            writer: None,
        }
    }

    /// File currently being written, if recording.
    pub fn output_path(&self) -> Option<&Path> {
        self.writer.as_ref().map(|w| w.path.as_path())
    }

    fn open(save_path: &Path, filename: &str) -> std::io::Result<(PathBuf, File)> {
        std::fs::create_dir_all(save_path)?;
        let path = save_path.join(format!("{filename}.tags.jsonl"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok((path, file))
    }

    fn report(&self, message: String) {
        warn!(sensor_id = %self.sensor_id(), "{message}");
        if let Some(ref faults) = self.faults {
            faults.report(self.sensor_id(), message);
        }
    }
}

impl Sensor for MarkerLogSensor {
    fn base(&self) -> &SensorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SensorBase {
        &mut self.base
    }

    fn tag(&mut self, tag: Tag) {
        if let Some(ref writer) = self.writer {
            // Don't block if the writer is behind - drop the marker instead
            if writer.sender.try_send(tag).is_err() {
                warn!(sensor_id = %self.sensor_id(), "marker writer backlog full, tag dropped");
            }
        }
    }

    fn action(&mut self, action_id: &str) -> bool {
        if action_id != MARK_ACTION {
            return false;
        }
        self.base.emit(SensorEvent::Tag(Tag::now("manual", TagKind::Impulse)));
        true
    }

    fn on_message(&mut self, msg: &serde_json::Value) {
        if let Some(note) = msg.get("note").and_then(|v| v.as_str()) {
            self.base
                .emit(SensorEvent::LogMessage(format!("marker_log note: {note}")));
        }
    }

    fn start_recording(&mut self, save_path: &Path, filename: &str) {
        if self.writer.is_some() {
            debug!(sensor_id = %self.sensor_id(), "already recording");
            return;
        }

        let (path, file) = match Self::open(save_path, filename) {
            Ok(opened) => opened,
            Err(e) => {
                self.report(format!("Could not open marker file: {e}"));
                return;
            }
        };

        let (sender, receiver) = bounded::<Tag>(1_024);
        let faults = self.faults.clone();
        let sensor_id = self.sensor_id();
        let handle = thread::spawn(move || {
            let mut out = BufWriter::new(file);
            for tag in receiver {
                let written = serde_json::to_string(&tag)
                    .map_err(std::io::Error::other)
                    .and_then(|line| writeln!(out, "{line}"));
                if let Err(e) = written {
                    if let Some(ref faults) = faults {
                        faults.report(sensor_id, format!("Marker write failed: {e}"));
                    }
                    return;
                }
            }
            if let Err(e) = out.flush() {
                if let Some(ref faults) = faults {
                    faults.report(sensor_id, format!("Marker flush failed: {e}"));
                }
            }
        });

        info!(sensor_id = %self.sensor_id(), path = %path.display(), "marker log recording");
        self.writer = Some(MarkerWriter {
            path,
            sender,
            handle,
        });
    }

    fn stop_recording(&mut self) {
        if let Some(writer) = self.writer.take() {
            // Closing the channel ends the writer loop
            drop(writer.sender);
            let _ = writer.handle.join();
        }
    }

    fn disconnect(&mut self) {
        self.stop_recording();
        self.base.release();
    }
}

fn marker_log_factory(_root_dir: &Path, callbacks: FactoryCallbacks) {
    let faults = callbacks.fault_reporter();
    callbacks.success(Box::new(MarkerLogSensor::new(faults)));
}

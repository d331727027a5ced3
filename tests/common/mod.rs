//! Shared fixtures: a probe sensor that records every call it receives and a
//! front end that records every notification.

#![allow(dead_code)]

use sensor_orchestrator::core::{FrontEnd, Notification};
use sensor_orchestrator::plugin::{FactoryCallbacks, FaultReporter, PluginRegistry};
use sensor_orchestrator::sensor::{
    ControlElement, Query, Sensor, SensorBase, SensorEmitter, SensorId, Tag,
};
use sensor_orchestrator::{Config, Controller};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Tag(Tag),
    Action(String),
    Message(serde_json::Value),
    Start(PathBuf, String),
    Stop,
    Disconnect,
}

/// Everything the probes saw, in global call order.
#[derive(Clone, Default)]
pub struct Probes {
    pub calls: Arc<Mutex<Vec<(SensorId, Call)>>>,
    pub emitters: Arc<Mutex<Vec<SensorEmitter>>>,
    pub faults: Arc<Mutex<Vec<FaultReporter>>>,
}

impl Probes {
    pub fn calls(&self) -> Vec<(SensorId, Call)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, sensor_id: SensorId) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|(id, _)| *id == sensor_id)
            .map(|(_, call)| call)
            .collect()
    }

    pub fn tags(&self) -> Vec<(SensorId, Tag)> {
        self.calls()
            .into_iter()
            .filter_map(|(id, call)| match call {
                Call::Tag(tag) => Some((id, tag)),
                _ => None,
            })
            .collect()
    }

    /// Emitter of the n-th probe created.
    pub fn emitter(&self, n: usize) -> SensorEmitter {
        self.emitters.lock().unwrap()[n].clone()
    }

    pub fn fault_reporter(&self, n: usize) -> FaultReporter {
        self.faults.lock().unwrap()[n].clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

pub struct ProbeSensor {
    base: SensorBase,
    probes: Probes,
}

impl Sensor for ProbeSensor {
    fn base(&self) -> &SensorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SensorBase {
        &mut self.base
    }

    fn tag(&mut self, mut tag: Tag) {
        // Scribble on the copy; no other sensor may see this.
        tag.misc = Some(serde_json::json!(self.sensor_id().to_string()));
        self.record(Call::Tag(tag));
    }

    fn action(&mut self, action_id: &str) -> bool {
        self.record(Call::Action(action_id.to_string()));
        action_id == "calibrate"
    }

    fn on_message(&mut self, msg: &serde_json::Value) {
        self.record(Call::Message(msg.clone()));
    }

    fn start_recording(&mut self, save_path: &Path, filename: &str) {
        self.record(Call::Start(save_path.to_path_buf(), filename.to_string()));
    }

    fn stop_recording(&mut self) {
        self.record(Call::Stop);
    }

    fn disconnect(&mut self) {
        if self.base.release() {
            self.record(Call::Disconnect);
        }
    }
}

impl ProbeSensor {
    fn record(&self, call: Call) {
        self.probes
            .calls
            .lock()
            .unwrap()
            .push((self.sensor_id(), call));
    }
}

/// Register a probe plugin producing sensors of `sensor_type`.
pub fn register_probe(registry: &mut PluginRegistry, name: &str, sensor_type: &str, probes: &Probes) {
    let probes = probes.clone();
    let sensor_type = sensor_type.to_string();
    registry.register(name, move |_: &Path, callbacks: FactoryCallbacks| {
        let sensor = ProbeSensor {
            base: SensorBase::new(sensor_type.clone())
                .with_control_elements(vec![ControlElement::new("calibrate", "Calibrate")]),
            probes: probes.clone(),
        };
        probes.emitters.lock().unwrap().push(sensor.emitter().clone());
        if let Some(reporter) = callbacks.fault_reporter() {
            probes.faults.lock().unwrap().push(reporter);
        }
        callbacks.success(Box::new(sensor));
    });
}

/// Records notifications and queries.
#[derive(Clone, Default)]
pub struct RecordingFrontEnd {
    pub notifications: Arc<Mutex<Vec<Notification>>>,
    pub queries: Arc<Mutex<Vec<Query>>>,
}

impl RecordingFrontEnd {
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn count_changes(&self) -> usize {
        self.notifications()
            .iter()
            .filter(|n| matches!(n, Notification::SensorCountChanged(_)))
            .count()
    }
}

impl FrontEnd for RecordingFrontEnd {
    fn notify(&mut self, notification: &Notification) {
        self.notifications.lock().unwrap().push(notification.clone());
    }

    fn show_message_box(&mut self, query: &Query) {
        self.queries.lock().unwrap().push(query.clone());
    }
}

pub struct Fixture {
    pub controller: Controller,
    pub probes: Probes,
    pub front_end: RecordingFrontEnd,
    pub root: tempfile::TempDir,
}

/// A controller with two probe plugins ("eyetracker" and "eeg", both of type
/// matching their name), one broken plugin, and a recording front end.
pub fn fixture() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let probes = Probes::default();

    let mut registry = PluginRegistry::new();
    register_probe(&mut registry, "eyetracker", "eyetracker", &probes);
    register_probe(&mut registry, "eeg", "eeg", &probes);
    registry.register("broken", |_: &Path, callbacks: FactoryCallbacks| {
        callbacks.error("device not found");
    });

    let mut controller = Controller::new(Config::with_root(root.path()), registry);
    let front_end = RecordingFrontEnd::default();
    controller.attach_front_end(Box::new(front_end.clone()));

    Fixture {
        controller,
        probes,
        front_end,
        root,
    }
}

impl Fixture {
    /// Add sensors by plugin name and dispatch the factory completions.
    pub fn add(&mut self, names: &[&str]) -> Vec<SensorId> {
        for name in names {
            self.controller.add_sensor(name).unwrap();
        }
        self.controller.run_pending();
        self.controller
            .sensors()
            .into_iter()
            .map(|info| info.sensor_id)
            .collect()
    }
}

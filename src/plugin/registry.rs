//! Name → factory registry consumed by the controller.
//!
//! How the registry gets populated (directory scanning, descriptor files,
//! static linking) is up to the embedder; the controller only looks names up.

use crate::core::dispatch::{Task, TaskSender};
use crate::sensor::{Sensor, SensorId};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Produces sensor instances for one plugin type.
///
/// Implementations may finish synchronously or hand the callbacks to a worker
/// thread, but must eventually call exactly one of
/// [`FactoryCallbacks::success`] or [`FactoryCallbacks::error`].
pub trait SensorFactory: Send + Sync {
    fn get_sensor(&self, root_dir: &Path, callbacks: FactoryCallbacks);
}

impl<F> SensorFactory for F
where
    F: Fn(&Path, FactoryCallbacks) + Send + Sync,
{
    fn get_sensor(&self, root_dir: &Path, callbacks: FactoryCallbacks) {
        self(root_dir, callbacks)
    }
}

/// Completion handle passed to a factory.
///
/// Both outcomes consume the handle, so a factory cannot report twice.
/// Results are queued onto the dispatch loop rather than applied inline.
pub struct FactoryCallbacks {
    plugin: String,
    sink: Option<TaskSender>,
}

impl FactoryCallbacks {
    pub(crate) fn new(plugin: impl Into<String>, sink: TaskSender) -> Self {
        Self {
            plugin: plugin.into(),
            sink: Some(sink),
        }
    }

    /// Name of the plugin this request was made for.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Hand the constructed sensor to the controller.
    ///
    /// If the controller has already closed, the sensor is disconnected here.
    pub fn success(mut self, sensor: Box<dyn Sensor>) {
        let Some(sink) = self.sink.take() else {
            return;
        };
        let task = Task::SensorReady {
            plugin: self.plugin.clone(),
            sensor,
        };
        if let Err(Task::SensorReady { mut sensor, .. }) = sink.deliver(task) {
            debug!(plugin = %self.plugin, "controller closed before sensor was ready");
            sensor.disconnect();
        }
    }

    /// Report that the sensor could not be created.
    pub fn error(mut self, message: impl Into<String>) {
        if let Some(sink) = self.sink.take() {
            let _ = sink.send(Task::SensorFailed {
                source: None,
                message: message.into(),
            });
        }
    }

    /// A reporter the sensor can keep for failures after it has connected.
    pub fn fault_reporter(&self) -> Option<FaultReporter> {
        self.sink.clone().map(|sink| FaultReporter { sink })
    }
}

impl Drop for FactoryCallbacks {
    fn drop(&mut self) {
        if self.sink.is_some() {
            warn!(plugin = %self.plugin, "sensor factory finished without reporting success or error");
        }
    }
}

/// Lets a connected sensor report a device failure to the controller.
///
/// The controller responds by unregistering and disconnecting the sensor and
/// raising an `error` notification.
#[derive(Clone)]
pub struct FaultReporter {
    sink: TaskSender,
}

impl FaultReporter {
    pub fn report(&self, sensor_id: SensorId, message: impl Into<String>) {
        let _ = self.sink.send(Task::SensorFailed {
            source: Some(sensor_id),
            message: message.into(),
        });
    }
}

impl std::fmt::Debug for FaultReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultReporter").finish_non_exhaustive()
    }
}

/// Maps human-readable sensor type names to factories.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: BTreeMap<String, Arc<dyn SensorFactory>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: SensorFactory + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SensorFactory>> {
        self.factories.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered plugin names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatch::TaskQueue;
    use crate::plugin::builtin::NoopSensor;
    use crate::sensor::SensorEventKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_register_and_lookup() {
        let mut registry = PluginRegistry::new();
        registry
            .register("zeta", |_: &Path, cb: FactoryCallbacks| cb.error("nope"))
            .register("alpha", |_: &Path, cb: FactoryCallbacks| cb.error("nope"));

        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
        assert!(registry.contains("alpha"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_error_is_queued() {
        let queue = TaskQueue::new();
        let callbacks = FactoryCallbacks::new("eyetracker", queue.sender());
        callbacks.error("device not found");

        match queue.try_recv() {
            Some(Task::SensorFailed { source, message }) => {
                assert!(source.is_none());
                assert_eq!(message, "device not found");
            }
            other => panic!("unexpected task {other:?}"),
        }
    }

    fn watch_cleared(sensor: &dyn Sensor) -> Arc<AtomicUsize> {
        let cleared = Arc::new(AtomicUsize::new(0));
        let c = cleared.clone();
        sensor.emitter().on(
            SensorEventKind::Cleared,
            Arc::new(move |_, _| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        cleared
    }

    #[test]
    fn test_success_after_close_disconnects_sensor() {
        let queue = TaskQueue::new();
        let callbacks = FactoryCallbacks::new("noop", queue.sender());
        queue.close();

        let sensor = NoopSensor::new();
        let cleared = watch_cleared(&sensor);
        callbacks.success(Box::new(sensor));

        assert_eq!(cleared.load(Ordering::SeqCst), 1);
        assert!(matches!(queue.try_recv(), Some(Task::Wake)));
        assert!(queue.try_recv().is_none());
    }

    #[test]
    fn test_success_after_controller_dropped_disconnects_sensor() {
        let queue = TaskQueue::new();
        let callbacks = FactoryCallbacks::new("noop", queue.sender());
        drop(queue);

        let sensor = NoopSensor::new();
        let cleared = watch_cleared(&sensor);
        callbacks.success(Box::new(sensor));

        assert_eq!(cleared.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fault_reporter_carries_sensor_id() {
        let queue = TaskQueue::new();
        let callbacks = FactoryCallbacks::new("eeg", queue.sender());
        let reporter = callbacks.fault_reporter().unwrap();
        callbacks.error("ignored");
        let _ = queue.try_recv();

        let id = SensorId::new();
        reporter.report(id, "cable unplugged");
        assert!(matches!(
            queue.try_recv(),
            Some(Task::SensorFailed { source: Some(s), .. }) if s == id
        ));
    }
}

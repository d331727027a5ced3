//! Subscription table between registered sensors and the dispatch loop.

use crate::core::dispatch::{Task, TaskSender};
use crate::sensor::{ListenerId, SensorEmitter, SensorEventKind, SensorId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Records exactly which listeners the controller installed on each sensor.
///
/// `subscribe` and `unsubscribe` are a strict pair: unsubscribing removes the
/// listener ids recorded at subscribe time and nothing else, so handlers never
/// leak and never fire twice.
pub(crate) struct EventBus {
    table: HashMap<SensorId, Vec<(SensorEventKind, ListenerId)>>,
    sink: TaskSender,
}

impl EventBus {
    pub(crate) fn new(sink: TaskSender) -> Self {
        Self {
            table: HashMap::new(),
            sink,
        }
    }

    /// Route the controller-handled kinds of `emitter` into the task queue.
    ///
    /// Returns `false` if the sensor is already subscribed.
    pub(crate) fn subscribe(&mut self, emitter: &SensorEmitter) -> bool {
        let sensor_id = emitter.sensor_id();
        if self.table.contains_key(&sensor_id) {
            return false;
        }

        let installed = SensorEventKind::CONTROLLER_KINDS
            .iter()
            .map(|&kind| {
                let sink = self.sink.clone();
                let id = emitter.on(
                    kind,
                    Arc::new(move |source, event| {
                        let task = Task::SensorEvent {
                            source,
                            event: event.clone(),
                        };
                        if sink.send(task).is_err() {
                            debug!(sensor_id = %source, kind = kind.as_str(), "dropping event, controller closed");
                        }
                    }),
                );
                (kind, id)
            })
            .collect();

        self.table.insert(sensor_id, installed);
        true
    }

    /// Remove the listeners installed by [`subscribe`](Self::subscribe).
    ///
    /// Returns `false` if the sensor was not subscribed.
    pub(crate) fn unsubscribe(&mut self, emitter: &SensorEmitter) -> bool {
        match self.table.remove(&emitter.sensor_id()) {
            Some(installed) => {
                for (kind, id) in installed {
                    emitter.remove_listener(kind, id);
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_subscribed(&self, sensor_id: &SensorId) -> bool {
        self.table.contains_key(sensor_id)
    }
}

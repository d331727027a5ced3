//! Outbound sensor events and the per-sensor listener table.

use crate::sensor::types::{Query, SensorId, Tag};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Event names a sensor can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorEventKind {
    Tag,
    Data,
    CloseController,
    StartCollectingData,
    StopCollectingData,
    LogMessage,
    Query,
    /// Final notification emitted by `disconnect`
    Cleared,
}

impl SensorEventKind {
    /// The kinds the controller subscribes for every registered sensor.
    pub const CONTROLLER_KINDS: [SensorEventKind; 7] = [
        SensorEventKind::Tag,
        SensorEventKind::Data,
        SensorEventKind::CloseController,
        SensorEventKind::StartCollectingData,
        SensorEventKind::StopCollectingData,
        SensorEventKind::LogMessage,
        SensorEventKind::Query,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorEventKind::Tag => "tag",
            SensorEventKind::Data => "data",
            SensorEventKind::CloseController => "close_controller",
            SensorEventKind::StartCollectingData => "start_collecting_data",
            SensorEventKind::StopCollectingData => "stop_collecting_data",
            SensorEventKind::LogMessage => "log_message",
            SensorEventKind::Query => "query",
            SensorEventKind::Cleared => "cleared",
        }
    }
}

/// An event emitted by a sensor.
#[derive(Debug, Clone)]
pub enum SensorEvent {
    /// Ask the controller to broadcast a tag to every sensor
    Tag(Tag),
    /// A data packet for the experiment's data callback
    Data(serde_json::Value),
    /// Ask the controller to shut down
    CloseController,
    StartCollectingData { subdir: String, filename: String },
    StopCollectingData,
    LogMessage(String),
    /// A question for the operator
    Query(Query),
    Cleared,
}

impl SensorEvent {
    pub fn kind(&self) -> SensorEventKind {
        match self {
            SensorEvent::Tag(_) => SensorEventKind::Tag,
            SensorEvent::Data(_) => SensorEventKind::Data,
            SensorEvent::CloseController => SensorEventKind::CloseController,
            SensorEvent::StartCollectingData { .. } => SensorEventKind::StartCollectingData,
            SensorEvent::StopCollectingData => SensorEventKind::StopCollectingData,
            SensorEvent::LogMessage(_) => SensorEventKind::LogMessage,
            SensorEvent::Query(_) => SensorEventKind::Query,
            SensorEvent::Cleared => SensorEventKind::Cleared,
        }
    }
}

/// Handle identifying one installed listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A listener receives the emitting sensor's id and the event.
pub type Listener = Arc<dyn Fn(SensorId, &SensorEvent) + Send + Sync>;

type ListenerTable = HashMap<SensorEventKind, Vec<(ListenerId, Listener)>>;

/// Listener table owned by a single sensor.
///
/// Cheap to clone; clones share the same table so a device thread can emit
/// while the controller subscribes or unsubscribes. Delivery within one
/// emitter is in emit order.
#[derive(Clone)]
pub struct SensorEmitter {
    sensor_id: SensorId,
    listeners: Arc<Mutex<ListenerTable>>,
}

impl SensorEmitter {
    pub fn new(sensor_id: SensorId) -> Self {
        Self {
            sensor_id,
            listeners: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn sensor_id(&self) -> SensorId {
        self.sensor_id
    }

    /// Install a listener for `kind`.
    pub fn on(&self, kind: SensorEventKind, listener: Listener) -> ListenerId {
        let id = ListenerId::next();
        self.table().entry(kind).or_default().push((id, listener));
        id
    }

    /// Remove exactly the listener installed under `id`.
    pub fn remove_listener(&self, kind: SensorEventKind, id: ListenerId) -> bool {
        let mut table = self.table();
        let Some(list) = table.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            table.remove(&kind);
        }
        removed
    }

    pub fn remove_all_listeners(&self) {
        self.table().clear();
    }

    /// Number of listeners currently installed for `kind`.
    pub fn listener_count(&self, kind: SensorEventKind) -> usize {
        self.table().get(&kind).map(Vec::len).unwrap_or(0)
    }

    /// Deliver `event` to every listener of its kind. Returns the number reached.
    pub fn emit(&self, event: SensorEvent) -> usize {
        // Snapshot so listeners may touch the table without deadlocking.
        let targets: Vec<Listener> = self
            .table()
            .get(&event.kind())
            .map(|list| list.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();

        for listener in &targets {
            listener(self.sensor_id, &event);
        }
        targets.len()
    }

    fn table(&self) -> MutexGuard<'_, ListenerTable> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for SensorEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorEmitter")
            .field("sensor_id", &self.sensor_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Listener) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        (
            hits,
            Arc::new(move |_, _| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_emit_reaches_only_matching_kind() {
        let emitter = SensorEmitter::new(SensorId::new());
        let (hits, listener) = counter();
        emitter.on(SensorEventKind::LogMessage, listener);

        assert_eq!(emitter.emit(SensorEvent::LogMessage("hi".into())), 1);
        assert_eq!(emitter.emit(SensorEvent::StopCollectingData), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_listener_is_exact() {
        let emitter = SensorEmitter::new(SensorId::new());
        let (first_hits, first) = counter();
        let (second_hits, second) = counter();
        let first_id = emitter.on(SensorEventKind::Data, first);
        emitter.on(SensorEventKind::Data, second);

        assert!(emitter.remove_listener(SensorEventKind::Data, first_id));
        assert!(!emitter.remove_listener(SensorEventKind::Data, first_id));

        emitter.emit(SensorEvent::Data(serde_json::json!(1)));
        assert_eq!(first_hits.load(Ordering::SeqCst), 0);
        assert_eq!(second_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_receives_source_id() {
        let id = SensorId::new();
        let emitter = SensorEmitter::new(id);
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        emitter.on(
            SensorEventKind::Cleared,
            Arc::new(move |source, _| {
                *s.lock().unwrap() = Some(source);
            }),
        );

        emitter.emit(SensorEvent::Cleared);
        assert_eq!(*seen.lock().unwrap(), Some(id));
    }

    #[test]
    fn test_controller_kinds_exclude_cleared() {
        assert_eq!(SensorEventKind::CONTROLLER_KINDS.len(), 7);
        assert!(!SensorEventKind::CONTROLLER_KINDS.contains(&SensorEventKind::Cleared));
    }
}

//! Single-consumer task queue drained by the controller's dispatch loop.
//!
//! Anything that must not run inline on the caller's stack (sensor events,
//! factory completions, experiment callbacks, cross-thread requests) is
//! posted here and executed in FIFO order by whichever thread runs the loop.

use crate::core::controller::Controller;
use crate::error::ControllerError;
use crate::sensor::{Sensor, SensorEvent, SensorId};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Work item for the dispatch loop.
pub(crate) enum Task {
    /// An event a subscribed sensor emitted
    SensorEvent { source: SensorId, event: SensorEvent },
    /// A plugin factory produced a sensor
    SensorReady { plugin: String, sensor: Box<dyn Sensor> },
    /// A factory failed, or a registered sensor reported a fault
    SensorFailed {
        source: Option<SensorId>,
        message: String,
    },
    /// Invoke the experiment's play callback
    Play,
    /// Invoke the experiment's data callback
    Data(serde_json::Value),
    /// Run a completion callback
    Deferred(Box<dyn FnOnce() + Send>),
    /// Run an operation against the controller
    Invoke(Box<dyn FnOnce(&mut Controller) + Send>),
    /// Wake the loop so it notices it has been closed
    Wake,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Task::SensorEvent { source, event } => {
                write!(f, "SensorEvent({source}, {})", event.kind().as_str())
            }
            Task::SensorReady { plugin, .. } => write!(f, "SensorReady({plugin})"),
            Task::SensorFailed { source, message } => {
                write!(f, "SensorFailed({source:?}, {message})")
            }
            Task::Play => write!(f, "Play"),
            Task::Data(_) => write!(f, "Data"),
            Task::Deferred(_) => write!(f, "Deferred"),
            Task::Invoke(_) => write!(f, "Invoke"),
            Task::Wake => write!(f, "Wake"),
        }
    }
}

/// Producer side of the queue. Cheap to clone and safe to move across threads.
#[derive(Clone)]
pub(crate) struct TaskSender {
    tx: Sender<Task>,
    closed: Arc<AtomicBool>,
}

impl TaskSender {
    /// Queue a task. Fails once the loop has been closed.
    pub(crate) fn send(&self, task: Task) -> Result<(), ControllerError> {
        self.deliver(task).map_err(|_| ControllerError::Closed)
    }

    /// Queue a task, handing it back if the loop is closed or gone.
    pub(crate) fn deliver(&self, task: Task) -> Result<(), Task> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(task);
        }
        self.tx.send(task).map_err(|e| e.into_inner())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// The queue itself, owned by the controller.
pub(crate) struct TaskQueue {
    sender: TaskSender,
    rx: Receiver<Task>,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            sender: TaskSender {
                tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            rx,
        }
    }

    pub(crate) fn sender(&self) -> TaskSender {
        self.sender.clone()
    }

    /// Mark the queue closed and wake a blocked consumer.
    pub(crate) fn close(&self) {
        self.sender.closed.store(true, Ordering::SeqCst);
        let _ = self.sender.tx.send(Task::Wake);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Block until a task is available.
    pub(crate) fn recv(&self) -> Option<Task> {
        self.rx.recv().ok()
    }

    /// Take a task if one is ready.
    pub(crate) fn try_recv(&self) -> Option<Task> {
        match self.rx.try_recv() {
            Ok(task) => Some(task),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }
}

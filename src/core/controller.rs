//! The orchestration mediator.
//!
//! The [`Controller`] owns the registered sensors and is the only thing that
//! mutates them. It runs on a single dispatch thread: sensor events, factory
//! completions and experiment callbacks are queued and executed in FIFO order
//! by [`Controller::run`] (or [`Controller::run_pending`]), never inline from
//! the stack that produced them. Other threads talk to it through a
//! [`ControllerHandle`].

use crate::activity::{create_shared_log, SharedActivityLog};
use crate::config::Config;
use crate::core::bus::EventBus;
use crate::core::dispatch::{Task, TaskQueue, TaskSender};
use crate::core::frontend::{FrontEnd, Notification};
use crate::core::session::RecordingSession;
use crate::core::tags::{KeyContingency, TagBroadcaster};
use crate::error::{ControllerError, ControllerResult};
use crate::plugin::{FactoryCallbacks, PluginRegistry};
use crate::sensor::{ControlElement, Sensor, SensorEvent, SensorId, Tag, TagKind};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Callback run once after all sensors have stopped recording.
pub type Completion = Box<dyn FnOnce() + Send>;

/// Hooks supplied by the experiment. The controller does not interpret them.
#[derive(Default)]
pub struct ExperimentCallbacks {
    pub play: Option<Box<dyn FnMut() + Send>>,
    pub stop: Option<Box<dyn FnMut() + Send>>,
    pub continue_experiment: Option<Box<dyn FnMut() + Send>>,
    pub data: Option<Box<dyn FnMut(serde_json::Value) + Send>>,
}

impl ExperimentCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_play(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.play = Some(Box::new(f));
        self
    }

    pub fn on_stop(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.stop = Some(Box::new(f));
        self
    }

    pub fn on_continue(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.continue_experiment = Some(Box::new(f));
        self
    }

    pub fn on_data(mut self, f: impl FnMut(serde_json::Value) + Send + 'static) -> Self {
        self.data = Some(Box::new(f));
        self
    }
}

/// Read-only view of a registered sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorInfo {
    pub sensor_id: SensorId,
    pub sensor_type: String,
    pub control_elements: Vec<ControlElement>,
}

/// Coordinates the active sensor set.
pub struct Controller {
    config: Config,
    registry: PluginRegistry,
    /// Registration order is start/stop order
    sensors: Vec<Box<dyn Sensor>>,
    bus: EventBus,
    queue: TaskQueue,
    session: RecordingSession,
    tags: TagBroadcaster,
    contingency: KeyContingency,
    callbacks: ExperimentCallbacks,
    front_ends: Vec<Box<dyn FrontEnd>>,
    participant_id: String,
    activity: SharedActivityLog,
    closed: bool,
}

impl Controller {
    pub fn new(config: Config, registry: PluginRegistry) -> Self {
        let queue = TaskQueue::new();
        Self {
            bus: EventBus::new(queue.sender()),
            session: RecordingSession::new(config.save_root.clone()),
            participant_id: config.participant_id.clone(),
            config,
            registry,
            sensors: Vec::new(),
            queue,
            tags: TagBroadcaster::new(),
            contingency: KeyContingency::new(),
            callbacks: ExperimentCallbacks::default(),
            front_ends: Vec::new(),
            activity: create_shared_log(),
            closed: false,
        }
    }

    /// Record activity into `log` instead of a private one.
    pub fn with_activity_log(mut self, log: SharedActivityLog) -> Self {
        self.activity = log;
        self
    }

    /// A cloneable handle for queueing operations from other threads.
    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            sink: self.queue.sender(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn activity(&self) -> &SharedActivityLog {
        &self.activity
    }

    // ------------------------------------------------------------------
    // Sensor set
    // ------------------------------------------------------------------

    /// Ask the plugin registered as `type_name` for a new sensor.
    ///
    /// The sensor is registered once the factory reports success and the
    /// completion has been dispatched.
    pub fn add_sensor(&mut self, type_name: &str) -> ControllerResult<()> {
        if self.closed {
            return Err(ControllerError::Closed);
        }
        let Some(factory) = self.registry.get(type_name) else {
            warn!(plugin = type_name, "Plugin {type_name} not found");
            return Err(ControllerError::PluginNotFound(type_name.to_string()));
        };

        debug!(plugin = type_name, "requesting sensor");
        let callbacks = FactoryCallbacks::new(type_name, self.queue.sender());
        factory.get_sensor(&self.config.root_dir, callbacks);
        Ok(())
    }

    /// Disconnect and unregister a sensor. Does not stop its recording first.
    ///
    /// Returns `false` (and raises nothing) if `sensor_id` is unknown.
    pub fn remove_sensor(&mut self, sensor_id: SensorId) -> bool {
        if !self.unregister(sensor_id) {
            return false;
        }
        info!(sensor_id = %sensor_id, "sensor removed");
        self.notify(Notification::SensorCountChanged(self.sensors.len()));
        true
    }

    /// Deliver `msg` to every sensor whose type is `type_name`.
    pub fn message_to_sensor(&mut self, type_name: &str, msg: &serde_json::Value) -> usize {
        let mut recipients = 0;
        for sensor in self
            .sensors
            .iter_mut()
            .filter(|s| s.sensor_type() == type_name)
        {
            sensor.on_message(msg);
            recipients += 1;
        }
        debug!(sensor_type = type_name, recipients, "message routed");
        recipients
    }

    /// Run a control-element action on one sensor.
    ///
    /// `None` if the sensor is unknown, otherwise whether it handled the action.
    pub fn sensor_action(&mut self, sensor_id: SensorId, action_id: &str) -> Option<bool> {
        self.sensors
            .iter_mut()
            .find(|s| s.sensor_id() == sensor_id)
            .map(|sensor| sensor.action(action_id))
    }

    pub fn sensors(&self) -> Vec<SensorInfo> {
        self.sensors
            .iter()
            .map(|s| SensorInfo {
                sensor_id: s.sensor_id(),
                sensor_type: s.sensor_type().to_string(),
                control_elements: s.control_elements().to_vec(),
            })
            .collect()
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_registered(&self, sensor_id: SensorId) -> bool {
        self.bus.is_subscribed(&sensor_id)
    }

    /// Names of every plugin the registry knows, sorted.
    pub fn available_plugins(&self) -> Vec<String> {
        self.registry.names()
    }

    // ------------------------------------------------------------------
    // Recording session
    // ------------------------------------------------------------------

    /// Start recording on every sensor under `save_root/subdir`.
    ///
    /// Rejected while a session is already active.
    pub fn start_collecting_data(&mut self, subdir: &str, filename: &str) -> ControllerResult<PathBuf> {
        let save_path = match self.session.begin(subdir, filename) {
            Ok(active) => active.save_path.clone(),
            Err(e) => {
                warn!(subdir, filename, "Not starting data collection: {e}");
                return Err(e);
            }
        };

        for sensor in self.sensors.iter_mut() {
            sensor.start_recording(&save_path, filename);
        }
        self.activity.record_session_started();
        info!(path = %save_path.display(), filename, sensors = self.sensors.len(), "data collection started");
        Ok(save_path)
    }

    /// Stop recording on every sensor, then queue `completion`.
    pub fn stop_collecting_data(&mut self, completion: Option<Completion>) {
        for sensor in self.sensors.iter_mut() {
            sensor.stop_recording();
        }
        if self.session.end().is_some() {
            info!(sensors = self.sensors.len(), "data collection stopped");
        }
        if let Some(completion) = completion {
            self.defer(Task::Deferred(completion));
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.session.is_active()
    }

    // ------------------------------------------------------------------
    // Tags and keypresses
    // ------------------------------------------------------------------

    /// Send a copy of `tag` to every registered sensor.
    pub fn tag(&mut self, tag: &Tag) -> usize {
        let recipients = self.tags.broadcast(tag, self.sensors.iter_mut());
        self.activity.record_tag_broadcast();
        recipients
    }

    /// Arm the keys that continue the experiment on the next press.
    pub fn arm_keypress<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contingency.arm(keys);
    }

    pub fn is_keypress_armed(&self) -> bool {
        self.contingency.is_armed()
    }

    /// Handle a keypress. An armed key disarms the list, raises `continue` and
    /// broadcasts a keypress tag.
    pub fn on_keypress(&mut self, key: &str) -> bool {
        if !self.contingency.trigger(key) {
            return false;
        }
        let tag = self.tags.stamp(key, TagKind::Keypress);
        self.notify(Notification::Continue);
        self.tag(&tag);
        true
    }

    // ------------------------------------------------------------------
    // Experiment relay
    // ------------------------------------------------------------------

    pub fn set_callbacks(&mut self, callbacks: ExperimentCallbacks) {
        self.callbacks = callbacks;
    }

    /// Queue the play callback, if one is set.
    pub fn play(&mut self) {
        if self.callbacks.play.is_some() {
            self.defer(Task::Play);
        }
    }

    pub fn stop(&mut self) {
        if let Some(ref mut stop) = self.callbacks.stop {
            stop();
        }
    }

    pub fn continue_experiment(&mut self) {
        if let Some(ref mut cont) = self.callbacks.continue_experiment {
            cont();
        }
    }

    pub fn set_participant_id(&mut self, participant_id: impl Into<String>) {
        self.participant_id = participant_id.into();
        self.notify(Notification::ParticipantIdUpdated(self.participant_id.clone()));
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    // ------------------------------------------------------------------
    // Front ends
    // ------------------------------------------------------------------

    pub fn attach_front_end(&mut self, front_end: Box<dyn FrontEnd>) {
        self.front_ends.push(front_end);
    }

    pub fn has_front_end(&self) -> bool {
        !self.front_ends.is_empty()
    }

    /// Drop every front end. With no one left to drive it, the controller closes.
    pub fn close_front_ends(&mut self) {
        self.front_ends.clear();
        self.close();
    }

    fn notify(&mut self, notification: Notification) {
        for front_end in self.front_ends.iter_mut() {
            front_end.notify(&notification);
        }
    }

    // ------------------------------------------------------------------
    // Dispatch loop
    // ------------------------------------------------------------------

    /// Run the dispatch loop until [`close`](Self::close).
    ///
    /// Without a front end, an experiment with a play callback starts itself.
    pub fn run(&mut self) {
        if self.closed {
            return;
        }
        if !self.has_front_end() && self.callbacks.play.is_some() {
            self.play();
        }

        info!("dispatch loop started");
        while !self.closed {
            match self.queue.recv() {
                Some(task) => self.dispatch(task),
                None => break,
            }
        }
        info!("dispatch loop stopped");
    }

    /// Execute every task queued so far without blocking.
    ///
    /// Tasks queued while draining are executed too. Returns the number run.
    pub fn run_pending(&mut self) -> usize {
        let mut executed = 0;
        while !self.closed {
            match self.queue.try_recv() {
                Some(task) => {
                    self.dispatch(task);
                    executed += 1;
                }
                None => break,
            }
        }
        executed
    }

    /// Number of tasks waiting on the loop.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Stop and disconnect every sensor, drop front ends and end the loop.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        for mut sensor in std::mem::take(&mut self.sensors) {
            self.bus.unsubscribe(sensor.emitter());
            sensor.stop_recording();
            sensor.disconnect();
        }
        self.session.end();
        self.front_ends.clear();
        self.closed = true;
        self.queue.close();
        self.discard_pending();

        if let Err(e) = self.activity.save() {
            warn!("Could not save activity stats: {e}");
        }
        info!("controller closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed || self.queue.is_closed()
    }

    /// Drop queued work after close. Sensors still waiting to be registered
    /// are disconnected so they release their resources.
    fn discard_pending(&mut self) {
        while let Some(task) = self.queue.try_recv() {
            if let Task::SensorReady { plugin, mut sensor } = task {
                debug!(sensor_id = %sensor.sensor_id(), plugin = %plugin, "disconnecting sensor that arrived after close");
                sensor.disconnect();
            }
        }
    }

    fn defer(&self, task: Task) {
        if let Err(e) = self.queue.sender().send(task) {
            debug!("task dropped: {e}");
        }
    }

    fn dispatch(&mut self, task: Task) {
        match task {
            Task::SensorEvent { source, event } => self.on_sensor_event(source, event),
            Task::SensorReady { plugin, sensor } => self.on_sensor_created(&plugin, sensor),
            Task::SensorFailed { source, message } => self.on_sensor_error(source, message),
            Task::Play => {
                if let Some(ref mut play) = self.callbacks.play {
                    play();
                }
            }
            Task::Data(packet) => {
                if let Some(ref mut data) = self.callbacks.data {
                    data(packet);
                }
            }
            Task::Deferred(completion) => completion(),
            Task::Invoke(operation) => operation(self),
            Task::Wake => {}
        }
    }

    fn on_sensor_created(&mut self, plugin: &str, mut sensor: Box<dyn Sensor>) {
        if self.closed {
            sensor.disconnect();
            return;
        }
        let sensor_id = sensor.sensor_id();
        if !self.bus.subscribe(sensor.emitter()) {
            warn!(sensor_id = %sensor_id, "sensor already registered");
            sensor.disconnect();
            return;
        }
        self.sensors.push(sensor);
        self.activity.record_sensor_added();
        info!(sensor_id = %sensor_id, plugin, "sensor added");
        self.notify(Notification::SensorCountChanged(self.sensors.len()));
    }

    fn on_sensor_error(&mut self, source: Option<SensorId>, message: String) {
        error!(sensor_id = ?source.map(|s| s.to_string()), "Sensor error: {message}");
        self.activity.record_sensor_error();
        if let Some(sensor_id) = source {
            if self.unregister(sensor_id) {
                self.notify(Notification::SensorCountChanged(self.sensors.len()));
            }
        }
        self.notify(Notification::Error(message));
    }

    fn on_sensor_event(&mut self, source: SensorId, event: SensorEvent) {
        match event {
            SensorEvent::Tag(tag) => {
                self.tag(&tag);
            }
            SensorEvent::Data(packet) => {
                if self.callbacks.data.is_some() {
                    self.activity.record_data_packet();
                    self.defer(Task::Data(packet));
                }
            }
            SensorEvent::CloseController => {
                self.defer(Task::Invoke(Box::new(|controller| controller.close())));
            }
            SensorEvent::StartCollectingData { subdir, filename } => {
                let _ = self.start_collecting_data(&subdir, &filename);
            }
            SensorEvent::StopCollectingData => self.stop_collecting_data(None),
            SensorEvent::LogMessage(message) => {
                self.notify(Notification::LogUpdate(message));
            }
            SensorEvent::Query(query) => {
                for front_end in self.front_ends.iter_mut() {
                    front_end.show_message_box(&query);
                }
            }
            SensorEvent::Cleared => {
                debug!(sensor_id = %source, "ignoring cleared event");
            }
        }
    }

    /// Unsubscribe, disconnect and drop a sensor. Registration and
    /// subscription always change together.
    fn unregister(&mut self, sensor_id: SensorId) -> bool {
        let Some(index) = self.sensors.iter().position(|s| s.sensor_id() == sensor_id) else {
            return false;
        };
        let mut sensor = self.sensors.remove(index);
        self.bus.unsubscribe(sensor.emitter());
        sensor.disconnect();
        self.activity.record_sensor_removed();
        true
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.close();
        // Factories on other threads may have succeeded since close.
        self.discard_pending();
    }
}

/// Queues controller operations from any thread.
///
/// Every method posts a task; nothing runs until the dispatch loop picks it
/// up. Once the controller is closed every call fails with
/// [`ControllerError::Closed`].
#[derive(Clone)]
pub struct ControllerHandle {
    sink: TaskSender,
}

impl ControllerHandle {
    /// Queue an arbitrary operation.
    pub fn invoke<F>(&self, operation: F) -> ControllerResult<()>
    where
        F: FnOnce(&mut Controller) + Send + 'static,
    {
        self.sink.send(Task::Invoke(Box::new(operation)))
    }

    pub fn add_sensor(&self, type_name: impl Into<String>) -> ControllerResult<()> {
        let type_name = type_name.into();
        self.invoke(move |c| {
            let _ = c.add_sensor(&type_name);
        })
    }

    pub fn remove_sensor(&self, sensor_id: SensorId) -> ControllerResult<()> {
        self.invoke(move |c| {
            c.remove_sensor(sensor_id);
        })
    }

    pub fn sensor_action(&self, sensor_id: SensorId, action_id: impl Into<String>) -> ControllerResult<()> {
        let action_id = action_id.into();
        self.invoke(move |c| {
            c.sensor_action(sensor_id, &action_id);
        })
    }

    pub fn message_to_sensor(
        &self,
        type_name: impl Into<String>,
        msg: serde_json::Value,
    ) -> ControllerResult<()> {
        let type_name = type_name.into();
        self.invoke(move |c| {
            c.message_to_sensor(&type_name, &msg);
        })
    }

    pub fn start_collecting_data(
        &self,
        subdir: impl Into<String>,
        filename: impl Into<String>,
    ) -> ControllerResult<()> {
        let (subdir, filename) = (subdir.into(), filename.into());
        self.invoke(move |c| {
            let _ = c.start_collecting_data(&subdir, &filename);
        })
    }

    pub fn stop_collecting_data(&self, completion: Option<Completion>) -> ControllerResult<()> {
        self.invoke(move |c| c.stop_collecting_data(completion))
    }

    /// Queue an already stamped tag for broadcast.
    pub fn tag(&self, tag: Tag) -> ControllerResult<()> {
        self.invoke(move |c| {
            c.tag(&tag);
        })
    }

    /// Stamp a tag now, on the calling thread, and queue it for broadcast.
    pub fn mark(&self, id: impl Into<String>, kind: TagKind) -> ControllerResult<()> {
        self.tag(Tag::now(id, kind))
    }

    pub fn keypress(&self, key: impl Into<String>) -> ControllerResult<()> {
        let key = key.into();
        self.invoke(move |c| {
            c.on_keypress(&key);
        })
    }

    pub fn arm_keypress(&self, keys: Vec<String>) -> ControllerResult<()> {
        self.invoke(move |c| c.arm_keypress(keys))
    }

    pub fn play(&self) -> ControllerResult<()> {
        self.invoke(|c| c.play())
    }

    pub fn stop(&self) -> ControllerResult<()> {
        self.invoke(|c| c.stop())
    }

    pub fn continue_experiment(&self) -> ControllerResult<()> {
        self.invoke(|c| c.continue_experiment())
    }

    pub fn set_participant_id(&self, participant_id: impl Into<String>) -> ControllerResult<()> {
        let participant_id = participant_id.into();
        self.invoke(move |c| c.set_participant_id(participant_id))
    }

    pub fn close(&self) -> ControllerResult<()> {
        self.invoke(|c| c.close())
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }
}

impl std::fmt::Debug for ControllerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::builtin_registry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn controller() -> Controller {
        Controller::new(Config::with_root("/tmp/unused-root"), builtin_registry())
    }

    #[test]
    fn test_headless_run_self_starts_and_closes() {
        let mut controller = controller();
        let handle = controller.handle();
        let plays = Arc::new(AtomicUsize::new(0));
        let p = plays.clone();
        controller.set_callbacks(ExperimentCallbacks::new().on_play(move || {
            p.fetch_add(1, Ordering::SeqCst);
            let _ = handle.close();
        }));

        controller.run();

        assert_eq!(plays.load(Ordering::SeqCst), 1);
        assert!(controller.is_closed());
    }

    #[test]
    fn test_handle_drives_loop_from_another_thread() {
        let mut controller = controller();
        let handle = controller.handle();

        let worker = thread::spawn(move || {
            handle.add_sensor("noop").unwrap();
            handle.set_participant_id("P01").unwrap();
            handle.close().unwrap();
        });

        controller.run();
        worker.join().unwrap();

        assert_eq!(controller.participant_id(), "P01");
        assert_eq!(controller.sensor_count(), 0);
        assert!(controller.handle().add_sensor("noop").is_err());
    }

    #[test]
    fn test_play_is_deferred() {
        let mut controller = controller();
        let plays = Arc::new(AtomicUsize::new(0));
        let p = plays.clone();
        controller.set_callbacks(ExperimentCallbacks::new().on_play(move || {
            p.fetch_add(1, Ordering::SeqCst);
        }));

        controller.play();
        assert_eq!(plays.load(Ordering::SeqCst), 0);
        assert_eq!(controller.run_pending(), 1);
        assert_eq!(plays.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_and_continue_are_inline() {
        let mut controller = controller();
        let calls = Arc::new(AtomicUsize::new(0));
        let (s, c) = (calls.clone(), calls.clone());
        controller.set_callbacks(
            ExperimentCallbacks::new()
                .on_stop(move || {
                    s.fetch_add(1, Ordering::SeqCst);
                })
                .on_continue(move || {
                    c.fetch_add(10, Ordering::SeqCst);
                }),
        );

        controller.stop();
        controller.continue_experiment();
        assert_eq!(calls.load(Ordering::SeqCst), 11);
        assert_eq!(controller.pending(), 0);
    }
}

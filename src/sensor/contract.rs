//! The capability contract every sensor plugin satisfies.

use crate::sensor::events::{SensorEmitter, SensorEvent};
use crate::sensor::types::{ControlElement, DataCondition, SensorId, Tag};
use std::path::Path;

/// State shared by every sensor implementation.
///
/// Device implementations embed one of these and expose it through
/// [`Sensor::base`]; the default trait methods do the rest.
#[derive(Debug)]
pub struct SensorBase {
    sensor_id: SensorId,
    sensor_type: String,
    control_elements: Vec<ControlElement>,
    data_conditions: Vec<DataCondition>,
    emitter: SensorEmitter,
    disconnected: bool,
}

impl SensorBase {
    /// Create the base state with a freshly generated id.
    pub fn new(sensor_type: impl Into<String>) -> Self {
        let sensor_id = SensorId::new();
        Self {
            sensor_id,
            sensor_type: sensor_type.into(),
            control_elements: Vec::new(),
            data_conditions: Vec::new(),
            emitter: SensorEmitter::new(sensor_id),
            disconnected: false,
        }
    }

    pub fn with_control_elements(mut self, elements: Vec<ControlElement>) -> Self {
        self.control_elements = elements;
        self
    }

    pub fn sensor_id(&self) -> SensorId {
        self.sensor_id
    }

    pub fn sensor_type(&self) -> &str {
        &self.sensor_type
    }

    pub fn control_elements(&self) -> &[ControlElement] {
        &self.control_elements
    }

    pub fn data_conditions(&self) -> &[DataCondition] {
        &self.data_conditions
    }

    pub fn emitter(&self) -> &SensorEmitter {
        &self.emitter
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// Emit an event unless the sensor has been disconnected.
    pub fn emit(&self, event: SensorEvent) -> usize {
        if self.disconnected {
            return 0;
        }
        self.emitter.emit(event)
    }

    /// Emit the final `cleared` notification and drop every listener.
    ///
    /// Returns `false` if the sensor was already released.
    pub fn release(&mut self) -> bool {
        if self.disconnected {
            return false;
        }
        self.emitter.emit(SensorEvent::Cleared);
        self.emitter.remove_all_listeners();
        self.data_conditions.clear();
        self.disconnected = true;
        true
    }
}

/// A plugin-supplied data-acquisition device.
///
/// `tag` must not block: devices that need to do I/O for a marker should hand
/// it to their own worker.
pub trait Sensor: Send {
    fn base(&self) -> &SensorBase;

    fn base_mut(&mut self) -> &mut SensorBase;

    fn sensor_id(&self) -> SensorId {
        self.base().sensor_id()
    }

    fn sensor_type(&self) -> &str {
        self.base().sensor_type()
    }

    fn control_elements(&self) -> &[ControlElement] {
        self.base().control_elements()
    }

    fn emitter(&self) -> &SensorEmitter {
        self.base().emitter()
    }

    fn set_data_condition(&mut self, condition: DataCondition) {
        self.base_mut().data_conditions.push(condition);
    }

    fn clear_data_conditions(&mut self) {
        self.base_mut().data_conditions.clear();
    }

    /// Deliver a synchronization marker. Each sensor gets its own copy.
    fn tag(&mut self, tag: Tag);

    /// Run a control-element action. Returns whether it was handled.
    fn action(&mut self, _action_id: &str) -> bool {
        false
    }

    /// Handle a type-addressed message from the controller.
    fn on_message(&mut self, _msg: &serde_json::Value) {}

    /// Begin writing under `save_path/filename`.
    fn start_recording(&mut self, save_path: &Path, filename: &str);

    /// Stop writing. Safe to call when not recording.
    fn stop_recording(&mut self);

    /// Release resources and listeners. A second call is a no-op.
    fn disconnect(&mut self) {
        self.base_mut().release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::events::SensorEventKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Bare {
        base: SensorBase,
    }

    impl Sensor for Bare {
        fn base(&self) -> &SensorBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut SensorBase {
            &mut self.base
        }

        fn tag(&mut self, _tag: Tag) {}

        fn start_recording(&mut self, _save_path: &Path, _filename: &str) {}

        fn stop_recording(&mut self) {}
    }

    #[test]
    fn test_default_accessors() {
        let sensor = Bare {
            base: SensorBase::new("eyetracker")
                .with_control_elements(vec![ControlElement::new("calibrate", "Calibrate")]),
        };
        assert_eq!(sensor.sensor_type(), "eyetracker");
        assert_eq!(sensor.emitter().sensor_id(), sensor.sensor_id());
        assert_eq!(sensor.control_elements()[0].action_id, "calibrate");
    }

    #[test]
    fn test_data_conditions_are_stored_and_cleared() {
        let mut sensor = Bare {
            base: SensorBase::new("eeg"),
        };
        sensor.set_data_condition(serde_json::json!({"gaze": "in_aoi"}));
        sensor.set_data_condition(serde_json::json!({"gaze": "fixation"}));
        assert_eq!(sensor.base().data_conditions().len(), 2);

        sensor.clear_data_conditions();
        assert!(sensor.base().data_conditions().is_empty());
    }

    #[test]
    fn test_disconnect_emits_cleared_once() {
        let mut sensor = Bare {
            base: SensorBase::new("eeg"),
        };
        let cleared = Arc::new(AtomicUsize::new(0));
        let c = cleared.clone();
        sensor.emitter().on(
            SensorEventKind::Cleared,
            Arc::new(move |_, _| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        sensor.disconnect();
        sensor.disconnect();

        assert_eq!(cleared.load(Ordering::SeqCst), 1);
        assert!(sensor.base().is_disconnected());
        assert_eq!(sensor.base().emit(SensorEvent::StopCollectingData), 0);
    }
}

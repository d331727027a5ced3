//! Value types exchanged between the controller and sensors.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Process-unique sensor identity.
///
/// Backed by a random v4 UUID, so collisions are negligible rather than
/// impossible. Identifiers are never reused after a sensor disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SensorId(Uuid);

impl SensorId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SensorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sensor-{}", self.0.simple())
    }
}

impl FromStr for SensorId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("sensor-").unwrap_or(s);
        Ok(Self(Uuid::parse_str(raw)?))
    }
}

/// What a tag marks on the session timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    /// Start of a period
    Start,
    /// End of a period
    End,
    /// Single point in time
    Impulse,
    /// Generated from an armed keypress
    Keypress,
    Other,
}

/// A timestamped synchronization marker.
///
/// The timestamp is taken once when the marker is recognized, before any
/// fan-out. Sensors are expected to sync their own clocks against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Identifier of the tag
    pub id: String,
    /// Kind of marker
    pub secondary_id: TagKind,
    /// Wall-clock seconds since the Unix epoch, microsecond resolution
    pub timestamp: f64,
    /// Free-form payload, interpreted by sensors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub misc: Option<serde_json::Value>,
}

impl Tag {
    /// Create a tag stamped with the current time.
    pub fn now(id: impl Into<String>, secondary_id: TagKind) -> Self {
        Self {
            id: id.into(),
            secondary_id,
            timestamp: timestamp(),
            misc: None,
        }
    }

    /// Attach a payload.
    pub fn with_misc(mut self, misc: serde_json::Value) -> Self {
        self.misc = Some(misc);
        self
    }
}

/// Current local clock reading in seconds, microsecond accuracy.
pub fn timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// An opaque UI-action descriptor published by a sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlElement {
    /// Identifier passed back through `sensor_action`
    pub action_id: String,
    /// Human readable label
    pub label: String,
}

impl ControlElement {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            label: label.into(),
        }
    }
}

/// A predicate evaluated inside the device. Stored, never interpreted here.
pub type DataCondition = serde_json::Value;

/// Callback attached to a query button.
pub type QueryCallback = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// A question a sensor wants a front end to put to the operator.
#[derive(Clone)]
pub struct Query {
    pub message: String,
    pub title: String,
    pub buttons: Vec<String>,
    /// One callback per button, in button order
    pub callbacks: Vec<QueryCallback>,
    /// Argument passed to the matching callback
    pub callback_args: Vec<serde_json::Value>,
}

impl Query {
    /// Run the callback bound to `button`, if there is one.
    pub fn answer(&self, button: usize) -> bool {
        match self.callbacks.get(button) {
            Some(callback) => {
                let arg = self
                    .callback_args
                    .get(button)
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
                callback(&arg);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("message", &self.message)
            .field("title", &self.title)
            .field("buttons", &self.buttons)
            .field("callbacks", &self.callbacks.len())
            .field("callback_args", &self.callback_args)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_sensor_ids_are_unique() {
        let a = SensorId::new();
        let b = SensorId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_sensor_id_display_parses_back() {
        let id = SensorId::new();
        let text = id.to_string();
        assert!(text.starts_with("sensor-"));
        assert_eq!(text.parse::<SensorId>().unwrap(), id);
    }

    #[test]
    fn test_tag_kind_serializes_snake_case() {
        let tag = Tag::now("space", TagKind::Keypress);
        let json = serde_json::to_value(&tag).unwrap();
        assert_eq!(json["secondary_id"], "keypress");
        assert!(json.get("misc").is_none());
    }

    #[test]
    fn test_tag_timestamp_is_recent() {
        let before = timestamp();
        let tag = Tag::now("t", TagKind::Impulse);
        let after = timestamp();
        assert!(tag.timestamp >= before && tag.timestamp <= after);
    }

    #[test]
    fn test_query_answer_uses_matching_arg() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let query = Query {
            message: "Recalibrate?".to_string(),
            title: "Eye tracker".to_string(),
            buttons: vec!["Yes".to_string()],
            callbacks: vec![Arc::new(move |arg: &serde_json::Value| {
                h.fetch_add(arg.as_u64().unwrap_or(0) as usize, Ordering::SeqCst);
            })],
            callback_args: vec![serde_json::json!(3)],
        };

        assert!(query.answer(0));
        assert!(!query.answer(1));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}

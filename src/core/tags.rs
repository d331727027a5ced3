//! Tag fan-out and the keypress contingency.

use crate::sensor::{Sensor, Tag, TagKind};
use std::collections::HashSet;
use tracing::debug;

/// Fans a tag out to every sensor as an independent copy.
#[derive(Debug, Default)]
pub struct TagBroadcaster;

impl TagBroadcaster {
    pub fn new() -> Self {
        Self
    }

    /// Capture the timestamp now, before any fan-out happens.
    pub fn stamp(&self, id: impl Into<String>, kind: TagKind) -> Tag {
        Tag::now(id, kind)
    }

    /// Deliver a copy of `tag` to each sensor. Returns the number of recipients.
    pub fn broadcast<'a, I>(&self, tag: &Tag, sensors: I) -> usize
    where
        I: IntoIterator<Item = &'a mut Box<dyn Sensor>>,
    {
        let mut recipients = 0;
        for sensor in sensors {
            sensor.tag(tag.clone());
            recipients += 1;
        }
        debug!(tag = %tag.id, kind = ?tag.secondary_id, recipients, "tag broadcast");
        recipients
    }
}

/// Set of keys armed to continue the experiment on the next matching press.
///
/// Armed while the set is non-empty, idle otherwise.
#[derive(Debug, Default)]
pub struct KeyContingency {
    armed: HashSet<String>,
}

impl KeyContingency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the armed set.
    pub fn arm<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.armed = keys.into_iter().map(Into::into).collect();
    }

    pub fn is_armed(&self) -> bool {
        !self.armed.is_empty()
    }

    pub fn armed_keys(&self) -> impl Iterator<Item = &str> {
        self.armed.iter().map(String::as_str)
    }

    /// Returns `true` and disarms if `key` is armed. Other keys are ignored.
    pub fn trigger(&mut self, key: &str) -> bool {
        if self.armed.contains(key) {
            self.armed.clear();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contingency_fires_once() {
        let mut contingency = KeyContingency::new();
        contingency.arm(["space", "enter"]);
        assert!(contingency.is_armed());

        assert!(!contingency.trigger("a"));
        assert!(contingency.is_armed());

        assert!(contingency.trigger("space"));
        assert!(!contingency.is_armed());
        assert!(!contingency.trigger("enter"));
    }

    #[test]
    fn test_arm_replaces_previous_set() {
        let mut contingency = KeyContingency::new();
        contingency.arm(["space"]);
        contingency.arm(["q"]);
        assert_eq!(contingency.armed_keys().collect::<Vec<_>>(), vec!["q"]);
    }

    #[test]
    fn test_broadcast_to_no_sensors() {
        let broadcaster = TagBroadcaster::new();
        let tag = broadcaster.stamp("stim", TagKind::Start);
        let mut sensors: Vec<Box<dyn Sensor>> = Vec::new();

        assert_eq!(broadcaster.broadcast(&tag, sensors.iter_mut()), 0);
    }
}

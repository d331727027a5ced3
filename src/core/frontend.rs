//! Attachment point for front ends (GUI, terminal, remote views).

use crate::sensor::Query;

/// Controller-level notifications delivered to attached front ends.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A sensor failed to connect or failed while connected
    Error(String),
    /// A sensor's log line
    LogUpdate(String),
    /// The registered sensor set changed; carries the new size
    SensorCountChanged(usize),
    ParticipantIdUpdated(String),
    /// An armed key was pressed
    Continue,
}

/// Receives notifications and operator queries from the controller.
///
/// Front ends never get a reference to the controller itself; they drive it
/// through a [`ControllerHandle`](crate::core::ControllerHandle).
pub trait FrontEnd: Send {
    fn notify(&mut self, notification: &Notification);

    fn show_message_box(&mut self, query: &Query);
}

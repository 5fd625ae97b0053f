//! Events emitted after every applied mutation.

use serde::{Deserialize, Serialize};

use super::alert::Alert;
use super::ids::OperationId;

/// Something observable happened in the tracker.
///
/// Events are delivered after the state change is committed, outside the
/// tracker's lock, to per-operation observers, global observers and the
/// broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackerEvent {
    Started { id: OperationId },
    Progressed { id: OperationId, progress: f64, stage: String },
    Finished { id: OperationId },
    Failed { id: OperationId, error: String },
    Retrying { id: OperationId, retry_count: u32 },
    MetricsUpdated { id: OperationId },
    Cleared { id: OperationId },
    AlertRaised { alert: Alert },
    AlertsExpired { count: usize },
}

impl TrackerEvent {
    /// The operation this event is about, if any.
    pub fn operation_id(&self) -> Option<&OperationId> {
        match self {
            TrackerEvent::Started { id }
            | TrackerEvent::Progressed { id, .. }
            | TrackerEvent::Finished { id }
            | TrackerEvent::Failed { id, .. }
            | TrackerEvent::Retrying { id, .. }
            | TrackerEvent::MetricsUpdated { id }
            | TrackerEvent::Cleared { id } => Some(id),
            TrackerEvent::AlertRaised { alert } => Some(&alert.component),
            TrackerEvent::AlertsExpired { .. } => None,
        }
    }
}

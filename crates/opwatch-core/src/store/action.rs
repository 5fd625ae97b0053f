//! Store actions: the only way records change.

use crate::domain::{MetricSample, OperationId, StartOptions};

/// One discrete state transition.
///
/// Each action is applied atomically against the latest snapshot before the
/// next one is admitted, so interleaved callers never race on a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Start {
        id: OperationId,
        options: StartOptions,
    },
    UpdateProgress {
        id: OperationId,
        progress: f64,
        stage: Option<String>,
    },
    /// Derived follow-up of `UpdateProgress`.
    RefreshEstimate {
        id: OperationId,
    },
    Finish {
        id: OperationId,
    },
    SetError {
        id: OperationId,
        message: String,
    },
    Retry {
        id: OperationId,
    },
    RecordSuccess {
        id: OperationId,
    },
    RecordError {
        id: OperationId,
    },
    RecordMetric {
        id: OperationId,
        sample: MetricSample,
    },
    Clear {
        id: OperationId,
    },
    ClearAll,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Start { .. } => "start",
            Action::UpdateProgress { .. } => "update_progress",
            Action::RefreshEstimate { .. } => "refresh_estimate",
            Action::Finish { .. } => "finish",
            Action::SetError { .. } => "set_error",
            Action::Retry { .. } => "retry",
            Action::RecordSuccess { .. } => "record_success",
            Action::RecordError { .. } => "record_error",
            Action::RecordMetric { .. } => "record_metric",
            Action::Clear { .. } => "clear",
            Action::ClearAll => "clear_all",
        }
    }
}

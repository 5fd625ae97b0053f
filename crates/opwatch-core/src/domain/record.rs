//! Operation record: the lifecycle state of one operation id.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::duration_ms;
use super::estimate::estimate_remaining;
use super::kind::OperationKind;
use super::metric::{MetricOutcome, MetricSample};

/// Opaque caller payload attached to a record.
///
/// The tracker stores and exports it verbatim and never looks inside; whoever
/// writes and reads it agrees on the shape out of band.
pub type Details = serde_json::Map<String, serde_json::Value>;

pub const STAGE_IDLE: &str = "idle";
pub const STAGE_STARTING: &str = "starting";
pub const STAGE_COMPLETED: &str = "completed";
pub const STAGE_ERROR: &str = "error";
pub const STAGE_RETRYING: &str = "retrying";

const SUCCESS_RATE_MAX: f64 = 100.0;
const SUCCESS_DELTA: f64 = 1.0;
const ERROR_DELTA: f64 = 5.0;

/// Lifecycle state for one operation.
///
/// Records are only ever changed by the store, through the transition methods
/// below; consumers see clones inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub is_loading: bool,

    /// Last progress value the caller reported, in `[0, 100]`.
    pub progress: f64,

    pub stage: String,

    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    /// Wall time of the last completed attempt, or an externally measured
    /// value supplied through `record_metric`.
    #[serde(with = "duration_ms::option", rename = "loading_duration_ms")]
    pub loading_duration: Option<Duration>,

    /// Linear extrapolation; only present while `0 < progress < 100`.
    #[serde(with = "duration_ms::option", rename = "estimated_time_remaining_ms")]
    pub estimated_time_remaining: Option<Duration>,

    pub error: Option<String>,
    pub retry_count: u32,
    pub kind: OperationKind,

    /// Starts at 100; moves by fixed deltas on success/error.
    pub success_rate: f64,
    pub error_count: u32,
    pub success_count: u32,

    pub details: Option<Details>,
}

impl Default for OperationRecord {
    fn default() -> Self {
        Self {
            is_loading: false,
            progress: 0.0,
            stage: STAGE_IDLE.to_string(),
            start_time: None,
            end_time: None,
            loading_duration: None,
            estimated_time_remaining: None,
            error: None,
            retry_count: 0,
            kind: OperationKind::default(),
            success_rate: SUCCESS_RATE_MAX,
            error_count: 0,
            success_count: 0,
            details: None,
        }
    }
}

/// Caller-provided overrides for `start`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartOptions {
    pub stage: Option<String>,
    pub kind: Option<OperationKind>,
    pub details: Option<Details>,
}

impl StartOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn kind(mut self, kind: OperationKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn details(mut self, details: Details) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<OperationKind> for StartOptions {
    fn from(kind: OperationKind) -> Self {
        Self::new().kind(kind)
    }
}

/// Clamp a reported progress value into `[0, 100]`. NaN counts as no progress.
pub fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 100.0)
    }
}

impl OperationRecord {
    /// Fresh in-flight record.
    ///
    /// Lifecycle fields are reset; the accumulated counters of `previous`
    /// (retries, errors, successes, success rate) survive a re-start so that
    /// `retry_count` only ever resets when the record is cleared.
    pub fn started(
        options: StartOptions,
        previous: Option<&OperationRecord>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut record = Self {
            is_loading: true,
            progress: 0.0,
            stage: options
                .stage
                .unwrap_or_else(|| STAGE_STARTING.to_string()),
            start_time: Some(now),
            kind: options.kind.unwrap_or_default(),
            details: options.details,
            ..Self::default()
        };
        if let Some(previous) = previous {
            record.retry_count = previous.retry_count;
            record.error_count = previous.error_count;
            record.success_count = previous.success_count;
            record.success_rate = previous.success_rate;
        }
        record
    }

    pub fn set_progress(&mut self, progress: f64, stage: Option<String>) {
        self.progress = clamp_progress(progress);
        if let Some(stage) = stage {
            self.stage = stage;
        }
    }

    /// Recompute the time-remaining estimate from the current progress.
    pub fn refresh_estimate(&mut self, now: DateTime<Utc>) {
        self.estimated_time_remaining = self
            .start_time
            .and_then(|start| estimate_remaining(start, now, self.progress));
    }

    pub fn mark_finished(&mut self, now: DateTime<Utc>) {
        self.is_loading = false;
        self.progress = 100.0;
        self.stage = STAGE_COMPLETED.to_string();
        self.error = None;
        self.estimated_time_remaining = None;
        self.close_attempt(now);
        self.count_success();
    }

    /// Progress is left where the failure happened.
    pub fn mark_failed(&mut self, message: String, now: DateTime<Utc>) {
        self.is_loading = false;
        self.error = Some(message);
        self.stage = STAGE_ERROR.to_string();
        self.estimated_time_remaining = None;
        self.close_attempt(now);
        self.count_error();
    }

    pub fn mark_retrying(&mut self, now: DateTime<Utc>) {
        self.is_loading = true;
        self.progress = 0.0;
        self.stage = STAGE_RETRYING.to_string();
        self.error = None;
        self.start_time = Some(now);
        self.end_time = None;
        self.estimated_time_remaining = None;
        self.retry_count = self.retry_count.saturating_add(1);
    }

    pub fn count_success(&mut self) {
        self.success_count = self.success_count.saturating_add(1);
        self.success_rate = (self.success_rate + SUCCESS_DELTA).min(SUCCESS_RATE_MAX);
    }

    pub fn count_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
        self.success_rate = (self.success_rate - ERROR_DELTA).max(0.0);
    }

    pub fn apply_metric(&mut self, sample: &MetricSample) {
        if let Some(duration) = sample.loading_duration {
            self.loading_duration = Some(duration);
        }
        match sample.outcome {
            Some(MetricOutcome::Success) => self.count_success(),
            Some(MetricOutcome::Error) => self.count_error(),
            None => {}
        }
    }

    fn close_attempt(&mut self, now: DateTime<Utc>) {
        self.end_time = Some(now);
        if let Some(start) = self.start_time {
            self.loading_duration = Some((now - start).to_std().unwrap_or_default());
        }
    }
}

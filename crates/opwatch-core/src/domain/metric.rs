//! Externally measured metrics for a record.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::duration_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricOutcome {
    Success,
    Error,
}

/// A measurement taken outside the tracker's own start/finish timing, e.g. a
/// server-reported duration or a render timing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    #[serde(with = "duration_ms::option", rename = "loading_duration_ms", default)]
    pub loading_duration: Option<Duration>,
    #[serde(default)]
    pub outcome: Option<MetricOutcome>,
}

impl MetricSample {
    pub fn duration(loading_duration: Duration) -> Self {
        Self {
            loading_duration: Some(loading_duration),
            outcome: None,
        }
    }

    pub fn with_outcome(mut self, outcome: MetricOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }
}

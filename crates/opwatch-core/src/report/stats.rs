//! Fleet-wide statistics over a snapshot.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::duration_ms;
use crate::store::Snapshot;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallStats {
    pub total_operations: usize,
    pub active_operations: usize,

    /// Mean over records whose loading duration is known.
    #[serde(with = "duration_ms::option", rename = "avg_loading_time_ms")]
    pub avg_loading_time: Option<Duration>,

    #[serde(with = "duration_ms::option", rename = "max_loading_time_ms")]
    pub max_loading_time: Option<Duration>,

    pub total_errors: u64,
    pub total_retries: u64,

    /// `None` when there are no records.
    pub avg_success_rate: Option<f64>,
}

impl OverallStats {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        if snapshot.is_empty() {
            return Self::default();
        }

        let records: Vec<_> = snapshot.iter().map(|(_, r)| r).collect();
        let durations: Vec<Duration> = records.iter().filter_map(|r| r.loading_duration).collect();

        let avg_loading_time = mean_duration(&durations);

        Self {
            total_operations: records.len(),
            active_operations: records.iter().filter(|r| r.is_loading).count(),
            avg_loading_time,
            max_loading_time: durations.iter().max().copied(),
            total_errors: records.iter().map(|r| u64::from(r.error_count)).sum(),
            total_retries: records.iter().map(|r| u64::from(r.retry_count)).sum(),
            avg_success_rate: Some(
                records.iter().map(|r| r.success_rate).sum::<f64>() / records.len() as f64,
            ),
        }
    }
}

/// Mean in nanoseconds; `Duration` addition would overflow near `Duration::MAX`.
fn mean_duration(durations: &[Duration]) -> Option<Duration> {
    if durations.is_empty() {
        return None;
    }
    let total: u128 = durations.iter().map(Duration::as_nanos).sum();
    let mean = total / durations.len() as u128;
    let secs = u64::try_from(mean / NANOS_PER_SEC).unwrap_or(u64::MAX);
    // remainder is always below one second
    let nanos = (mean % NANOS_PER_SEC) as u32;
    Some(Duration::new(secs, nanos))
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

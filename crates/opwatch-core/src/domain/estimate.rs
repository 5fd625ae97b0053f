//! Time-remaining estimation from partial progress.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Linear extrapolation of the time left for an operation.
///
/// Assumes constant throughput: if `progress` percent took `elapsed`, the
/// whole run takes `elapsed / (progress / 100)`. There is no smoothing, so a
/// single slow update moves the estimate visibly; it corrects itself on the
/// next report.
///
/// Returns `None` at the boundaries (`progress <= 0`, `progress >= 100`, NaN)
/// where the extrapolation is undefined or unneeded. A clock that went
/// backwards counts as zero elapsed time.
pub fn estimate_remaining(
    start: DateTime<Utc>,
    now: DateTime<Utc>,
    progress: f64,
) -> Option<Duration> {
    if progress.is_nan() || progress <= 0.0 || progress >= 100.0 {
        return None;
    }
    let elapsed = (now - start).to_std().unwrap_or_default().as_secs_f64();
    let estimated_total = elapsed / (progress / 100.0);
    let remaining = (estimated_total - elapsed).max(0.0);
    // tiny progress extrapolates past what a Duration can hold
    Some(Duration::try_from_secs_f64(remaining).unwrap_or(Duration::MAX))
}

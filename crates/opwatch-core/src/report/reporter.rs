//! Worst-performer ranking and point-in-time reports.
//!
//! Everything here reads snapshots and returns owned values; nothing mutates
//! the store or the alert log.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OverallStats;
use crate::domain::{
    Alert, BudgetBook, BudgetVerdict, ErrorRateMode, OperationId, OperationRecord,
    PerformanceBudget, duration_ms, evaluate,
};
use crate::store::{Records, Snapshot};

const LOADING_PENALTY_MAX: f64 = 30.0;
const ERROR_PENALTY_MAX: f64 = 25.0;
const ERROR_PENALTY_EACH: f64 = 5.0;
const RETRY_PENALTY_MAX: f64 = 15.0;
const RETRY_PENALTY_EACH: f64 = 5.0;
const SUCCESS_RATE_WEIGHT: f64 = 0.1;

/// Composite health score of one operation against its budget.
///
/// Starts at 100 and loses up to 30 for loading time over budget (scaled by
/// how far over, relative to the budget), up to 25 for errors, up to 15 for
/// retries beyond the allowance, then moves by a tenth of the distance between
/// the success rate and its target. Clamped to `[0, 100]`.
pub fn performance_score(record: &OperationRecord, budget: &PerformanceBudget) -> f64 {
    let mut score = 100.0;

    if let Some(actual) = record.loading_duration
        && actual > budget.max_loading_time
    {
        let overage = (actual - budget.max_loading_time).as_secs_f64()
            / budget.max_loading_time.as_secs_f64();
        score -= (overage * LOADING_PENALTY_MAX).min(LOADING_PENALTY_MAX);
    }

    score -= (f64::from(record.error_count) * ERROR_PENALTY_EACH).min(ERROR_PENALTY_MAX);

    let retry_overage = record.retry_count.saturating_sub(budget.max_retry_attempts);
    score -= (f64::from(retry_overage) * RETRY_PENALTY_EACH).min(RETRY_PENALTY_MAX);

    score += SUCCESS_RATE_WEIGHT * (record.success_rate - budget.target_success_rate);

    score.clamp(0.0, 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceScore {
    pub id: OperationId,
    pub score: f64,
    pub verdict: BudgetVerdict,
    #[serde(with = "duration_ms::option", rename = "loading_duration_ms")]
    pub loading_duration: Option<Duration>,
    pub error_count: u32,
    pub retry_count: u32,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_components: usize,
    /// Records with a budget whose verdict is not `within_budget`.
    pub components_with_issues: usize,
    /// Mean score of the reported worst performers; 100 when none.
    pub avg_performance_score: f64,
}

/// Raw dump of every record and explicit budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsExport {
    pub exported_at: DateTime<Utc>,
    pub records: Records,
    pub budgets: BTreeMap<OperationId, PerformanceBudget>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub overall_stats: OverallStats,
    pub worst_performers: Vec<PerformanceScore>,
    pub recent_alerts: Vec<Alert>,
    pub metrics: MetricsExport,
    pub summary: ReportSummary,
}

/// Builds reports from snapshots.
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    pub error_rate_mode: ErrorRateMode,
    pub worst_performers_limit: usize,
    pub alert_limit: usize,
}

impl Default for Reporter {
    fn default() -> Self {
        Self {
            error_rate_mode: ErrorRateMode::default(),
            worst_performers_limit: 5,
            alert_limit: 20,
        }
    }
}

impl Reporter {
    /// Score every record that has a budget; lowest scores first.
    pub fn worst_performers(
        &self,
        snapshot: &Snapshot,
        budgets: &BudgetBook,
        limit: usize,
    ) -> Vec<PerformanceScore> {
        let mut scores: Vec<PerformanceScore> = snapshot
            .iter()
            .filter_map(|(id, record)| {
                let budget = budgets.resolve(id.as_str(), record)?;
                Some(PerformanceScore {
                    id: id.clone(),
                    score: performance_score(record, budget),
                    verdict: evaluate(record, budget, self.error_rate_mode).verdict,
                    loading_duration: record.loading_duration,
                    error_count: record.error_count,
                    retry_count: record.retry_count,
                    success_rate: record.success_rate,
                })
            })
            .collect();

        scores.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scores.truncate(limit);
        scores
    }

    pub fn components_with_issues(&self, snapshot: &Snapshot, budgets: &BudgetBook) -> usize {
        snapshot
            .iter()
            .filter_map(|(id, record)| {
                budgets
                    .resolve(id.as_str(), record)
                    .map(|budget| evaluate(record, budget, self.error_rate_mode))
            })
            .filter(|evaluation| !evaluation.is_within_budget())
            .count()
    }

    pub fn export(
        &self,
        snapshot: &Snapshot,
        budgets: &BudgetBook,
        now: DateTime<Utc>,
    ) -> MetricsExport {
        MetricsExport {
            exported_at: now,
            records: snapshot.records().clone(),
            budgets: budgets.explicit_budgets().clone(),
        }
    }

    /// Assemble a report. `recent_alerts` is expected newest first; only the
    /// first `alert_limit` are kept.
    pub fn generate(
        &self,
        snapshot: &Snapshot,
        budgets: &BudgetBook,
        mut recent_alerts: Vec<Alert>,
        now: DateTime<Utc>,
    ) -> PerformanceReport {
        let worst_performers = self.worst_performers(snapshot, budgets, self.worst_performers_limit);
        let avg_performance_score = if worst_performers.is_empty() {
            100.0
        } else {
            worst_performers.iter().map(|s| s.score).sum::<f64>() / worst_performers.len() as f64
        };
        recent_alerts.truncate(self.alert_limit);

        PerformanceReport {
            generated_at: now,
            overall_stats: OverallStats::from_snapshot(snapshot),
            summary: ReportSummary {
                total_components: snapshot.len(),
                components_with_issues: self.components_with_issues(snapshot, budgets),
                avg_performance_score,
            },
            worst_performers,
            recent_alerts,
            metrics: self.export(snapshot, budgets, now),
        }
    }
}

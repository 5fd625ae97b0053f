//! Performance budgets and verdicts.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::duration_ms;
use super::errors::TrackerError;
use super::ids::OperationId;
use super::kind::OperationKind;
use super::record::OperationRecord;

/// Thresholds an operation's observed metrics are compared against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceBudget {
    #[serde(with = "duration_ms", rename = "max_loading_time_ms")]
    pub max_loading_time: Duration,

    /// Advisory: exceeding it is reported, never enforced.
    pub max_retry_attempts: u32,

    /// Percent, `[0, 100]`.
    pub target_success_rate: f64,

    /// Percent, `[0, 100]`.
    pub max_error_rate: f64,
}

impl Default for PerformanceBudget {
    fn default() -> Self {
        Self {
            max_loading_time: Duration::from_millis(3000),
            max_retry_attempts: 3,
            target_success_rate: 95.0,
            max_error_rate: 5.0,
        }
    }
}

impl PerformanceBudget {
    pub fn new(max_loading_time: Duration) -> Self {
        Self {
            max_loading_time,
            ..Self::default()
        }
    }

    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    pub fn with_target_success_rate(mut self, rate: f64) -> Self {
        self.target_success_rate = rate;
        self
    }

    pub fn with_max_error_rate(mut self, rate: f64) -> Self {
        self.max_error_rate = rate;
        self
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.max_loading_time.is_zero() {
            return Err(TrackerError::InvalidBudget(
                "max_loading_time must be > 0".into(),
            ));
        }
        for (name, value) in [
            ("target_success_rate", self.target_success_rate),
            ("max_error_rate", self.max_error_rate),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(TrackerError::InvalidBudget(format!(
                    "{name} must be within [0, 100], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Three-level health classification of a record against its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetVerdict {
    WithinBudget,
    /// Only soft violations (retries, success rate).
    Warning,
    /// At least one hard violation (loading time, error rate).
    Exceeded,
}

impl fmt::Display for BudgetVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BudgetVerdict::WithinBudget => "within_budget",
            BudgetVerdict::Warning => "warning",
            BudgetVerdict::Exceeded => "exceeded",
        })
    }
}

/// How the error rate of a record is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorRateMode {
    /// `errors / (errors + 1)`. Approaches 100% as errors pile up and ignores
    /// successes entirely; kept as the default for compatibility.
    #[default]
    Smoothed,
    /// `errors / (errors + successes)`, 0 when nothing completed yet.
    Observed,
}

impl ErrorRateMode {
    /// Error rate of `record` in percent.
    pub fn error_rate(self, record: &OperationRecord) -> f64 {
        let errors = f64::from(record.error_count);
        match self {
            ErrorRateMode::Smoothed => errors / (errors + 1.0) * 100.0,
            ErrorRateMode::Observed => {
                let total = errors + f64::from(record.success_count);
                if total == 0.0 { 0.0 } else { errors / total * 100.0 }
            }
        }
    }
}

/// Explicit per-operation budgets, with per-kind fallbacks.
#[derive(Debug, Clone, Default)]
pub struct BudgetBook {
    by_id: BTreeMap<OperationId, PerformanceBudget>,
    by_kind: HashMap<OperationKind, PerformanceBudget>,
}

impl BudgetBook {
    pub fn new(by_kind: HashMap<OperationKind, PerformanceBudget>) -> Self {
        Self {
            by_id: BTreeMap::new(),
            by_kind,
        }
    }

    pub fn set(&mut self, id: OperationId, budget: PerformanceBudget) -> Option<PerformanceBudget> {
        self.by_id.insert(id, budget)
    }

    pub fn remove(&mut self, id: &str) -> Option<PerformanceBudget> {
        self.by_id.remove(id)
    }

    pub fn explicit(&self, id: &str) -> Option<&PerformanceBudget> {
        self.by_id.get(id)
    }

    /// Budget that applies to `record`: its own, else the one for its kind.
    pub fn resolve(&self, id: &str, record: &OperationRecord) -> Option<&PerformanceBudget> {
        self.by_id.get(id).or_else(|| self.by_kind.get(&record.kind))
    }

    pub fn explicit_budgets(&self) -> &BTreeMap<OperationId, PerformanceBudget> {
        &self.by_id
    }
}

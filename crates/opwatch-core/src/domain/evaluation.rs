//! Budget evaluation: record + budget -> verdict.
//!
//! Every rule is checked independently and all violations are collected.
//! Loading time and error rate are hard violations (user visible, urgent);
//! retries and success rate are soft ones (leading indicators). Evaluation is
//! a pure function of its inputs.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::alert::AlertLevel;
use super::budget::{BudgetVerdict, ErrorRateMode, PerformanceBudget};
use super::duration_ms;
use super::record::OperationRecord;

/// One broken budget rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Violation {
    LoadingTime {
        #[serde(with = "duration_ms", rename = "actual_ms")]
        actual: Duration,
        #[serde(with = "duration_ms", rename = "limit_ms")]
        limit: Duration,
    },
    Retries {
        count: u32,
        limit: u32,
    },
    SuccessRate {
        actual: f64,
        target: f64,
    },
    ErrorRate {
        actual: f64,
        limit: f64,
    },
}

impl Violation {
    pub fn is_hard(&self) -> bool {
        matches!(self, Violation::LoadingTime { .. } | Violation::ErrorRate { .. })
    }

    /// Level of the alert this violation raises.
    pub fn alert_level(&self) -> AlertLevel {
        match self {
            Violation::ErrorRate { .. } => AlertLevel::Error,
            _ => AlertLevel::Warning,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::LoadingTime { actual, limit } => write!(
                f,
                "loading time {}ms exceeded budget of {}ms by {}ms",
                actual.as_millis(),
                limit.as_millis(),
                actual.saturating_sub(*limit).as_millis()
            ),
            Violation::Retries { count, limit } => {
                write!(f, "retried {count} times, budget allows {limit}")
            }
            Violation::SuccessRate { actual, target } => {
                write!(f, "success rate {actual:.1}% below target {target:.1}%")
            }
            Violation::ErrorRate { actual, limit } => {
                write!(f, "error rate {actual:.1}% above limit {limit:.1}%")
            }
        }
    }
}

/// Result of comparing a record with its budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetEvaluation {
    pub verdict: BudgetVerdict,
    pub violations: Vec<Violation>,
}

impl BudgetEvaluation {
    pub fn is_within_budget(&self) -> bool {
        self.verdict == BudgetVerdict::WithinBudget
    }

    /// Alerts to raise for this evaluation, as `(level, message)` pairs.
    pub fn candidate_alerts(&self, component: &str) -> Vec<(AlertLevel, String)> {
        self.violations
            .iter()
            .map(|v| (v.alert_level(), format!("{component}: {v}")))
            .collect()
    }
}

/// Compare `record` against `budget`.
///
/// Loading time only counts once the attempt is closed (or a duration was
/// recorded externally); an in-flight operation is never flagged for it.
pub fn evaluate(
    record: &OperationRecord,
    budget: &PerformanceBudget,
    mode: ErrorRateMode,
) -> BudgetEvaluation {
    let mut violations = Vec::new();

    if let Some(actual) = record.loading_duration
        && actual > budget.max_loading_time
    {
        violations.push(Violation::LoadingTime {
            actual,
            limit: budget.max_loading_time,
        });
    }

    if record.retry_count > budget.max_retry_attempts {
        violations.push(Violation::Retries {
            count: record.retry_count,
            limit: budget.max_retry_attempts,
        });
    }

    if record.success_rate < budget.target_success_rate {
        violations.push(Violation::SuccessRate {
            actual: record.success_rate,
            target: budget.target_success_rate,
        });
    }

    let error_rate = mode.error_rate(record);
    if error_rate > budget.max_error_rate {
        violations.push(Violation::ErrorRate {
            actual: error_rate,
            limit: budget.max_error_rate,
        });
    }

    let verdict = if violations.is_empty() {
        BudgetVerdict::WithinBudget
    } else if violations.iter().any(Violation::is_hard) {
        BudgetVerdict::Exceeded
    } else {
        BudgetVerdict::Warning
    };

    BudgetEvaluation {
        verdict,
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn budget() -> PerformanceBudget {
        PerformanceBudget::new(Duration::from_millis(1000))
            .with_max_retry_attempts(2)
            .with_target_success_rate(90.0)
            .with_max_error_rate(5.0)
    }

    fn record() -> OperationRecord {
        OperationRecord {
            loading_duration: Some(Duration::from_millis(400)),
            ..OperationRecord::default()
        }
    }

    #[test]
    fn healthy_record_is_within_budget() {
        let result = evaluate(&record(), &budget(), ErrorRateMode::Smoothed);
        assert_eq!(result.verdict, BudgetVerdict::WithinBudget);
        assert!(result.violations.is_empty());
        assert!(result.candidate_alerts("x").is_empty());
    }

    #[test]
    fn slow_load_is_exceeded_with_overage_in_message() {
        let slow = OperationRecord {
            loading_duration: Some(Duration::from_millis(2500)),
            ..record()
        };
        let result = evaluate(&slow, &budget(), ErrorRateMode::Smoothed);
        assert_eq!(result.verdict, BudgetVerdict::Exceeded);

        let alerts = result.candidate_alerts("fetch.listings");
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].0, AlertLevel::Warning);
        assert!(alerts[0].1.contains("by 1500ms"), "{}", alerts[0].1);
        assert!(alerts[0].1.starts_with("fetch.listings: "));
    }

    #[test]
    fn in_flight_record_is_not_flagged_for_loading_time() {
        let in_flight = OperationRecord {
            is_loading: true,
            loading_duration: None,
            ..OperationRecord::default()
        };
        let result = evaluate(&in_flight, &budget(), ErrorRateMode::Smoothed);
        assert!(result.is_within_budget());
    }

    #[test]
    fn one_error_against_five_percent_limit_is_exceeded() {
        let failed = OperationRecord {
            error_count: 1,
            success_rate: 95.0,
            ..record()
        };
        let result = evaluate(&failed, &budget(), ErrorRateMode::Smoothed);
        assert_eq!(result.verdict, BudgetVerdict::Exceeded);
        assert!(matches!(
            result.violations.as_slice(),
            [Violation::ErrorRate { actual, .. }] if (*actual - 50.0).abs() < 1e-9
        ));
        assert_eq!(result.candidate_alerts("calc")[0].0, AlertLevel::Error);
    }

    #[rstest]
    #[case::retries_only(OperationRecord { retry_count: 3, ..record() })]
    #[case::success_rate_only(OperationRecord { success_rate: 80.0, ..record() })]
    #[case::both_soft(OperationRecord { retry_count: 5, success_rate: 10.0, ..record() })]
    fn soft_violations_yield_warning(#[case] input: OperationRecord) {
        let result = evaluate(&input, &budget(), ErrorRateMode::Smoothed);
        assert_eq!(result.verdict, BudgetVerdict::Warning);
        assert!(result.violations.iter().all(|v| !v.is_hard()));
    }

    #[test]
    fn all_violations_are_collected() {
        let bad = OperationRecord {
            loading_duration: Some(Duration::from_millis(5000)),
            retry_count: 4,
            success_rate: 50.0,
            error_count: 10,
            ..OperationRecord::default()
        };
        let result = evaluate(&bad, &budget(), ErrorRateMode::Smoothed);
        assert_eq!(result.verdict, BudgetVerdict::Exceeded);
        assert_eq!(result.violations.len(), 4);
    }

    #[test]
    fn observed_mode_uses_successes() {
        let mostly_ok = OperationRecord {
            error_count: 1,
            success_count: 99,
            success_rate: 100.0,
            ..record()
        };
        let b = budget().with_max_error_rate(5.0);
        assert_eq!(
            evaluate(&mostly_ok, &b, ErrorRateMode::Smoothed).verdict,
            BudgetVerdict::Exceeded
        );
        assert_eq!(
            evaluate(&mostly_ok, &b, ErrorRateMode::Observed).verdict,
            BudgetVerdict::WithinBudget
        );
    }

    #[test]
    fn evaluation_is_deterministic() {
        let input = OperationRecord {
            retry_count: 7,
            error_count: 2,
            ..record()
        };
        let a = evaluate(&input, &budget(), ErrorRateMode::Smoothed);
        let b = evaluate(&input, &budget(), ErrorRateMode::Smoothed);
        assert_eq!(a, b);
    }
}

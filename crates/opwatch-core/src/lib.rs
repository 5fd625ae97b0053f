//! opwatch-core
//!
//! In-process tracking of asynchronous operations: lifecycle records,
//! performance budgets, alerts and reports.
//!
//! # Modules
//! - **domain**: records, budgets, evaluation, alerts, events, errors
//! - **ports**: clock and id generator abstractions
//! - **store**: action-driven record store with cheap snapshots
//! - **alerts**: bounded, self-expiring alert log
//! - **report**: scoring, aggregate stats, report assembly
//! - **app**: the `Tracker` facade, builder, wrapper and sweeper

pub mod alerts;
pub mod app;
pub mod domain;
pub mod ports;
pub mod report;
pub mod store;

pub use app::{
    AlertSweeper, BuildError, OperationWrapper, Subscription, Tracker, TrackerBuilder,
    TrackerConfig,
};
pub use domain::{
    Alert, AlertId, AlertLevel, BudgetEvaluation, BudgetVerdict, ErrorRateMode, MetricOutcome,
    MetricSample, OperationId, OperationKind, OperationRecord, PerformanceBudget, StartOptions,
    TrackerError, TrackerEvent, Violation,
};
pub use report::{MetricsExport, PerformanceReport, PerformanceScore};

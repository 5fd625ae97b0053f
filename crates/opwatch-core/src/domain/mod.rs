//! Domain model: records, budgets, alerts, and the pure functions over them.

pub mod alert;
pub mod budget;
pub mod duration_ms;
pub mod errors;
pub mod estimate;
pub mod evaluation;
pub mod events;
pub mod ids;
pub mod kind;
pub mod metric;
pub mod record;

pub use alert::{Alert, AlertLevel};
pub use budget::{BudgetBook, BudgetVerdict, ErrorRateMode, PerformanceBudget};
pub use errors::TrackerError;
pub use estimate::estimate_remaining;
pub use evaluation::{BudgetEvaluation, Violation, evaluate};
pub use events::TrackerEvent;
pub use ids::{AlertId, OperationId};
pub use kind::OperationKind;
pub use metric::{MetricOutcome, MetricSample};
pub use record::{Details, OperationRecord, StartOptions, clamp_progress};

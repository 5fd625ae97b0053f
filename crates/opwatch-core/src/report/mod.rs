//! Aggregate reporting over snapshots.

mod reporter;
mod stats;

pub use reporter::{
    MetricsExport, PerformanceReport, PerformanceScore, Reporter, ReportSummary,
    performance_score,
};
pub use stats::OverallStats;

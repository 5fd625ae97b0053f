//! Tracker configuration.
//!
//! Every field has a default, so a partial JSON document (or none at all) is
//! a valid configuration.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alerts::{DEFAULT_CAPACITY, DEFAULT_INFO_TTL};
use crate::domain::{ErrorRateMode, OperationKind, PerformanceBudget, TrackerError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Maximum number of alerts retained.
    pub alert_capacity: usize,

    /// Lifetime of info alerts.
    pub info_alert_ttl_ms: u64,

    /// Alerts included in a report.
    pub report_alert_limit: usize,

    /// Worst performers included in a report.
    pub report_worst_performers: usize,

    pub error_rate_mode: ErrorRateMode,

    /// Period of the background alert sweeper.
    pub sweep_interval_ms: u64,

    /// Budgets for operations without one of their own.
    pub kind_budgets: HashMap<OperationKind, PerformanceBudget>,

    /// Capacity of the broadcast event channel.
    pub event_channel_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            alert_capacity: DEFAULT_CAPACITY,
            info_alert_ttl_ms: DEFAULT_INFO_TTL.as_millis() as u64,
            report_alert_limit: 20,
            report_worst_performers: 5,
            error_rate_mode: ErrorRateMode::Smoothed,
            sweep_interval_ms: 1000,
            kind_budgets: HashMap::new(),
            event_channel_capacity: 256,
        }
    }
}

impl TrackerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, TrackerError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TrackerError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| TrackerError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.alert_capacity == 0 {
            return Err(TrackerError::InvalidConfig("alert_capacity must be > 0".into()));
        }
        if self.sweep_interval_ms == 0 {
            return Err(TrackerError::InvalidConfig(
                "sweep_interval_ms must be > 0".into(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(TrackerError::InvalidConfig(
                "event_channel_capacity must be > 0".into(),
            ));
        }
        for budget in self.kind_budgets.values() {
            budget.validate()?;
        }
        Ok(())
    }

    pub fn info_alert_ttl(&self) -> Duration {
        Duration::from_millis(self.info_alert_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn with_kind_budget(mut self, kind: OperationKind, budget: PerformanceBudget) -> Self {
        self.kind_budgets.insert(kind, budget);
        self
    }
}

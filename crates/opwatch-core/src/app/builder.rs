//! TrackerBuilder: wiring and startup validation.
//!
//! Configuration is checked once in `build()`, so a bad value fails at
//! startup instead of surfacing later as a panic or a silent misbehaviour.

use std::sync::Arc;

use super::config::TrackerConfig;
use super::tracker::Tracker;
use crate::domain::TrackerError;
use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};

/// Builds a [`Tracker`].
///
/// ```
/// use opwatch_core::{TrackerBuilder, TrackerConfig};
///
/// let tracker = TrackerBuilder::new()
///     .config(TrackerConfig::default())
///     .build()
///     .expect("default config is valid");
/// assert!(!tracker.is_any_loading());
/// ```
pub struct TrackerBuilder {
    config: TrackerConfig,
    clock: Arc<dyn Clock>,
    ids: Box<dyn IdGenerator>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid tracker configuration: {0}")]
    InvalidConfig(#[source] TrackerError),
}

impl TrackerBuilder {
    pub fn new() -> Self {
        Self {
            config: TrackerConfig::default(),
            clock: Arc::new(SystemClock),
            ids: Box::new(UlidGenerator),
        }
    }

    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the wall clock, e.g. with a `FixedClock` in tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id_generator(mut self, ids: Box<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn build(self) -> Result<Tracker, BuildError> {
        self.config.validate().map_err(BuildError::InvalidConfig)?;
        Ok(Tracker::from_parts(self.config, self.clock, self.ids))
    }
}

impl Default for TrackerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AlertId, OperationId, OperationKind, PerformanceBudget, StartOptions};
    use chrono::{DateTime, Utc};
    use std::time::Duration;

    struct NilIds;

    impl IdGenerator for NilIds {
        fn generate_alert_id(&self, component: &OperationId, _at: DateTime<Utc>) -> AlertId {
            AlertId::from_parts(component, ulid::Ulid::nil())
        }
    }

    #[test]
    fn test_build_with_defaults() {
        let tracker = TrackerBuilder::new().build();
        assert!(tracker.is_ok());
    }

    #[test]
    fn test_build_rejects_zero_capacity() {
        let config = TrackerConfig {
            alert_capacity: 0,
            ..TrackerConfig::default()
        };
        let result = TrackerBuilder::new().config(config).build();
        assert!(matches!(
            result,
            Err(BuildError::InvalidConfig(TrackerError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn test_build_rejects_invalid_kind_budget() {
        let config = TrackerConfig::default().with_kind_budget(
            OperationKind::Form,
            PerformanceBudget::new(Duration::from_millis(100)).with_max_error_rate(250.0),
        );
        let result = TrackerBuilder::new().config(config).build();
        assert!(matches!(
            result,
            Err(BuildError::InvalidConfig(TrackerError::InvalidBudget(_)))
        ));
    }

    #[test]
    fn test_build_uses_custom_id_generator() {
        let tracker = TrackerBuilder::new()
            .id_generator(Box::new(NilIds))
            .build()
            .unwrap();
        tracker.start("x", StartOptions::new());
        tracker.set_error("x", "boom");
        let alerts = tracker.alerts();
        assert_eq!(
            alerts[0].id.as_str(),
            format!("x-{}", ulid::Ulid::nil()).as_str()
        );
    }
}

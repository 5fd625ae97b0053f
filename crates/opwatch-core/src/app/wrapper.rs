//! OperationWrapper: run an async unit of work under tracking.
//!
//! The wrapper starts the record, advances synthetic progress through a list
//! of named stages while the work is pending, and closes the record with
//! `finish` or `set_error` depending on the outcome. The work's own result is
//! handed back untouched.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::tracker::Tracker;
use crate::domain::{OperationId, OperationKind, StartOptions};

const DEFAULT_TICK: Duration = Duration::from_millis(250);
const MIN_TICK: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct OperationWrapper {
    tracker: Tracker,
    id: OperationId,
    options: StartOptions,
    stages: Vec<String>,
    tick: Duration,
}

impl OperationWrapper {
    pub fn new(tracker: Tracker, id: impl Into<OperationId>) -> Self {
        Self {
            tracker,
            id: id.into(),
            options: StartOptions::new(),
            stages: Vec::new(),
            tick: DEFAULT_TICK,
        }
    }

    fn of_kind(tracker: Tracker, id: impl Into<OperationId>, kind: OperationKind) -> Self {
        let mut wrapper = Self::new(tracker, id);
        wrapper.options = wrapper.options.kind(kind);
        wrapper
    }

    pub fn initial(tracker: Tracker, id: impl Into<OperationId>) -> Self {
        Self::of_kind(tracker, id, OperationKind::Initial)
    }

    pub fn navigation(tracker: Tracker, id: impl Into<OperationId>) -> Self {
        Self::of_kind(tracker, id, OperationKind::Navigation)
    }

    pub fn data(tracker: Tracker, id: impl Into<OperationId>) -> Self {
        Self::of_kind(tracker, id, OperationKind::Data)
    }

    pub fn calculation(tracker: Tracker, id: impl Into<OperationId>) -> Self {
        Self::of_kind(tracker, id, OperationKind::Calculation)
    }

    pub fn form(tracker: Tracker, id: impl Into<OperationId>) -> Self {
        Self::of_kind(tracker, id, OperationKind::Form)
    }

    /// Override start options. A kind set here wins over the constructor's.
    pub fn with_options(mut self, options: StartOptions) -> Self {
        let kind = options.kind.or(self.options.kind);
        self.options = options;
        self.options.kind = kind;
        self
    }

    /// Stages to step through, one per `tick`, while the work is pending.
    /// Ticks shorter than 1ms are raised to 1ms.
    pub fn with_stages<I, S>(mut self, stages: I, tick: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stages = stages.into_iter().map(Into::into).collect();
        self.tick = tick.max(MIN_TICK);
        self
    }

    pub fn id(&self) -> &OperationId {
        &self.id
    }

    /// Start the record and drive `work` to completion.
    #[tracing::instrument(skip(self, work), fields(operation = %self.id))]
    pub async fn run<F, T, E>(&self, work: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.tracker.start(&self.id, self.options.clone());
        self.drive(work).await
    }

    /// Mark a retry on the existing record and drive `work` again.
    #[tracing::instrument(skip(self, work), fields(operation = %self.id))]
    pub async fn retry_with<F, T, E>(&self, work: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.tracker.retry(self.id.as_str());
        self.drive(work).await
    }

    async fn drive<F, T, E>(&self, work: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let id = self.id.as_str();
        tokio::pin!(work);

        let result = if self.stages.is_empty() {
            work.await
        } else {
            let mut ticker = tokio::time::interval(self.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;

            let mut next = 0;
            loop {
                tokio::select! {
                    biased;
                    result = &mut work => break result,
                    _ = ticker.tick(), if next < self.stages.len() => {
                        let progress = stage_progress(next, self.stages.len());
                        self.tracker
                            .update_progress(id, progress, Some(self.stages[next].as_str()));
                        next += 1;
                    }
                }
            }
        };

        match &result {
            Ok(_) => self.tracker.finish(id),
            Err(e) => self.tracker.set_error(id, e.to_string()),
        }
        result
    }
}

/// Progress shown when entering stage `index` of `count`; never reaches 100.
fn stage_progress(index: usize, count: usize) -> f64 {
    ((index + 1) * 100) as f64 / (count + 1) as f64
}

//! Tracker: the facade that owns records, budgets and alerts.
//!
//! Every mutation takes the state lock once, applies one action plus its
//! derived follow-ups (estimate refresh, budget evaluation, alerts) and queues
//! the resulting events in commit order. Events are delivered after the lock
//! is released, by one drainer at a time, so every observer sees them in the
//! order the state changed. Observers may call back into the tracker; events
//! from a nested mutation are delivered after the one being handled.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::builder::TrackerBuilder;
use super::config::TrackerConfig;
use super::observer::{Observers, Scope, Subscription};
use crate::alerts::AlertLog;
use crate::domain::{
    Alert, AlertId, AlertLevel, BudgetBook, BudgetEvaluation, ErrorRateMode, MetricSample,
    OperationId, OperationRecord, PerformanceBudget, StartOptions, TrackerError, TrackerEvent,
    evaluate,
};
use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};
use crate::report::{MetricsExport, PerformanceReport, Reporter};
use crate::store::{Action, Dispatched, RecordStore, Snapshot};

/// Operation lifecycle tracker.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<TrackerState>,
    observers: Arc<Mutex<Observers>>,
    events: broadcast::Sender<TrackerEvent>,
    clock: Arc<dyn Clock>,
    config: TrackerConfig,
    reporter: Reporter,
}

struct TrackerState {
    store: RecordStore,
    budgets: BudgetBook,
    alerts: AlertLog,
    outbox: Outbox,
}

/// Events committed but not yet delivered.
#[derive(Default)]
struct Outbox {
    queue: VecDeque<TrackerEvent>,
    draining: bool,
}

impl Outbox {
    /// Queue `events`. True when the caller must drain.
    fn enqueue(&mut self, events: impl IntoIterator<Item = TrackerEvent>) -> bool {
        self.queue.extend(events);
        if self.draining || self.queue.is_empty() {
            return false;
        }
        self.draining = true;
        true
    }

    /// Next event to deliver; releases the drainer role once empty.
    fn next(&mut self) -> Option<TrackerEvent> {
        let event = self.queue.pop_front();
        if event.is_none() {
            self.draining = false;
        }
        event
    }
}

/// Hands the drainer role back if a callback panics mid-delivery.
struct DrainReset<'a>(&'a Inner);

impl Drop for DrainReset<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.lock_state().outbox.draining = false;
        }
    }
}

/// What kind of change an action makes, as far as events and alerts care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Started,
    Progressed,
    Finished,
    Failed,
    Retrying,
    Measured,
    Counted,
    Removed,
}

impl Transition {
    fn of(action: &Action) -> Self {
        match action {
            Action::Start { .. } => Transition::Started,
            Action::UpdateProgress { .. } | Action::RefreshEstimate { .. } => {
                Transition::Progressed
            }
            Action::Finish { .. } => Transition::Finished,
            Action::SetError { .. } => Transition::Failed,
            Action::Retry { .. } => Transition::Retrying,
            Action::RecordMetric { .. } => Transition::Measured,
            Action::RecordSuccess { .. } | Action::RecordError { .. } => Transition::Counted,
            Action::Clear { .. } | Action::ClearAll => Transition::Removed,
        }
    }

    /// Transitions after which the record is checked against its budget.
    fn evaluates(self) -> bool {
        matches!(
            self,
            Transition::Finished | Transition::Failed | Transition::Measured
        )
    }

    fn event(self, id: &OperationId, record: &OperationRecord) -> Option<TrackerEvent> {
        let id = id.clone();
        Some(match self {
            Transition::Started => TrackerEvent::Started { id },
            Transition::Progressed => TrackerEvent::Progressed {
                id,
                progress: record.progress,
                stage: record.stage.clone(),
            },
            Transition::Finished => TrackerEvent::Finished { id },
            Transition::Failed => TrackerEvent::Failed {
                id,
                error: record.error.clone().unwrap_or_default(),
            },
            Transition::Retrying => TrackerEvent::Retrying {
                id,
                retry_count: record.retry_count,
            },
            Transition::Measured | Transition::Counted => TrackerEvent::MetricsUpdated { id },
            Transition::Removed => return None,
        })
    }

    fn log(self, id: &OperationId, record: &OperationRecord) {
        match self {
            Transition::Started => debug!(
                operation = %id,
                kind = %record.kind,
                stage = %record.stage,
                retry_count = record.retry_count,
                "operation started"
            ),
            Transition::Progressed => debug!(
                operation = %id,
                progress = record.progress,
                stage = %record.stage,
                "progress updated"
            ),
            Transition::Finished => info!(
                operation = %id,
                duration_ms = record.loading_duration.map(|d| d.as_millis() as u64),
                "operation finished"
            ),
            Transition::Failed => info!(
                operation = %id,
                error = record.error.as_deref().unwrap_or_default(),
                error_count = record.error_count,
                "operation failed"
            ),
            Transition::Retrying => info!(
                operation = %id,
                retry_count = record.retry_count,
                "operation retrying"
            ),
            Transition::Measured | Transition::Counted => debug!(
                operation = %id,
                success_rate = record.success_rate,
                "metrics updated"
            ),
            Transition::Removed => {}
        }
    }
}

impl TrackerState {
    fn apply(
        &mut self,
        action: Action,
        now: DateTime<Utc>,
        mode: ErrorRateMode,
    ) -> Vec<TrackerEvent> {
        let transition = Transition::of(&action);
        let name = action.name();

        let id = match self.store.dispatch(action, now) {
            Dispatched::Updated(id) => id,
            Dispatched::Removed(ids) => {
                debug!(count = ids.len(), "operations cleared");
                return ids
                    .into_iter()
                    .map(|id| TrackerEvent::Cleared { id })
                    .collect();
            }
            Dispatched::Ignored => {
                debug!(action = name, "ignored action for unknown operation");
                return Vec::new();
            }
        };

        if transition == Transition::Progressed {
            self.store
                .dispatch(Action::RefreshEstimate { id: id.clone() }, now);
        }

        let (event, pending) = {
            let Some(record) = self.store.get(id.as_str()) else {
                return Vec::new();
            };
            transition.log(&id, record);
            (
                transition.event(&id, record),
                self.pending_alerts(transition, &id, record, mode),
            )
        };

        let mut events: Vec<TrackerEvent> = event.into_iter().collect();
        if !pending.is_empty() {
            events.extend(self.prune_alerts(now));
            for (level, message) in pending {
                events.push(self.raise(level, message, &id, now));
            }
        }
        events
    }

    fn pending_alerts(
        &self,
        transition: Transition,
        id: &OperationId,
        record: &OperationRecord,
        mode: ErrorRateMode,
    ) -> Vec<(AlertLevel, String)> {
        let mut pending = Vec::new();
        if transition == Transition::Failed {
            let message = record.error.as_deref().unwrap_or("unknown error");
            pending.push((AlertLevel::Error, format!("{id} failed: {message}")));
        }
        if !transition.evaluates() {
            return pending;
        }

        let evaluation = self
            .budgets
            .resolve(id.as_str(), record)
            .map(|budget| evaluate(record, budget, mode));
        if let Some(evaluation) = &evaluation {
            pending.extend(evaluation.candidate_alerts(id.as_str()));
        }

        if transition == Transition::Finished
            && record.retry_count > 0
            && evaluation
                .as_ref()
                .is_none_or(BudgetEvaluation::is_within_budget)
        {
            let retries = record.retry_count;
            let noun = if retries == 1 { "retry" } else { "retries" };
            pending.push((
                AlertLevel::Info,
                format!("{id} recovered after {retries} {noun}"),
            ));
        }
        pending
    }

    fn raise(
        &mut self,
        level: AlertLevel,
        message: String,
        component: &OperationId,
        now: DateTime<Utc>,
    ) -> TrackerEvent {
        let alert = self.alerts.add(level, message, component, now);
        match alert.level {
            AlertLevel::Error => {
                error!(operation = %component, alert = %alert.id, "{}", alert.message)
            }
            AlertLevel::Warning => {
                warn!(operation = %component, alert = %alert.id, "{}", alert.message)
            }
            AlertLevel::Info => {
                info!(operation = %component, alert = %alert.id, "{}", alert.message)
            }
        }
        TrackerEvent::AlertRaised { alert }
    }

    fn prune_alerts(&mut self, now: DateTime<Utc>) -> Option<TrackerEvent> {
        let count = self.alerts.prune_expired(now);
        (count > 0).then(|| {
            debug!(count, "info alerts expired");
            TrackerEvent::AlertsExpired { count }
        })
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the state lock, queue the events it returns, then
    /// deliver the queue unless another caller is already doing so.
    fn commit<T, E>(&self, f: impl FnOnce(&mut TrackerState) -> (T, E)) -> T
    where
        E: IntoIterator<Item = TrackerEvent>,
    {
        let (value, drain) = {
            let mut state = self.lock_state();
            let (value, events) = f(&mut state);
            (value, state.outbox.enqueue(events))
        };
        if drain {
            self.drain();
        }
        value
    }

    fn drain(&self) {
        let _reset = DrainReset(self);
        loop {
            let next = self.lock_state().outbox.next();
            let Some(event) = next else {
                break;
            };
            self.deliver(event);
        }
    }

    /// Must be called without the state lock held.
    fn deliver(&self, event: TrackerEvent) {
        let callbacks = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .matching(&event);
        for callback in callbacks {
            callback(&event);
        }
        // no receivers is not an error
        let _ = self.events.send(event);
    }
}

impl Tracker {
    /// Start configuring a tracker.
    pub fn builder() -> TrackerBuilder {
        TrackerBuilder::new()
    }

    /// Assemble a tracker from an already validated configuration.
    pub(crate) fn from_parts(
        config: TrackerConfig,
        clock: Arc<dyn Clock>,
        ids: Box<dyn IdGenerator>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_channel_capacity);
        let reporter = Reporter {
            error_rate_mode: config.error_rate_mode,
            worst_performers_limit: config.report_worst_performers,
            alert_limit: config.report_alert_limit,
        };
        let state = TrackerState {
            store: RecordStore::new(),
            budgets: BudgetBook::new(config.kind_budgets.clone()),
            alerts: AlertLog::new(config.alert_capacity, config.info_alert_ttl(), ids),
            outbox: Outbox::default(),
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                observers: Arc::new(Mutex::new(Observers::default())),
                events,
                clock,
                config,
                reporter,
            }),
        }
    }

    /// Configuration the tracker was built with.
    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    /// Current time on the tracker's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    fn apply(&self, action: Action) {
        let now = self.inner.clock.now();
        let mode = self.inner.config.error_rate_mode;
        self.inner.commit(|state| ((), state.apply(action, now, mode)));
    }

    // ---- mutations ----

    /// Begin (or restart) tracking `id`.
    pub fn start(&self, id: impl Into<OperationId>, options: impl Into<StartOptions>) {
        self.apply(Action::Start {
            id: id.into(),
            options: options.into(),
        });
    }

    /// Report progress; out-of-range values are clamped into `[0, 100]`.
    pub fn update_progress(&self, id: &str, progress: f64, stage: Option<&str>) {
        self.apply(Action::UpdateProgress {
            id: id.into(),
            progress,
            stage: stage.map(str::to_owned),
        });
    }

    /// Close the current attempt as a success at 100%.
    pub fn finish(&self, id: &str) {
        self.apply(Action::Finish { id: id.into() });
    }

    /// Close the current attempt as failed and raise an error alert.
    pub fn set_error(&self, id: &str, message: impl Into<String>) {
        self.apply(Action::SetError {
            id: id.into(),
            message: message.into(),
        });
    }

    /// Reopen `id` for another attempt, keeping its progress.
    pub fn retry(&self, id: &str) {
        self.apply(Action::Retry { id: id.into() });
    }

    /// Count a success without touching the lifecycle.
    pub fn record_success(&self, id: &str) {
        self.apply(Action::RecordSuccess { id: id.into() });
    }

    /// Count an error without touching the lifecycle.
    pub fn record_error(&self, id: &str) {
        self.apply(Action::RecordError { id: id.into() });
    }

    /// Merge an externally measured sample and re-check the budget.
    pub fn record_metric(&self, id: &str, sample: MetricSample) {
        self.apply(Action::RecordMetric {
            id: id.into(),
            sample,
        });
    }

    /// Forget `id`. Later updates for it are ignored until it starts again.
    pub fn clear(&self, id: &str) {
        self.apply(Action::Clear { id: id.into() });
    }

    /// Forget every record. Budgets and alerts are kept.
    pub fn clear_all(&self) {
        self.apply(Action::ClearAll);
    }

    /// Attach an explicit budget to `id`, replacing any previous one.
    pub fn set_budget(
        &self,
        id: impl Into<OperationId>,
        budget: PerformanceBudget,
    ) -> Result<(), TrackerError> {
        budget.validate()?;
        let id = id.into();
        debug!(operation = %id, max_loading_time_ms = budget.max_loading_time.as_millis() as u64, "budget set");
        self.inner.lock_state().budgets.set(id, budget);
        Ok(())
    }

    /// Drop the explicit budget for `id`, returning it if there was one.
    pub fn remove_budget(&self, id: &str) -> Option<PerformanceBudget> {
        self.inner.lock_state().budgets.remove(id)
    }

    // ---- queries ----

    /// Copy of the current record for `id`.
    pub fn get_by_id(&self, id: &str) -> Option<OperationRecord> {
        self.inner.lock_state().store.get(id).cloned()
    }

    /// Point-in-time view of every record; unaffected by later changes.
    pub fn snapshot(&self) -> Snapshot {
        self.inner.lock_state().store.snapshot()
    }

    /// True while at least one operation is in flight.
    pub fn is_any_loading(&self) -> bool {
        self.snapshot().is_any_loading()
    }

    /// Ids of in-flight operations, in id order.
    pub fn loading_ids(&self) -> Vec<OperationId> {
        self.snapshot().loading_ids()
    }

    /// Estimate stored by the last progress update.
    pub fn get_estimated_time_remaining(&self, id: &str) -> Option<Duration> {
        self.inner
            .lock_state()
            .store
            .get(id)
            .and_then(|r| r.estimated_time_remaining)
    }

    /// Budget that applies to `id`: its explicit one, else its kind's.
    pub fn budget_for(&self, id: &str) -> Option<PerformanceBudget> {
        let state = self.inner.lock_state();
        match state.store.get(id) {
            Some(record) => state.budgets.resolve(id, record).cloned(),
            None => state.budgets.explicit(id).cloned(),
        }
    }

    /// `None` when `id` is unknown or no budget applies to it.
    pub fn get_budget_status(&self, id: &str) -> Option<BudgetEvaluation> {
        let state = self.inner.lock_state();
        let record = state.store.get(id)?;
        let budget = state.budgets.resolve(id, record)?;
        Some(evaluate(record, budget, self.inner.config.error_rate_mode))
    }

    /// Every record and explicit budget, stamped with the current time.
    pub fn export_metrics(&self) -> MetricsExport {
        let now = self.inner.clock.now();
        let state = self.inner.lock_state();
        self.inner
            .reporter
            .export(&state.store.snapshot(), &state.budgets, now)
    }

    /// Stats, ranking and recent alerts over the current state.
    pub fn generate_report(&self) -> PerformanceReport {
        let now = self.inner.clock.now();
        let reporter = &self.inner.reporter;
        let report = self.inner.commit(|state| {
            let expired = state.prune_alerts(now);
            let recent = state.alerts.recent(reporter.alert_limit);
            let report = reporter.generate(&state.store.snapshot(), &state.budgets, recent, now);
            (report, expired)
        });
        debug!(
            components = report.summary.total_components,
            with_issues = report.summary.components_with_issues,
            "performance report generated"
        );
        report
    }

    // ---- alerts ----

    fn with_alerts<T>(&self, f: impl FnOnce(&mut AlertLog) -> T) -> T {
        let now = self.inner.clock.now();
        self.inner.commit(|state| {
            let expired = state.prune_alerts(now);
            (f(&mut state.alerts), expired)
        })
    }

    /// Every live alert, newest first.
    pub fn alerts(&self) -> Vec<Alert> {
        self.with_alerts(|log| log.iter().cloned().collect())
    }

    /// At most `limit` live alerts, newest first.
    pub fn recent_alerts(&self, limit: usize) -> Vec<Alert> {
        self.with_alerts(|log| log.recent(limit))
    }

    /// Live alerts raised for `id`, newest first.
    pub fn alerts_for(&self, id: &str) -> Vec<Alert> {
        self.with_alerts(|log| log.for_component(id))
    }

    /// False when no live alert has this id.
    pub fn dismiss_alert(&self, id: &AlertId) -> bool {
        self.with_alerts(|log| log.dismiss(id)).is_some()
    }

    /// Drop every alert. Returns how many were removed.
    pub fn clear_alerts(&self) -> usize {
        self.with_alerts(AlertLog::clear)
    }

    /// Drop expired info alerts now. Returns how many were removed.
    pub fn purge_expired_alerts(&self) -> usize {
        let now = self.inner.clock.now();
        self.inner.commit(|state| {
            let expired = state.prune_alerts(now);
            let count = match &expired {
                Some(TrackerEvent::AlertsExpired { count }) => *count,
                _ => 0,
            };
            (count, expired)
        })
    }

    // ---- observation ----

    /// Call `callback` for every event about `id`, alerts included.
    pub fn on_change(
        &self,
        id: impl Into<OperationId>,
        callback: impl Fn(&TrackerEvent) + Send + Sync + 'static,
    ) -> Subscription {
        Subscription::register(
            &self.inner.observers,
            Scope::Operation(id.into()),
            Arc::new(callback),
        )
    }

    /// Call `callback` for every event.
    pub fn on_any_change(
        &self,
        callback: impl Fn(&TrackerEvent) + Send + Sync + 'static,
    ) -> Subscription {
        Subscription::register(&self.inner.observers, Scope::Any, Arc::new(callback))
    }

    /// Receive every event from now on. Slow receivers see `Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.inner.events.subscribe()
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::from_parts(
            TrackerConfig::default(),
            Arc::new(SystemClock),
            Box::new(UlidGenerator),
        )
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("Tracker")
            .field("operations", &state.store.len())
            .field("alerts", &state.alerts.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BudgetVerdict, MetricOutcome, OperationKind, Violation};
    use crate::ports::FixedClock;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn tracker() -> (Tracker, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(t0()));
        let tracker = Tracker::builder().clock(clock.clone()).build().unwrap();
        (tracker, clock)
    }

    #[test]
    fn fetch_lifecycle_completes() {
        let (tracker, clock) = tracker();
        tracker.start("fetchA", OperationKind::Data);
        assert!(tracker.is_any_loading());
        assert_eq!(tracker.loading_ids(), vec![OperationId::from("fetchA")]);

        clock.advance(Duration::from_millis(200));
        tracker.update_progress("fetchA", 50.0, Some("fetching"));
        let mid = tracker.get_by_id("fetchA").unwrap();
        assert_eq!(mid.progress, 50.0);
        assert_eq!(mid.stage, "fetching");

        clock.advance(Duration::from_millis(200));
        tracker.finish("fetchA");
        let done = tracker.get_by_id("fetchA").unwrap();
        assert!(!done.is_loading);
        assert_eq!(done.progress, 100.0);
        assert_eq!(done.stage, "completed");
        assert_eq!(done.loading_duration, Some(Duration::from_millis(400)));
        assert_eq!(done.success_count, 1);
        assert!(!tracker.is_any_loading());
    }

    #[test]
    fn progress_is_clamped() {
        let (tracker, _) = tracker();
        tracker.start("x", StartOptions::new());
        tracker.update_progress("x", 150.0, None);
        assert_eq!(tracker.get_by_id("x").unwrap().progress, 100.0);
        tracker.update_progress("x", -3.0, None);
        assert_eq!(tracker.get_by_id("x").unwrap().progress, 0.0);
    }

    #[test]
    fn estimate_extrapolates_linearly() {
        let (tracker, clock) = tracker();
        tracker.start("x", StartOptions::new());
        clock.advance(Duration::from_secs(1));
        tracker.update_progress("x", 25.0, None);
        assert_eq!(
            tracker.get_estimated_time_remaining("x"),
            Some(Duration::from_secs(3))
        );
        tracker.finish("x");
        assert_eq!(tracker.get_estimated_time_remaining("x"), None);
    }

    #[test]
    fn slow_finish_exceeds_budget_and_warns() {
        let (tracker, clock) = tracker();
        tracker
            .set_budget("calcB", PerformanceBudget::new(Duration::from_millis(1000)))
            .unwrap();
        tracker.start("calcB", OperationKind::Calculation);
        clock.advance(Duration::from_millis(2500));
        tracker.finish("calcB");

        let status = tracker.get_budget_status("calcB").unwrap();
        assert_eq!(status.verdict, BudgetVerdict::Exceeded);
        assert!(matches!(
            status.violations.as_slice(),
            [Violation::LoadingTime { .. }]
        ));

        let alerts = tracker.alerts_for("calcB");
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Warning);
        assert!(alerts[0].message.contains("by 1500ms"), "{}", alerts[0].message);
    }

    #[test]
    fn set_error_raises_error_alert_and_counts() {
        let (tracker, _) = tracker();
        tracker.start("calcB", StartOptions::new());
        tracker.set_error("calcB", "boom");

        let record = tracker.get_by_id("calcB").unwrap();
        assert!(!record.is_loading);
        assert_eq!(record.error.as_deref(), Some("boom"));
        assert_eq!(record.error_count, 1);
        assert_eq!(record.success_rate, 95.0);

        let alerts = tracker.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Error);
        assert_eq!(alerts[0].message, "calcB failed: boom");
    }

    #[test]
    fn no_budget_means_no_status() {
        let (tracker, _) = tracker();
        tracker.start("x", StartOptions::new());
        assert!(tracker.get_budget_status("x").is_none());
        assert!(tracker.get_budget_status("missing").is_none());
    }

    #[test]
    fn kind_budget_applies_without_explicit_one() {
        let clock = Arc::new(FixedClock::new(t0()));
        let config = TrackerConfig::default().with_kind_budget(
            OperationKind::Form,
            PerformanceBudget::new(Duration::from_millis(100)),
        );
        let tracker = Tracker::builder()
            .config(config)
            .clock(clock.clone())
            .build()
            .unwrap();

        tracker.start("submit", OperationKind::Form);
        clock.advance(Duration::from_millis(300));
        tracker.finish("submit");
        assert_eq!(
            tracker.get_budget_status("submit").map(|s| s.verdict),
            Some(BudgetVerdict::Exceeded)
        );
        assert_eq!(
            tracker.budget_for("submit").map(|b| b.max_loading_time),
            Some(Duration::from_millis(100))
        );
    }

    #[test]
    fn invalid_budget_is_rejected() {
        let (tracker, _) = tracker();
        let err = tracker
            .set_budget("x", PerformanceBudget::new(Duration::ZERO))
            .unwrap_err();
        assert!(matches!(err, TrackerError::InvalidBudget(_)));
        assert!(tracker.budget_for("x").is_none());
    }

    #[test]
    fn clear_removes_record_and_ignores_stale_updates() {
        let (tracker, _) = tracker();
        tracker.start("x", StartOptions::new());
        tracker.clear("x");
        assert!(tracker.get_by_id("x").is_none());

        tracker.update_progress("x", 40.0, None);
        tracker.finish("x");
        assert!(tracker.get_by_id("x").is_none());
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn clear_all_empties_store() {
        let (tracker, _) = tracker();
        for id in ["a", "b", "c"] {
            tracker.start(id, StartOptions::new());
        }
        tracker.clear_all();
        assert!(tracker.snapshot().is_empty());
        assert!(!tracker.is_any_loading());
    }

    #[test]
    fn retry_increments_and_restart_preserves_count() {
        let (tracker, _) = tracker();
        tracker.start("x", StartOptions::new());
        for _ in 0..4 {
            tracker.set_error("x", "flaky");
            tracker.retry("x");
        }
        let record = tracker.get_by_id("x").unwrap();
        assert_eq!(record.retry_count, 4);
        assert!(record.is_loading);
        assert_eq!(record.stage, "retrying");

        tracker.start("x", StartOptions::new());
        assert_eq!(tracker.get_by_id("x").unwrap().retry_count, 4);

        tracker.clear("x");
        tracker.start("x", StartOptions::new());
        assert_eq!(tracker.get_by_id("x").unwrap().retry_count, 0);
    }

    #[test]
    fn info_alert_expires_after_ttl() {
        let (tracker, clock) = tracker();
        let expired = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&expired);
        let _sub = tracker.on_any_change(move |event| {
            if let TrackerEvent::AlertsExpired { count } = event {
                seen.fetch_add(*count, Ordering::SeqCst);
            }
        });

        tracker.start("x", StartOptions::new());
        tracker.set_error("x", "first try");
        tracker.retry("x");
        tracker.finish("x");

        let alerts = tracker.alerts();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].level, AlertLevel::Info);
        assert_eq!(alerts[0].message, "x recovered after 1 retry");

        clock.advance(Duration::from_millis(4999));
        assert_eq!(tracker.alerts().len(), 2);
        clock.advance(Duration::from_millis(2));
        let remaining = tracker.alerts();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].level, AlertLevel::Error);
        assert_eq!(expired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn alert_log_is_capped() {
        let (tracker, _) = tracker();
        for i in 0..150 {
            let id = format!("op{i}");
            tracker.start(id.as_str(), StartOptions::new());
            tracker.set_error(&id, "down");
        }
        let alerts = tracker.alerts();
        assert_eq!(alerts.len(), 100);
        assert_eq!(alerts[0].component.as_str(), "op149");
        assert_eq!(alerts[99].component.as_str(), "op50");
    }

    #[test]
    fn dismiss_and_clear_alerts() {
        let (tracker, _) = tracker();
        tracker.start("a", StartOptions::new());
        tracker.set_error("a", "x");
        tracker.start("b", StartOptions::new());
        tracker.set_error("b", "y");

        let first = tracker.alerts()[0].id.clone();
        assert!(tracker.dismiss_alert(&first));
        assert!(!tracker.dismiss_alert(&first));
        assert_eq!(tracker.alerts().len(), 1);
        assert_eq!(tracker.clear_alerts(), 1);
        assert!(tracker.alerts().is_empty());
    }

    #[test]
    fn purge_reports_removed_count() {
        let (tracker, clock) = tracker();
        tracker.start("x", StartOptions::new());
        tracker.set_error("x", "e");
        tracker.retry("x");
        tracker.finish("x");
        assert_eq!(tracker.purge_expired_alerts(), 0);
        clock.advance(Duration::from_secs(6));
        assert_eq!(tracker.purge_expired_alerts(), 1);
        assert_eq!(tracker.purge_expired_alerts(), 0);
    }

    #[test]
    fn metric_sample_updates_duration_and_evaluates() {
        let (tracker, _) = tracker();
        tracker
            .set_budget("render", PerformanceBudget::new(Duration::from_millis(16)))
            .unwrap();
        tracker.start("render", OperationKind::Navigation);
        tracker.record_metric(
            "render",
            MetricSample::duration(Duration::from_millis(40)).with_outcome(MetricOutcome::Success),
        );

        let record = tracker.get_by_id("render").unwrap();
        assert_eq!(record.loading_duration, Some(Duration::from_millis(40)));
        assert_eq!(record.success_count, 1);
        assert_eq!(tracker.alerts_for("render").len(), 1);
    }

    #[test]
    fn record_success_and_error_adjust_rate() {
        let (tracker, _) = tracker();
        tracker.start("x", StartOptions::new());
        tracker.record_error("x");
        tracker.record_error("x");
        tracker.record_success("x");
        let record = tracker.get_by_id("x").unwrap();
        assert_eq!(record.error_count, 2);
        assert_eq!(record.success_rate, 91.0);
    }

    #[test]
    fn scoped_observer_sees_only_its_operation() {
        let (tracker, _) = tracker();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let sub = tracker.on_change("a", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tracker.start("a", StartOptions::new());
        tracker.start("b", StartOptions::new());
        tracker.update_progress("a", 10.0, None);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        drop(sub);
        tracker.finish("a");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn observer_may_call_back_into_tracker() {
        let (tracker, _) = tracker();
        let reader = tracker.clone();
        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&observed);
        let _sub = tracker.on_change("x", move |_| {
            let progress = reader.get_by_id("x").map(|r| r.progress);
            sink.lock().unwrap().push(progress);
        });

        tracker.start("x", StartOptions::new());
        tracker.update_progress("x", 30.0, None);
        tracker.finish("x");
        assert_eq!(
            *observed.lock().unwrap(),
            vec![Some(0.0), Some(30.0), Some(100.0)]
        );
    }

    #[test]
    fn broadcast_receives_events_in_order() {
        let (tracker, _) = tracker();
        let mut rx = tracker.subscribe();
        tracker.start("x", StartOptions::new());
        tracker.update_progress("x", 50.0, Some("half"));
        tracker.set_error("x", "nope");
        tracker.clear("x");

        assert_eq!(rx.try_recv().unwrap(), TrackerEvent::Started { id: "x".into() });
        assert_eq!(
            rx.try_recv().unwrap(),
            TrackerEvent::Progressed {
                id: "x".into(),
                progress: 50.0,
                stage: "half".into()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            TrackerEvent::Failed {
                id: "x".into(),
                error: "nope".into()
            }
        );
        assert!(matches!(rx.try_recv().unwrap(), TrackerEvent::AlertRaised { .. }));
        assert_eq!(rx.try_recv().unwrap(), TrackerEvent::Cleared { id: "x".into() });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn ignored_actions_emit_nothing() {
        let (tracker, _) = tracker();
        let mut rx = tracker.subscribe();
        tracker.finish("ghost");
        tracker.retry("ghost");
        tracker.clear("ghost");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn report_ranks_worst_first() {
        let (tracker, clock) = tracker();
        for (id, ms) in [("fast", 100), ("slow", 2000), ("mid", 900)] {
            tracker
                .set_budget(id, PerformanceBudget::new(Duration::from_millis(1000)))
                .unwrap();
            tracker.start(id, StartOptions::new());
            clock.advance(Duration::from_millis(ms));
            tracker.finish(id);
        }

        let report = tracker.generate_report();
        assert_eq!(report.summary.total_components, 3);
        assert_eq!(report.summary.components_with_issues, 1);
        assert_eq!(report.worst_performers[0].id.as_str(), "slow");
        assert_eq!(report.recent_alerts.len(), 1);
        assert_eq!(report.metrics.budgets.len(), 3);
    }

    #[test]
    fn vanishing_progress_keeps_tracker_usable() {
        let (tracker, clock) = tracker();
        let mut rx = tracker.subscribe();
        tracker.start("x", StartOptions::new());
        clock.advance(Duration::from_secs(1));
        tracker.update_progress("x", 1e-20, None);

        assert_eq!(tracker.get_estimated_time_remaining("x"), Some(Duration::MAX));
        assert_eq!(rx.try_recv().unwrap(), TrackerEvent::Started { id: "x".into() });
        assert!(matches!(
            rx.try_recv().unwrap(),
            TrackerEvent::Progressed { .. }
        ));
    }

    #[test]
    fn report_survives_huge_measured_durations() {
        let (tracker, _) = tracker();
        tracker
            .set_budget("a", PerformanceBudget::new(Duration::from_secs(1)))
            .unwrap();
        for id in ["a", "b"] {
            tracker.start(id, StartOptions::new());
            tracker.record_metric(id, MetricSample::duration(Duration::MAX));
        }
        let report = tracker.generate_report();
        assert_eq!(report.overall_stats.avg_loading_time, Some(Duration::MAX));
        assert_eq!(report.worst_performers[0].id.as_str(), "a");
        assert_eq!(tracker.alerts_for("a")[0].level, AlertLevel::Warning);
    }

    #[test]
    fn failed_calculation_exceeds_error_rate_budget() {
        let (tracker, _) = tracker();
        tracker
            .set_budget("calcB", PerformanceBudget::default().with_max_error_rate(5.0))
            .unwrap();
        tracker.start("calcB", OperationKind::Calculation);
        tracker.set_error("calcB", "overflow");

        let status = tracker.get_budget_status("calcB").unwrap();
        assert_eq!(status.verdict, BudgetVerdict::Exceeded);
        assert!(
            status
                .violations
                .iter()
                .any(|v| matches!(v, Violation::ErrorRate { limit, .. } if *limit == 5.0)),
            "{:?}",
            status.violations
        );
    }

    #[test]
    fn export_metrics_holds_records_and_explicit_budgets() {
        let (tracker, clock) = tracker();
        tracker
            .set_budget("fetchA", PerformanceBudget::new(Duration::from_millis(500)))
            .unwrap();
        tracker.start("fetchA", OperationKind::Data);
        tracker.start("calcB", OperationKind::Calculation);
        clock.advance(Duration::from_millis(120));
        tracker.finish("fetchA");

        let export = tracker.export_metrics();
        assert_eq!(export.exported_at, t0() + chrono::TimeDelta::milliseconds(120));
        assert_eq!(export.records.len(), 2);
        assert_eq!(
            export.records.get("fetchA").and_then(|r| r.loading_duration),
            Some(Duration::from_millis(120))
        );
        assert!(export.records.get("calcB").unwrap().is_loading);
        assert_eq!(export.budgets.len(), 1);
        assert_eq!(
            export.budgets.get("fetchA").map(|b| b.max_loading_time),
            Some(Duration::from_millis(500))
        );
    }

    #[test]
    fn remove_budget_returns_it_and_stops_evaluation() {
        let (tracker, _) = tracker();
        let budget = PerformanceBudget::new(Duration::from_millis(800));
        tracker.set_budget("x", budget.clone()).unwrap();
        tracker.start("x", StartOptions::new());
        assert!(tracker.get_budget_status("x").is_some());

        assert_eq!(tracker.remove_budget("x"), Some(budget));
        assert!(tracker.get_budget_status("x").is_none());
        assert!(tracker.budget_for("x").is_none());
        assert_eq!(tracker.remove_budget("x"), None);
    }

    #[test]
    fn events_from_other_threads_wait_for_earlier_delivery() {
        let (tracker, _) = tracker();
        tracker.start("x", StartOptions::new());
        let mut rx = tracker.subscribe();

        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let gate = Mutex::new(Some((entered_tx, release_rx)));
        let _sub = tracker.on_change("x", move |event| {
            if !matches!(event, TrackerEvent::Progressed { progress, .. } if *progress == 10.0) {
                return;
            }
            let pair = gate.lock().unwrap().take();
            if let Some((entered, release)) = pair {
                entered.send(()).unwrap();
                release.recv().unwrap();
            }
        });

        let first = tracker.clone();
        let handle = std::thread::spawn(move || first.update_progress("x", 10.0, None));
        entered_rx.recv().unwrap();
        // committed while the first event is still being delivered
        tracker.update_progress("x", 20.0, None);
        release_tx.send(()).unwrap();
        handle.join().unwrap();

        let delivered: Vec<f64> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|event| match event {
                TrackerEvent::Progressed { progress, .. } => Some(progress),
                _ => None,
            })
            .collect();
        assert_eq!(delivered, vec![10.0, 20.0]);
    }

    #[test]
    fn nested_mutation_is_delivered_after_current_event() {
        let (tracker, _) = tracker();
        let writer = tracker.clone();
        let _sub = tracker.on_change("a", move |event| {
            if matches!(event, TrackerEvent::Finished { .. }) {
                writer.start("b", StartOptions::new());
            }
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _all = tracker.on_any_change(move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        tracker.start("a", StartOptions::new());
        tracker.finish("a");

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                TrackerEvent::Started { id: "a".into() },
                TrackerEvent::Finished { id: "a".into() },
                TrackerEvent::Started { id: "b".into() },
            ]
        );
        assert!(tracker.get_by_id("b").unwrap().is_loading);
    }

    #[test]
    fn snapshot_is_isolated_from_later_changes() {
        let (tracker, _) = tracker();
        tracker.start("x", StartOptions::new());
        let before = tracker.snapshot();
        tracker.finish("x");
        assert!(before.get("x").unwrap().is_loading);
        assert!(!tracker.get_by_id("x").unwrap().is_loading);
    }
}

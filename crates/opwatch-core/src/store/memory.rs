//! In-memory record store.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::Action;
use crate::domain::{OperationId, OperationRecord};

pub type Records = BTreeMap<OperationId, OperationRecord>;

/// Immutable view of every record at one point in time.
///
/// Cheap to clone; later mutations never show through an existing snapshot.
#[derive(Debug, Clone, Default)]
pub struct Snapshot(Arc<Records>);

impl Snapshot {
    pub fn get(&self, id: &str) -> Option<&OperationRecord> {
        self.0.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OperationId, &OperationRecord)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_any_loading(&self) -> bool {
        self.0.values().any(|r| r.is_loading)
    }

    pub fn loading_ids(&self) -> Vec<OperationId> {
        self.0
            .iter()
            .filter(|(_, r)| r.is_loading)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn records(&self) -> &Records {
        &self.0
    }
}

/// What a dispatched action did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// The record was created or changed.
    Updated(OperationId),
    /// These records were removed.
    Removed(Vec<OperationId>),
    /// The action targeted an absent record and was dropped.
    Ignored,
}

/// Single-writer record store.
///
/// Records live behind an `Arc`; the writer copies on write only while a
/// reader still holds an older snapshot.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Arc<Records>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(Arc::clone(&self.records))
    }

    pub fn get(&self, id: &str) -> Option<&OperationRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Apply one action at time `now`.
    ///
    /// Only `Start` creates records; every other action on an absent id is a
    /// silent no-op, including a stale update arriving after `Clear`.
    pub fn dispatch(&mut self, action: Action, now: DateTime<Utc>) -> Dispatched {
        match action {
            Action::Start { id, options } => {
                let records = Arc::make_mut(&mut self.records);
                let record = OperationRecord::started(options, records.get(id.as_str()), now);
                records.insert(id.clone(), record);
                Dispatched::Updated(id)
            }
            Action::UpdateProgress {
                id,
                progress,
                stage,
            } => self.update(id, |r| r.set_progress(progress, stage)),
            Action::RefreshEstimate { id } => self.update(id, |r| r.refresh_estimate(now)),
            Action::Finish { id } => self.update(id, |r| r.mark_finished(now)),
            Action::SetError { id, message } => self.update(id, |r| r.mark_failed(message, now)),
            Action::Retry { id } => self.update(id, |r| r.mark_retrying(now)),
            Action::RecordSuccess { id } => self.update(id, OperationRecord::count_success),
            Action::RecordError { id } => self.update(id, OperationRecord::count_error),
            Action::RecordMetric { id, sample } => self.update(id, |r| r.apply_metric(&sample)),
            Action::Clear { id } => {
                if !self.records.contains_key(id.as_str()) {
                    return Dispatched::Ignored;
                }
                Arc::make_mut(&mut self.records).remove(id.as_str());
                Dispatched::Removed(vec![id])
            }
            Action::ClearAll => {
                if self.records.is_empty() {
                    return Dispatched::Ignored;
                }
                let ids = self.records.keys().cloned().collect();
                self.records = Arc::new(Records::new());
                Dispatched::Removed(ids)
            }
        }
    }

    fn update(&mut self, id: OperationId, f: impl FnOnce(&mut OperationRecord)) -> Dispatched {
        if !self.records.contains_key(id.as_str()) {
            return Dispatched::Ignored;
        }
        if let Some(record) = Arc::make_mut(&mut self.records).get_mut(id.as_str()) {
            f(record);
        }
        Dispatched::Updated(id)
    }
}

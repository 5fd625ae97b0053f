//! Change observers.
//!
//! Callbacks are registered per operation id or for every change, and are
//! handed back a [`Subscription`]. Dropping the subscription unregisters the
//! callback, so a forgotten observer can never outlive its owner.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::domain::{OperationId, TrackerEvent};

pub type Callback = Arc<dyn Fn(&TrackerEvent) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Scope {
    Operation(OperationId),
    Any,
}

#[derive(Default)]
pub(crate) struct Observers {
    next_token: u64,
    by_operation: HashMap<OperationId, Vec<(u64, Callback)>>,
    any: Vec<(u64, Callback)>,
}

impl Observers {
    pub(crate) fn insert(&mut self, scope: &Scope, callback: Callback) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        match scope {
            Scope::Operation(id) => self
                .by_operation
                .entry(id.clone())
                .or_default()
                .push((token, callback)),
            Scope::Any => self.any.push((token, callback)),
        }
        token
    }

    pub(crate) fn remove(&mut self, scope: &Scope, token: u64) {
        match scope {
            Scope::Operation(id) => {
                if let Some(list) = self.by_operation.get_mut(id.as_str()) {
                    list.retain(|(t, _)| *t != token);
                    if list.is_empty() {
                        self.by_operation.remove(id.as_str());
                    }
                }
            }
            Scope::Any => self.any.retain(|(t, _)| *t != token),
        }
    }

    /// Callbacks interested in `event`, operation-scoped ones first.
    pub(crate) fn matching(&self, event: &TrackerEvent) -> Vec<Callback> {
        let scoped = event
            .operation_id()
            .and_then(|id| self.by_operation.get(id.as_str()))
            .into_iter()
            .flatten();
        scoped
            .chain(self.any.iter())
            .map(|(_, cb)| Arc::clone(cb))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.any.len() + self.by_operation.values().map(Vec::len).sum::<usize>()
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("operations", &self.by_operation.len())
            .field("total", &self.len())
            .finish()
    }
}

/// Handle for a registered observer. Unsubscribes on drop.
#[must_use = "dropping a Subscription unregisters the observer immediately"]
pub struct Subscription {
    token: u64,
    scope: Scope,
    observers: Weak<Mutex<Observers>>,
}

impl Subscription {
    pub(crate) fn register(
        observers: &Arc<Mutex<Observers>>,
        scope: Scope,
        callback: Callback,
    ) -> Self {
        let token = observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(&scope, callback);
        Self {
            token,
            scope,
            observers: Arc::downgrade(observers),
        }
    }

    /// Unregister now instead of at drop.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(observers) = self.observers.upgrade() {
            observers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.scope, self.token);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("token", &self.token)
            .field("scope", &self.scope)
            .finish()
    }
}

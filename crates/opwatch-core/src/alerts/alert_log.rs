//! Bounded alert log.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::domain::{Alert, AlertId, AlertLevel, OperationId};
use crate::ports::IdGenerator;

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_INFO_TTL: Duration = Duration::from_secs(5);

/// Newest-first buffer of alerts.
///
/// Holds at most `capacity` entries; inserting into a full log evicts the
/// oldest. Info alerts expire `info_ttl` after their own insertion; expiry is
/// keyed by alert id, so it never touches entries added later. Warning and
/// error alerts stay until dismissed, cleared, or evicted.
pub struct AlertLog {
    entries: VecDeque<Alert>,
    capacity: usize,
    info_ttl: TimeDelta,
    ids: Box<dyn IdGenerator>,
}

impl AlertLog {
    pub fn new(capacity: usize, info_ttl: Duration, ids: Box<dyn IdGenerator>) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
            info_ttl: TimeDelta::from_std(info_ttl).unwrap_or(TimeDelta::MAX),
            ids,
        }
    }

    /// Insert a new alert and return a copy of it.
    ///
    /// Expired entries are not pruned here; callers run `prune_expired` so
    /// they can observe how many went away.
    pub fn add(
        &mut self,
        level: AlertLevel,
        message: impl Into<String>,
        component: &OperationId,
        now: DateTime<Utc>,
    ) -> Alert {
        let alert = Alert {
            id: self.ids.generate_alert_id(component, now),
            level,
            message: message.into(),
            timestamp: now,
            component: component.clone(),
        };
        self.entries.push_front(alert.clone());
        self.entries.truncate(self.capacity);
        alert
    }

    /// Remove info alerts whose time is up. Returns how many were removed.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let ttl = self.info_ttl;
        self.entries
            .retain(|a| !(a.level.expires() && is_past(a.timestamp, ttl, now)));
        before - self.entries.len()
    }

    /// Remove one alert by id.
    pub fn dismiss(&mut self, id: &AlertId) -> Option<Alert> {
        let index = self.entries.iter().position(|a| &a.id == id)?;
        self.entries.remove(index)
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    /// Up to `limit` alerts, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Alert> {
        self.entries.iter().take(limit).cloned().collect()
    }

    pub fn for_component(&self, component: &str) -> Vec<Alert> {
        self.entries
            .iter()
            .filter(|a| a.component.as_str() == component)
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Alert> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for AlertLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertLog")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity)
            .field("info_ttl", &self.info_ttl)
            .finish()
    }
}

fn is_past(inserted: DateTime<Utc>, ttl: TimeDelta, now: DateTime<Utc>) -> bool {
    match inserted.checked_add_signed(ttl) {
        Some(deadline) => now >= deadline,
        None => false,
    }
}

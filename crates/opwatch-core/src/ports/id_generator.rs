//! IdGenerator port: alert id allocation.
//!
//! Alert ids combine the producing operation id with a ULID whose time part
//! is the alert's own timestamp, so ids sort by creation time and stay unique
//! even when one component raises several alerts within the same millisecond.

use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::domain::ids::{AlertId, OperationId};

pub trait IdGenerator: Send + Sync {
    fn generate_alert_id(&self, component: &OperationId, at: DateTime<Utc>) -> AlertId;
}

/// ULID based generator: timestamp from the alert, 80 random bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct UlidGenerator;

impl IdGenerator for UlidGenerator {
    fn generate_alert_id(&self, component: &OperationId, at: DateTime<Utc>) -> AlertId {
        let timestamp_ms = u64::try_from(at.timestamp_millis()).unwrap_or(0);
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        AlertId::from_parts(component, ulid)
    }
}

//! Domain identifiers.
//!
//! Operation ids are chosen by callers (`"fetch.listings"`, `"calc.sizing"`),
//! so they are plain strings behind a newtype. Alert ids are generated by the
//! tracker from the producing operation id and a timestamp-ordered ULID, which
//! keeps them unique per insertion and sortable by creation time.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifier of one trackable unit of asynchronous work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for OperationId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for OperationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&OperationId> for OperationId {
    fn from(value: &OperationId) -> Self {
        value.clone()
    }
}

// Lets maps keyed by `OperationId` be queried with a `&str`.
impl Borrow<str> for OperationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Identifier of one alert log entry: `{component}-{ulid}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(String);

impl AlertId {
    pub fn from_parts(component: &OperationId, ulid: Ulid) -> Self {
        Self(format!("{component}-{ulid}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

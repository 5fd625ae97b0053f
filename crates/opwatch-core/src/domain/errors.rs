//! Errors of the tracker itself.
//!
//! Failures of the operations being tracked are not represented here: they
//! stay in the caller's own error type and are only mirrored into the
//! record as a message.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("invalid budget: {0}")]
    InvalidBudget(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read configuration from {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

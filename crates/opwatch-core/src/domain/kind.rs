//! Operation kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What sort of work an operation represents.
///
/// The kind never changes how the tracker treats a record; it is carried for
/// consumers (which placeholder to render) and to pick a per-kind fallback
/// budget when an operation has none of its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// First load of a page or application shell.
    Initial,
    /// Route transition.
    Navigation,
    /// Data fetch.
    #[default]
    Data,
    /// Local or remote computation.
    Calculation,
    /// Form submission.
    Form,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Initial => "initial",
            OperationKind::Navigation => "navigation",
            OperationKind::Data => "data",
            OperationKind::Calculation => "calculation",
            OperationKind::Form => "form",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

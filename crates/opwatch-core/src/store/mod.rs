//! Operation record store: single dispatch point, immutable snapshots.

mod action;
mod memory;

pub use action::Action;
pub use memory::{Dispatched, RecordStore, Records, Snapshot};

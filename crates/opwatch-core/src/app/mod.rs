//! App layer: wires the store, budgets and alert log behind one facade.
//!
//! # Main components
//! - **TrackerBuilder**: configuration validation and port wiring
//! - **Tracker**: mutations, queries, reports, observers
//! - **OperationWrapper**: runs async work under tracking
//! - **AlertSweeper**: background expiry of info alerts

pub mod builder;
pub mod config;
pub mod observer;
pub mod sweeper;
pub mod tracker;
pub mod wrapper;

pub use self::builder::{BuildError, TrackerBuilder};
pub use self::config::TrackerConfig;
pub use self::observer::{Callback, Subscription};
pub use self::sweeper::AlertSweeper;
pub use self::tracker::Tracker;
pub use self::wrapper::OperationWrapper;

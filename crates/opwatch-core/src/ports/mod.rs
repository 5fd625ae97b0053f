//! Ports: the tracker's only outside collaborators.
//!
//! The core depends on a clock and an id source and nothing else (no network,
//! filesystem or database). Both are traits so tests can substitute them.

pub mod clock;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};

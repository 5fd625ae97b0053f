//! Alert log: bounded, newest first, with self-expiring info entries.

mod alert_log;

pub use alert_log::{AlertLog, DEFAULT_CAPACITY, DEFAULT_INFO_TTL};

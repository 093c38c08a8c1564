//! SeaORM entities backing the monitor.

pub mod alert_configuration;
pub mod check_outcome;
pub mod incident;
pub mod monitored_target;

/// Identity of a monitored target.
pub type TargetId = i32;

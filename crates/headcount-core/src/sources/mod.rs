//! Occupancy source implementations.

pub mod helpers;

pub mod command;
pub mod replay;

pub use command::{DEFAULT_STALE_AFTER, DetectorCommandConfig, DetectorCommandSource};
pub use replay::ReplaySource;

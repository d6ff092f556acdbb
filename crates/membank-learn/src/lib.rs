//! Usage tracking and adaptive signal weighting.
//!
//! Every search appends one `UsageRecord` to a JSONL log; the learn step
//! replays recent records and nudges the ranker's weight vector toward the
//! signals that predicted the user's selections. Updates are rate-limited
//! per step and clamped into a configured band, so a burst of one-sided
//! feedback cannot push either signal to an extreme.

pub mod adapt;
pub mod usage;

pub use adapt::{update_weights, WeightStore};
pub use usage::UsageTracker;

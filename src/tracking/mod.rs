//! Duration tracking and per-cycle decisions

pub mod decision;
pub mod duration;

pub use decision::{Decision, DecisionEngine, ALERT_TITLE};
pub use duration::{AccumulationMode, Advance, DurationTracker, ResetPolicy};

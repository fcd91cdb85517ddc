//! bedwatch: bedside pressure mapping and pressure-injury prevention
//!
//! ## Architecture
//!
//! - **Acquisition**: one reader thread per sensor board, feeding a shared board-state table
//! - **Processing**: raw grid assembly, heatmap merge, per-region pressure analysis
//! - **Posture**: template and learned classifiers behind one trait
//! - **Tracking**: per-region pressure durations, day totals and the reposition decision
//! - **Delivery**: remote/local persistence, actuator controller link, caregiver alerts
//! - **Pipeline**: the fixed-cadence cycle loop tying it together

pub mod acquisition;
pub mod config;
pub mod delivery;
pub mod pipeline;
pub mod posture;
pub mod processing;
pub mod storage;
pub mod tracking;
pub mod types;

// Re-export device configuration
pub use config::BedwatchConfig;

// Re-export commonly used types
pub use types::{
    AlertPayload, BodyRegion, ControlPacket, CycleResult, DayLog, Grid, PostureLabel, PressureLog, RegionMap,
    Thresholds,
};

// Re-export the cycle machinery
pub use pipeline::{CycleEngine, CycleLoop, LoopSettings};
pub use posture::{build_classifier, PostureClassifier};
pub use tracking::{DecisionEngine, DurationTracker};

//! Shared data structures for the pressure-monitoring pipeline
//!
//! - Acquisition: BoardId, BoardReading
//! - Processing: Grid (pressure grids and heatmaps)
//! - Classification: PostureLabel, BodyRegion, RegionMap, RiskFlags
//! - Decisions and delivery: Thresholds, DayLog, PressureLog, CycleResult,
//!   AlertPayload, ActuationSignal, ControlPacket

mod board;
mod grid;
mod posture;
mod records;

pub use board::*;
pub use grid::*;
pub use posture::*;
pub use records::*;

//! Monitoring pipeline
//!
//! ```text
//! every interval:
//!   acquire snapshot (timeout -> empty)
//!   assemble -> merge -> classify -> analyze -> track -> decide   (CycleEngine)
//!   broadcast heatmap, persist logs, send control packet, alert    (CycleLoop)
//! ```

pub mod cycle;
pub mod processing_loop;

pub use cycle::{CycleEngine, CycleOutput};
pub use processing_loop::{CycleLoop, LoopSettings, LoopStats};

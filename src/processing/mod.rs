//! Pressure map processing
//!
//! Snapshot -> head/body grids -> unified heatmap -> per-region pressure.
//! Everything here is a pure function of its inputs.

pub mod assembler;
pub mod heatmap;
pub mod regions;

pub use assembler::{assemble, PressureGrid, BODY_COLS, BODY_ROWS, HEAD_COLS, HEAD_ROWS};
pub use heatmap::{merge, merge_pressure_grid, resize, HeatmapError};
pub use regions::{analyze, region_mean, RegionRect};

/// Heatmap dimensions for the fixed board topology
pub const HEATMAP_ROWS: usize = HEAD_ROWS + BODY_ROWS;
pub const HEATMAP_COLS: usize = BODY_COLS;

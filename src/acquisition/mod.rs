//! Sensor data acquisition module
//!
//! Handles line ingestion from the mattress sensor boards: per-port reader
//! threads, line parsing, and the shared board-state table the cycle loop
//! snapshots from.

pub mod board_state;
pub mod manager;
pub mod parser;
pub mod serial;
pub mod simulated;
pub mod source;

pub use board_state::{BoardSnapshot, BoardStateTable};
pub use manager::{AcquisitionManager, ReaderSettings};
pub use parser::BoardLineParser;
pub use serial::{list_ports, SerialLineSource, SerialPortProvider};
pub use simulated::{SimulatedBoard, SimulatedProvider};
pub use source::{AcquisitionError, LineSource, SourceProvider};

//! System-wide default constants.
//!
//! Grouped by subsystem. The config sections in `bedwatch_config` fall back to
//! these values for any key absent from the TOML file.

// ============================================================================
// Acquisition
// ============================================================================

/// Serial bit rate used by the sensor boards.
pub const SERIAL_BAUD_RATE: u32 = 115_200;

/// Port-name fragments that identify candidate sensor boards during enumeration.
pub const SERIAL_PORT_PATTERNS: &[&str] = &["ttyUSB", "ttyACM", "usbmodem", "usbserial"];

/// Per-read timeout on a serial source (ms).
///
/// Bounds how long a reader thread takes to notice the stop flag.
pub const SERIAL_READ_TIMEOUT_MS: u64 = 500;

/// Window after opening a port during which lines are discarded (ms).
///
/// The boards reset when the port opens and print boot noise for ~2 s.
pub const SETTLE_WINDOW_MS: u64 = 2_000;

/// Bounded wait per reader thread when disconnecting (ms).
pub const JOIN_TIMEOUT_MS: u64 = 3_000;

/// Orchestrator wait for the first board report (ms).
pub const SNAPSHOT_TIMEOUT_MS: u64 = 2_000;

// ============================================================================
// Cycle
// ============================================================================

/// Fixed cycle interval (seconds).
pub const CYCLE_INTERVAL_SECS: f64 = 1.0;

/// Delay between reconnect attempts for sources and the actuator link (seconds).
pub const RECONNECT_INTERVAL_SECS: u64 = 5;

// ============================================================================
// Classification
// ============================================================================

/// Minimum cosine similarity for a template match.
pub const TEMPLATE_CONFIDENCE_FLOOR: f64 = 0.3;

/// Learned-model artifact file.
pub const MODEL_PATH: &str = "models/posture_model.json";

// ============================================================================
// Decisions
// ============================================================================

/// Per-region tolerated pressure duration when no patient record exists (minutes).
pub const DEFAULT_THRESHOLD_MINUTES: u32 = 120;

/// Instantaneous pressure above which a region triggers actuation.
pub const PRESSURE_CEILING: i32 = 300;

/// Pressure at which actuation intensity saturates.
pub const PRESSURE_SATURATION: i32 = 1_000;

/// Continuous duration above which a region triggers actuation (seconds).
pub const DURATION_CEILING_SECS: u64 = 300;

/// Actuation intensity bounds (percent).
pub const INTENSITY_MIN: u8 = 30;
pub const INTENSITY_MAX: u8 = 100;

// ============================================================================
// Delivery
// ============================================================================

/// Actuator controller address and port.
pub const CONTROL_NODE_ADDRESS: &str = "10.0.0.2";
pub const CONTROL_NODE_PORT: u16 = 24;

/// Time allowed for the actuator controller to acknowledge a packet (ms).
pub const CONTROL_ACK_TIMEOUT_MS: u64 = 5_000;

/// TCP connect timeout for the actuator link (ms).
pub const CONTROL_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// TCP keepalive idle time on the actuator link (seconds).
pub const TCP_KEEPALIVE_SECS: u64 = 30;

/// HTTP timeout for persistence and push requests (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 10;

/// Local sled database location.
pub const LOCAL_STORE_PATH: &str = "./data/bedwatch";

//! Device configuration: struct definitions, loading, overrides and validation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use crate::tracking::{AccumulationMode, ResetPolicy};

/// Top-level device configuration.
///
/// Loaded from TOML with every section optional. Search order:
/// 1. `$BEDWATCH_CONFIG` env var
/// 2. `./bedwatch.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BedwatchConfig {
    /// Device identification
    #[serde(default)]
    pub device: DeviceInfo,

    /// Sensor board enumeration and reader threads
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Cycle cadence and duration-tracking policy
    #[serde(default)]
    pub cycle: CycleConfig,

    /// Posture classifier selection
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Thresholds and actuation ceilings
    #[serde(default)]
    pub decision: DecisionConfig,

    /// Where day logs and pressure logs go
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Actuator controller link
    #[serde(default)]
    pub actuation: ActuationConfig,

    /// Caregiver push notifications
    #[serde(default)]
    pub notification: NotificationConfig,
}

impl BedwatchConfig {
    /// Load configuration using the standard search order.
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var("BEDWATCH_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), device = config.device.id, "Loaded config from BEDWATCH_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from BEDWATCH_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "BEDWATCH_CONFIG points to non-existent file, falling back");
            }
        }

        // 2. Check ./bedwatch.toml
        let local = PathBuf::from("bedwatch.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(device = config.device.id, "Loaded config from ./bedwatch.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./bedwatch.toml, using defaults");
                }
            }
        }

        // 3. Defaults
        info!("No bedwatch.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Apply the field-deployment environment variables on top of the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(key, value = %raw, "Ignoring unparseable environment override");
                    None
                }
            }
        }

        if let Some(id) = parsed("DEVICE_ID", lookup("DEVICE_ID")) {
            self.device.id = id;
        }
        if let Some(port) = lookup("SERIAL_PORT").filter(|p| !p.trim().is_empty()) {
            self.acquisition.ports = vec![port.trim().to_string()];
        }
        if let Some(baud) = parsed("SERIAL_BAUDRATE", lookup("SERIAL_BAUDRATE")) {
            self.acquisition.baud_rate = baud;
        }
        if let Some(url) = lookup("SUPABASE_URL") {
            self.persistence.supabase_url = url;
        }
        if let Some(key) = lookup("SUPABASE_KEY") {
            self.persistence.supabase_key = key;
        }
        if let Some(address) = lookup("CONTROL_NODE_ADDRESS") {
            self.actuation.address = address;
        }
        if let Some(port) = parsed("CONTROL_NODE_PORT", lookup("CONTROL_NODE_PORT")) {
            self.actuation.port = port;
        }
        if let Some(interval) = parsed("CYCLE_INTERVAL", lookup("CYCLE_INTERVAL")) {
            self.cycle.interval_secs = interval;
        }
        if let Some(url) = lookup("PUSH_WEBHOOK_URL").filter(|u| !u.trim().is_empty()) {
            self.notification.webhook_url = Some(url);
        }
    }

    /// Validate cross-field invariants. Returns every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if !(self.cycle.interval_secs.is_finite() && self.cycle.interval_secs > 0.0) {
            errors.push(format!(
                "cycle.interval_secs must be a positive number, got {}",
                self.cycle.interval_secs
            ));
        }
        if self.cycle.reconnect_interval_secs == 0 {
            errors.push("cycle.reconnect_interval_secs must be at least 1".to_string());
        }

        let acq = &self.acquisition;
        if acq.baud_rate == 0 {
            errors.push("acquisition.baud_rate must be non-zero".to_string());
        }
        if acq.read_timeout_ms == 0 {
            errors.push("acquisition.read_timeout_ms must be non-zero".to_string());
        }
        if acq.snapshot_timeout_ms == 0 {
            errors.push("acquisition.snapshot_timeout_ms must be non-zero".to_string());
        }
        if acq.ports.is_empty() && acq.port_patterns.is_empty() {
            errors.push("acquisition needs either explicit ports or port_patterns".to_string());
        }

        if !(0.0..=1.0).contains(&self.classifier.confidence_floor) {
            errors.push(format!(
                "classifier.confidence_floor ({}) must be within [0, 1]",
                self.classifier.confidence_floor
            ));
        }

        let d = &self.decision;
        if d.default_threshold_minutes == 0 {
            errors.push("decision.default_threshold_minutes must be at least 1".to_string());
        }
        if d.pressure_ceiling < 0 || d.pressure_ceiling >= defaults::PRESSURE_SATURATION {
            errors.push(format!(
                "decision.pressure_ceiling ({}) must be within [0, {})",
                d.pressure_ceiling,
                defaults::PRESSURE_SATURATION
            ));
        }

        if self.persistence.backend == PersistenceBackend::Supabase {
            if self.device.id == 0 {
                errors.push("device.id (DEVICE_ID) must be set for remote persistence".to_string());
            }
            if self.persistence.supabase_url.trim().is_empty() {
                errors.push("persistence.supabase_url (SUPABASE_URL) is required".to_string());
            }
            if self.persistence.supabase_key.trim().is_empty() {
                errors.push("persistence.supabase_key (SUPABASE_KEY) is required".to_string());
            }
        }

        if self.actuation.enabled && !self.actuation.mock {
            if self.actuation.address.trim().is_empty() {
                errors.push("actuation.address must not be empty".to_string());
            }
            if self.actuation.port == 0 {
                errors.push("actuation.port must be non-zero".to_string());
            }
        }
        if self.actuation.ack_timeout_ms == 0 {
            errors.push("actuation.ack_timeout_ms must be non-zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    /// Device identifier used for patient lookup and broadcast topics
    pub id: i64,
    pub name: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            id: 0,
            name: "bedwatch".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub baud_rate: u32,
    /// Explicit port paths; when non-empty, enumeration is skipped
    pub ports: Vec<String>,
    /// Name fragments matched against enumerated ports
    pub port_patterns: Vec<String>,
    pub read_timeout_ms: u64,
    pub settle_window_ms: u64,
    pub join_timeout_ms: u64,
    pub snapshot_timeout_ms: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            baud_rate: defaults::SERIAL_BAUD_RATE,
            ports: Vec::new(),
            port_patterns: defaults::SERIAL_PORT_PATTERNS.iter().map(|s| s.to_string()).collect(),
            read_timeout_ms: defaults::SERIAL_READ_TIMEOUT_MS,
            settle_window_ms: defaults::SETTLE_WINDOW_MS,
            join_timeout_ms: defaults::JOIN_TIMEOUT_MS,
            snapshot_timeout_ms: defaults::SNAPSHOT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    pub interval_secs: f64,
    pub reconnect_interval_secs: u64,
    pub reset_policy: ResetPolicy,
    pub accumulation_mode: AccumulationMode,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::CYCLE_INTERVAL_SECS,
            reconnect_interval_secs: defaults::RECONNECT_INTERVAL_SECS,
            reset_policy: ResetPolicy::default(),
            accumulation_mode: AccumulationMode::default(),
        }
    }
}

impl CycleConfig {
    /// Whole seconds credited to a region per cycle (at least 1)
    pub fn interval_whole_secs(&self) -> u64 {
        self.interval_secs.round().max(1.0) as u64
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierStrategy {
    #[default]
    Template,
    Learned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub strategy: ClassifierStrategy,
    pub model_path: PathBuf,
    pub confidence_floor: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            strategy: ClassifierStrategy::default(),
            model_path: PathBuf::from(defaults::MODEL_PATH),
            confidence_floor: defaults::TEMPLATE_CONFIDENCE_FLOOR,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub default_threshold_minutes: u32,
    pub pressure_ceiling: i32,
    pub duration_ceiling_secs: u64,
    /// Derive an actuation signal each cycle
    pub actuation_enabled: bool,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            default_threshold_minutes: defaults::DEFAULT_THRESHOLD_MINUTES,
            pressure_ceiling: defaults::PRESSURE_CEILING,
            duration_ceiling_secs: defaults::DURATION_CEILING_SECS,
            actuation_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceBackend {
    Supabase,
    #[default]
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub backend: PersistenceBackend,
    pub supabase_url: String,
    pub supabase_key: String,
    pub local_path: PathBuf,
    pub http_timeout_secs: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::default(),
            supabase_url: String::new(),
            supabase_key: String::new(),
            local_path: PathBuf::from(defaults::LOCAL_STORE_PATH),
            http_timeout_secs: defaults::HTTP_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuationConfig {
    pub enabled: bool,
    /// Use the in-process mock controller instead of TCP
    pub mock: bool,
    pub address: String,
    pub port: u16,
    pub ack_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mock: false,
            address: defaults::CONTROL_NODE_ADDRESS.to_string(),
            port: defaults::CONTROL_NODE_PORT,
            ack_timeout_ms: defaults::CONTROL_ACK_TIMEOUT_MS,
            connect_timeout_ms: defaults::CONTROL_CONNECT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Push gateway endpoint; alerts are only logged when unset
    pub webhook_url: Option<String>,
    pub auth_token: Option<String>,
    /// Prefix combined with the device id to form the push topic
    pub topic_prefix: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            auth_token: None,
            topic_prefix: "patient_".to_string(),
        }
    }
}

//! Config Validation Tests
//!
//! Loads TOML files from disk and exercises the cross-field validation and
//! environment override layers independently from the rest of the service.

use std::io::Write;

use bedwatch::config::{BedwatchConfig, ClassifierStrategy, ConfigError, PersistenceBackend};
use bedwatch::tracking::{AccumulationMode, ResetPolicy};

fn validation_errors(config: &BedwatchConfig) -> Vec<String> {
    match config.validate() {
        Ok(()) => Vec::new(),
        Err(ConfigError::Validation(errors)) => errors,
        Err(other) => panic!("unexpected error: {other}"),
    }
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn full_file_loads_every_section() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[device]
id = 31
name = "ward-3-bed-2"

[acquisition]
baud_rate = 57600
ports = ["/dev/ttyUSB0", "/dev/ttyUSB1"]

[cycle]
interval_secs = 2.0
reset_policy = "per_region"
accumulation_mode = "active_regions"

[classifier]
strategy = "learned"
model_path = "/opt/bedwatch/model.json"

[decision]
default_threshold_minutes = 90
pressure_ceiling = 250

[persistence]
backend = "supabase"
supabase_url = "https://example.supabase.co"
supabase_key = "anon"

[actuation]
mock = true

[notification]
webhook_url = "https://push.example.org/send"
topic_prefix = "bed_"
"#
    )
    .unwrap();

    let config = BedwatchConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.device.id, 31);
    assert_eq!(config.acquisition.baud_rate, 57_600);
    assert_eq!(config.acquisition.ports.len(), 2);
    assert_eq!(config.cycle.interval_whole_secs(), 2);
    assert_eq!(config.cycle.reset_policy, ResetPolicy::PerRegion);
    assert_eq!(config.cycle.accumulation_mode, AccumulationMode::ActiveRegions);
    assert_eq!(config.classifier.strategy, ClassifierStrategy::Learned);
    assert_eq!(config.decision.default_threshold_minutes, 90);
    assert_eq!(config.decision.pressure_ceiling, 250);
    assert_eq!(config.persistence.backend, PersistenceBackend::Supabase);
    assert!(config.actuation.mock);
    assert_eq!(config.notification.topic_prefix, "bed_");
    assert!(config.validate().is_ok());
}

#[test]
fn unknown_policy_is_a_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "[cycle]\nreset_policy = \"whenever\"\n").unwrap();
    assert!(matches!(
        BedwatchConfig::load_from_file(file.path()),
        Err(ConfigError::Parse(..))
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = BedwatchConfig::load_from_file(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::Io(..))));
}

#[test]
fn serialized_config_loads_back() {
    let mut config = BedwatchConfig::default();
    config.device.id = 4;
    config.cycle.reset_policy = ResetPolicy::PerRegion;

    let parsed: BedwatchConfig = toml::from_str(&config.to_toml().unwrap()).unwrap();
    assert_eq!(parsed.device.id, 4);
    assert_eq!(parsed.cycle.reset_policy, ResetPolicy::PerRegion);
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn non_positive_interval_rejected() {
    let mut config = BedwatchConfig::default();
    config.cycle.interval_secs = 0.0;
    let errors = validation_errors(&config);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("interval_secs"));

    config.cycle.interval_secs = f64::NAN;
    assert_eq!(validation_errors(&config).len(), 1);
}

#[test]
fn every_problem_reported_at_once() {
    let mut config = BedwatchConfig::default();
    config.acquisition.baud_rate = 0;
    config.classifier.confidence_floor = 1.5;
    config.decision.default_threshold_minutes = 0;
    config.decision.pressure_ceiling = 1_000;

    let errors = validation_errors(&config);
    assert_eq!(errors.len(), 4, "{errors:?}");
}

#[test]
fn tcp_actuation_needs_an_endpoint() {
    let mut config = BedwatchConfig::default();
    config.actuation.address = "  ".to_string();
    config.actuation.port = 0;
    assert_eq!(validation_errors(&config).len(), 2);

    config.actuation.mock = true;
    assert!(config.validate().is_ok());

    config.actuation.mock = false;
    config.actuation.enabled = false;
    assert!(config.validate().is_ok());
}

#[test]
fn remote_persistence_needs_device_id() {
    let mut config = BedwatchConfig::default();
    config.persistence.backend = PersistenceBackend::Supabase;
    config.persistence.supabase_url = "https://example.supabase.co".to_string();
    config.persistence.supabase_key = "anon".to_string();

    let errors = validation_errors(&config);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("DEVICE_ID"));

    config.apply_overrides(|key| (key == "DEVICE_ID").then(|| "12".to_string()));
    assert!(config.validate().is_ok());
}

// ============================================================================
// Environment overrides
// ============================================================================

#[test]
fn overrides_cover_the_field_settings() {
    let mut config = BedwatchConfig::default();
    config.apply_overrides(|key| {
        let value = match key {
            "SUPABASE_URL" => "https://db.example.org",
            "SUPABASE_KEY" => "service",
            "CONTROL_NODE_ADDRESS" => "192.168.4.1",
            "CONTROL_NODE_PORT" => "9000",
            "PUSH_WEBHOOK_URL" => "https://push.example.org",
            _ => return None,
        };
        Some(value.to_string())
    });

    assert_eq!(config.persistence.supabase_url, "https://db.example.org");
    assert_eq!(config.persistence.supabase_key, "service");
    assert_eq!(config.actuation.address, "192.168.4.1");
    assert_eq!(config.actuation.port, 9000);
    assert_eq!(config.notification.webhook_url.as_deref(), Some("https://push.example.org"));
}

#[test]
fn blank_port_override_keeps_enumeration() {
    let mut config = BedwatchConfig::default();
    config.apply_overrides(|key| (key == "SERIAL_PORT").then(|| "   ".to_string()));
    assert!(config.acquisition.ports.is_empty());
    assert!(!config.acquisition.port_patterns.is_empty());
}

//! Device Configuration Module
//!
//! Per-device configuration loaded from TOML, with environment overrides for
//! the handful of settings that differ between field deployments.
//!
//! ## Loading Order
//!
//! 1. `BEDWATCH_CONFIG` environment variable (path to TOML file)
//! 2. `bedwatch.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! Environment overrides (`DEVICE_ID`, `SERIAL_PORT`, `SUPABASE_URL`, ...) are
//! applied on top by [`BedwatchConfig::apply_env_overrides`]. The loaded
//! config is passed by value into each component at startup.

mod bedwatch_config;
pub mod defaults;

pub use bedwatch_config::*;

//! Per-cycle results and the records handed to delivery collaborators

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{BodyRegion, PostureLabel, RegionMap};
use crate::config::defaults;

// ============================================================================
// Thresholds
// ============================================================================

/// Maximum tolerated pressure duration per region, in minutes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub minutes: RegionMap<u32>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::uniform(defaults::DEFAULT_THRESHOLD_MINUTES)
    }
}

impl Thresholds {
    pub fn uniform(minutes: u32) -> Self {
        Self { minutes: RegionMap::splat(minutes) }
    }

    pub fn with(mut self, region: BodyRegion, minutes: u32) -> Self {
        self.minutes.set(region, minutes);
        self
    }

    pub fn limit_seconds(&self, region: BodyRegion) -> u64 {
        u64::from(self.minutes.get(region)) * 60
    }
}

// ============================================================================
// Daily accumulation and pressure logs
// ============================================================================

/// Daily accumulation record mirroring the duration counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayLog {
    /// Remote row id, `None` until the record has been created remotely
    #[serde(default)]
    pub id: Option<i64>,
    pub day: NaiveDate,
    pub device_id: i64,
    pub totals: RegionMap<u64>,
    #[serde(default)]
    pub last_posture: PostureLabel,
}

impl DayLog {
    pub fn empty(device_id: i64, day: NaiveDate) -> Self {
        Self {
            id: None,
            day,
            device_id,
            totals: RegionMap::default(),
            last_posture: PostureLabel::Unknown,
        }
    }
}

/// One cycle's durations as stored in the pressure log table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PressureLog {
    pub day_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub durations: RegionMap<u64>,
    pub posture: PostureLabel,
    pub posture_change_required: bool,
}

// ============================================================================
// Decisions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    Normal,
    High,
}

/// Caregiver notification produced when a region exceeds its threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPayload {
    /// Push topic or device identifier the alert is addressed to
    pub target: String,
    pub title: String,
    pub body: String,
    pub priority: AlertPriority,
    pub regions: Vec<BodyRegion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuationAction {
    Inflate,
    None,
}

/// Relief-mattress command derived from pressures and durations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuationSignal {
    pub action: ActuationAction,
    /// Sorted, de-duplicated zone numbers
    pub zones: Vec<u8>,
    /// 0 when no action, otherwise 30..=100
    pub intensity: u8,
}

impl ActuationSignal {
    pub fn no_action() -> Self {
        Self {
            action: ActuationAction::None,
            zones: Vec::new(),
            intensity: 0,
        }
    }

    pub fn is_no_action(&self) -> bool {
        self.action == ActuationAction::None
    }
}

/// Auxiliary flags predicted alongside the posture class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RiskFlags {
    pub upper_body: bool,
    pub right_leg: bool,
    pub left_leg: bool,
    pub feet: bool,
}

// ============================================================================
// Cycle result
// ============================================================================

/// Everything one cycle produced, handed to the delivery collaborators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleResult {
    pub cycle: u64,
    pub timestamp: DateTime<Utc>,
    pub boards_reporting: usize,
    pub posture: PostureLabel,
    pub risk_flags: Option<RiskFlags>,
    pub pressures: RegionMap<i32>,
    pub durations: RegionMap<u64>,
    pub reposition_required: bool,
    pub posture_changed: bool,
    pub alert: Option<AlertPayload>,
    pub actuation: Option<ActuationSignal>,
}

impl CycleResult {
    /// Regions currently reporting pressure
    pub fn active_regions(&self) -> Vec<BodyRegion> {
        self.pressures
            .iter()
            .filter(|(_, p)| *p != 0)
            .map(|(r, _)| r)
            .collect()
    }

    pub fn to_pressure_log(&self, day_id: Option<i64>) -> PressureLog {
        PressureLog {
            day_id,
            created_at: self.timestamp,
            durations: self.durations,
            posture: self.posture,
            posture_change_required: self.reposition_required,
        }
    }
}

// ============================================================================
// Actuator wire messages
// ============================================================================

/// Unified packet sent to the actuator controller each cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPacket {
    pub posture: PostureLabel,
    pub active_parts: Vec<BodyRegion>,
    pub durations: RegionMap<u64>,
    /// Server-issued control parameters, passed through verbatim
    #[serde(default)]
    pub controls: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub actuation: Option<ActuationSignal>,
}

impl ControlPacket {
    pub fn from_cycle(result: &CycleResult, controls: serde_json::Value) -> Self {
        Self {
            posture: result.posture,
            active_parts: result.active_regions(),
            durations: result.durations,
            controls,
            actuation: result.actuation.clone(),
        }
    }
}

/// Unsolicited status message from the actuator controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub inflated_zones: Vec<u8>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_seconds() {
        let t = Thresholds::default().with(BodyRegion::Hip, 1);
        assert_eq!(t.limit_seconds(BodyRegion::Hip), 60);
        assert_eq!(t.limit_seconds(BodyRegion::Occiput), 120 * 60);
    }

    #[test]
    fn test_control_packet_wire_shape() {
        let packet = ControlPacket {
            posture: PostureLabel::Supine,
            active_parts: vec![BodyRegion::Hip],
            durations: RegionMap::splat(3),
            controls: serde_json::json!({"mode": "auto"}),
            actuation: None,
        };
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["posture"], "supine");
        assert_eq!(json["active_parts"][0], "hip");
        assert_eq!(json["durations"]["left_heel"], 3);
        assert!(json.get("actuation").is_none());
    }

    #[test]
    fn test_inbound_message_tolerates_missing_fields() {
        let msg: InboundMessage = serde_json::from_str(r#"{"inflated_zones": [2, 5]}"#).unwrap();
        assert_eq!(msg.inflated_zones, vec![2, 5]);
        assert!(msg.timestamp.is_none());
    }
}

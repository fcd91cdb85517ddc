//! Decision engine: reposition rule, caregiver alert, relief actuation

use crate::config::{defaults, DecisionConfig};
use crate::types::{ActuationAction, ActuationSignal, AlertPayload, AlertPriority, BodyRegion, RegionMap, Thresholds};

pub const ALERT_TITLE: &str = "Pressure injury risk";

/// Decisions for one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub reposition_required: bool,
    pub alert: Option<AlertPayload>,
    /// `None` when actuation is disabled
    pub actuation: Option<ActuationSignal>,
}

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    pressure_ceiling: i32,
    duration_ceiling_secs: u64,
    actuation_enabled: bool,
    alert_target: String,
}

impl DecisionEngine {
    pub fn new(config: &DecisionConfig, alert_target: impl Into<String>) -> Self {
        Self {
            pressure_ceiling: config.pressure_ceiling,
            duration_ceiling_secs: config.duration_ceiling_secs,
            actuation_enabled: config.actuation_enabled,
            alert_target: alert_target.into(),
        }
    }

    pub fn evaluate(&self, thresholds: &Thresholds, durations: &RegionMap<u64>, pressures: &RegionMap<i32>) -> Decision {
        let over: Vec<BodyRegion> = BodyRegion::ALL
            .into_iter()
            .filter(|&r| durations.get(r) >= thresholds.limit_seconds(r))
            .collect();

        let reposition_required = !over.is_empty();
        let alert = reposition_required.then(|| self.alert(&over, durations));
        let actuation = self.actuation_enabled.then(|| self.actuation(durations, pressures));

        Decision { reposition_required, alert, actuation }
    }

    fn alert(&self, regions: &[BodyRegion], durations: &RegionMap<u64>) -> AlertPayload {
        let listed: Vec<String> = regions
            .iter()
            .map(|&r| format!("{} ({} min)", r, durations.get(r) / 60))
            .collect();
        AlertPayload {
            target: self.alert_target.clone(),
            title: ALERT_TITLE.to_string(),
            body: format!("Reposition patient: {}", listed.join(", ")),
            priority: AlertPriority::High,
            regions: regions.to_vec(),
        }
    }

    fn actuation(&self, durations: &RegionMap<u64>, pressures: &RegionMap<i32>) -> ActuationSignal {
        let triggering: Vec<BodyRegion> = BodyRegion::ALL
            .into_iter()
            .filter(|&r| pressures.get(r) > self.pressure_ceiling || durations.get(r) > self.duration_ceiling_secs)
            .collect();

        if triggering.is_empty() {
            return ActuationSignal::no_action();
        }

        let mut zones: Vec<u8> = triggering.iter().map(|r| r.actuation_zone()).collect();
        zones.sort_unstable();
        zones.dedup();

        let peak = triggering.iter().map(|&r| pressures.get(r)).max().unwrap_or(0);
        ActuationSignal {
            action: ActuationAction::Inflate,
            zones,
            intensity: self.intensity(peak),
        }
    }

    /// Linear ramp from the ceiling to saturation, truncated
    fn intensity(&self, pressure: i32) -> u8 {
        let min = f64::from(defaults::INTENSITY_MIN);
        let max = f64::from(defaults::INTENSITY_MAX);
        if pressure <= self.pressure_ceiling {
            return defaults::INTENSITY_MIN;
        }
        let span = f64::from(defaults::PRESSURE_SATURATION - self.pressure_ceiling).max(1.0);
        let ramp = min + f64::from(pressure - self.pressure_ceiling) / span * (max - min);
        ramp.clamp(min, max) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> DecisionEngine {
        DecisionEngine::new(&DecisionConfig::default(), "patient_7")
    }

    fn one(region: BodyRegion, value: u64) -> RegionMap<u64> {
        let mut m = RegionMap::default();
        m.set(region, value);
        m
    }

    #[test]
    fn test_reposition_boundary() {
        let thresholds = Thresholds::default().with(BodyRegion::Hip, 1);
        let e = engine();
        let d = e.evaluate(&thresholds, &one(BodyRegion::Hip, 59), &RegionMap::default());
        assert!(!d.reposition_required);
        assert!(d.alert.is_none());

        let d = e.evaluate(&thresholds, &one(BodyRegion::Hip, 60), &RegionMap::default());
        assert!(d.reposition_required);
        let alert = d.alert.unwrap();
        assert_eq!(alert.title, ALERT_TITLE);
        assert!(alert.body.contains("hip (1 min)"), "{}", alert.body);
        assert_eq!(alert.priority, AlertPriority::High);
        assert_eq!(alert.target, "patient_7");
        assert_eq!(alert.regions, vec![BodyRegion::Hip]);
    }

    #[test]
    fn test_all_one_second_below_threshold() {
        let thresholds = Thresholds::uniform(2);
        let d = engine().evaluate(&thresholds, &RegionMap::splat(119), &RegionMap::default());
        assert!(!d.reposition_required);
    }

    #[test]
    fn test_no_trigger_is_no_action() {
        let d = engine().evaluate(&Thresholds::default(), &RegionMap::splat(10), &RegionMap::splat(300));
        assert_eq!(d.actuation, Some(ActuationSignal::no_action()));
    }

    #[test]
    fn test_pressure_trigger_intensity() {
        let mut pressures = RegionMap::default();
        pressures.set(BodyRegion::Hip, 650);
        pressures.set(BodyRegion::Occiput, 400);
        let d = engine().evaluate(&Thresholds::default(), &RegionMap::default(), &pressures);
        let signal = d.actuation.unwrap();
        assert_eq!(signal.action, ActuationAction::Inflate);
        assert_eq!(signal.zones, vec![1, 5]);
        // 30 + 350/700 * 70
        assert_eq!(signal.intensity, 65);
    }

    #[test]
    fn test_intensity_saturates() {
        let mut pressures = RegionMap::default();
        pressures.set(BodyRegion::LeftHeel, 1500);
        let signal = engine()
            .evaluate(&Thresholds::default(), &RegionMap::default(), &pressures)
            .actuation
            .unwrap();
        assert_eq!(signal.zones, vec![7]);
        assert_eq!(signal.intensity, 100);
    }

    #[test]
    fn test_duration_trigger_uses_floor_intensity() {
        let signal = engine()
            .evaluate(&Thresholds::default(), &one(BodyRegion::RightElbow, 301), &RegionMap::default())
            .actuation
            .unwrap();
        assert_eq!(signal.zones, vec![3]);
        assert_eq!(signal.intensity, 30);
    }

    #[test]
    fn test_actuation_disabled() {
        let config = DecisionConfig { actuation_enabled: false, ..DecisionConfig::default() };
        let d = DecisionEngine::new(&config, "x").evaluate(&Thresholds::default(), &RegionMap::default(), &RegionMap::splat(900));
        assert!(d.actuation.is_none());
    }
}

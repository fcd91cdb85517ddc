//! Duration tracker
//!
//! Per-region "seconds under continuous pressure" counters, the last posture
//! seen, and the daily accumulation record that mirrors them.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::types::{DayLog, PostureLabel, RegionMap};

/// What happens to the counters when the posture changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// Zero every counter on a posture change and skip accumulation that cycle
    #[default]
    PostureChange,
    /// Never reset on posture change; each region follows only its own pressure
    PerRegion,
}

/// Which regions accumulate time in a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccumulationMode {
    /// Regions with nonzero measured pressure
    #[default]
    PressureReported,
    /// Regions in the posture's active-region set
    ActiveRegions,
}

/// Outcome of one tracker step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Advance {
    pub posture_changed: bool,
    pub day_rolled: bool,
}

#[derive(Debug, Clone)]
pub struct DurationTracker {
    durations: RegionMap<u64>,
    last_posture: PostureLabel,
    /// Restored totals with no recorded posture; the next posture is adopted
    adopt_next_posture: bool,
    day_log: DayLog,
    interval_secs: u64,
    reset_policy: ResetPolicy,
    accumulation: AccumulationMode,
}

impl DurationTracker {
    pub fn new(device_id: i64, interval_secs: u64) -> Self {
        Self {
            durations: RegionMap::default(),
            last_posture: PostureLabel::Unknown,
            adopt_next_posture: false,
            day_log: DayLog::empty(device_id, Local::now().date_naive()),
            interval_secs,
            reset_policy: ResetPolicy::default(),
            accumulation: AccumulationMode::default(),
        }
    }

    pub fn with_reset_policy(mut self, policy: ResetPolicy) -> Self {
        self.reset_policy = policy;
        self
    }

    pub fn with_accumulation(mut self, mode: AccumulationMode) -> Self {
        self.accumulation = mode;
        self
    }

    /// Copy of the current counters
    pub fn durations(&self) -> RegionMap<u64> {
        self.durations
    }

    pub fn last_posture(&self) -> PostureLabel {
        self.last_posture
    }

    pub fn day_log(&self) -> &DayLog {
        &self.day_log
    }

    /// Record the remote id assigned after the day log was created
    pub fn set_day_log_id(&mut self, id: Option<i64>) {
        self.day_log.id = id;
    }

    /// Resume from a persisted day log.
    ///
    /// Remote day logs carry totals but no posture. When such a record has
    /// time on it, the first posture seen afterwards continues those totals
    /// instead of counting as a change away from `Unknown`.
    pub fn restore(&mut self, record: DayLog) {
        self.adopt_next_posture =
            record.last_posture == PostureLabel::Unknown && record.totals.iter().any(|(_, total)| total > 0);
        self.durations = record.totals;
        self.last_posture = record.last_posture;
        self.day_log = record;
    }

    pub fn advance(&mut self, pressures: &RegionMap<i32>, posture: PostureLabel) -> Advance {
        self.advance_at(pressures, posture, Local::now().date_naive())
    }

    pub fn advance_at(&mut self, pressures: &RegionMap<i32>, posture: PostureLabel, today: NaiveDate) -> Advance {
        let posture_changed = posture != self.last_posture && !self.adopt_next_posture;
        self.adopt_next_posture = false;

        if posture_changed && self.reset_policy == ResetPolicy::PostureChange {
            self.durations = RegionMap::default();
        } else {
            let interval = self.interval_secs;
            let accumulation = self.accumulation;
            self.durations = self.durations.map(|region, current| {
                let loaded = match accumulation {
                    AccumulationMode::PressureReported => pressures.get(region) != 0,
                    AccumulationMode::ActiveRegions => posture.is_active(region),
                };
                if loaded {
                    current.saturating_add(interval)
                } else {
                    0
                }
            });
        }
        self.last_posture = posture;

        let day_rolled = today != self.day_log.day;
        if day_rolled {
            tracing::info!(from = %self.day_log.day, to = %today, "Day rollover, starting new day log");
            self.day_log = DayLog::empty(self.day_log.device_id, today);
        }
        self.day_log.totals = self.durations;
        self.day_log.last_posture = posture;

        Advance { posture_changed, day_rolled }
    }
}

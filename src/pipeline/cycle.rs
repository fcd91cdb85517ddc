//! One monitoring cycle, free of I/O
//!
//! ```text
//! snapshot -> assemble -> merge -> classify -> analyze -> track -> decide
//! ```
//!
//! Everything after `decide` (broadcast, logs, actuation, alerts) belongs to
//! the delivery side of the loop.

use chrono::{Local, NaiveDate, Utc};

use crate::acquisition::BoardSnapshot;
use crate::config::BedwatchConfig;
use crate::posture::PostureClassifier;
use crate::processing::{analyze, assemble, merge_pressure_grid, HEATMAP_COLS, HEATMAP_ROWS};
use crate::tracking::{DecisionEngine, DurationTracker};
use crate::types::{CycleResult, Grid, Thresholds};

/// A cycle's result plus the heatmap it was computed from
#[derive(Debug, Clone)]
pub struct CycleOutput {
    pub result: CycleResult,
    pub heatmap: Grid,
    pub day_rolled: bool,
}

pub struct CycleEngine {
    classifier: Box<dyn PostureClassifier>,
    tracker: DurationTracker,
    decision: DecisionEngine,
    cycles: u64,
}

impl CycleEngine {
    pub fn new(classifier: Box<dyn PostureClassifier>, tracker: DurationTracker, decision: DecisionEngine) -> Self {
        Self {
            classifier,
            tracker,
            decision,
            cycles: 0,
        }
    }

    /// Tracker and decision engine configured from `config`
    pub fn from_config(config: &BedwatchConfig, classifier: Box<dyn PostureClassifier>) -> Self {
        let tracker = DurationTracker::new(config.device.id, config.cycle.interval_whole_secs())
            .with_reset_policy(config.cycle.reset_policy)
            .with_accumulation(config.cycle.accumulation_mode);
        let target = format!("{}{}", config.notification.topic_prefix, config.device.id);
        let decision = DecisionEngine::new(&config.decision, target);
        Self::new(classifier, tracker, decision)
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    pub fn tracker(&self) -> &DurationTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut DurationTracker {
        &mut self.tracker
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn run_cycle(&mut self, snapshot: &BoardSnapshot, thresholds: &Thresholds) -> CycleOutput {
        self.run_cycle_at(snapshot, thresholds, Local::now().date_naive())
    }

    pub fn run_cycle_at(&mut self, snapshot: &BoardSnapshot, thresholds: &Thresholds, today: NaiveDate) -> CycleOutput {
        self.cycles += 1;

        let grid = assemble(snapshot);
        let heatmap = merge_pressure_grid(&grid).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Heatmap merge failed, using an empty heatmap");
            Grid::zeros(HEATMAP_ROWS, HEATMAP_COLS)
        });

        let classification = self.classifier.classify(&heatmap);
        let pressures = analyze(classification.posture, &heatmap);
        let advance = self.tracker.advance_at(&pressures, classification.posture, today);
        let durations = self.tracker.durations();
        let decision = self.decision.evaluate(thresholds, &durations, &pressures);

        if advance.posture_changed {
            tracing::info!(
                cycle = self.cycles,
                posture = %classification.posture,
                classifier = self.classifier.name(),
                "Posture changed"
            );
        }

        let result = CycleResult {
            cycle: self.cycles,
            timestamp: Utc::now(),
            boards_reporting: snapshot.len(),
            posture: classification.posture,
            risk_flags: classification.risk_flags,
            pressures,
            durations,
            reposition_required: decision.reposition_required,
            posture_changed: advance.posture_changed,
            alert: decision.alert,
            actuation: decision.actuation,
        };

        CycleOutput {
            result,
            heatmap,
            day_rolled: advance.day_rolled,
        }
    }
}

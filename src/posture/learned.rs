//! Learned-model posture classifier
//!
//! Runs a pre-fit min-max scaler and a multi-output linear model exported to
//! JSON. The model predicts a posture class code plus four binary risk flags
//! (upper body, right leg, left leg, feet). Artifacts are loaded once at
//! startup and shared through an `Arc`.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Classification, PostureClassifier};
use crate::processing::{HEATMAP_COLS, HEATMAP_ROWS};
use crate::types::{Grid, PostureLabel, RiskFlags};

/// Head columns sampled into the feature vector (left edge, centre, right edge)
const HEAD_FEATURE_COLS: [usize; 3] = [0, 3, 6];
/// First heatmap row belonging to the body grid
const BODY_START_ROW: usize = 2;

/// 6 head features + 12x7 body features
pub const FEATURE_COUNT: usize = BODY_START_ROW * HEAD_FEATURE_COLS.len() + (HEATMAP_ROWS - BODY_START_ROW) * HEATMAP_COLS;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Model shape error: {0}")]
    Shape(String),
}

/// `x * scale + min`, per feature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub min: Vec<f64>,
    pub scale: Vec<f64>,
}

impl MinMaxScaler {
    pub fn transform(&self, features: &[f64]) -> Vec<f64> {
        features
            .iter()
            .zip(self.scale.iter().zip(&self.min))
            .map(|(x, (scale, min))| x * scale + min)
            .collect()
    }
}

/// One-vs-rest linear head over posture class codes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassHead {
    pub classes: Vec<i32>,
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

impl ClassHead {
    /// Class code with the highest decision value (first wins on ties)
    pub fn predict(&self, x: &[f64]) -> Option<i32> {
        let mut best: Option<(i32, f64)> = None;
        for ((class, w), b) in self.classes.iter().zip(&self.weights).zip(&self.bias) {
            let score = dot(w, x) + b;
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((*class, score));
            }
        }
        best.map(|(class, _)| class)
    }
}

/// Logistic head for one binary flag; positive decision value means set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryHead {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl BinaryHead {
    pub fn predict(&self, x: &[f64]) -> bool {
        dot(&self.weights, x) + self.bias >= 0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagHeads {
    pub upper_body: BinaryHead,
    pub right_leg: BinaryHead,
    pub left_leg: BinaryHead,
    pub feet: BinaryHead,
}

/// Scaler and classifier weights exported from training
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifacts {
    pub scaler: MinMaxScaler,
    pub posture: ClassHead,
    pub flags: FlagHeads,
}

impl ModelArtifacts {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let contents = std::fs::read_to_string(path)?;
        let artifacts: Self = serde_json::from_str(&contents)?;
        artifacts.validate()?;
        Ok(artifacts)
    }

    /// Load, logging and returning `None` when artifacts are absent or invalid
    pub fn load_optional(path: &Path) -> Option<Arc<Self>> {
        match Self::load(path) {
            Ok(artifacts) => {
                tracing::info!(path = %path.display(), classes = ?artifacts.posture.classes, "Loaded posture model");
                Some(Arc::new(artifacts))
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Posture model unavailable, learned classifier will report unknown");
                None
            }
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let check = |what: &str, len: usize| {
            if len == FEATURE_COUNT {
                Ok(())
            } else {
                Err(ModelError::Shape(format!("{what} has {len} features, expected {FEATURE_COUNT}")))
            }
        };

        check("scaler.min", self.scaler.min.len())?;
        check("scaler.scale", self.scaler.scale.len())?;

        let p = &self.posture;
        if p.classes.is_empty() || p.classes.len() != p.weights.len() || p.classes.len() != p.bias.len() {
            return Err(ModelError::Shape(format!(
                "posture head has {} classes, {} weight rows, {} biases",
                p.classes.len(),
                p.weights.len(),
                p.bias.len()
            )));
        }
        for w in &p.weights {
            check("posture weight row", w.len())?;
        }

        let f = &self.flags;
        check("flags.upper_body", f.upper_body.weights.len())?;
        check("flags.right_leg", f.right_leg.weights.len())?;
        check("flags.left_leg", f.left_leg.weights.len())?;
        check("flags.feet", f.feet.weights.len())?;
        Ok(())
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Head rows at columns 0/3/6, then every body cell, row-major
pub fn extract_features(heatmap: &Grid) -> Option<Vec<f64>> {
    if heatmap.shape() != (HEATMAP_ROWS, HEATMAP_COLS) {
        return None;
    }
    let mut features = Vec::with_capacity(FEATURE_COUNT);
    for r in 0..BODY_START_ROW {
        features.extend(HEAD_FEATURE_COLS.iter().map(|&c| f64::from(heatmap.get(r, c))));
    }
    for r in BODY_START_ROW..HEATMAP_ROWS {
        features.extend(heatmap.row(r).iter().map(|&v| f64::from(v)));
    }
    Some(features)
}

/// Map a class code and flags onto a posture label.
///
/// Supine with the left-leg flag means the right heel is off the mattress,
/// with the right-leg flag the left heel; the right-leg flag wins if both are set.
pub fn posture_from_prediction(class: i32, flags: RiskFlags) -> PostureLabel {
    match class {
        0 => {
            let mut posture = PostureLabel::Supine;
            if flags.left_leg {
                posture = PostureLabel::SupineRightLegRaised;
            }
            if flags.right_leg {
                posture = PostureLabel::SupineLeftLegRaised;
            }
            posture
        }
        1 => PostureLabel::LeftSide,
        2 => PostureLabel::RightSide,
        3 => PostureLabel::Prone,
        5 => PostureLabel::Sitting,
        _ => PostureLabel::Unknown,
    }
}

/// Classifier backed by optional model artifacts
#[derive(Debug, Clone)]
pub struct LearnedClassifier {
    artifacts: Option<Arc<ModelArtifacts>>,
}

impl LearnedClassifier {
    pub fn new(artifacts: Option<Arc<ModelArtifacts>>) -> Self {
        Self { artifacts }
    }

    pub fn has_model(&self) -> bool {
        self.artifacts.is_some()
    }
}

impl PostureClassifier for LearnedClassifier {
    fn name(&self) -> &str {
        "learned"
    }

    fn classify(&self, heatmap: &Grid) -> Classification {
        let Some(model) = self.artifacts.as_deref() else {
            return Classification::unknown();
        };
        let Some(features) = extract_features(heatmap) else {
            tracing::warn!(shape = ?heatmap.shape(), "Heatmap shape does not match model input");
            return Classification::unknown();
        };

        let x = model.scaler.transform(&features);
        let flags = RiskFlags {
            upper_body: model.flags.upper_body.predict(&x),
            right_leg: model.flags.right_leg.predict(&x),
            left_leg: model.flags.left_leg.predict(&x),
            feet: model.flags.feet.predict(&x),
        };
        let Some(class) = model.posture.predict(&x) else {
            return Classification::unknown();
        };

        Classification {
            posture: posture_from_prediction(class, flags),
            risk_flags: Some(flags),
        }
    }
}

//! Posture classifiers
//!
//! A classifier maps a 14x7 heatmap to a posture label and, when the
//! strategy supports it, auxiliary risk flags.
//!
//! ## Strategies
//!
//! 1. **Template** (default) - cosine similarity against per-posture reference patterns
//! 2. **Learned** - pre-fit scaler plus linear multi-output model loaded from JSON

pub mod learned;
pub mod template;

pub use learned::{LearnedClassifier, ModelArtifacts, ModelError};
pub use template::TemplateClassifier;

use crate::config::{ClassifierConfig, ClassifierStrategy};
use crate::types::{Grid, PostureLabel, RiskFlags};

/// Result of classifying one heatmap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    pub posture: PostureLabel,
    pub risk_flags: Option<RiskFlags>,
}

impl Classification {
    pub fn posture(posture: PostureLabel) -> Self {
        Self { posture, risk_flags: None }
    }

    pub fn unknown() -> Self {
        Self::posture(PostureLabel::Unknown)
    }

    pub fn with_flags(mut self, flags: RiskFlags) -> Self {
        self.risk_flags = Some(flags);
        self
    }
}

/// Trait for posture classification strategies
pub trait PostureClassifier: Send + Sync {
    /// Strategy name used in logs ("template", "learned")
    fn name(&self) -> &str;

    /// Classify a heatmap. Unrecognizable input yields `PostureLabel::Unknown`.
    fn classify(&self, heatmap: &Grid) -> Classification;
}

/// Create the classifier selected by configuration
pub fn build_classifier(config: &ClassifierConfig) -> Box<dyn PostureClassifier> {
    match config.strategy {
        ClassifierStrategy::Template => Box::new(TemplateClassifier::new(config.confidence_floor)),
        ClassifierStrategy::Learned => {
            let classifier = LearnedClassifier::new(ModelArtifacts::load_optional(&config.model_path));
            tracing::info!(model_loaded = classifier.has_model(), "Using learned posture classifier");
            Box::new(classifier)
        }
    }
}

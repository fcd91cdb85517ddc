//! Template-similarity posture classifier
//!
//! Min-max normalizes the heatmap and scores it by cosine similarity against
//! one hand-weighted 14x7 reference template per posture.

use super::{Classification, PostureClassifier};
use crate::processing::{HEATMAP_COLS, HEATMAP_ROWS};
use crate::types::{Grid, PostureLabel};

const CELLS: usize = HEATMAP_ROWS * HEATMAP_COLS;

/// Reference load pattern for one posture
#[derive(Debug, Clone)]
pub struct PostureTemplate {
    pub posture: PostureLabel,
    weights: [f64; CELLS],
}

impl PostureTemplate {
    fn new(posture: PostureLabel) -> Self {
        Self { posture, weights: [0.0; CELLS] }
    }

    /// Set `rows` x `cols` (half-open) to `weight`
    fn fill(mut self, rows: (usize, usize), cols: (usize, usize), weight: f64) -> Self {
        for r in rows.0..rows.1 {
            for c in cols.0..cols.1 {
                self.weights[r * HEATMAP_COLS + c] = weight;
            }
        }
        self
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

/// Built-in templates, in tie-break order
pub fn default_templates() -> Vec<PostureTemplate> {
    vec![
        PostureTemplate::new(PostureLabel::Supine)
            .fill((0, 2), (2, 5), 1.0) // occiput
            .fill((2, 5), (1, 6), 0.8) // shoulder blades
            .fill((5, 7), (1, 6), 0.4) // lower back
            .fill((7, 10), (1, 6), 1.0) // sacrum
            .fill((12, 14), (1, 3), 0.7) // heels
            .fill((12, 14), (4, 6), 0.7),
        PostureTemplate::new(PostureLabel::Prone)
            .fill((0, 2), (2, 5), 0.5) // face
            .fill((2, 6), (1, 6), 0.9) // chest
            .fill((6, 10), (1, 6), 1.0) // abdomen and pelvis
            .fill((10, 12), (1, 3), 0.6) // knees
            .fill((10, 12), (4, 6), 0.6),
        PostureTemplate::new(PostureLabel::LeftSide)
            .fill((0, 2), (0, 2), 0.5)
            .fill((2, 5), (0, 3), 1.0) // left shoulder
            .fill((5, 7), (0, 1), 0.8) // left elbow
            .fill((7, 11), (0, 3), 1.0) // left hip
            .fill((11, 14), (0, 2), 0.7), // left leg
        PostureTemplate::new(PostureLabel::RightSide)
            .fill((0, 2), (5, 7), 0.5)
            .fill((2, 5), (4, 7), 1.0)
            .fill((5, 7), (6, 7), 0.8)
            .fill((7, 11), (4, 7), 1.0)
            .fill((11, 14), (5, 7), 0.7),
        PostureTemplate::new(PostureLabel::Sitting).fill((7, 12), (1, 6), 1.0),
    ]
}

/// Scales values to `[0, 1]`; a constant map becomes all zeros
pub fn min_max_normalize(heatmap: &Grid) -> Vec<f64> {
    let (lo, hi) = heatmap.min_max();
    let (lo, hi) = (f64::from(lo), f64::from(hi));
    let span = hi - lo;
    heatmap
        .values()
        .iter()
        .map(|&v| if span > 0.0 { (f64::from(v) - lo) / span } else { 0.0 })
        .collect()
}

/// Cosine similarity; zero when either vector has zero norm
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Picks the most similar template above a confidence floor
#[derive(Debug, Clone)]
pub struct TemplateClassifier {
    templates: Vec<PostureTemplate>,
    confidence_floor: f64,
}

impl TemplateClassifier {
    pub fn new(confidence_floor: f64) -> Self {
        Self::with_templates(default_templates(), confidence_floor)
    }

    pub fn with_templates(templates: Vec<PostureTemplate>, confidence_floor: f64) -> Self {
        Self { templates, confidence_floor }
    }

    /// Similarity of the heatmap to every template, in template order
    pub fn scores(&self, heatmap: &Grid) -> Vec<(PostureLabel, f64)> {
        if heatmap.shape() != (HEATMAP_ROWS, HEATMAP_COLS) {
            tracing::warn!(shape = ?heatmap.shape(), "Heatmap shape does not match templates");
            return Vec::new();
        }
        let normalized = min_max_normalize(heatmap);
        self.templates
            .iter()
            .map(|t| (t.posture, cosine_similarity(&normalized, t.weights())))
            .collect()
    }
}

impl PostureClassifier for TemplateClassifier {
    fn name(&self) -> &str {
        "template"
    }

    fn classify(&self, heatmap: &Grid) -> Classification {
        let mut best: Option<(PostureLabel, f64)> = None;
        for (posture, score) in self.scores(heatmap) {
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((posture, score));
            }
        }

        match best {
            Some((posture, score)) if score >= self.confidence_floor => {
                tracing::trace!(posture = %posture, score, "Template match");
                Classification::posture(posture)
            }
            _ => Classification::unknown(),
        }
    }
}

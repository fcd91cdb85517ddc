//! Region pressure analyzer
//!
//! Each body region owns a fixed rectangle of the 14x7 heatmap (row 0 is the
//! head end, column 0 the patient's left). A region's pressure is the rounded
//! mean over its rectangle, reported only when the posture loads that region.

use crate::types::{BodyRegion, Grid, PostureLabel, RegionMap};

/// Half-open rectangle in heatmap coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionRect {
    pub rows: (usize, usize),
    pub cols: (usize, usize),
}

impl BodyRegion {
    /// Heatmap rectangle this region is measured over
    pub fn rect(self) -> RegionRect {
        let (rows, cols) = match self {
            BodyRegion::Occiput => ((0, 2), (2, 5)),
            BodyRegion::Scapula => ((2, 5), (1, 6)),
            BodyRegion::LeftElbow => ((5, 7), (0, 1)),
            BodyRegion::RightElbow => ((5, 7), (6, 7)),
            BodyRegion::Hip => ((7, 10), (1, 6)),
            BodyRegion::LeftHeel => ((12, 14), (1, 3)),
            BodyRegion::RightHeel => ((12, 14), (4, 6)),
        };
        RegionRect { rows, cols }
    }
}

/// Mean over the rectangle, clipped to the heatmap bounds. Empty overlap -> 0.
pub fn region_mean(heatmap: &Grid, rect: RegionRect) -> f64 {
    let r1 = rect.rows.1.min(heatmap.rows());
    let c1 = rect.cols.1.min(heatmap.cols());
    let (r0, c0) = (rect.rows.0.min(r1), rect.cols.0.min(c1));

    let count = (r1 - r0) * (c1 - c0);
    if count == 0 {
        return 0.0;
    }
    let sum: f64 = (r0..r1)
        .flat_map(|r| (c0..c1).map(move |c| (r, c)))
        .map(|(r, c)| f64::from(heatmap.get(r, c)))
        .sum();
    sum / count as f64
}

/// Per-region pressure, gated by the posture's active-region table
pub fn analyze(posture: PostureLabel, heatmap: &Grid) -> RegionMap<i32> {
    RegionMap::from_fn(|region| {
        if !posture.is_active(region) {
            return 0;
        }
        let mean = region_mean(heatmap, region.rect()).round();
        if mean <= 0.0 {
            0
        } else {
            mean.min(f64::from(i32::MAX)) as i32
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(value: f32) -> Grid {
        Grid::from_vec(14, 7, vec![value; 98]).unwrap()
    }

    #[test]
    fn test_rectangles_fit_the_heatmap() {
        for region in BodyRegion::ALL {
            let rect = region.rect();
            assert!(rect.rows.0 < rect.rows.1 && rect.rows.1 <= 14, "{region}");
            assert!(rect.cols.0 < rect.cols.1 && rect.cols.1 <= 7, "{region}");
        }
    }

    #[test]
    fn test_unknown_posture_reports_nothing() {
        let pressures = analyze(PostureLabel::Unknown, &uniform(500.0));
        assert!(pressures.iter().all(|(_, p)| p == 0));
    }

    #[test]
    fn test_posture_gating() {
        let pressures = analyze(PostureLabel::LeftSide, &uniform(250.0));
        assert_eq!(pressures[BodyRegion::LeftElbow], 250);
        assert_eq!(pressures[BodyRegion::Hip], 250);
        assert_eq!(pressures[BodyRegion::RightElbow], 0);
        assert_eq!(pressures[BodyRegion::Occiput], 0);
    }

    #[test]
    fn test_mean_over_rectangle() {
        let mut heatmap = uniform(0.0);
        // Half of the hip rectangle (3x5) at 600
        for r in 7..10 {
            for c in 1..4 {
                heatmap.set(r, c, 600.0);
            }
        }
        let pressures = analyze(PostureLabel::Sitting, &heatmap);
        assert_eq!(pressures[BodyRegion::Hip], 360);
    }

    #[test]
    fn test_negative_readings_clamp_to_zero() {
        let pressures = analyze(PostureLabel::Supine, &uniform(-20.0));
        assert!(pressures.iter().all(|(_, p)| p == 0));
    }

    #[test]
    fn test_small_heatmap_is_clipped() {
        let heatmap = Grid::from_vec(3, 3, vec![9.0; 9]).unwrap();
        assert_eq!(region_mean(&heatmap, BodyRegion::Hip.rect()), 0.0);
        assert_eq!(region_mean(&heatmap, BodyRegion::Occiput.rect()), 9.0);
    }
}

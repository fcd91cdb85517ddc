//! Heatmap merger: column-align the head and body grids and stack them
//!
//! Grids with fewer columns are resampled on a normalized `[0, 1]` axis
//! using interpolating splines, one axis at a time. Per axis the spline
//! order is `min(3, n - 1)`:
//!
//! | samples | interpolant                       |
//! |---------|-----------------------------------|
//! | 1       | constant (repeat)                 |
//! | 2       | linear                            |
//! | 3       | quadratic through all three       |
//! | >= 4    | cubic spline, not-a-knot ends     |
//!
//! Interpolating splines on a rectangular grid are separable, so resampling
//! columns then rows gives the same result as a bivariate spline. When either
//! source dimension has fewer than two samples the whole grid falls back to
//! per-axis linear interpolation (or repetition).

use thiserror::Error;

use super::assembler::PressureGrid;
use crate::types::{Grid, GridError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeatmapError {
    #[error("cannot merge an empty grid ({rows}x{cols})")]
    EmptyInput { rows: usize, cols: usize },

    #[error(transparent)]
    Shape(#[from] GridError),
}

/// Merge the assembled grids into one heatmap
pub fn merge_pressure_grid(grid: &PressureGrid) -> Result<Grid, HeatmapError> {
    merge(&grid.head, &grid.body)
}

/// Resample to a common column count and stack `head` above `body`.
///
/// Output rows = `head.rows() + body.rows()`, columns = the larger column count.
pub fn merge(head: &Grid, body: &Grid) -> Result<Grid, HeatmapError> {
    for g in [head, body] {
        if g.is_empty() {
            return Err(HeatmapError::EmptyInput { rows: g.rows(), cols: g.cols() });
        }
    }

    let cols = head.cols().max(body.cols());
    let head = resize(head, head.rows(), cols)?;
    let body = resize(body, body.rows(), cols)?;
    Ok(head.vstack(&body)?)
}

/// Resample `grid` to `rows` x `cols`
pub fn resize(grid: &Grid, rows: usize, cols: usize) -> Result<Grid, HeatmapError> {
    if grid.is_empty() {
        return Err(HeatmapError::EmptyInput { rows: grid.rows(), cols: grid.cols() });
    }
    if grid.shape() == (rows, cols) {
        return Ok(grid.clone());
    }

    let use_spline = grid.rows() >= 2 && grid.cols() >= 2;
    let method = if use_spline { Method::Spline } else { Method::Linear };

    // Columns first, row by row
    let mut widened = vec![0.0f64; grid.rows() * cols];
    for r in 0..grid.rows() {
        let samples: Vec<f64> = grid.row(r).iter().map(|&v| f64::from(v)).collect();
        let resampled = resample_axis(&samples, cols, method);
        widened[r * cols..(r + 1) * cols].copy_from_slice(&resampled);
    }

    // Then rows, column by column
    let mut out = vec![0.0f32; rows * cols];
    for c in 0..cols {
        let samples: Vec<f64> = (0..grid.rows()).map(|r| widened[r * cols + c]).collect();
        for (r, v) in resample_axis(&samples, rows, method).into_iter().enumerate() {
            out[r * cols + c] = v as f32;
        }
    }

    Ok(Grid::from_vec(rows, cols, out)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Spline,
    Linear,
}

/// Resample evenly spaced samples on `[0, 1]` to `target` evenly spaced points
fn resample_axis(samples: &[f64], target: usize, method: Method) -> Vec<f64> {
    let n = samples.len();
    if n == target {
        return samples.to_vec();
    }
    if n == 1 {
        return vec![samples[0]; target];
    }

    let positions = (0..target).map(|i| if target == 1 { 0.0 } else { i as f64 / (target - 1) as f64 });

    match method {
        Method::Linear => positions.map(|t| linear_at(samples, t)).collect(),
        Method::Spline => match n {
            2 => positions.map(|t| linear_at(samples, t)).collect(),
            3 => positions.map(|t| quadratic_at(samples, t)).collect(),
            _ => {
                let spline = CubicSpline::not_a_knot(samples);
                positions.map(|t| spline.eval(t)).collect()
            }
        },
    }
}

fn linear_at(y: &[f64], t: f64) -> f64 {
    let h = 1.0 / (y.len() - 1) as f64;
    let j = ((t / h).floor() as usize).min(y.len() - 2);
    let s = (t - j as f64 * h) / h;
    y[j] + (y[j + 1] - y[j]) * s
}

/// Lagrange quadratic through three samples at 0, 0.5, 1
fn quadratic_at(y: &[f64], t: f64) -> f64 {
    let (x0, x1, x2) = (0.0, 0.5, 1.0);
    let l0 = (t - x1) * (t - x2) / ((x0 - x1) * (x0 - x2));
    let l1 = (t - x0) * (t - x2) / ((x1 - x0) * (x1 - x2));
    let l2 = (t - x0) * (t - x1) / ((x2 - x0) * (x2 - x1));
    y[0] * l0 + y[1] * l1 + y[2] * l2
}

/// Interpolating cubic spline on uniform knots, stored as second derivatives
struct CubicSpline<'a> {
    y: &'a [f64],
    m: Vec<f64>,
    h: f64,
}

impl<'a> CubicSpline<'a> {
    /// Not-a-knot end conditions: third derivative continuous at the
    /// second and second-to-last knots. Requires at least four samples.
    fn not_a_knot(y: &'a [f64]) -> Self {
        let n = y.len();
        let h = 1.0 / (n - 1) as f64;
        let mut a = vec![vec![0.0; n]; n];
        let mut b = vec![0.0; n];

        a[0][0] = 1.0;
        a[0][1] = -2.0;
        a[0][2] = 1.0;
        for i in 1..n - 1 {
            a[i][i - 1] = 1.0;
            a[i][i] = 4.0;
            a[i][i + 1] = 1.0;
            b[i] = 6.0 * (y[i + 1] - 2.0 * y[i] + y[i - 1]) / (h * h);
        }
        a[n - 1][n - 3] = 1.0;
        a[n - 1][n - 2] = -2.0;
        a[n - 1][n - 1] = 1.0;

        let m = solve_dense(a, b);
        Self { y, m, h }
    }

    fn eval(&self, t: f64) -> f64 {
        let n = self.y.len();
        let h = self.h;
        let j = ((t / h).floor() as usize).min(n - 2);
        let x0 = j as f64 * h;
        let x1 = x0 + h;
        let (m0, m1) = (self.m[j], self.m[j + 1]);
        let (y0, y1) = (self.y[j], self.y[j + 1]);

        m0 * (x1 - t).powi(3) / (6.0 * h)
            + m1 * (t - x0).powi(3) / (6.0 * h)
            + (y0 / h - m0 * h / 6.0) * (x1 - t)
            + (y1 / h - m1 * h / 6.0) * (t - x0)
    }
}

/// Gaussian elimination with partial pivoting for the small spline systems
fn solve_dense(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        a.swap(col, pivot);
        b.swap(col, pivot);

        let diag = a[col][col];
        if diag.abs() < f64::EPSILON {
            continue;
        }
        for row in col + 1..n {
            let factor = a[row][col] / diag;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        let diag = a[row][row];
        x[row] = if diag.abs() < f64::EPSILON { 0.0 } else { (b[row] - tail) / diag };
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_fixed_topology_shape() {
        let heatmap = merge_pressure_grid(&PressureGrid::zeros()).unwrap();
        assert_eq!(heatmap.shape(), (14, 7));
    }

    #[test]
    fn test_arbitrary_shapes() {
        for (hr, hc, br, bc) in [(1, 1, 1, 1), (2, 3, 12, 7), (3, 9, 4, 2), (1, 5, 6, 5), (4, 1, 2, 6)] {
            let head = Grid::zeros(hr, hc);
            let body = Grid::zeros(br, bc);
            let merged = merge(&head, &body).unwrap();
            assert_eq!(merged.shape(), (hr + br, hc.max(bc)), "inputs {hr}x{hc} + {br}x{bc}");
        }
    }

    #[test]
    fn test_empty_input_rejected() {
        let err = merge(&Grid::zeros(0, 3), &Grid::zeros(12, 7)).unwrap_err();
        assert_eq!(err, HeatmapError::EmptyInput { rows: 0, cols: 3 });
    }

    #[test]
    fn test_equal_columns_concatenate_unchanged() {
        let head = Grid::from_rows(&[[1.0_f32, 2.0], [3.0, 4.0]]).unwrap();
        let body = Grid::from_rows(&[[5.0_f32, 6.0]]).unwrap();
        let merged = merge(&head, &body).unwrap();
        assert_eq!(merged.values(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_constant_head_stays_constant() {
        let head = Grid::from_rows(&[[400.0_f32; 3], [0.0; 3]]).unwrap();
        let merged = merge(&head, &Grid::zeros(12, 7)).unwrap();
        assert!(merged.row(0).iter().all(|&v| (v - 400.0).abs() < 1e-3));
        assert!(merged.row(1).iter().all(|&v| v.abs() < 1e-3));
    }

    #[test]
    fn test_quadratic_head_resampling() {
        // 0, 1, 0 across three columns is the parabola 4t(1 - t)
        let head = Grid::from_rows(&[[0.0_f32, 1.0, 0.0], [0.0, 1.0, 0.0]]).unwrap();
        let wide = resize(&head, 2, 5).unwrap();
        let expected = [0.0, 0.75, 1.0, 0.75, 0.0];
        for (got, want) in wide.row(0).iter().zip(expected) {
            assert!(approx(f64::from(*got), want), "got {got}, want {want}");
        }
    }

    #[test]
    fn test_cubic_spline_reproduces_cubic() {
        // Not-a-knot splines reproduce any cubic exactly
        let f = |t: f64| 2.0 * t.powi(3) - t * t + 0.5 * t + 3.0;
        let samples: Vec<f64> = (0..6).map(|i| f(i as f64 / 5.0)).collect();
        let resampled = resample_axis(&samples, 11, Method::Spline);
        for (i, v) in resampled.iter().enumerate() {
            assert!(approx(*v, f(i as f64 / 10.0)), "index {i}");
        }
    }

    #[test]
    fn test_single_row_falls_back_to_linear() {
        let grid = Grid::from_rows(&[[0.0_f32, 10.0, 0.0, 10.0]]).unwrap();
        let wide = resize(&grid, 1, 7).unwrap();
        // Linear interpolation never overshoots the samples
        assert!(wide.row(0).iter().all(|&v| (0.0..=10.0).contains(&v)));
        assert!(approx(f64::from(wide.get(0, 2)), 10.0));
    }

    #[test]
    fn test_single_column_repeats() {
        let grid = Grid::from_rows(&[[3.0_f32], [5.0]]).unwrap();
        let wide = resize(&grid, 2, 4).unwrap();
        assert_eq!(wide.row(0), &[3.0; 4]);
        assert_eq!(wide.row(1), &[5.0; 4]);
    }
}

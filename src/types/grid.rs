//! Dense row-major numeric grid used for pressure maps

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shape violations when building a grid
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("grid data length {len} does not match shape {rows}x{cols}")]
    LengthMismatch { rows: usize, cols: usize, len: usize },

    #[error("ragged rows: row {row} has {len} columns, expected {expected}")]
    Ragged { row: usize, len: usize, expected: usize },
}

/// Row-major 2-D grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Grid {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, GridError> {
        if data.len() != rows * cols {
            return Err(GridError::LengthMismatch { rows, cols, len: data.len() });
        }
        Ok(Self { rows, cols, data })
    }

    /// Build from nested rows; every row must have the same length
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self, GridError> {
        let expected = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * expected);
        for (row, values) in rows.iter().enumerate() {
            let values = values.as_ref();
            if values.len() != expected {
                return Err(GridError::Ragged { row, len: values.len(), expected });
            }
            data.extend_from_slice(values);
        }
        Self::from_vec(rows.len(), expected, data)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.data[row * self.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn column(&self, col: usize) -> Vec<f32> {
        (0..self.rows).map(|r| self.get(r, col)).collect()
    }

    /// Flattened row-major values
    pub fn values(&self) -> &[f32] {
        &self.data
    }

    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        (0..self.rows).map(|r| self.row(r).to_vec()).collect()
    }

    pub fn min_max(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }

    /// Stack `other` below `self`; both must share a column count
    pub fn vstack(&self, other: &Grid) -> Result<Grid, GridError> {
        if self.cols != other.cols {
            return Err(GridError::Ragged { row: self.rows, len: other.cols, expected: self.cols });
        }
        let mut data = Vec::with_capacity(self.data.len() + other.data.len());
        data.extend_from_slice(&self.data);
        data.extend_from_slice(&other.data);
        Grid::from_vec(self.rows + other.rows, self.cols, data)
    }
}

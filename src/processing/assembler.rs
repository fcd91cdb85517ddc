//! Matrix assembler: board snapshot -> fixed-shape pressure grids
//!
//! Channel layout:
//! - head board `UNO0`: channels 0..=2 -> head row 0, 3..=5 -> head row 1
//! - body board `UNOk`: channels 0..=6 -> body row 2(k-1), 7..=13 -> body row 2(k-1)+1
//!
//! Boards missing from the snapshot leave their rows at zero.

use crate::acquisition::BoardSnapshot;
use crate::types::{BoardId, BoardReading, Grid};

pub const HEAD_ROWS: usize = 2;
pub const HEAD_COLS: usize = 3;
pub const BODY_ROWS: usize = 12;
pub const BODY_COLS: usize = 7;

/// Body rows contributed by each body board
const ROWS_PER_BODY_BOARD: usize = 2;

/// Head (2x3) and body (12x7) grids for one snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct PressureGrid {
    pub head: Grid,
    pub body: Grid,
}

impl PressureGrid {
    /// All-zero grids of the fixed shapes
    pub fn zeros() -> Self {
        Self {
            head: Grid::zeros(HEAD_ROWS, HEAD_COLS),
            body: Grid::zeros(BODY_ROWS, BODY_COLS),
        }
    }
}

/// Assemble the grids from whatever boards the snapshot holds
pub fn assemble(snapshot: &BoardSnapshot) -> PressureGrid {
    let mut grid = PressureGrid::zeros();

    for board in BoardId::ALL {
        let Some(reading) = snapshot.get(board) else {
            continue;
        };
        match board.body_position() {
            None => fill_rows(&mut grid.head, 0, HEAD_ROWS, reading),
            Some(pos) => fill_rows(&mut grid.body, pos * ROWS_PER_BODY_BOARD, ROWS_PER_BODY_BOARD, reading),
        }
    }

    grid
}

/// Channel `c` lands at row `first_row + c / cols`, column `c % cols`
fn fill_rows(target: &mut Grid, first_row: usize, rows: usize, reading: &BoardReading) {
    let cols = target.cols();
    for (&channel, &value) in &reading.channels {
        let channel = usize::from(channel);
        if channel >= rows * cols {
            continue;
        }
        target.set(first_row + channel / cols, channel % cols, value as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::simulated::reference_channels;
    use std::collections::BTreeMap;

    fn reading(board: BoardId, channels: &[(u16, i32)]) -> BoardReading {
        BoardReading::new(board, channels.iter().copied().collect::<BTreeMap<_, _>>())
    }

    #[test]
    fn test_empty_snapshot_is_all_zero() {
        let grid = assemble(&BoardSnapshot::empty());
        assert_eq!(grid.head.shape(), (2, 3));
        assert_eq!(grid.body.shape(), (12, 7));
        assert!(grid.head.values().iter().chain(grid.body.values()).all(|&v| v == 0.0));
    }

    #[test]
    fn test_head_only_snapshot() {
        let snapshot = BoardSnapshot::from_readings([reading(
            BoardId::Uno0,
            &[(0, 400), (1, 400), (2, 400), (3, 0), (4, 0), (5, 0)],
        )]);
        let grid = assemble(&snapshot);
        assert_eq!(grid.head.to_rows(), vec![vec![400.0; 3], vec![0.0; 3]]);
        assert!(grid.body.values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_body_board_row_pairs() {
        let channels: Vec<(u16, i32)> = (0..14).map(|c| (c, i32::from(c) + 1)).collect();
        let snapshot = BoardSnapshot::from_readings([reading(BoardId::Uno3, &channels)]);
        let grid = assemble(&snapshot);

        assert_eq!(grid.body.row(4), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(grid.body.row(5), &[8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0]);
        for row in (0..12).filter(|r| *r != 4 && *r != 5) {
            assert!(grid.body.row(row).iter().all(|&v| v == 0.0), "row {row} should be zero");
        }
    }

    #[test]
    fn test_missing_board_leaves_only_its_rows_zero() {
        let full = BoardSnapshot::from_readings(
            BoardId::ALL.into_iter().map(|b| BoardReading::new(b, reference_channels(b))),
        );
        let partial = BoardSnapshot::from_readings(
            BoardId::ALL
                .into_iter()
                .filter(|b| *b != BoardId::Uno4)
                .map(|b| BoardReading::new(b, reference_channels(b))),
        );
        let full = assemble(&full);
        let partial = assemble(&partial);

        assert_eq!(full.head, partial.head);
        for row in 0..12 {
            if row == 6 || row == 7 {
                assert!(partial.body.row(row).iter().all(|&v| v == 0.0));
                assert!(full.body.row(row).iter().any(|&v| v > 0.0));
            } else {
                assert_eq!(full.body.row(row), partial.body.row(row));
            }
        }
    }

    #[test]
    fn test_out_of_range_channels_ignored() {
        let snapshot = BoardSnapshot::from_readings([
            reading(BoardId::Uno0, &[(6, 999), (2, 5)]),
            reading(BoardId::Uno6, &[(14, 999), (13, 4)]),
        ]);
        let grid = assemble(&snapshot);
        assert_eq!(grid.head.get(0, 2), 5.0);
        assert_eq!(grid.body.get(11, 6), 4.0);
        assert_eq!(grid.head.values().iter().sum::<f32>(), 5.0);
        assert_eq!(grid.body.values().iter().sum::<f32>(), 4.0);
    }
}

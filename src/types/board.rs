//! Sensor board identity and per-board readings

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the seven sensor boards in the mattress topology
///
/// `UNO0` sits under the head; `UNO1`..`UNO6` cover the body from shoulders
/// to heels, two grid rows each.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BoardId {
    Uno0,
    Uno1,
    Uno2,
    Uno3,
    Uno4,
    Uno5,
    Uno6,
}

impl BoardId {
    pub const COUNT: usize = 7;

    pub const ALL: [BoardId; Self::COUNT] = [
        BoardId::Uno0,
        BoardId::Uno1,
        BoardId::Uno2,
        BoardId::Uno3,
        BoardId::Uno4,
        BoardId::Uno5,
        BoardId::Uno6,
    ];

    /// The head board
    pub const HEAD: BoardId = BoardId::Uno0;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Parse `UNO3`, `uno3` or `UNO3_` into a board id
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim().trim_end_matches('_');
        let digits = label.get(..3).filter(|p| p.eq_ignore_ascii_case("uno")).map(|_| &label[3..])?;
        let index: usize = digits.parse().ok()?;
        Self::from_index(index)
    }

    pub fn is_head(self) -> bool {
        self == Self::HEAD
    }

    /// Position of this body board among the body boards (`UNO1` -> 0)
    pub fn body_position(self) -> Option<usize> {
        self.index().checked_sub(1)
    }

    pub fn label(self) -> &'static str {
        match self {
            BoardId::Uno0 => "UNO0",
            BoardId::Uno1 => "UNO1",
            BoardId::Uno2 => "UNO2",
            BoardId::Uno3 => "UNO3",
            BoardId::Uno4 => "UNO4",
            BoardId::Uno5 => "UNO5",
            BoardId::Uno6 => "UNO6",
        }
    }
}

impl std::fmt::Display for BoardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Latest channel values reported by one board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardReading {
    pub board: BoardId,
    pub captured_at: DateTime<Utc>,
    pub channels: BTreeMap<u16, i32>,
}

impl BoardReading {
    pub fn new(board: BoardId, channels: BTreeMap<u16, i32>) -> Self {
        Self {
            board,
            captured_at: Utc::now(),
            channels,
        }
    }

    pub fn channel(&self, index: u16) -> Option<i32> {
        self.channels.get(&index).copied()
    }
}

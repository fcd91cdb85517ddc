//! Simulated sensor boards for bench runs without hardware
//!
//! Each simulated board prints prefixed-format lines carrying a supine
//! reference load pattern with a little random jitter, at a fixed rate.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use rand::Rng;

use super::source::{AcquisitionError, LineSource, SourceProvider};
use crate::types::BoardId;

const HEAD_VALUE: i32 = 400;

/// Body load (12 rows x 7 columns) of a patient lying supine
const SUPINE_BODY: [[i32; 7]; 12] = [
    [0, 300, 300, 300, 300, 300, 0],
    [0, 300, 300, 300, 300, 300, 0],
    [0; 7],
    [0; 7],
    [0; 7],
    [0, 600, 600, 600, 600, 600, 0],
    [0, 600, 600, 600, 600, 600, 0],
    [0, 600, 600, 600, 600, 600, 0],
    [0; 7],
    [0; 7],
    [0, 350, 350, 0, 350, 350, 0],
    [0, 350, 350, 0, 350, 350, 0],
];

/// Reference channel values a board reports for the supine pattern
pub fn reference_channels(board: BoardId) -> BTreeMap<u16, i32> {
    match board.body_position() {
        None => (0..6).map(|c| (c, HEAD_VALUE)).collect(),
        Some(pos) => {
            let mut channels = BTreeMap::new();
            for offset in 0..2 {
                for (col, &value) in SUPINE_BODY[pos * 2 + offset].iter().enumerate() {
                    channels.insert((offset * 7 + col) as u16, value);
                }
            }
            channels
        }
    }
}

/// One simulated board
pub struct SimulatedBoard {
    board: BoardId,
    name: String,
    period: Duration,
    jitter: i32,
    next_emit: Instant,
}

impl SimulatedBoard {
    pub fn new(board: BoardId, period: Duration, jitter: i32) -> Self {
        Self {
            board,
            name: format!("sim:{}", board),
            period,
            jitter: jitter.max(0),
            next_emit: Instant::now(),
        }
    }

    fn render_line(&self) -> String {
        let mut rng = rand::thread_rng();
        let prefix = self.board.label();
        reference_channels(self.board)
            .into_iter()
            .map(|(channel, value)| {
                let noisy = if value > 0 && self.jitter > 0 {
                    (value + rng.gen_range(-self.jitter..=self.jitter)).max(1)
                } else {
                    value
                };
                format!("{prefix}_C{channel}:{noisy}")
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl LineSource for SimulatedBoard {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<(), AcquisitionError> {
        self.next_emit = Instant::now();
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<String>, AcquisitionError> {
        let now = Instant::now();
        if now < self.next_emit {
            std::thread::sleep(self.next_emit - now);
        }
        self.next_emit += self.period;
        Ok(Some(self.render_line()))
    }
}

/// Provides one simulated source per board
#[derive(Debug, Clone)]
pub struct SimulatedProvider {
    pub period: Duration,
    pub jitter: i32,
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            jitter: 15,
        }
    }
}

impl SourceProvider for SimulatedProvider {
    fn discover(&self) -> Result<Vec<Box<dyn LineSource>>, AcquisitionError> {
        Ok(BoardId::ALL
            .into_iter()
            .map(|board| Box::new(SimulatedBoard::new(board, self.period, self.jitter)) as Box<dyn LineSource>)
            .collect())
    }

    fn provider_name(&self) -> &str {
        "simulated"
    }
}

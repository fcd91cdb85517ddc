//! Shared, versioned table of the latest reading per board
//!
//! Reader threads publish into fixed slots indexed by board id. The cycle
//! loop waits on the same lock's condition variable until the revision has
//! moved past a known value, so a publish between check and wait can never be
//! missed.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::types::{BoardId, BoardReading};

#[derive(Debug, Default)]
struct TableInner {
    slots: [Option<BoardReading>; BoardId::COUNT],
    revision: u64,
}

/// Latest reading per board plus a revision counter
#[derive(Debug, Default)]
pub struct BoardStateTable {
    inner: Mutex<TableInner>,
    changed: Condvar,
}

/// Consistent copy of the table at one revision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardSnapshot {
    readings: [Option<BoardReading>; BoardId::COUNT],
    revision: u64,
}

impl BoardSnapshot {
    /// Snapshot with no board data, used when acquisition times out
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot directly from readings (later readings win)
    pub fn from_readings(readings: impl IntoIterator<Item = BoardReading>) -> Self {
        let mut snapshot = Self::default();
        for reading in readings {
            let idx = reading.board.index();
            snapshot.readings[idx] = Some(reading);
            snapshot.revision += 1;
        }
        snapshot
    }

    pub fn get(&self, board: BoardId) -> Option<&BoardReading> {
        self.readings[board.index()].as_ref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn reported_boards(&self) -> Vec<BoardId> {
        BoardId::ALL
            .into_iter()
            .filter(|b| self.readings[b.index()].is_some())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.readings.iter().filter(|r| r.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BoardStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Board state lock poisoned by a panicked reader, recovering");
            poisoned.into_inner()
        })
    }

    /// Replace the board's slot, bump the revision and wake all waiters.
    ///
    /// Returns the new revision.
    pub fn publish(&self, reading: BoardReading) -> u64 {
        let mut inner = self.lock();
        let idx = reading.board.index();
        inner.slots[idx] = Some(reading);
        inner.revision += 1;
        let revision = inner.revision;
        drop(inner);
        self.changed.notify_all();
        revision
    }

    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        let inner = self.lock();
        BoardSnapshot {
            readings: inner.slots.clone(),
            revision: inner.revision,
        }
    }

    /// Block until at least one board slot is populated, then snapshot.
    ///
    /// Returns `None` if nothing is available within `timeout`.
    pub fn wait_for_any(&self, timeout: Duration) -> Option<BoardSnapshot> {
        self.wait_until(timeout, |inner| inner.slots.iter().any(Option::is_some))
    }

    /// Block until the revision exceeds `seen`, then snapshot.
    pub fn wait_for_revision_after(&self, seen: u64, timeout: Duration) -> Option<BoardSnapshot> {
        self.wait_until(timeout, |inner| inner.revision > seen)
    }

    fn wait_until(&self, timeout: Duration, ready: impl Fn(&TableInner) -> bool) -> Option<BoardSnapshot> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        while !ready(&inner) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            inner = match self.changed.wait_timeout(inner, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        Some(BoardSnapshot {
            readings: inner.slots.clone(),
            revision: inner.revision,
        })
    }

    /// Forget all readings. The revision keeps counting.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.slots = Default::default();
    }
}

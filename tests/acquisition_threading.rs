//! Acquisition Threading Tests
//!
//! Runs the multi-port manager against simulated boards and misbehaving
//! sources to check fan-in, bounded shutdown and reconnects.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bedwatch::acquisition::simulated::reference_channels;
use bedwatch::acquisition::{
    AcquisitionError, AcquisitionManager, LineSource, ReaderSettings, SimulatedProvider, SourceProvider,
};
use bedwatch::processing::assemble;
use bedwatch::types::BoardId;

fn settings(join_timeout: Duration) -> ReaderSettings {
    ReaderSettings {
        settle_window: Duration::ZERO,
        join_timeout,
    }
}

/// Ignores the stop flag by blocking far longer than the join timeout
struct StuckSource;

impl LineSource for StuckSource {
    fn name(&self) -> &str {
        "stuck"
    }

    fn open(&mut self) -> Result<(), AcquisitionError> {
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<String>, AcquisitionError> {
        std::thread::sleep(Duration::from_secs(3));
        Ok(None)
    }
}

struct StuckProvider;

impl SourceProvider for StuckProvider {
    fn discover(&self) -> Result<Vec<Box<dyn LineSource>>, AcquisitionError> {
        Ok(vec![Box::new(StuckSource)])
    }

    fn provider_name(&self) -> &str {
        "stuck"
    }
}

/// Finds nothing on the first discovery, simulated boards afterwards
struct LateProvider {
    attempts: AtomicUsize,
    boards: SimulatedProvider,
}

impl SourceProvider for LateProvider {
    fn discover(&self) -> Result<Vec<Box<dyn LineSource>>, AcquisitionError> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(Vec::new());
        }
        self.boards.discover()
    }

    fn provider_name(&self) -> &str {
        "late"
    }
}

fn fast_boards() -> SimulatedProvider {
    SimulatedProvider {
        period: Duration::from_millis(5),
        jitter: 0,
    }
}

#[test]
fn all_simulated_boards_reach_one_snapshot() {
    let mut manager = AcquisitionManager::new(Arc::new(fast_boards()), settings(Duration::from_secs(2))).unwrap();
    assert_eq!(manager.connect().unwrap(), 7);

    let table = manager.table();
    let deadline = Instant::now() + Duration::from_secs(3);
    let mut snapshot = table.wait_for_any(Duration::from_secs(2)).unwrap();
    while snapshot.len() < 7 && Instant::now() < deadline {
        snapshot = table
            .wait_for_revision_after(snapshot.revision(), Duration::from_millis(100))
            .unwrap_or(snapshot);
    }
    assert_eq!(snapshot.reported_boards(), BoardId::ALL.to_vec());

    let grid = assemble(&snapshot);
    assert_eq!(grid.head.values(), &[400.0; 6]);
    // UNO4 carries body rows 6 and 7
    let hip = reference_channels(BoardId::Uno4);
    assert_eq!(grid.body.get(6, 1), hip[&1] as f32);
    assert_eq!(grid.body.get(7, 0), hip[&7] as f32);

    manager.disconnect();
    assert_eq!(manager.live_sources(), 0);
    assert!(table.wait_for_any(Duration::from_millis(20)).is_none());
}

#[test]
fn stuck_reader_is_abandoned_after_join_timeout() {
    let mut manager = AcquisitionManager::new(Arc::new(StuckProvider), settings(Duration::from_millis(100))).unwrap();
    manager.connect().unwrap();

    let started = Instant::now();
    manager.disconnect();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!manager.is_connected());
}

#[test]
fn reconnect_picks_up_late_sources() {
    let provider = Arc::new(LateProvider {
        attempts: AtomicUsize::new(0),
        boards: fast_boards(),
    });
    let mut manager = AcquisitionManager::new(provider, settings(Duration::from_secs(2))).unwrap();

    let err = manager.connect().unwrap_err();
    assert!(err.is_connection_fault());
    assert!(matches!(manager.check_health(), Err(AcquisitionError::NoSources)));

    assert_eq!(manager.reconnect().unwrap(), 7);
    assert!(manager.check_health().is_ok());
    assert_eq!(manager.source_names().len(), 7);
    assert!(manager.wait_for_snapshot(Duration::from_secs(2)).is_some());

    let stats = manager.stats();
    assert_eq!(stats.len(), 7);
    assert!(stats.iter().any(|(_, read, _, published)| *read > 0 && *published > 0));
    manager.disconnect();
}

//! Multi-port acquisition manager
//!
//! Owns one OS thread per discovered source. Each thread opens its source,
//! throws away the settle window, then parses lines and publishes readings
//! into the shared [`BoardStateTable`]. A fault on one source ends only that
//! source's thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::board_state::{BoardSnapshot, BoardStateTable};
use super::parser::BoardLineParser;
use super::source::{AcquisitionError, LineSource, SourceProvider};
use crate::config::AcquisitionConfig;

/// Poll period while waiting for a reader thread to exit
const JOIN_POLL: Duration = Duration::from_millis(10);

/// Timing knobs for the reader threads
#[derive(Debug, Clone, Copy)]
pub struct ReaderSettings {
    pub settle_window: Duration,
    pub join_timeout: Duration,
}

impl ReaderSettings {
    pub fn from_config(config: &AcquisitionConfig) -> Self {
        Self {
            settle_window: Duration::from_millis(config.settle_window_ms),
            join_timeout: Duration::from_millis(config.join_timeout_ms),
        }
    }
}

/// Per-source counters, readable while the thread runs
#[derive(Debug, Default)]
pub struct ReaderStats {
    pub lines_read: AtomicU64,
    pub lines_discarded: AtomicU64,
    pub readings_published: AtomicU64,
}

struct Worker {
    name: String,
    handle: JoinHandle<()>,
    stats: Arc<ReaderStats>,
}

/// Runs the per-port reader threads
pub struct AcquisitionManager {
    provider: Arc<dyn SourceProvider>,
    settings: ReaderSettings,
    table: Arc<BoardStateTable>,
    parser: Arc<BoardLineParser>,
    stop: Arc<AtomicBool>,
    workers: Vec<Worker>,
    abandoned: usize,
}

impl AcquisitionManager {
    pub fn new(provider: Arc<dyn SourceProvider>, settings: ReaderSettings) -> Result<Self, AcquisitionError> {
        Ok(Self {
            provider,
            settings,
            table: Arc::new(BoardStateTable::new()),
            parser: Arc::new(BoardLineParser::new()?),
            stop: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
            abandoned: 0,
        })
    }

    /// Discover sources and start one reader thread per source.
    ///
    /// Returns the number of threads started. Fails with
    /// [`AcquisitionError::NoSources`] when discovery finds nothing.
    pub fn connect(&mut self) -> Result<usize, AcquisitionError> {
        if !self.workers.is_empty() {
            return Ok(self.workers.len());
        }

        let sources = self.provider.discover()?;
        if sources.is_empty() {
            return Err(AcquisitionError::NoSources);
        }

        self.stop = Arc::new(AtomicBool::new(false));
        for source in sources {
            let name = source.name().to_string();
            let stats = Arc::new(ReaderStats::default());
            let ctx = ReaderContext {
                table: Arc::clone(&self.table),
                parser: Arc::clone(&self.parser),
                stop: Arc::clone(&self.stop),
                stats: Arc::clone(&stats),
                settle_window: self.settings.settle_window,
            };
            let spawned = std::thread::Builder::new()
                .name(format!("acq-{}", name.rsplit('/').next().unwrap_or(&name)))
                .spawn(move || reader_loop(source, ctx));

            match spawned {
                Ok(handle) => self.workers.push(Worker { name, handle, stats }),
                Err(e) => {
                    // Tear down the threads already started before reporting
                    self.disconnect();
                    return Err(AcquisitionError::Spawn(e));
                }
            }
        }

        info!(
            provider = self.provider.provider_name(),
            sources = self.workers.len(),
            "Acquisition started"
        );
        Ok(self.workers.len())
    }

    /// Stop all reader threads, waiting a bounded time for each.
    ///
    /// Threads still running after the join timeout are abandoned.
    pub fn disconnect(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.stop.store(true, Ordering::SeqCst);

        for worker in self.workers.drain(..) {
            let deadline = Instant::now() + self.settings.join_timeout;
            while !worker.handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(JOIN_POLL);
            }

            if worker.handle.is_finished() {
                if worker.handle.join().is_err() {
                    warn!(source = %worker.name, "Reader thread panicked");
                }
            } else {
                self.abandoned += 1;
                warn!(
                    source = %worker.name,
                    timeout_ms = self.settings.join_timeout.as_millis() as u64,
                    total_abandoned = self.abandoned,
                    "Reader thread did not stop in time, abandoning it"
                );
            }
        }

        self.table.clear();
        info!("Acquisition stopped");
    }

    /// Disconnect then connect again
    pub fn reconnect(&mut self) -> Result<usize, AcquisitionError> {
        self.disconnect();
        self.connect()
    }

    pub fn is_connected(&self) -> bool {
        !self.workers.is_empty()
    }

    /// Reader threads that have not exited
    pub fn live_sources(&self) -> usize {
        self.workers.iter().filter(|w| !w.handle.is_finished()).count()
    }

    /// Fails with a connection fault when every reader has exited
    pub fn check_health(&self) -> Result<(), AcquisitionError> {
        if !self.is_connected() {
            return Err(AcquisitionError::NoSources);
        }
        if self.live_sources() == 0 {
            return Err(AcquisitionError::AllSourcesDown);
        }
        Ok(())
    }

    pub fn source_names(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.name.clone()).collect()
    }

    /// `(source, lines read, lines discarded, readings published)`
    pub fn stats(&self) -> Vec<(String, u64, u64, u64)> {
        self.workers
            .iter()
            .map(|w| {
                (
                    w.name.clone(),
                    w.stats.lines_read.load(Ordering::Relaxed),
                    w.stats.lines_discarded.load(Ordering::Relaxed),
                    w.stats.readings_published.load(Ordering::Relaxed),
                )
            })
            .collect()
    }

    /// Shared table, for waiting from another thread
    pub fn table(&self) -> Arc<BoardStateTable> {
        Arc::clone(&self.table)
    }

    /// Block until any board has reported, then snapshot.
    pub fn wait_for_snapshot(&self, timeout: Duration) -> Option<BoardSnapshot> {
        self.table.wait_for_any(timeout)
    }
}

impl Drop for AcquisitionManager {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Reader thread
// ============================================================================

struct ReaderContext {
    table: Arc<BoardStateTable>,
    parser: Arc<BoardLineParser>,
    stop: Arc<AtomicBool>,
    stats: Arc<ReaderStats>,
    settle_window: Duration,
}

fn reader_loop(mut source: Box<dyn LineSource>, ctx: ReaderContext) {
    let tag = format!("[Acquisition:{}]", source.name());

    if let Err(e) = source.open() {
        error!("{} Failed to open source: {}", tag, e);
        return;
    }
    info!("{} Source opened, settling for {:?}", tag, ctx.settle_window);

    let settle_until = Instant::now() + ctx.settle_window;

    while !ctx.stop.load(Ordering::SeqCst) {
        match source.read_line() {
            Ok(Some(line)) => {
                ctx.stats.lines_read.fetch_add(1, Ordering::Relaxed);
                if Instant::now() < settle_until {
                    ctx.stats.lines_discarded.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                match ctx.parser.parse(&line) {
                    Some(reading) => {
                        ctx.table.publish(reading);
                        ctx.stats.readings_published.fetch_add(1, Ordering::Relaxed);
                    }
                    None => {
                        ctx.stats.lines_discarded.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!("{} Source fault, stopping this reader: {}", tag, e);
                return;
            }
        }
    }

    debug!(
        "{} Reader stopped after {} lines",
        tag,
        ctx.stats.lines_read.load(Ordering::Relaxed)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoardId;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Feeds scripted lines, then idles (or fails) once exhausted
    struct ScriptedSource {
        name: String,
        lines: VecDeque<String>,
        fail_when_done: bool,
    }

    impl LineSource for ScriptedSource {
        fn name(&self) -> &str {
            &self.name
        }

        fn open(&mut self) -> Result<(), AcquisitionError> {
            Ok(())
        }

        fn read_line(&mut self) -> Result<Option<String>, AcquisitionError> {
            if let Some(line) = self.lines.pop_front() {
                return Ok(Some(line));
            }
            if self.fail_when_done {
                return Err(AcquisitionError::SourceClosed(self.name.clone()));
            }
            std::thread::sleep(Duration::from_millis(5));
            Ok(None)
        }
    }

    struct ScriptedProvider {
        scripts: Mutex<Vec<(String, Vec<String>, bool)>>,
    }

    impl ScriptedProvider {
        fn new(scripts: Vec<(&str, Vec<&str>, bool)>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(
                    scripts
                        .into_iter()
                        .map(|(n, l, f)| (n.to_string(), l.into_iter().map(String::from).collect(), f))
                        .collect(),
                ),
            })
        }
    }

    impl SourceProvider for ScriptedProvider {
        fn discover(&self) -> Result<Vec<Box<dyn LineSource>>, AcquisitionError> {
            Ok(self
                .scripts
                .lock()
                .unwrap()
                .iter()
                .map(|(name, lines, fail)| {
                    Box::new(ScriptedSource {
                        name: name.clone(),
                        lines: lines.iter().cloned().collect(),
                        fail_when_done: *fail,
                    }) as Box<dyn LineSource>
                })
                .collect())
        }

        fn provider_name(&self) -> &str {
            "scripted"
        }
    }

    fn settings() -> ReaderSettings {
        ReaderSettings {
            settle_window: Duration::ZERO,
            join_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_connect_fails_without_sources() {
        let provider = ScriptedProvider::new(vec![]);
        let mut manager = AcquisitionManager::new(provider, settings()).unwrap();
        assert!(matches!(manager.connect(), Err(AcquisitionError::NoSources)));
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_readings_from_all_ports_reach_the_table() {
        let provider = ScriptedProvider::new(vec![
            ("port-a", vec!["UNO0_C0:400 UNO0_C1:401"], false),
            ("port-b", vec!["noise", "[UNO2] C0=7 C13=9"], false),
        ]);
        let mut manager = AcquisitionManager::new(provider, settings()).unwrap();
        assert_eq!(manager.connect().unwrap(), 2);

        let table = manager.table();
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut snapshot = manager.wait_for_snapshot(Duration::from_secs(2)).unwrap();
        while snapshot.len() < 2 && Instant::now() < deadline {
            snapshot = table
                .wait_for_revision_after(snapshot.revision(), Duration::from_millis(200))
                .unwrap_or(snapshot);
        }

        assert_eq!(snapshot.reported_boards(), vec![BoardId::Uno0, BoardId::Uno2]);
        assert_eq!(snapshot.get(BoardId::Uno2).unwrap().channel(13), Some(9));
        manager.disconnect();
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_faulty_source_does_not_stop_others() {
        let provider = ScriptedProvider::new(vec![
            ("broken", vec![], true),
            ("healthy", vec!["UNO1_C0:10"], false),
        ]);
        let mut manager = AcquisitionManager::new(provider, settings()).unwrap();
        manager.connect().unwrap();

        let snapshot = manager.wait_for_snapshot(Duration::from_secs(2)).unwrap();
        assert_eq!(snapshot.reported_boards(), vec![BoardId::Uno1]);

        let deadline = Instant::now() + Duration::from_secs(2);
        while manager.live_sources() != 1 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(manager.live_sources(), 1);
        assert!(manager.check_health().is_ok());
        manager.disconnect();
    }

    #[test]
    fn test_all_sources_down_is_reported() {
        let provider = ScriptedProvider::new(vec![("broken", vec![], true)]);
        let mut manager = AcquisitionManager::new(provider, settings()).unwrap();
        manager.connect().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while manager.live_sources() != 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(matches!(manager.check_health(), Err(AcquisitionError::AllSourcesDown)));
    }

    #[test]
    fn test_settle_window_discards_boot_noise() {
        let provider = ScriptedProvider::new(vec![("port-a", vec!["UNO3_C0:1"], false)]);
        let mut manager = AcquisitionManager::new(
            provider,
            ReaderSettings {
                settle_window: Duration::from_secs(30),
                join_timeout: Duration::from_secs(2),
            },
        )
        .unwrap();
        manager.connect().unwrap();
        assert!(manager.wait_for_snapshot(Duration::from_millis(100)).is_none());
        manager.disconnect();
    }
}

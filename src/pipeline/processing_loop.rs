//! Fixed-cadence cycle loop
//!
//! Owns the cycle engine, the acquisition manager and the delivery
//! collaborators. Each tick it snapshots the board table, runs one cycle and
//! delivers the result. Delivery failures are logged and never stop the loop;
//! lost connections are retried every reconnect interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::cycle::{CycleEngine, CycleOutput};
use crate::acquisition::{AcquisitionManager, BoardSnapshot};
use crate::config::BedwatchConfig;
use crate::delivery::{ActuationLink, Notifier, PersistenceSink};
use crate::types::{ControlPacket, InboundMessage, Thresholds};

/// Loop timing
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub interval: Duration,
    pub snapshot_timeout: Duration,
    pub reconnect_interval: Duration,
    /// Stop after this many cycles (bench runs)
    pub max_cycles: Option<u64>,
}

impl LoopSettings {
    pub fn from_config(config: &BedwatchConfig) -> Self {
        Self {
            interval: Duration::from_secs_f64(config.cycle.interval_secs),
            snapshot_timeout: Duration::from_millis(config.acquisition.snapshot_timeout_ms),
            reconnect_interval: Duration::from_secs(config.cycle.reconnect_interval_secs),
            max_cycles: None,
        }
    }
}

/// Counters reported when the loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    pub empty_snapshots: u64,
    pub reposition_cycles: u64,
    pub alerts_sent: u64,
    pub packets_acked: u64,
    pub delivery_failures: u64,
    pub controller_messages: u64,
}

pub struct CycleLoop {
    engine: CycleEngine,
    acquisition: Option<AcquisitionManager>,
    persistence: Arc<dyn PersistenceSink>,
    actuation: Option<Box<dyn ActuationLink>>,
    notifier: Arc<dyn Notifier>,
    thresholds: Thresholds,
    device_id: i64,
    settings: LoopSettings,
    cancel: CancellationToken,
    stats: LoopStats,
}

impl CycleLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: CycleEngine,
        acquisition: AcquisitionManager,
        persistence: Arc<dyn PersistenceSink>,
        notifier: Arc<dyn Notifier>,
        thresholds: Thresholds,
        device_id: i64,
        settings: LoopSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            engine,
            acquisition: Some(acquisition),
            persistence,
            actuation: None,
            notifier,
            thresholds,
            device_id,
            settings,
            cancel,
            stats: LoopStats::default(),
        }
    }

    pub fn with_actuation(mut self, link: Box<dyn ActuationLink>) -> Self {
        self.actuation = Some(link);
        self
    }

    /// Run until cancelled or `max_cycles` is reached
    pub async fn run(mut self) -> LoopStats {
        let mut inbound = self.actuation.as_mut().and_then(|link| link.take_inbound());
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_maintenance: Option<Instant> = None;

        info!(
            device_id = self.device_id,
            classifier = self.engine.classifier_name(),
            persistence = self.persistence.backend_name(),
            notifier = self.notifier.name(),
            interval_ms = self.settings.interval.as_millis() as u64,
            "[CycleLoop] Starting"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("[CycleLoop] Shutdown signal received");
                    break;
                }
                Some(msg) = next_inbound(&mut inbound) => {
                    self.forward_controller_message(&msg).await;
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let due = last_maintenance.map_or(true, |t| t.elapsed() >= self.settings.reconnect_interval);
            if due {
                self.maintain_connections().await;
                last_maintenance = Some(Instant::now());
            }

            let snapshot = self.acquire_snapshot().await;
            let output = self.engine.run_cycle(&snapshot, &self.thresholds);
            self.deliver(&output).await;
            self.record(&output);

            if self.settings.max_cycles.is_some_and(|max| self.stats.cycles >= max) {
                info!(cycles = self.stats.cycles, "[CycleLoop] Cycle limit reached");
                break;
            }
        }

        self.shutdown().await;
        self.stats
    }

    fn record(&mut self, output: &CycleOutput) {
        let result = &output.result;
        self.stats.cycles += 1;
        if result.boards_reporting == 0 {
            self.stats.empty_snapshots += 1;
        }
        if result.reposition_required {
            self.stats.reposition_cycles += 1;
        }
        debug!(
            cycle = result.cycle,
            boards = result.boards_reporting,
            posture = %result.posture,
            reposition = result.reposition_required,
            "[CycleLoop] Cycle complete"
        );
        if self.stats.cycles % 60 == 0 {
            info!(
                cycles = self.stats.cycles,
                empty = self.stats.empty_snapshots,
                reposition = self.stats.reposition_cycles,
                delivery_failures = self.stats.delivery_failures,
                "[CycleLoop] Progress"
            );
        }
    }

    // ========================================================================
    // Acquisition
    // ========================================================================

    async fn acquire_snapshot(&mut self) -> BoardSnapshot {
        let Some(manager) = self.acquisition.as_ref() else {
            return BoardSnapshot::empty();
        };
        let table = manager.table();
        let timeout = self.settings.snapshot_timeout;
        match tokio::task::spawn_blocking(move || table.wait_for_any(timeout)).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!("[CycleLoop] No board data within {:?}, using empty snapshot", timeout);
                BoardSnapshot::empty()
            }
            Err(e) => {
                error!(error = %e, "[CycleLoop] Snapshot task failed");
                BoardSnapshot::empty()
            }
        }
    }

    async fn maintain_connections(&mut self) {
        if let Some(manager) = self.acquisition.as_ref() {
            for (source, read, discarded, published) in manager.stats() {
                debug!(source = %source, read, discarded, published, "[CycleLoop] Reader stats");
            }
            if let Err(e) = manager.check_health() {
                if e.is_connection_fault() {
                    warn!(error = %e, "[CycleLoop] Acquisition down, reconnecting");
                    self.reconnect_acquisition().await;
                }
            }
        }

        if let Some(link) = self.actuation.as_mut() {
            if !link.is_connected() {
                match link.connect().await {
                    Ok(()) => info!(link = link.name(), "[CycleLoop] Actuator link connected"),
                    Err(e) => warn!(link = link.name(), error = %e, "[CycleLoop] Actuator link unavailable"),
                }
            }
        }
    }

    /// Reconnect on the blocking pool; the manager joins reader threads
    async fn reconnect_acquisition(&mut self) {
        let Some(mut manager) = self.acquisition.take() else {
            return;
        };
        let joined = tokio::task::spawn_blocking(move || {
            let result = manager.reconnect();
            (manager, result)
        })
        .await;

        match joined {
            Ok((manager, result)) => {
                match result {
                    Ok(sources) => info!(sources, names = ?manager.source_names(), "[CycleLoop] Acquisition reconnected"),
                    Err(e) => warn!(error = %e, "[CycleLoop] Acquisition reconnect failed"),
                }
                self.acquisition = Some(manager);
            }
            Err(e) => error!(error = %e, "[CycleLoop] Acquisition reconnect task failed, running without sensors"),
        }
    }

    // ========================================================================
    // Delivery
    // ========================================================================

    fn delivery_failed(&mut self, what: &str, error: &dyn std::fmt::Display) {
        self.stats.delivery_failures += 1;
        warn!(error = %error, "[CycleLoop] {} failed", what);
    }

    async fn deliver(&mut self, output: &CycleOutput) {
        let result = &output.result;
        let persistence = Arc::clone(&self.persistence);

        if let Err(e) = persistence.broadcast_heatmap(self.device_id, &output.heatmap).await {
            self.delivery_failed("Heatmap broadcast", &e);
        }

        if output.day_rolled || self.engine.tracker().day_log().id.is_none() {
            match persistence.create_day_log(self.engine.tracker().day_log()).await {
                Ok(created) => {
                    info!(day = %created.day, id = ?created.id, "[CycleLoop] Day log created");
                    self.engine.tracker_mut().set_day_log_id(created.id);
                }
                Err(e) => self.delivery_failed("Day log creation", &e),
            }
        }

        let day_log = self.engine.tracker().day_log().clone();
        if let Err(e) = persistence.create_pressure_log(&result.to_pressure_log(day_log.id)).await {
            self.delivery_failed("Pressure log", &e);
        }
        if day_log.id.is_some() {
            if let Err(e) = persistence.update_day_log(&day_log).await {
                self.delivery_failed("Day log update", &e);
            }
        }

        self.send_control_packet(output).await;

        if let Some(alert) = &result.alert {
            match self.notifier.notify(alert).await {
                Ok(()) => self.stats.alerts_sent += 1,
                Err(e) => self.delivery_failed("Alert", &e),
            }
        }
    }

    async fn send_control_packet(&mut self, output: &CycleOutput) {
        let connected = self.actuation.as_ref().is_some_and(|link| link.is_connected());
        if !connected {
            return;
        }

        let controls = match self.persistence.fetch_device_controls(self.device_id).await {
            Ok(controls) => controls,
            Err(e) => {
                self.delivery_failed("Controls fetch", &e);
                serde_json::Value::Null
            }
        };
        let packet = ControlPacket::from_cycle(&output.result, controls);

        let Some(link) = self.actuation.as_mut() else {
            return;
        };
        match link.send_packet(&packet).await {
            Ok(()) => self.stats.packets_acked += 1,
            Err(e) => {
                if e.is_connection_fault() {
                    link.disconnect().await;
                }
                self.delivery_failed("Control packet", &e);
            }
        }
    }

    async fn forward_controller_message(&mut self, msg: &InboundMessage) {
        self.stats.controller_messages += 1;
        debug!(zones = ?msg.inflated_zones, "[CycleLoop] Controller status");
        if let Err(e) = self.persistence.broadcast_controls(self.device_id, msg).await {
            self.delivery_failed("Controls broadcast", &e);
        }
    }

    async fn shutdown(&mut self) {
        if let Some(link) = self.actuation.as_mut() {
            link.disconnect().await;
        }
        if let Some(mut manager) = self.acquisition.take() {
            if let Err(e) = tokio::task::spawn_blocking(move || manager.disconnect()).await {
                warn!(error = %e, "[CycleLoop] Acquisition shutdown task failed");
            }
        }
        info!(
            cycles = self.stats.cycles,
            alerts = self.stats.alerts_sent,
            packets = self.stats.packets_acked,
            delivery_failures = self.stats.delivery_failures,
            "[CycleLoop] Stopped"
        );
    }
}

async fn next_inbound(rx: &mut Option<mpsc::Receiver<InboundMessage>>) -> Option<InboundMessage> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

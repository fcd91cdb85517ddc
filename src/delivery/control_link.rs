//! Actuator controller link
//!
//! Newline-delimited JSON over TCP. Every control packet must be answered
//! by an `ACK` line within the ack timeout. Any other line the controller
//! sends is an unsolicited status message (`{"inflated_zones": [...]}`)
//! and goes to the inbound channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{ActuationLink, DeliveryError};
use crate::config::{defaults, ActuationConfig};
use crate::types::{ControlPacket, InboundMessage};

const ACK: &str = "ACK";
const INBOUND_CAPACITY: usize = 64;
const MOCK_EMIT_INTERVAL: Duration = Duration::from_secs(5);

// ============================================================================
// TCP link
// ============================================================================

pub struct TcpControlLink {
    address: String,
    port: u16,
    ack_timeout: Duration,
    connect_timeout: Duration,
    writer: Option<OwnedWriteHalf>,
    ack_rx: Option<mpsc::Receiver<()>>,
    reader_task: Option<JoinHandle<()>>,
    connected: Arc<AtomicBool>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Option<mpsc::Receiver<InboundMessage>>,
}

impl TcpControlLink {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        Self {
            address: address.into(),
            port,
            ack_timeout: Duration::from_millis(defaults::CONTROL_ACK_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(defaults::CONTROL_CONNECT_TIMEOUT_MS),
            writer: None,
            ack_rx: None,
            reader_task: None,
            connected: Arc::new(AtomicBool::new(false)),
            inbound_tx,
            inbound_rx: Some(inbound_rx),
        }
    }

    pub fn from_config(config: &ActuationConfig) -> Self {
        Self::new(config.address.clone(), config.port)
            .with_ack_timeout(Duration::from_millis(config.ack_timeout_ms))
            .with_connect_timeout(Duration::from_millis(config.connect_timeout_ms))
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn mark_lost(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        self.writer = None;
    }
}

/// Splits controller lines into acknowledgements and inbound messages
async fn read_controller(
    reader: OwnedReadHalf,
    ack_tx: mpsc::Sender<()>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    connected: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == ACK {
                    if ack_tx.send(()).await.is_err() {
                        break;
                    }
                    continue;
                }
                match serde_json::from_str::<InboundMessage>(line) {
                    Ok(msg) => {
                        if inbound_tx.try_send(msg).is_err() {
                            tracing::warn!("[ControlLink] Inbound queue full, dropping controller message");
                        }
                    }
                    Err(e) => tracing::debug!(line, error = %e, "[ControlLink] Ignoring unrecognized line"),
                }
            }
            Ok(None) => {
                tracing::warn!("[ControlLink] Controller closed the connection");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "[ControlLink] Read failed");
                break;
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
}

#[async_trait]
impl ActuationLink for TcpControlLink {
    fn name(&self) -> &str {
        "tcp"
    }

    async fn connect(&mut self) -> Result<(), DeliveryError> {
        if self.is_connected() {
            return Ok(());
        }
        self.disconnect().await;

        let addr = format!("{}:{}", self.address, self.port);
        tracing::info!(address = %addr, "Connecting to actuator controller");

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| DeliveryError::Connection(format!("connect to {addr} timed out")))?
            .map_err(|e| DeliveryError::Connection(format!("{addr}: {e}")))?;

        let sock_ref = socket2::SockRef::from(&stream);
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(Duration::from_secs(defaults::TCP_KEEPALIVE_SECS))
            .with_interval(Duration::from_secs(10));
        if let Err(e) = sock_ref.set_tcp_keepalive(&keepalive) {
            tracing::debug!(error = %e, "Could not enable TCP keepalive");
        }

        let (reader, writer) = stream.into_split();
        let (ack_tx, ack_rx) = mpsc::channel(8);
        self.connected.store(true, Ordering::SeqCst);
        self.reader_task = Some(tokio::spawn(read_controller(
            reader,
            ack_tx,
            self.inbound_tx.clone(),
            Arc::clone(&self.connected),
        )));
        self.writer = Some(writer);
        self.ack_rx = Some(ack_rx);

        tracing::info!(address = %addr, "Actuator controller connected");
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        self.ack_rx = None;
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.writer.is_some()
    }

    async fn send_packet(&mut self, packet: &ControlPacket) -> Result<(), DeliveryError> {
        if !self.is_connected() {
            return Err(DeliveryError::Disconnected);
        }
        let mut line = serde_json::to_vec(packet)?;
        line.push(b'\n');

        let (Some(writer), Some(ack_rx)) = (self.writer.as_mut(), self.ack_rx.as_mut()) else {
            return Err(DeliveryError::Disconnected);
        };

        // Late acknowledgements from a timed-out packet must not satisfy this one
        while ack_rx.try_recv().is_ok() {}

        let written = writer.write_all(&line).await;
        if let Err(e) = written {
            self.mark_lost();
            return Err(DeliveryError::Connection(e.to_string()));
        }

        let ack = tokio::time::timeout(self.ack_timeout, ack_rx.recv()).await;
        match ack {
            Ok(Some(())) => Ok(()),
            Ok(None) => {
                self.mark_lost();
                Err(DeliveryError::Disconnected)
            }
            Err(_) => Err(DeliveryError::Timeout("ACK")),
        }
    }

    fn take_inbound(&mut self) -> Option<mpsc::Receiver<InboundMessage>> {
        self.inbound_rx.take()
    }
}

// ============================================================================
// Mock link
// ============================================================================

/// Always acknowledges; periodically reports random inflated zones
pub struct MockControlLink {
    connected: bool,
    emit_interval: Duration,
    emitter: Option<JoinHandle<()>>,
    packets_sent: u64,
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Option<mpsc::Receiver<InboundMessage>>,
}

impl MockControlLink {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        Self {
            connected: false,
            emit_interval: MOCK_EMIT_INTERVAL,
            emitter: None,
            packets_sent: 0,
            inbound_tx,
            inbound_rx: Some(inbound_rx),
        }
    }

    pub fn with_emit_interval(mut self, interval: Duration) -> Self {
        self.emit_interval = interval;
        self
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }
}

impl Default for MockControlLink {
    fn default() -> Self {
        Self::new()
    }
}

/// Zero to three distinct zones out of 1..=7, sorted
pub fn random_zones() -> Vec<u8> {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let count = rng.gen_range(0..=3);
    let mut zones: Vec<u8> = rand::seq::index::sample(&mut rng, 7, count)
        .into_iter()
        .map(|i| i as u8 + 1)
        .collect();
    zones.sort_unstable();
    zones
}

#[async_trait]
impl ActuationLink for MockControlLink {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&mut self) -> Result<(), DeliveryError> {
        if self.connected {
            return Ok(());
        }
        let tx = self.inbound_tx.clone();
        let interval = self.emit_interval;
        self.emitter = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let msg = InboundMessage {
                    inflated_zones: random_zones(),
                    timestamp: Some(chrono::Local::now().to_rfc3339()),
                };
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
        }));
        self.connected = true;
        tracing::info!("Mock actuator link connected");
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(task) = self.emitter.take() {
            task.abort();
        }
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send_packet(&mut self, packet: &ControlPacket) -> Result<(), DeliveryError> {
        if !self.connected {
            return Err(DeliveryError::Disconnected);
        }
        self.packets_sent += 1;
        tracing::debug!(posture = %packet.posture, active = packet.active_parts.len(), "Mock actuator packet acknowledged");
        Ok(())
    }

    fn take_inbound(&mut self) -> Option<mpsc::Receiver<InboundMessage>> {
        self.inbound_rx.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PostureLabel, RegionMap};
    use tokio::net::TcpListener;

    fn packet() -> ControlPacket {
        ControlPacket {
            posture: PostureLabel::Supine,
            active_parts: Vec::new(),
            durations: RegionMap::default(),
            controls: serde_json::Value::Null,
            actuation: None,
        }
    }

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn test_ack_and_inbound_split() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            writer.write_all(b"{\"inflated_zones\": [1, 3], \"timestamp\": \"t\"}\n").await.unwrap();
            writer.write_all(b"ACK\n").await.unwrap();
            line
        });

        let mut link = TcpControlLink::new("127.0.0.1", port);
        let mut inbound = link.take_inbound().unwrap();
        assert!(link.take_inbound().is_none());
        link.connect().await.unwrap();
        assert!(link.is_connected());
        link.send_packet(&packet()).await.unwrap();

        let sent = server.await.unwrap();
        let decoded: serde_json::Value = serde_json::from_str(&sent).unwrap();
        assert_eq!(decoded["posture"], "supine");

        let msg = inbound.recv().await.unwrap();
        assert_eq!(msg.inflated_zones, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_missing_ack_times_out() {
        let (listener, port) = listener().await;
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(stream);
        });

        let mut link = TcpControlLink::new("127.0.0.1", port).with_ack_timeout(Duration::from_millis(100));
        link.connect().await.unwrap();
        let err = link.send_packet(&packet()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Timeout(_)));
        assert!(!err.is_connection_fault());
    }

    #[tokio::test]
    async fn test_connection_loss_detected() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut link = TcpControlLink::new("127.0.0.1", port).with_ack_timeout(Duration::from_millis(200));
        link.connect().await.unwrap();
        server.await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!link.is_connected());
        let err = link.send_packet(&packet()).await.unwrap_err();
        assert!(err.is_connection_fault());
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_fault() {
        let (listener, port) = listener().await;
        drop(listener);
        let mut link = TcpControlLink::new("127.0.0.1", port);
        let err = link.connect().await.unwrap_err();
        assert!(err.is_connection_fault());
    }

    #[tokio::test]
    async fn test_mock_link_acknowledges_and_emits() {
        let mut link = MockControlLink::new().with_emit_interval(Duration::from_millis(20));
        let mut inbound = link.take_inbound().unwrap();
        assert!(matches!(link.send_packet(&packet()).await, Err(DeliveryError::Disconnected)));

        link.connect().await.unwrap();
        link.send_packet(&packet()).await.unwrap();
        assert_eq!(link.packets_sent(), 1);

        let msg = tokio::time::timeout(Duration::from_secs(2), inbound.recv()).await.unwrap().unwrap();
        assert!(msg.inflated_zones.len() <= 3);
        assert!(msg.inflated_zones.iter().all(|z| (1..=7).contains(z)));
        link.disconnect().await;
        assert!(!link.is_connected());
    }

    #[test]
    fn test_random_zones_are_distinct() {
        for _ in 0..50 {
            let zones = random_zones();
            let mut dedup = zones.clone();
            dedup.dedup();
            assert_eq!(zones, dedup);
        }
    }
}

//! Delivery collaborators
//!
//! The cycle loop hands its results to three collaborators. None of them may
//! abort a cycle: every failure is returned as a [`DeliveryError`] and logged
//! by the caller.
//!
//! - [`PersistenceSink`]: thresholds, day logs, pressure logs, realtime broadcast
//! - [`ActuationLink`]: control packets to the relief-mattress controller
//! - [`Notifier`]: caregiver push alerts

pub mod control_link;
pub mod notifier;
pub mod supabase;

pub use control_link::{MockControlLink, TcpControlLink};
pub use notifier::{build_notifier, LogNotifier, WebhookNotifier};
pub use supabase::SupabaseClient;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::{AlertPayload, ControlPacket, DayLog, Grid, InboundMessage, PressureLog, Thresholds};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Link is not connected")]
    Disconnected,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl DeliveryError {
    /// Faults that call for a reconnect rather than a retry next cycle
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, DeliveryError::Connection(_) | DeliveryError::Disconnected)
    }
}

impl From<sled::Error> for DeliveryError {
    fn from(e: sled::Error) -> Self {
        DeliveryError::Storage(e.to_string())
    }
}

/// Remote or local record store
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    fn backend_name(&self) -> &str;

    /// Per-region thresholds configured for the patient on this device
    async fn fetch_thresholds(&self, device_id: i64) -> Result<Thresholds, DeliveryError>;

    async fn fetch_day_log(&self, device_id: i64, day: NaiveDate) -> Result<Option<DayLog>, DeliveryError>;

    /// Create the record and return it with its assigned id
    async fn create_day_log(&self, log: &DayLog) -> Result<DayLog, DeliveryError>;

    async fn update_day_log(&self, log: &DayLog) -> Result<(), DeliveryError>;

    async fn create_pressure_log(&self, log: &PressureLog) -> Result<(), DeliveryError>;

    /// Server-issued control parameters passed through to the actuator
    async fn fetch_device_controls(&self, device_id: i64) -> Result<serde_json::Value, DeliveryError>;

    async fn broadcast_heatmap(&self, device_id: i64, heatmap: &Grid) -> Result<(), DeliveryError>;

    async fn broadcast_controls(&self, device_id: i64, message: &InboundMessage) -> Result<(), DeliveryError>;
}

/// Bidirectional link to the actuator controller
#[async_trait]
pub trait ActuationLink: Send {
    fn name(&self) -> &str;

    async fn connect(&mut self) -> Result<(), DeliveryError>;

    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Send one packet and wait for its acknowledgement
    async fn send_packet(&mut self, packet: &ControlPacket) -> Result<(), DeliveryError>;

    /// Unsolicited controller messages. Returns `None` after the first call.
    fn take_inbound(&mut self) -> Option<mpsc::Receiver<InboundMessage>>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, alert: &AlertPayload) -> Result<(), DeliveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_fault_classification() {
        assert!(DeliveryError::Disconnected.is_connection_fault());
        assert!(DeliveryError::Connection("refused".into()).is_connection_fault());
        assert!(!DeliveryError::Timeout("ACK").is_connection_fault());
        assert!(!DeliveryError::Storage("full".into()).is_connection_fault());
    }
}

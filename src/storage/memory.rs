//! In-memory persistence for tests and dry runs

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::delivery::{DeliveryError, PersistenceSink};
use crate::types::{DayLog, Grid, InboundMessage, PressureLog, Thresholds};

#[derive(Debug, Default)]
struct MemoryInner {
    thresholds: Thresholds,
    controls: serde_json::Value,
    day_logs: Vec<DayLog>,
    pressure_logs: Vec<PressureLog>,
    heatmaps: usize,
    controller_messages: Vec<InboundMessage>,
    next_id: i64,
}

/// Records everything it is handed
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> DeliveryError {
    DeliveryError::Storage(e.to_string())
}

impl MemoryStore {
    pub fn new(thresholds: Thresholds) -> Self {
        let store = Self::default();
        if let Ok(mut inner) = store.inner.write() {
            inner.thresholds = thresholds;
        }
        store
    }

    pub fn day_logs(&self) -> Vec<DayLog> {
        self.inner.read().map(|i| i.day_logs.clone()).unwrap_or_default()
    }

    pub fn pressure_logs(&self) -> Vec<PressureLog> {
        self.inner.read().map(|i| i.pressure_logs.clone()).unwrap_or_default()
    }

    pub fn heatmaps_broadcast(&self) -> usize {
        self.inner.read().map(|i| i.heatmaps).unwrap_or(0)
    }

    pub fn controller_messages(&self) -> Vec<InboundMessage> {
        self.inner.read().map(|i| i.controller_messages.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PersistenceSink for MemoryStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn fetch_thresholds(&self, _device_id: i64) -> Result<Thresholds, DeliveryError> {
        Ok(self.inner.read().map_err(poisoned)?.thresholds)
    }

    async fn fetch_day_log(&self, device_id: i64, day: NaiveDate) -> Result<Option<DayLog>, DeliveryError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .day_logs
            .iter()
            .find(|l| l.device_id == device_id && l.day == day)
            .cloned())
    }

    async fn create_day_log(&self, log: &DayLog) -> Result<DayLog, DeliveryError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.next_id += 1;
        let mut created = log.clone();
        created.id = Some(inner.next_id);
        inner.day_logs.push(created.clone());
        Ok(created)
    }

    async fn update_day_log(&self, log: &DayLog) -> Result<(), DeliveryError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        match inner.day_logs.iter_mut().find(|l| l.id.is_some() && l.id == log.id) {
            Some(existing) => {
                *existing = log.clone();
                Ok(())
            }
            None => Err(DeliveryError::Storage(format!("unknown day log id {:?}", log.id))),
        }
    }

    async fn create_pressure_log(&self, log: &PressureLog) -> Result<(), DeliveryError> {
        self.inner.write().map_err(poisoned)?.pressure_logs.push(log.clone());
        Ok(())
    }

    async fn fetch_device_controls(&self, _device_id: i64) -> Result<serde_json::Value, DeliveryError> {
        Ok(self.inner.read().map_err(poisoned)?.controls.clone())
    }

    async fn broadcast_heatmap(&self, _device_id: i64, _heatmap: &Grid) -> Result<(), DeliveryError> {
        self.inner.write().map_err(poisoned)?.heatmaps += 1;
        Ok(())
    }

    async fn broadcast_controls(&self, _device_id: i64, message: &InboundMessage) -> Result<(), DeliveryError> {
        self.inner
            .write()
            .map_err(poisoned)?
            .controller_messages
            .push(message.clone());
        Ok(())
    }
}

//! sled-backed persistence for standalone deployments
//!
//! Trees:
//! - `day_logs`: key `<device_id BE><YYYY-MM-DD>` -> JSON `DayLog`
//! - `pressure_logs`: key `<created_at nanos BE>` -> JSON `PressureLog`
//! - `thresholds` / `controls`: key `<device_id BE>` -> JSON
//!
//! Realtime broadcasts have no local consumer and are dropped.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::delivery::{DeliveryError, PersistenceSink};
use crate::types::{DayLog, Grid, InboundMessage, PressureLog, Thresholds};

const DAY_LOGS: &str = "day_logs";
const PRESSURE_LOGS: &str = "pressure_logs";
const THRESHOLDS: &str = "thresholds";
const CONTROLS: &str = "controls";

#[derive(Clone)]
pub struct LocalStore {
    db: sled::Db,
    day_logs: sled::Tree,
    pressure_logs: sled::Tree,
    thresholds: sled::Tree,
    controls: sled::Tree,
    default_threshold_minutes: u32,
}

fn day_key(device_id: i64, day: NaiveDate) -> Vec<u8> {
    let mut key = device_id.to_be_bytes().to_vec();
    key.extend_from_slice(day.format("%Y-%m-%d").to_string().as_bytes());
    key
}

fn time_key(at: DateTime<Utc>) -> [u8; 8] {
    at.timestamp_nanos_opt()
        .unwrap_or_else(|| at.timestamp().saturating_mul(1_000_000_000))
        .to_be_bytes()
}

impl LocalStore {
    pub fn open<P: AsRef<Path>>(path: P, default_threshold_minutes: u32) -> Result<Self, DeliveryError> {
        let db = sled::open(path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), "Local store opened");
        Ok(Self {
            day_logs: db.open_tree(DAY_LOGS)?,
            pressure_logs: db.open_tree(PRESSURE_LOGS)?,
            thresholds: db.open_tree(THRESHOLDS)?,
            controls: db.open_tree(CONTROLS)?,
            db,
            default_threshold_minutes,
        })
    }

    pub fn set_thresholds(&self, device_id: i64, thresholds: &Thresholds) -> Result<(), DeliveryError> {
        self.thresholds
            .insert(device_id.to_be_bytes(), serde_json::to_vec(thresholds)?)?;
        Ok(())
    }

    pub fn set_controls(&self, device_id: i64, controls: &serde_json::Value) -> Result<(), DeliveryError> {
        self.controls
            .insert(device_id.to_be_bytes(), serde_json::to_vec(controls)?)?;
        Ok(())
    }

    /// Most recent pressure logs, newest first
    pub fn recent_pressure_logs(&self, limit: usize) -> Vec<PressureLog> {
        self.pressure_logs
            .iter()
            .rev()
            .filter_map(|item| item.ok())
            .filter_map(|(_, value)| serde_json::from_slice(&value).ok())
            .take(limit)
            .collect()
    }

    pub fn pressure_log_count(&self) -> usize {
        self.pressure_logs.len()
    }

    pub fn flush(&self) -> Result<(), DeliveryError> {
        self.db.flush()?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceSink for LocalStore {
    fn backend_name(&self) -> &str {
        "local"
    }

    async fn fetch_thresholds(&self, device_id: i64) -> Result<Thresholds, DeliveryError> {
        match self.thresholds.get(device_id.to_be_bytes())? {
            Some(value) => Ok(serde_json::from_slice(&value)?),
            None => Ok(Thresholds::uniform(self.default_threshold_minutes)),
        }
    }

    async fn fetch_day_log(&self, device_id: i64, day: NaiveDate) -> Result<Option<DayLog>, DeliveryError> {
        match self.day_logs.get(day_key(device_id, day))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn create_day_log(&self, log: &DayLog) -> Result<DayLog, DeliveryError> {
        let mut created = log.clone();
        let id = self.db.generate_id()?;
        created.id = Some(i64::try_from(id).unwrap_or(i64::MAX));
        self.day_logs
            .insert(day_key(log.device_id, log.day), serde_json::to_vec(&created)?)?;
        Ok(created)
    }

    async fn update_day_log(&self, log: &DayLog) -> Result<(), DeliveryError> {
        self.day_logs
            .insert(day_key(log.device_id, log.day), serde_json::to_vec(log)?)?;
        Ok(())
    }

    async fn create_pressure_log(&self, log: &PressureLog) -> Result<(), DeliveryError> {
        self.pressure_logs
            .insert(time_key(log.created_at), serde_json::to_vec(log)?)?;
        Ok(())
    }

    async fn fetch_device_controls(&self, device_id: i64) -> Result<serde_json::Value, DeliveryError> {
        match self.controls.get(device_id.to_be_bytes())? {
            Some(value) => Ok(serde_json::from_slice(&value)?),
            None => Ok(serde_json::Value::Null),
        }
    }

    async fn broadcast_heatmap(&self, _device_id: i64, _heatmap: &Grid) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn broadcast_controls(&self, device_id: i64, message: &InboundMessage) -> Result<(), DeliveryError> {
        tracing::debug!(device_id, zones = ?message.inflated_zones, "Controller status (local store, not broadcast)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BodyRegion, PostureLabel, RegionMap};
    use chrono::Duration;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    #[tokio::test]
    async fn test_thresholds_default_then_stored() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), 90).unwrap();
        let t = store.fetch_thresholds(7).await.unwrap();
        assert_eq!(t, Thresholds::uniform(90));

        store.set_thresholds(7, &Thresholds::uniform(90).with(BodyRegion::Hip, 1)).unwrap();
        let t = store.fetch_thresholds(7).await.unwrap();
        assert_eq!(t.minutes.get(BodyRegion::Hip), 1);
    }

    #[tokio::test]
    async fn test_day_log_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), 120).unwrap();
        assert!(store.fetch_day_log(7, day()).await.unwrap().is_none());

        let created = store.create_day_log(&DayLog::empty(7, day())).await.unwrap();
        assert!(created.id.is_some());

        let mut updated = created.clone();
        updated.totals.set(BodyRegion::Scapula, 33);
        updated.last_posture = PostureLabel::Prone;
        store.update_day_log(&updated).await.unwrap();

        let fetched = store.fetch_day_log(7, day()).await.unwrap().unwrap();
        assert_eq!(fetched, updated);
        assert!(store.fetch_day_log(8, day()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pressure_logs_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), 120).unwrap();
        let start = Utc::now();
        for i in 0..3 {
            let log = PressureLog {
                day_id: Some(1),
                created_at: start + Duration::seconds(i),
                durations: RegionMap::splat(i as u64),
                posture: PostureLabel::Supine,
                posture_change_required: false,
            };
            store.create_pressure_log(&log).await.unwrap();
        }
        assert_eq!(store.pressure_log_count(), 3);
        let recent = store.recent_pressure_logs(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].durations.get(BodyRegion::Hip), 2);
    }

    #[tokio::test]
    async fn test_controls_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), 120).unwrap();
        assert!(store.fetch_device_controls(7).await.unwrap().is_null());
        let controls = serde_json::json!({"mode": "auto", "zones": [1, 2]});
        store.set_controls(7, &controls).unwrap();
        assert_eq!(store.fetch_device_controls(7).await.unwrap(), controls);
    }
}

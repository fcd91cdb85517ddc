//! Supabase persistence over PostgREST and the realtime broadcast endpoint
//!
//! Tables: `patients` (thresholds), `day_logs`, `pressure_logs`, `devices`
//! (controls). Region columns use the short keys (`relbow`, `lheel`, ...):
//! `total_<key>` on day logs, `<key>` on pressure logs, `<key>_threshold`
//! on patients.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};

use super::{DeliveryError, PersistenceSink};
use crate::config::PersistenceConfig;
use crate::types::{BodyRegion, DayLog, Grid, InboundMessage, PressureLog, RegionMap, Thresholds};

const HEATMAP_EVENT: &str = "heatmap_update";
const CONTROLS_EVENT: &str = "controls";

#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    default_threshold_minutes: u32,
}

impl SupabaseClient {
    pub fn new(config: &PersistenceConfig, default_threshold_minutes: u32) -> Result<Self, DeliveryError> {
        if config.supabase_url.trim().is_empty() || config.supabase_key.trim().is_empty() {
            return Err(DeliveryError::NotConfigured("supabase_url and supabase_key are required".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            api_key: config.supabase_key.clone(),
            default_threshold_minutes,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn select(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<Value>, DeliveryError> {
        let resp = self
            .authorized(self.http.get(self.table_url(table)))
            .query(query)
            .send()
            .await?;
        check_status(resp.status())?;
        Ok(resp.json::<Vec<Value>>().await?)
    }

    async fn insert(&self, table: &str, row: &Value) -> Result<Vec<Value>, DeliveryError> {
        let resp = self
            .authorized(self.http.post(self.table_url(table)))
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;
        check_status(resp.status())?;
        Ok(resp.json::<Vec<Value>>().await?)
    }

    async fn broadcast(&self, device_id: i64, event: &str, payload: Value) -> Result<(), DeliveryError> {
        let body = json!({
            "messages": [{
                "topic": device_id.to_string(),
                "event": event,
                "payload": payload,
            }]
        });
        let resp = self
            .authorized(self.http.post(format!("{}/realtime/v1/api/broadcast", self.base_url)))
            .json(&body)
            .send()
            .await?;
        check_status(resp.status())
    }
}

fn check_status(status: StatusCode) -> Result<(), DeliveryError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(DeliveryError::Status(status))
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn int_field(row: &Value, key: &str) -> Option<i64> {
    row.get(key).and_then(Value::as_i64)
}

/// Thresholds from a patient row; missing, null or zero columns take the default
pub fn thresholds_from_row(row: &Value, default_minutes: u32) -> Thresholds {
    Thresholds {
        minutes: RegionMap::from_fn(|region| {
            int_field(row, &format!("{}_threshold", region.column_key()))
                .and_then(|m| u32::try_from(m).ok())
                .filter(|m| *m > 0)
                .unwrap_or(default_minutes)
        }),
    }
}

pub fn day_log_to_row(log: &DayLog, include_id: bool) -> Value {
    let mut row = Map::new();
    if include_id {
        if let Some(id) = log.id {
            row.insert("id".into(), json!(id));
        }
    }
    row.insert("day".into(), json!(log.day.format("%Y-%m-%d").to_string()));
    row.insert("device_id".into(), json!(log.device_id));
    for (region, total) in log.totals.iter() {
        row.insert(format!("total_{}", region.column_key()), json!(total));
    }
    Value::Object(row)
}

pub fn day_log_from_row(row: &Value) -> Result<DayLog, DeliveryError> {
    let day = row
        .get("day")
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .ok_or_else(|| DeliveryError::Storage(format!("day_logs row without a valid day: {row}")))?;
    let device_id = int_field(row, "device_id")
        .ok_or_else(|| DeliveryError::Storage(format!("day_logs row without device_id: {row}")))?;

    let mut log = DayLog::empty(device_id, day);
    log.id = int_field(row, "id");
    log.totals = RegionMap::from_fn(|region: BodyRegion| {
        row.get(format!("total_{}", region.column_key()))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    });
    Ok(log)
}

pub fn pressure_log_to_row(log: &PressureLog) -> Value {
    let mut row = Map::new();
    row.insert("day_id".into(), json!(log.day_id));
    row.insert("created_at".into(), json!(log.created_at.to_rfc3339()));
    for (region, secs) in log.durations.iter() {
        row.insert(region.column_key().to_string(), json!(secs));
    }
    row.insert("posture_type".into(), json!(log.posture.code()));
    row.insert("posture_change_required".into(), json!(log.posture_change_required));
    Value::Object(row)
}

#[async_trait]
impl PersistenceSink for SupabaseClient {
    fn backend_name(&self) -> &str {
        "supabase"
    }

    async fn fetch_thresholds(&self, device_id: i64) -> Result<Thresholds, DeliveryError> {
        let rows = self.select("patients", &[("device_id", format!("eq.{device_id}"))]).await?;
        match rows.first() {
            Some(row) => Ok(thresholds_from_row(row, self.default_threshold_minutes)),
            None => Err(DeliveryError::Storage(format!("no patient registered for device {device_id}"))),
        }
    }

    async fn fetch_day_log(&self, device_id: i64, day: NaiveDate) -> Result<Option<DayLog>, DeliveryError> {
        let rows = self
            .select(
                "day_logs",
                &[
                    ("device_id", format!("eq.{device_id}")),
                    ("day", format!("eq.{}", day.format("%Y-%m-%d"))),
                ],
            )
            .await?;
        rows.first().map(day_log_from_row).transpose()
    }

    async fn create_day_log(&self, log: &DayLog) -> Result<DayLog, DeliveryError> {
        let rows = self.insert("day_logs", &day_log_to_row(log, false)).await?;
        let mut created = match rows.first() {
            Some(row) => day_log_from_row(row)?,
            None => {
                tracing::warn!(device_id = log.device_id, day = %log.day, "Day log insert returned no row");
                log.clone()
            }
        };
        created.last_posture = log.last_posture;
        Ok(created)
    }

    async fn update_day_log(&self, log: &DayLog) -> Result<(), DeliveryError> {
        let Some(id) = log.id else {
            return Err(DeliveryError::Storage("day log has no remote id".into()));
        };
        let resp = self
            .authorized(self.http.patch(self.table_url("day_logs")))
            .query(&[("id", format!("eq.{id}"))])
            .json(&day_log_to_row(log, true))
            .send()
            .await?;
        check_status(resp.status())
    }

    async fn create_pressure_log(&self, log: &PressureLog) -> Result<(), DeliveryError> {
        self.insert("pressure_logs", &pressure_log_to_row(log)).await?;
        Ok(())
    }

    async fn fetch_device_controls(&self, device_id: i64) -> Result<Value, DeliveryError> {
        let rows = self
            .select("devices", &[("select", "controls".to_string()), ("id", format!("eq.{device_id}"))])
            .await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("controls").cloned())
            .unwrap_or(Value::Null))
    }

    async fn broadcast_heatmap(&self, device_id: i64, heatmap: &Grid) -> Result<(), DeliveryError> {
        self.broadcast(device_id, HEATMAP_EVENT, json!({ "values": heatmap.values() }))
            .await
    }

    async fn broadcast_controls(&self, device_id: i64, message: &InboundMessage) -> Result<(), DeliveryError> {
        self.broadcast(device_id, CONTROLS_EVENT, serde_json::to_value(message)?)
            .await
    }
}

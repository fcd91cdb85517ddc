//! Caregiver push notifications

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{DeliveryError, Notifier};
use crate::config::NotificationConfig;
use crate::types::AlertPayload;

/// Posts alerts to a push gateway as `{topic, notification, priority}`
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
    auth_token: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, auth_token: Option<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, url: url.into(), auth_token })
    }

    pub fn body(alert: &AlertPayload) -> serde_json::Value {
        json!({
            "topic": alert.target,
            "notification": {
                "title": alert.title,
                "body": alert.body,
            },
            "priority": alert.priority,
            "regions": alert.regions,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, alert: &AlertPayload) -> Result<(), DeliveryError> {
        let mut req = self.http.post(&self.url).json(&Self::body(alert));
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        let resp = req.send().await?;
        if resp.status().is_success() {
            tracing::info!(topic = %alert.target, "Alert delivered");
            Ok(())
        } else {
            Err(DeliveryError::Status(resp.status()))
        }
    }
}

/// Used when no push endpoint is configured
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, alert: &AlertPayload) -> Result<(), DeliveryError> {
        tracing::warn!(topic = %alert.target, title = %alert.title, "{}", alert.body);
        Ok(())
    }
}

/// Webhook notifier when an endpoint is configured, log-only otherwise
pub fn build_notifier(config: &NotificationConfig, timeout: Duration) -> Result<Box<dyn Notifier>, DeliveryError> {
    match config.webhook_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => Ok(Box::new(WebhookNotifier::new(url, config.auth_token.clone(), timeout)?)),
        None => Ok(Box::new(LogNotifier)),
    }
}

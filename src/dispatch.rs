//! Trigger event and decision delivery.
//!
//! The monitor hands emitted events to an [`ActionDispatcher`]; delivery and
//! retry semantics live entirely here, outside the evaluation core. The
//! default dispatcher writes structured logs; configuring a webhook URL
//! swaps in HTTP delivery with bounded retries.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::DispatchConfig;
use crate::decision::Decision;
use crate::monitor::TriggerEvent;

/// Consumer of emitted trigger events and decisions.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Dispatcher name for logging.
    fn name(&self) -> &'static str;

    /// Deliver a trigger event.
    async fn deliver_event(&self, event: &TriggerEvent) -> Result<()>;

    /// Deliver a decision.
    async fn deliver_decision(&self, decision: &Decision) -> Result<()>;
}

/// Structured-log dispatcher; the default when no webhook is configured.
#[derive(Debug, Default)]
pub struct LogDispatcher;

#[async_trait]
impl ActionDispatcher for LogDispatcher {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver_event(&self, event: &TriggerEvent) -> Result<()> {
        info!(
            event_id = %event.id,
            ticker = %event.ticker,
            condition = %event.condition_name,
            price = event.snapshot_price,
            "TRIGGER fired"
        );
        Ok(())
    }

    async fn deliver_decision(&self, decision: &Decision) -> Result<()> {
        info!(
            ticker = %decision.ticker,
            score = decision.score,
            category = %decision.category,
            "Decision"
        );
        Ok(())
    }
}

/// Webhook dispatcher: POSTs JSON payloads with bounded retries.
pub struct WebhookDispatcher {
    url: String,
    retry_count: u32,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Payload<'a> {
    TriggerEvent(&'a TriggerEvent),
    Decision(&'a Decision),
}

impl WebhookDispatcher {
    pub fn new(url: String, retry_count: u32, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            url,
            retry_count: retry_count.max(1),
            client,
        }
    }

    async fn post(&self, payload: &Payload<'_>) -> Result<()> {
        let mut last_error = None;

        for attempt in 1..=self.retry_count {
            match self.client.post(&self.url).json(payload).send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => {
                    warn!(
                        attempt,
                        status = %response.status(),
                        "Webhook delivery rejected"
                    );
                    last_error = Some(anyhow::anyhow!("webhook returned {}", response.status()));
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Webhook delivery failed");
                    last_error = Some(e.into());
                }
            }

            if attempt < self.retry_count {
                tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("webhook delivery failed")))
            .with_context(|| format!("giving up after {} attempts", self.retry_count))
    }
}

#[async_trait]
impl ActionDispatcher for WebhookDispatcher {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver_event(&self, event: &TriggerEvent) -> Result<()> {
        self.post(&Payload::TriggerEvent(event)).await
    }

    async fn deliver_decision(&self, decision: &Decision) -> Result<()> {
        self.post(&Payload::Decision(decision)).await
    }
}

/// Build the configured dispatcher.
pub fn dispatcher_from_config(config: &DispatchConfig) -> std::sync::Arc<dyn ActionDispatcher> {
    match &config.webhook_url {
        Some(url) => std::sync::Arc::new(WebhookDispatcher::new(
            url.clone(),
            config.retry_count,
            Duration::from_secs(config.timeout_secs),
        )),
        None => std::sync::Arc::new(LogDispatcher),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_log_dispatcher_accepts_events() {
        let dispatcher = LogDispatcher;
        let event = TriggerEvent {
            id: "e-1".to_string(),
            ticker: "X".to_string(),
            condition_name: "stop_loss".to_string(),
            fired_at: Utc::now(),
            snapshot_price: 95.0,
        };
        assert!(dispatcher.deliver_event(&event).await.is_ok());
    }

    #[test]
    fn test_config_selects_dispatcher() {
        let config = DispatchConfig::default();
        assert_eq!(dispatcher_from_config(&config).name(), "log");

        let config = DispatchConfig {
            webhook_url: Some("http://127.0.0.1:1/hook".to_string()),
            ..DispatchConfig::default()
        };
        assert_eq!(dispatcher_from_config(&config).name(), "webhook");
    }
}

//! Outbound notification adapters.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde_json::json;
use uuid::Uuid;

use crate::ports::Notifier;

/// Posts low-balance alerts to a configured webhook endpoint. Delivery is
/// best-effort; the caller never waits on or fails with us.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookNotifier {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_low_balance(&self, holder_id: Uuid, balance: &BigDecimal) -> anyhow::Result<()> {
        self.client
            .post(&self.endpoint)
            .json(&json!({
                "kind": "low_balance",
                "pass_holder_id": holder_id,
                "balance": balance.to_string(),
            }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

/// Drops notifications on the floor; used when no webhook is configured.
#[derive(Clone, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send_low_balance(&self, holder_id: Uuid, balance: &BigDecimal) -> anyhow::Result<()> {
        tracing::debug!(holder = %holder_id, %balance, "low balance (no notifier configured)");
        Ok(())
    }
}

//! Notification gateway: the external collaborator that actually reaches a
//! user. The pipeline only needs the `deliver` contract; transports live
//! behind it.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::error::GatewayError;

/// Abstract alert transport. At-least-once callers pass a deterministic
/// idempotency key so redeliveries collapse to one user-visible alert.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn deliver(&self, idempotency_key: &str, message: &str) -> Result<(), GatewayError>;
}

/// Gateway that only logs. Used for dry runs and as the default transport.
pub struct LogGateway;

#[async_trait]
impl NotificationGateway for LogGateway {
    async fn deliver(&self, idempotency_key: &str, message: &str) -> Result<(), GatewayError> {
        info!(key = %idempotency_key, alert = %message, "alert");
        Ok(())
    }
}

/// Webhook transport: POSTs the alert as JSON, idempotency key in both the
/// body and an `Idempotency-Key` header.
pub struct WebhookGateway {
    client: reqwest::Client,
    url: String,
}

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(15);

impl WebhookGateway {
    pub fn new(url: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Fatal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationGateway for WebhookGateway {
    async fn deliver(&self, idempotency_key: &str, message: &str) -> Result<(), GatewayError> {
        let body = json!({
            "idempotency_key": idempotency_key,
            "message": message,
        });

        let response = self
            .client
            .post(&self.url)
            .header("Idempotency-Key", idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Retryable(format!("webhook request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 429 || status.is_server_error() {
            Err(GatewayError::Retryable(format!("webhook {status}: {body}")))
        } else {
            // Malformed message or invalid destination: retrying cannot help.
            Err(GatewayError::Fatal(format!("webhook {status}: {body}")))
        }
    }
}

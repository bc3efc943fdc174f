//! Webhook outbox: event-driven delivery with independent retry.
//!
//! Subscribes to the server event bus and posts signed payloads to
//! registered endpoints. Delivery failures are retried here, on their own
//! schedule, and recorded per attempt; the processing pipeline never
//! waits on a webhook. Repeated failures disable the registration (the
//! repository enforces the threshold).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::{json, Value as JsonValue};
use sha2::Sha256;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use docflow_core::defaults;
use docflow_core::{Error, EventBus, Result, ServerEvent, Webhook, WebhookDelivery, WebhookRepository};

/// Signature header carried on every delivery.
pub const SIGNATURE_HEADER: &str = "X-Docflow-Signature";

/// Outbox configuration.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Delay between delivery attempts to the same endpoint.
    pub retry_delay: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(defaults::WEBHOOK_TIMEOUT_SECS),
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Handle for stopping a spawned outbox.
pub struct OutboxHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl OutboxHandle {
    /// Signal the outbox to stop. A delivery in flight completes and is
    /// recorded before the task exits.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Dispatches server events to registered webhooks.
pub struct WebhookOutbox {
    webhooks: Arc<dyn WebhookRepository>,
    client: Client,
    config: OutboxConfig,
}

impl WebhookOutbox {
    pub fn new(webhooks: Arc<dyn WebhookRepository>) -> Result<Self> {
        Self::with_config(webhooks, OutboxConfig::default())
    }

    pub fn with_config(webhooks: Arc<dyn WebhookRepository>, config: OutboxConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            webhooks,
            client,
            config,
        })
    }

    /// Subscribe to the bus and dispatch until the bus closes or the
    /// handle signals shutdown. The shutdown race happens only between
    /// events, so an in-flight delivery always runs to completion.
    pub fn spawn(self: Arc<Self>, events: &EventBus) -> (OutboxHandle, JoinHandle<()>) {
        let mut rx = events.subscribe();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            info!(
                subsystem = "pipeline",
                component = "webhook_outbox",
                "Webhook outbox started"
            );
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    received = rx.recv() => match received {
                        Ok(event) => self.dispatch_event(&event).await,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(
                                subsystem = "pipeline",
                                component = "webhook_outbox",
                                missed,
                                "Outbox lagged behind event bus"
                            );
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            info!(
                subsystem = "pipeline",
                component = "webhook_outbox",
                "Webhook outbox stopped"
            );
        });
        (OutboxHandle { shutdown_tx }, join)
    }

    /// Deliver one event to every active subscriber.
    pub async fn dispatch_event(&self, event: &ServerEvent) {
        let event_type = event.event_type();
        let targets = match self.webhooks.list_active_for_event(event_type).await {
            Ok(targets) => targets,
            Err(e) => {
                warn!(
                    subsystem = "pipeline",
                    component = "webhook_outbox",
                    error = %e,
                    "Failed to list webhooks"
                );
                return;
            }
        };

        if targets.is_empty() {
            return;
        }

        let payload = json!({
            "event": event_type,
            "timestamp": Utc::now(),
            "data": event,
        });

        for webhook in targets {
            self.deliver(&webhook, event_type, &payload).await;
        }
    }

    async fn deliver(&self, webhook: &Webhook, event_type: &str, payload: &JsonValue) {
        let body = payload.to_string();
        let max_attempts = webhook.max_retries.max(1) as u32;

        let mut last_status: Option<i32> = None;
        let mut last_body: Option<String> = None;
        let mut success = false;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.config.retry_delay * (attempt - 1)).await;
            }

            let mut request = self
                .client
                .post(&webhook.url)
                .header("Content-Type", "application/json")
                .body(body.clone());

            if let Some(ref secret) = webhook.secret {
                request = request.header(SIGNATURE_HEADER, sign_payload(secret, &body));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    last_status = Some(status.as_u16() as i32);
                    last_body = response.text().await.ok();
                    if status.is_success() {
                        success = true;
                        break;
                    }
                    debug!(
                        subsystem = "pipeline",
                        component = "webhook_outbox",
                        webhook_id = %webhook.id,
                        attempt,
                        status = status.as_u16(),
                        "Webhook delivery rejected"
                    );
                }
                Err(e) => {
                    last_status = None;
                    last_body = Some(e.to_string());
                    debug!(
                        subsystem = "pipeline",
                        component = "webhook_outbox",
                        webhook_id = %webhook.id,
                        attempt,
                        error = %e,
                        "Webhook delivery failed"
                    );
                }
            }
        }

        if success {
            debug!(
                subsystem = "pipeline",
                component = "webhook_outbox",
                webhook_id = %webhook.id,
                event_type,
                "Webhook delivered"
            );
        } else {
            warn!(
                subsystem = "pipeline",
                component = "webhook_outbox",
                webhook_id = %webhook.id,
                event_type,
                attempts = max_attempts,
                "Webhook delivery exhausted retries"
            );
        }

        let delivery = WebhookDelivery {
            id: docflow_core::uuid_utils::new_v7(),
            webhook_id: webhook.id,
            event_type: event_type.to_string(),
            payload: payload.clone(),
            status_code: last_status,
            response_body: last_body,
            delivered_at: Utc::now(),
            success,
        };
        if let Err(e) = self.webhooks.record_delivery(delivery).await {
            warn!(
                subsystem = "pipeline",
                component = "webhook_outbox",
                webhook_id = %webhook.id,
                error = %e,
                "Failed to record webhook delivery"
            );
        }
    }
}

/// HMAC-SHA256 signature over the raw request body, hex encoded.
pub fn sign_payload(secret: &str, body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a received signature against a shared secret.
pub fn verify_signature(secret: &str, body: &str, signature: &str) -> bool {
    sign_payload(secret, body) == signature
}

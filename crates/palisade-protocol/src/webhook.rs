//! Webhook fan-out to peer platforms.
//!
//! After a successful create or update, every active peer platform except
//! the originator is notified with the mutated payload. Delivery is
//! best-effort and at-most-once: bounded timeout, no retry, one peer's
//! failure never blocks the others. The payload and an `X-Origin-Platform`
//! header carry the sender identity so a receiving platform can recognize
//! and drop a write it originated itself.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value as Json;
use tokio::task::JoinSet;
use url::Url;

use palisade_guard::Directory;

use crate::config::WebhookConfig;

/// The body POSTed to each peer's webhook endpoint.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub id: String,
    pub w3id: String,
    pub evault_public_key: Option<String>,
    pub data: Json,
    pub schema_id: String,
    pub origin_platform: Option<String>,
}

/// Fans mutations out to peer platforms fetched from the directory.
pub struct WebhookDispatcher {
    directory: Arc<dyn Directory>,
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookDispatcher {
    pub fn new(directory: Arc<dyn Directory>, config: WebhookConfig) -> Self {
        Self { directory, client: reqwest::Client::new(), config }
    }

    /// The set of platforms to notify: everyone except the URL-normalized
    /// originator. When the origin (or a candidate) cannot be parsed as a
    /// URL, the candidate is kept — over-notification is preferred to
    /// silently dropping a peer.
    pub fn recipients(platforms: Vec<String>, origin: Option<&str>) -> Vec<String> {
        let origin_url = origin.and_then(|o| Url::parse(o).ok());
        platforms
            .into_iter()
            .filter(|platform| match (&origin_url, Url::parse(platform)) {
                (Some(origin), Ok(candidate)) => candidate.as_str() != origin.as_str(),
                _ => true,
            })
            .collect()
    }

    /// Deliver to all recipients concurrently. Each peer's failure is
    /// logged and isolated; this method itself never fails.
    pub async fn deliver(&self, payload: WebhookPayload) {
        let platforms = match self.directory.active_platforms().await {
            Ok(platforms) => platforms,
            Err(e) => {
                tracing::warn!(error = %e, "platform lookup failed, skipping webhook delivery");
                return;
            }
        };
        let recipients = Self::recipients(platforms, payload.origin_platform.as_deref());
        if recipients.is_empty() {
            return;
        }
        tracing::debug!(count = recipients.len(), id = %payload.id, "delivering webhooks");

        let mut deliveries = JoinSet::new();
        for platform in recipients {
            let client = self.client.clone();
            let payload = payload.clone();
            let path = self.config.endpoint_path.clone();
            let timeout = self.config.timeout;
            deliveries.spawn(async move {
                deliver_one(client, &platform, &path, timeout, payload).await;
            });
        }
        while deliveries.join_next().await.is_some() {}
    }

    /// Schedule delivery without awaiting it. The response path never waits
    /// on webhook outcomes.
    pub fn dispatch(self: &Arc<Self>, payload: WebhookPayload, delay: Duration) {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            dispatcher.deliver(payload).await;
        });
    }
}

async fn deliver_one(
    client: reqwest::Client,
    platform: &str,
    path: &str,
    timeout: Duration,
    payload: WebhookPayload,
) {
    let url = match Url::parse(platform).and_then(|base| base.join(path)) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(platform, error = %e, "invalid platform url, skipping webhook");
            return;
        }
    };
    let mut request = client.post(url).timeout(timeout).json(&payload);
    if let Some(origin) = &payload.origin_platform {
        request = request.header("X-Origin-Platform", origin);
    }
    match request.send().await {
        Ok(response) if response.status().is_success() => {
            tracing::debug!(platform, "webhook delivered");
        }
        Ok(response) => {
            tracing::warn!(platform, status = %response.status(), "webhook rejected by peer");
        }
        Err(e) => {
            tracing::warn!(platform, error = %e, "webhook delivery failed");
        }
    }
}

//! Vault configuration.

use std::time::Duration;

/// Webhook delivery tuning.
#[derive(Clone, Debug)]
pub struct WebhookConfig {
    /// Path appended to each peer platform's base URL.
    pub endpoint_path: String,
    /// Per-delivery timeout. A timed-out delivery is a failed delivery for
    /// that peer only.
    pub timeout: Duration,
    /// Extra delay before create-path fan-out. Feedback suppression is
    /// handled by the origin-platform tag, so this defaults to zero; the
    /// knob remains for deployments that want the old spacing back.
    pub create_delay: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/api/webhook".into(),
            timeout: Duration::from_secs(5),
            create_delay: Duration::ZERO,
        }
    }
}

/// Configuration for the vault service.
#[derive(Clone, Debug, Default)]
pub struct VaultConfig {
    /// This vault's public key, echoed in webhook payloads.
    pub public_key: Option<String>,
    /// Platform identity of the migration tool. Only a caller whose
    /// authenticated platform matches may skip webhooks on bulk creates.
    pub migration_platform: Option<String>,
    pub webhook: WebhookConfig,
}

//! Discord webhook notifier.

use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error};

use super::Notifier;
use crate::error::{Error, Result};
use crate::telemetry::metrics;

/// Discord rejects message content longer than this many characters.
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

/// Posts alerts to a Discord channel through a webhook.
pub struct DiscordNotifier {
    client: reqwest::Client,
    webhook_url: SecretString,
}

impl DiscordNotifier {
    pub fn new(webhook_url: SecretString) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("failed to build webhook client: {e}")))?;
        Ok(Self {
            client,
            webhook_url,
        })
    }

    async fn post(&self, content: &str) -> reqwest::Result<()> {
        self.client
            .post(self.webhook_url.expose_secret())
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, message: &str) {
        let content = truncate_chars(message, DISCORD_MESSAGE_LIMIT);
        match self.post(content).await {
            Ok(()) => {
                debug!(chars = content.chars().count(), "discord notified");
                metrics::notifications().add(1, &[KeyValue::new("result", "ok")]);
            }
            Err(e) => {
                // The webhook URL embeds a token; log the error without it.
                error!(error = %e.without_url(), "error notifying discord");
                metrics::notifications().add(1, &[KeyValue::new("result", "error")]);
            }
        }
    }
}

/// Longest prefix of `s` with at most `limit` characters.
pub fn truncate_chars(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

//! Alert delivery.
//!
//! Notifiers are best effort: delivery failures are logged where they happen
//! and never reach the monitor.

pub mod discord;

use async_trait::async_trait;
use tracing::warn;

pub use discord::DiscordNotifier;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `message`. Must not fail the caller.
    async fn notify(&self, message: &str);
}

/// Writes alerts to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) {
        warn!(alert = message, "unworked jobs alert");
    }
}

//! Delivery channel implementations.

pub mod telegram;
pub mod whatsapp;

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::ChannelError;

/// Upper bound on a single channel HTTP request, connect included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client shared by the channel adapters.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build HTTP client with timeout, using defaults");
            reqwest::Client::new()
        })
}

/// Trait for external messaging channels (Telegram bot, WhatsApp Business, etc.).
///
/// Each channel owns its own credentials and destination; the queue only
/// hands it formatted text.
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    /// Get the name of this channel.
    fn name(&self) -> &'static str;

    /// Check if this channel is enabled/configured.
    fn enabled(&self) -> bool;

    /// Configured recipient (chat id, phone number) if any.
    fn destination(&self) -> Option<&str>;

    /// Deliver formatted text to `destination`.
    async fn deliver(&self, text: &str, destination: &str) -> Result<(), ChannelError>;
}

//! Error types for the notification system.

use thiserror::Error;

/// Errors that can occur when delivering an alert through a channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Channel is not configured
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Rate limited by the service
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The service answered but refused the message
    #[error("Rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Other error
    #[error("{0}")]
    Other(String),
}

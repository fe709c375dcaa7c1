//! Error types for the guardian core.

use thiserror::Error;

/// Errors surfaced by persistence, settings, and configuration.
///
/// Scoring and triage never return these for recoverable conditions; they
/// log and fall back instead.
#[derive(Debug, Error)]
pub enum GuardianError {
    #[error("Failed to read '{key}': {reason}")]
    StorageRead { key: String, reason: String },

    #[error("Failed to write '{key}': {reason}")]
    StorageWrite { key: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid alert settings: {0}")]
    InvalidSettings(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for guardian operations.
pub type Result<T> = std::result::Result<T, GuardianError>;

//! Alert message types and their human-readable text layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery priority of an alert. Ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Informational, safe to batch
    Low,
    /// Worth a look today
    Normal,
    /// Needs attention soon
    High,
    /// Interrupt the parent now
    Critical,
}

impl Priority {
    /// Glyph prefixed to the formatted message.
    #[must_use]
    pub const fn glyph(&self) -> &'static str {
        match self {
            Self::Low => "ℹ️",
            Self::Normal => "🔔",
            Self::High => "⚠️",
            Self::Critical => "🚨",
        }
    }

    /// Get display name for this priority.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// What kind of message is being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A detected incident on the monitored device
    Incident,
    /// Periodic statistics digest
    Summary,
    /// Channel connectivity check
    Test,
}

impl MessageKind {
    /// Category glyph shown after the priority glyph.
    #[must_use]
    pub const fn glyph(&self) -> &'static str {
        match self {
            Self::Incident => "🛡️",
            Self::Summary => "📊",
            Self::Test => "🧪",
        }
    }
}

/// A single alert handed to the delivery queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub kind: MessageKind,
    pub priority: Priority,
    pub title: String,
    pub body: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl AlertMessage {
    /// Create a message stamped with the current time.
    pub fn new(
        kind: MessageKind,
        priority: Priority,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            priority,
            title: title.into(),
            body: body.into(),
            created_at: Utc::now(),
        }
    }

    /// Render the message as plain text for chat-style channels.
    ///
    /// The layout is a readability convention only; channels may adapt it.
    #[must_use]
    pub fn format_text(&self) -> String {
        format!(
            "{} {} {}\n\n{}\n\n🕒 {}",
            self.priority.glyph(),
            self.kind.glyph(),
            self.title,
            self.body,
            self.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

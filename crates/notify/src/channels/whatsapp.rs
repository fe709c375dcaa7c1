//! WhatsApp Business (Cloud API) channel.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{http_client, NotifyChannel, DEFAULT_REQUEST_TIMEOUT};
use crate::error::ChannelError;

/// Environment variable for the Cloud API access token.
const ENV_WHATSAPP_ACCESS_TOKEN: &str = "WHATSAPP_ACCESS_TOKEN";

/// Environment variable for the sending phone number id.
const ENV_WHATSAPP_PHONE_NUMBER_ID: &str = "WHATSAPP_PHONE_NUMBER_ID";

/// Environment variable for the recipient phone number.
const ENV_WHATSAPP_RECIPIENT: &str = "WHATSAPP_RECIPIENT";

/// Default Graph API endpoint.
pub const DEFAULT_WHATSAPP_API_BASE: &str = "https://graph.facebook.com/v19.0";

/// WhatsApp channel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WhatsAppConfig {
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
    pub recipient: Option<String>,
    pub api_base: String,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            phone_number_id: None,
            recipient: None,
            api_base: DEFAULT_WHATSAPP_API_BASE.to_string(),
        }
    }
}

impl WhatsAppConfig {
    /// Overlay credentials from environment variables.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var(ENV_WHATSAPP_ACCESS_TOKEN) {
            self.access_token = Some(token);
        }
        if let Ok(id) = std::env::var(ENV_WHATSAPP_PHONE_NUMBER_ID) {
            self.phone_number_id = Some(id);
        }
        if let Ok(recipient) = std::env::var(ENV_WHATSAPP_RECIPIENT) {
            self.recipient = Some(recipient);
        }
        self
    }
}

/// WhatsApp Business notification channel.
pub struct WhatsAppChannel {
    config: WhatsAppConfig,
    client: reqwest::Client,
}

impl WhatsAppChannel {
    /// Create a channel from explicit configuration.
    #[must_use]
    pub fn new(config: WhatsAppConfig) -> Self {
        Self {
            config,
            client: http_client(DEFAULT_REQUEST_TIMEOUT),
        }
    }

    /// Replace the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    /// Create a new WhatsApp channel from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let channel = Self::new(WhatsAppConfig::default().with_env_overrides());

        if channel.enabled() {
            debug!("WhatsApp notifications enabled");
        } else {
            debug!("WhatsApp notifications disabled (credentials not set)");
        }

        channel
    }
}

#[async_trait]
impl NotifyChannel for WhatsAppChannel {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    fn enabled(&self) -> bool {
        [
            &self.config.access_token,
            &self.config.phone_number_id,
            &self.config.recipient,
        ]
        .iter()
        .all(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }

    fn destination(&self) -> Option<&str> {
        self.config.recipient.as_deref()
    }

    async fn deliver(&self, text: &str, destination: &str) -> Result<(), ChannelError> {
        let token = self
            .config
            .access_token
            .as_deref()
            .ok_or_else(|| ChannelError::NotConfigured(ENV_WHATSAPP_ACCESS_TOKEN.to_string()))?;
        let phone_number_id = self
            .config
            .phone_number_id
            .as_deref()
            .ok_or_else(|| ChannelError::NotConfigured(ENV_WHATSAPP_PHONE_NUMBER_ID.to_string()))?;

        let url = format!(
            "{}/{phone_number_id}/messages",
            self.config.api_base.trim_end_matches('/')
        );

        let payload = TextMessage {
            messaging_product: "whatsapp",
            to: destination,
            kind: "text",
            text: TextBody { body: text },
        };

        debug!(channel = "whatsapp", to = destination, "Sending message");

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(channel = "whatsapp", "Message sent successfully");
            return Ok(());
        }

        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            warn!(channel = "whatsapp", retry_after_secs, "Rate limited by Cloud API");
            return Err(ChannelError::RateLimited { retry_after_secs });
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            channel = "whatsapp",
            status = %status,
            body = %body,
            "WhatsApp messages request failed"
        );

        Err(ChannelError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

// =============================================================================
// Cloud API types
// =============================================================================

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextBody<'a>,
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    body: &'a str,
}

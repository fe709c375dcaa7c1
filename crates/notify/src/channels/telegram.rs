//! Telegram bot API channel.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{http_client, NotifyChannel, DEFAULT_REQUEST_TIMEOUT};
use crate::error::ChannelError;

/// Environment variable for the bot token.
const ENV_TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";

/// Environment variable for the destination chat id.
const ENV_TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";

/// Default bot API endpoint.
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram channel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
        }
    }
}

impl TelegramConfig {
    /// Overlay credentials from environment variables, keeping existing values
    /// where a variable is unset.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var(ENV_TELEGRAM_BOT_TOKEN) {
            self.bot_token = Some(token);
        }
        if let Ok(chat_id) = std::env::var(ENV_TELEGRAM_CHAT_ID) {
            self.chat_id = Some(chat_id);
        }
        self
    }
}

/// Telegram bot notification channel.
pub struct TelegramChannel {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramChannel {
    /// Create a channel from explicit configuration.
    #[must_use]
    pub fn new(config: TelegramConfig) -> Self {
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

    /// Create a new Telegram channel from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let channel = Self::new(TelegramConfig::default().with_env_overrides());

        if channel.enabled() {
            debug!("Telegram notifications enabled");
        } else {
            debug!("Telegram notifications disabled (TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID not set)");
        }

        channel
    }

    fn endpoint(&self, token: &str) -> String {
        format!(
            "{}/bot{token}/sendMessage",
            self.config.api_base.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl NotifyChannel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn enabled(&self) -> bool {
        self.config.bot_token.as_deref().is_some_and(|t| !t.is_empty())
            && self.config.chat_id.as_deref().is_some_and(|c| !c.is_empty())
    }

    fn destination(&self) -> Option<&str> {
        self.config.chat_id.as_deref()
    }

    async fn deliver(&self, text: &str, destination: &str) -> Result<(), ChannelError> {
        let token = self
            .config
            .bot_token
            .as_deref()
            .ok_or_else(|| ChannelError::NotConfigured(ENV_TELEGRAM_BOT_TOKEN.to_string()))?;

        let payload = SendMessage {
            chat_id: destination,
            text,
            disable_web_page_preview: true,
        };

        debug!(channel = "telegram", chat_id = destination, "Sending message");

        let response = self
            .client
            .post(self.endpoint(token))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: Option<TelegramResponse> = serde_json::from_str(&body).ok();

        if status.as_u16() == 429 {
            let retry_after_secs = parsed
                .as_ref()
                .and_then(|r| r.parameters.as_ref())
                .and_then(|p| p.retry_after)
                .unwrap_or(30);
            warn!(channel = "telegram", retry_after_secs, "Rate limited by bot API");
            return Err(ChannelError::RateLimited { retry_after_secs });
        }

        match parsed {
            Some(r) if status.is_success() && r.ok => {
                debug!(channel = "telegram", "Message sent successfully");
                Ok(())
            }
            other => {
                let description = other
                    .and_then(|r| r.description)
                    .unwrap_or_else(|| body.clone());
                warn!(
                    channel = "telegram",
                    status = %status,
                    body = %description,
                    "Telegram sendMessage request failed"
                );
                Err(ChannelError::Rejected {
                    status: status.as_u16(),
                    body: description,
                })
            }
        }
    }
}

// =============================================================================
// Bot API types
// =============================================================================

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel_for(server: &MockServer) -> TelegramChannel {
        TelegramChannel::new(TelegramConfig {
            bot_token: Some("123:abc".to_string()),
            chat_id: Some("42".to_string()),
            api_base: server.uri(),
        })
    }

    #[test]
    fn test_disabled_without_credentials() {
        let channel = TelegramChannel::new(TelegramConfig::default());
        assert!(!channel.enabled());

        let channel = TelegramChannel::new(TelegramConfig {
            bot_token: Some("123:abc".to_string()),
            ..TelegramConfig::default()
        });
        assert!(!channel.enabled());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        // SAFETY: This test runs serially via #[serial] to avoid env var races
        unsafe {
            std::env::set_var(ENV_TELEGRAM_BOT_TOKEN, "999:xyz");
            std::env::set_var(ENV_TELEGRAM_CHAT_ID, "-1001");
        }

        let channel = TelegramChannel::from_env();
        assert!(channel.enabled());
        assert_eq!(channel.destination(), Some("-1001"));

        // SAFETY: see above
        unsafe {
            std::env::remove_var(ENV_TELEGRAM_BOT_TOKEN);
            std::env::remove_var(ENV_TELEGRAM_CHAT_ID);
        }
    }

    #[tokio::test]
    async fn test_deliver_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(serde_json::json!({
                "chat_id": "42",
                "text": "hello"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {"message_id": 7}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let channel = channel_for(&server);
        channel.deliver("hello", "42").await.unwrap();
    }

    #[tokio::test]
    async fn test_deliver_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 12",
                "parameters": {"retry_after": 12}
            })))
            .mount(&server)
            .await;

        let err = channel_for(&server).deliver("hello", "42").await.unwrap_err();
        assert!(matches!(err, ChannelError::RateLimited { retry_after_secs: 12 }));
    }

    #[tokio::test]
    async fn test_deliver_rejected_on_bad_chat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let err = channel_for(&server).deliver("hello", "42").await.unwrap_err();
        match err {
            ChannelError::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "Bad Request: chat not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_deliver_times_out_on_stalled_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": true, "result": {}}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let channel = channel_for(&server).with_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = channel.deliver("hello", "42").await.unwrap_err();

        assert!(matches!(&err, ChannelError::Http(e) if e.is_timeout()), "got {err}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}

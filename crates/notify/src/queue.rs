//! Channel fan-out with a bounded retry queue.
//!
//! [`DeliveryQueue::send`] tries every enabled channel in turn. When none of
//! them accepts a message it is parked in an in-memory retry queue that a
//! background worker drains on a fixed interval. Entries are dropped for good
//! once they have been attempted `max_attempts` times.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channels::telegram::{TelegramChannel, TelegramConfig};
use crate::channels::whatsapp::{WhatsAppChannel, WhatsAppConfig};
use crate::channels::NotifyChannel;
use crate::message::{AlertMessage, MessageKind, Priority};

/// Environment variable to disable all notifications.
const ENV_NOTIFY_DISABLED: &str = "NOTIFY_DISABLED";

/// Delivery attempts allowed per message, the first one included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delivery queue configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliveryConfig {
    /// Messages below this priority are skipped unless forced.
    pub min_priority: Priority,
    /// Seconds between retry passes.
    pub retry_interval_secs: u64,
    /// Pause between entries within a single retry pass.
    pub retry_pause_millis: u64,
    /// Attempts per message before it is discarded.
    pub max_attempts: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            min_priority: Priority::Normal,
            retry_interval_secs: 30,
            retry_pause_millis: 1000,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl DeliveryConfig {
    fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs.max(1))
    }

    fn retry_pause(&self) -> Duration {
        Duration::from_millis(self.retry_pause_millis)
    }
}

/// A message waiting for another delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedAlert {
    pub id: Uuid,
    pub message: AlertMessage,
    pub enqueued_at: DateTime<Utc>,
    /// Attempts made so far. Never decreases.
    pub attempts: u32,
    pub max_attempts: u32,
}

impl QueuedAlert {
    fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Result of [`DeliveryQueue::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// At least one channel accepted the message.
    Delivered { accepted: usize },
    /// Every enabled channel failed; the message waits in the retry queue.
    Queued,
    /// Priority below the delivery threshold. Nothing was attempted.
    Skipped,
    /// No channel is enabled. Nothing was attempted.
    NoChannels,
}

impl SendOutcome {
    /// `true` iff at least one channel accepted the message.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Counters for a single retry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub delivered: usize,
    pub requeued: usize,
    pub expired: usize,
}

/// Clears the in-progress flag even if the pass panics.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Alert dispatcher with retry-on-failure semantics.
pub struct DeliveryQueue {
    channels: Vec<Arc<dyn NotifyChannel>>,
    config: DeliveryConfig,
    pending: Mutex<VecDeque<QueuedAlert>>,
    processing: AtomicBool,
}

impl DeliveryQueue {
    /// Create a queue over specific channels.
    #[must_use]
    pub fn new(channels: Vec<Arc<dyn NotifyChannel>>, config: DeliveryConfig) -> Self {
        Self {
            channels,
            config,
            pending: Mutex::new(VecDeque::new()),
            processing: AtomicBool::new(false),
        }
    }

    /// Build a queue from channel configuration.
    ///
    /// Only channels whose credentials are complete are kept. Setting
    /// `NOTIFY_DISABLED=true` yields a queue without channels.
    #[must_use]
    pub fn from_config(
        telegram: TelegramConfig,
        whatsapp: WhatsAppConfig,
        config: DeliveryConfig,
    ) -> Self {
        let disabled = std::env::var(ENV_NOTIFY_DISABLED)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        if disabled {
            info!("Notifications disabled via NOTIFY_DISABLED");
            return Self::new(vec![], config);
        }

        let mut channels: Vec<Arc<dyn NotifyChannel>> = vec![];

        let telegram = TelegramChannel::new(telegram);
        if telegram.enabled() {
            info!("Telegram notifications enabled");
            channels.push(Arc::new(telegram));
        }

        let whatsapp = WhatsAppChannel::new(whatsapp);
        if whatsapp.enabled() {
            info!("WhatsApp notifications enabled");
            channels.push(Arc::new(whatsapp));
        }

        if channels.is_empty() {
            warn!("No notification channels configured");
        } else {
            info!(channel_count = channels.len(), "Delivery queue initialized");
        }

        Self::new(channels, config)
    }

    /// Build a queue from environment variables only.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_config(
            TelegramConfig::default().with_env_overrides(),
            WhatsAppConfig::default().with_env_overrides(),
            DeliveryConfig::default(),
        )
    }

    /// Get the delivery configuration.
    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Get the number of enabled channels.
    pub fn channel_count(&self) -> usize {
        self.channels.iter().filter(|c| c.enabled()).count()
    }

    /// Check if any channel is enabled.
    pub fn has_channels(&self) -> bool {
        self.channel_count() > 0
    }

    /// Format and send a message. See [`DeliveryQueue::send_message`].
    pub async fn send(
        &self,
        kind: MessageKind,
        priority: Priority,
        title: &str,
        body: &str,
        force: bool,
    ) -> SendOutcome {
        self.send_message(AlertMessage::new(kind, priority, title, body), force)
            .await
    }

    /// Hand a message to every enabled channel in turn.
    ///
    /// Unless `force` is set, messages below the configured priority are
    /// skipped. If channels are enabled but none accepts the message, it is
    /// queued for retry instead of being dropped.
    pub async fn send_message(&self, message: AlertMessage, force: bool) -> SendOutcome {
        if !force && message.priority < self.config.min_priority {
            debug!(
                priority = %message.priority,
                threshold = %self.config.min_priority,
                "Below delivery threshold, skipping"
            );
            return SendOutcome::Skipped;
        }

        if !self.has_channels() {
            debug!("No channels configured, skipping message");
            return SendOutcome::NoChannels;
        }

        let accepted = self.dispatch(&message).await;
        if accepted > 0 {
            return SendOutcome::Delivered { accepted };
        }

        let entry = QueuedAlert {
            id: Uuid::new_v4(),
            message,
            enqueued_at: Utc::now(),
            attempts: 1,
            max_attempts: self.config.max_attempts,
        };
        warn!(
            queue_id = %entry.id,
            title = %entry.message.title,
            "All channels failed, queued for retry"
        );
        self.pending.lock().await.push_back(entry);

        SendOutcome::Queued
    }

    /// Send a connectivity check through every enabled channel.
    pub async fn send_test(&self) -> SendOutcome {
        self.send(
            MessageKind::Test,
            Priority::Low,
            "Test message",
            "Alert delivery is configured correctly.",
            true,
        )
        .await
    }

    /// Number of channels that accepted the message.
    async fn dispatch(&self, message: &AlertMessage) -> usize {
        let text = message.format_text();
        let mut accepted = 0;

        for channel in &self.channels {
            let channel_name = channel.name();

            if !channel.enabled() {
                debug!(channel = channel_name, "Channel disabled, skipping");
                continue;
            }

            let Some(destination) = channel.destination() else {
                warn!(channel = channel_name, "Channel has no destination, skipping");
                continue;
            };

            match channel.deliver(&text, destination).await {
                Ok(()) => {
                    debug!(channel = channel_name, "Alert delivered");
                    accepted += 1;
                }
                Err(e) => {
                    warn!(channel = channel_name, error = %e, "Failed to deliver alert");
                }
            }
        }

        accepted
    }

    /// Snapshot of messages waiting for retry.
    pub async fn pending(&self) -> Vec<QueuedAlert> {
        self.pending.lock().await.iter().cloned().collect()
    }

    /// Number of messages waiting for retry.
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Run one retry pass over the queue.
    ///
    /// Returns `None` when another pass is already running. Every entry
    /// present at the start of the pass is looked at exactly once; messages
    /// queued while the pass runs wait for the next one. An entry stays in
    /// the queue while it is being retried and leaves it only once delivered
    /// or out of attempts, so a pass that is cut short loses nothing.
    pub async fn process_pending(&self) -> Option<PassReport> {
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Retry pass already running");
            return None;
        }
        let _guard = PassGuard(&self.processing);

        let ids: Vec<Uuid> = self.pending.lock().await.iter().map(|e| e.id).collect();
        let mut report = PassReport::default();
        if ids.is_empty() {
            return Some(report);
        }

        debug!(entries = ids.len(), "Starting retry pass");

        let mut attempted = false;

        for id in ids {
            let message = {
                let mut pending = self.pending.lock().await;
                let Some(pos) = pending.iter().position(|e| e.id == id) else {
                    continue;
                };
                if pending[pos].exhausted() {
                    if let Some(entry) = pending.remove(pos) {
                        log_discarded(&entry);
                    }
                    report.expired += 1;
                    continue;
                }
                pending[pos].message.clone()
            };

            if attempted {
                tokio::time::sleep(self.config.retry_pause()).await;
            }
            attempted = true;

            let delivered = self.dispatch(&message).await > 0;

            let mut pending = self.pending.lock().await;
            let Some(pos) = pending.iter().position(|e| e.id == id) else {
                continue;
            };

            if delivered {
                if let Some(entry) = pending.remove(pos) {
                    info!(queue_id = %entry.id, attempts = entry.attempts + 1, "Queued alert delivered");
                }
                report.delivered += 1;
                continue;
            }

            let entry = &mut pending[pos];
            entry.attempts += 1;
            if entry.exhausted() {
                if let Some(entry) = pending.remove(pos) {
                    log_discarded(&entry);
                }
                report.expired += 1;
            } else {
                warn!(queue_id = %entry.id, attempts = entry.attempts, "Retry failed, keeping in queue");
                report.requeued += 1;
            }
        }

        Some(report)
    }

    /// Start the background retry worker.
    ///
    /// Runs a pass every `retry_interval_secs` until `cancel` fires. A pass
    /// that panics is logged and the next one waits twice the interval.
    pub fn spawn_retry_worker(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let interval = self.config.retry_interval();
            let mut delay = interval;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }

                let queue = Arc::clone(&self);
                match tokio::spawn(async move { queue.process_pending().await }).await {
                    Ok(Some(report)) => {
                        if report != PassReport::default() {
                            info!(
                                delivered = report.delivered,
                                requeued = report.requeued,
                                expired = report.expired,
                                "Retry pass finished"
                            );
                        }
                        delay = interval;
                    }
                    Ok(None) => delay = interval,
                    Err(e) => {
                        error!(error = %e, "Retry pass aborted, backing off");
                        delay = interval * 2;
                    }
                }
            }

            debug!("Retry worker stopped");
        })
    }
}

fn log_discarded(entry: &QueuedAlert) {
    error!(
        queue_id = %entry.id,
        attempts = entry.attempts,
        title = %entry.message.title,
        "Max retries exceeded, discarding alert"
    );
}

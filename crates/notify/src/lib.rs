//! Parent-facing alert delivery.
//!
//! This crate takes an alert that has already been judged worth sending and
//! pushes it to external messaging channels, retrying failures in the
//! background.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use notify::{DeliveryQueue, MessageKind, Priority};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() {
//! // Create the queue from environment variables
//! let queue = Arc::new(DeliveryQueue::from_env());
//! let cancel = CancellationToken::new();
//! let worker = Arc::clone(&queue).spawn_retry_worker(cancel.clone());
//!
//! let outcome = queue
//!     .send(MessageKind::Incident, Priority::High, "Threat detected", "Matched: narkotyki", false)
//!     .await;
//! println!("delivered: {}", outcome.is_delivered());
//!
//! cancel.cancel();
//! let _ = worker.await;
//! # }
//! ```
//!
//! # Configuration
//!
//! Channels read their credentials from configuration or the environment:
//!
//! - `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`: Telegram bot channel
//! - `WHATSAPP_ACCESS_TOKEN`, `WHATSAPP_PHONE_NUMBER_ID`, `WHATSAPP_RECIPIENT`:
//!   WhatsApp Business channel
//! - `NOTIFY_DISABLED`: Set to "true" to disable all notifications
//!
//! # Architecture
//!
//! - [`NotifyChannel`] trait defines the interface for delivery channels
//! - [`TelegramChannel`] and [`WhatsAppChannel`] implement it over HTTP
//! - [`DeliveryQueue`] fans a message out to all enabled channels and keeps
//!   failed messages for a bounded number of retries

pub mod channels;
pub mod error;
pub mod message;
pub mod queue;

pub use channels::telegram::{TelegramChannel, TelegramConfig};
pub use channels::whatsapp::{WhatsAppChannel, WhatsAppConfig};
pub use channels::NotifyChannel;
pub use error::ChannelError;
pub use message::{AlertMessage, MessageKind, Priority};
pub use queue::{DeliveryConfig, DeliveryQueue, PassReport, QueuedAlert, SendOutcome};

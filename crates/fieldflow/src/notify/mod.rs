//! Outbound notifications and third-party sync.
//!
//! Each message goes to one [`Channel`]. A channel with a webhook URL gets a JSON POST;
//! a channel without one only logs the message.

pub mod webhook;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub use webhook::WebhookNotifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Customer,
    Office,
    Accounting,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Customer => "customer",
            Channel::Office => "office",
            Channel::Accounting => "accounting",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What gets delivered: an event name plus its data.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Envelope {
    pub event: &'static str,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("notification timed out")]
    Timeout,
    #[error("notification request failed: {0}")]
    Http(String),
    #[error("receiver returned {status}")]
    Rejected { status: u16 },
    #[error("receiver is rate limiting")]
    RateLimited,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel: Channel, envelope: &Envelope) -> Result<(), NotifyError>;
}

/// Logs every message and delivers nothing.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, channel: Channel, envelope: &Envelope) -> Result<(), NotifyError> {
        tracing::info!(%channel, event = envelope.event, data = %envelope.data, "notification (log only)");
        Ok(())
    }
}

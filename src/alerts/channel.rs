use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::AlertEvent;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("channel misconfigured: {0}")]
    Misconfigured(String),
}

/// Delivery acknowledgement from a channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelAck {
    pub channel: String,
    pub message_id: Option<String>,
}

/// A delivery mechanism for alerts. Implementations must be safe to call
/// concurrently; delivery is best-effort and failures are reported back to
/// the dispatcher rather than panicking or retrying internally.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, event: &AlertEvent) -> Result<ChannelAck, ChannelError>;
}

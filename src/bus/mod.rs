//! Bus Client: publish to and subscribe from an inter-instance pub/sub
//! topic-per-channel, backed by NATS core pub/sub (no JetStream — this is
//! best-effort, at-least-once-while-subscribed fan-out, not a durable log;
//! durability for history lives in [`crate::history`]).

mod nats;

pub use nats::NatsBus;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus connection error: {0}")]
    Connect(String),
    #[error("bus publish error: {0}")]
    Publish(String),
    #[error("bus subscription dropped: {0}")]
    Disconnected(String),
}

/// One message observed on a bus subscription.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// The subject all channel topics live under, so a single wildcard
/// subscription covers every channel plus the control topic.
pub const CHANNEL_SUBJECT_PREFIX: &str = "relay.chat.";
pub const CONTROL_TOPIC: &str = "relay.control.create_channel";
pub const ALL_TOPICS_PATTERN: &str = "relay.>";

pub fn channel_subject(channel: &str) -> String {
    format!("{CHANNEL_SUBJECT_PREFIX}{channel}")
}

/// Cross-instance pub/sub. Implementations must surface a dropped
/// subscription as [`BusError::Disconnected`] rather than silently
/// ending the stream, so the Fan-out Dispatcher can resubscribe.
#[async_trait]
pub trait BusClient: Send + Sync {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BusError>;

    /// Subscribe to a NATS-style subject pattern (e.g. `relay.>`).
    /// Returns a receiver; closing the channel signals disconnection.
    async fn subscribe_pattern(
        &self,
        pattern: &str,
    ) -> Result<tokio::sync::mpsc::Receiver<BusMessage>, BusError>;
}

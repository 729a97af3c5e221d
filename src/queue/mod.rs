//! Queue Client: enqueue notification and audit envelopes, best-effort
//! durable via NATS JetStream. `enqueue` is fired off the request path —
//! callers must never `.await` it inline with a reply (see `crate::session`).

mod nats;

pub use nats::NatsQueue;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue connection error: {0}")]
    Connect(String),
    #[error("queue publish error: {0}")]
    Publish(String),
}

pub const NOTIFICATION_QUEUE: &str = "relay-notifications";
pub const AUDIT_QUEUE: &str = "relay-audit-log";

#[async_trait]
pub trait QueueClient: Send + Sync {
    async fn enqueue(&self, queue_name: &str, payload: Bytes) -> Result<(), QueueError>;
}

//! NATS JetStream implementation of [`QueueClient`].

use super::{AUDIT_QUEUE, NOTIFICATION_QUEUE, QueueClient, QueueError};
use async_nats::jetstream::{self, stream::Config as StreamConfig};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

pub struct NatsQueue {
    jetstream: jetstream::Context,
}

impl NatsQueue {
    pub async fn connect(client: async_nats::Client) -> Result<Self, QueueError> {
        let jetstream = jetstream::new(client);
        for name in [NOTIFICATION_QUEUE, AUDIT_QUEUE] {
            jetstream
                .get_or_create_stream(StreamConfig {
                    name: name.to_string(),
                    subjects: vec![name.to_string()],
                    ..Default::default()
                })
                .await
                .map_err(|e| QueueError::Connect(e.to_string()))?;
        }
        info!("queue streams ready");
        Ok(Self { jetstream })
    }
}

#[async_trait]
impl QueueClient for NatsQueue {
    async fn enqueue(&self, queue_name: &str, payload: Bytes) -> Result<(), QueueError> {
        // Fire-and-forget from the caller's perspective: we don't await the
        // JetStream ack future here, only that NATS accepted the publish.
        self.jetstream
            .publish(queue_name.to_string(), payload)
            .await
            .map_err(|e| QueueError::Publish(e.to_string()))?;
        Ok(())
    }
}

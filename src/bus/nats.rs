//! NATS core pub/sub implementation of [`BusClient`].

use super::{BusClient, BusError, BusMessage};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        info!(url, "connecting to bus");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BusClient for NatsBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BusError> {
        self.client
            .publish(topic.to_string(), payload)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))
    }

    async fn subscribe_pattern(
        &self,
        pattern: &str,
    ) -> Result<mpsc::Receiver<BusMessage>, BusError> {
        let mut sub = self
            .client
            .subscribe(pattern.to_string())
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;

        let (tx, rx) = mpsc::channel(1024);
        tokio::spawn(async move {
            while let Some(msg) = sub.next().await {
                let forwarded = BusMessage {
                    topic: msg.subject.to_string(),
                    payload: msg.payload,
                };
                if tx.send(forwarded).await.is_err() {
                    break;
                }
            }
            warn!("bus subscription ended");
        });
        Ok(rx)
    }
}

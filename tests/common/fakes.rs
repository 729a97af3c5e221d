//! In-memory fakes for [`relayd::bus::BusClient`] and
//! [`relayd::queue::QueueClient`], standing in for NATS in tests that don't
//! need a real broker — only the fan-out and enqueue contracts.

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use relayd::bus::{BusClient, BusError, BusMessage};
use relayd::queue::{QueueClient, QueueError};
use tokio::sync::mpsc;

/// Broadcasts every publish to every currently-subscribed receiver,
/// ignoring the subject pattern — this harness only ever has one
/// subscriber (the dispatcher), so pattern matching adds nothing a real
/// broker's wildcard subscription wouldn't already give it.
#[derive(Default)]
pub struct FakeBus {
    subscribers: Mutex<Vec<mpsc::Sender<BusMessage>>>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BusClient for FakeBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BusError> {
        let mut subs = self.subscribers.lock().unwrap();
        subs.retain(|tx| {
            tx.try_send(BusMessage {
                topic: topic.to_string(),
                payload: payload.clone(),
            })
            .is_ok()
        });
        Ok(())
    }

    async fn subscribe_pattern(
        &self,
        _pattern: &str,
    ) -> Result<mpsc::Receiver<BusMessage>, BusError> {
        let (tx, rx) = mpsc::channel(256);
        self.subscribers.lock().unwrap().push(tx);
        Ok(rx)
    }
}

/// Records every enqueued payload for assertions; never fails.
#[derive(Default)]
pub struct FakeQueue {
    pub enqueued: Mutex<Vec<(String, Bytes)>>,
}

impl FakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, queue_name: &str) -> usize {
        self.enqueued
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == queue_name)
            .count()
    }
}

#[async_trait]
impl QueueClient for FakeQueue {
    async fn enqueue(&self, queue_name: &str, payload: Bytes) -> Result<(), QueueError> {
        self.enqueued
            .lock()
            .unwrap()
            .push((queue_name.to_string(), payload));
        Ok(())
    }
}

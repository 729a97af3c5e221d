//! NATS connection settings for the Bus and Queue Clients.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// NATS server URL, e.g. `nats://127.0.0.1:4222`.
    pub url: String,
}

/// Queue Client connection. Left empty to reuse `bus.url` — relayd's
/// reference deployment runs pub/sub and JetStream against the same
/// NATS cluster, same as the teacher's single-dependency messaging stack.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub url: String,
}

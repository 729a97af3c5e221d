//! Network listener configuration.

use serde::Deserialize;
use std::net::SocketAddr;

/// TCP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind to (e.g., "0.0.0.0:7000").
    pub address: SocketAddr,
}

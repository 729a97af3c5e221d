//! Configuration loading and validation.
//!
//! Split into logical submodules the way the teacher splits
//! `config/{types,listen,history,...}.rs`:
//! - [`server`]: process identity, logging and metrics.
//! - [`listen`]: the TCP listener address.
//! - [`history`]: history/database file locations.
//! - [`bus`]: NATS bus connection.
//! - [`queue`]: NATS JetStream connection.
//! - [`security`]: the pluggable authenticator selection.

mod bus;
mod history;
mod listen;
mod security;
mod server;
mod validation;

pub use bus::BusConfig;
pub use history::HistoryConfig;
pub use listen::ListenConfig;
pub use security::{AuthenticatorKind, SecurityConfig};
pub use server::{LogFormat, ServerConfig};
pub use validation::{validate, ValidationError};

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub listen: ListenConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    pub bus: BusConfig,
    /// Defaults to the bus URL when omitted — relayd's reference queue
    /// backend is JetStream on the same NATS connection.
    #[serde(default)]
    pub queue: bus::QueueConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Resolve the configuration path from CLI arguments: `-c <path>`,
/// `--config <path>`, a bare path, or the `config.toml` default.
pub fn resolve_config_path() -> String {
    let mut args = std::env::args().skip(1);
    match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("missing path after {flag}");
            std::process::exit(1);
        }),
        Some(path) => path,
        None => "config.toml".to_string(),
    }
}

//! Process identity, logging, and metrics configuration.

use serde::Deserialize;

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_metrics_port() -> u16 {
    9090
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Name used in `tracing` spans and logs; purely cosmetic.
    #[serde(default = "default_instance_name")]
    pub name: String,
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Prometheus HTTP endpoint port. `0` disables it — used by tests.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_instance_name() -> String {
    "relayd".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_instance_name(),
            log_format: LogFormat::Pretty,
            metrics_port: default_metrics_port(),
        }
    }
}

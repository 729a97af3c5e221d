//! Storage file locations for the two History Store backends.

use serde::Deserialize;

fn default_sqlite_path() -> String {
    "relayd.db".to_string()
}

fn default_redb_path() -> String {
    "relayd_messages.redb".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Path to the SQLite database file backing channels/membership/audit
    /// logs. `:memory:` is accepted for tests.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    /// Path to the redb file backing the append-only message log.
    #[serde(default = "default_redb_path")]
    pub redb_path: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            redb_path: default_redb_path(),
        }
    }
}

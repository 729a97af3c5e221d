//! Append-only half of the History Store: the per-channel `Message` log.
//!
//! Backed by `redb`, mirroring the lexicographically-keyed range-query
//! design used elsewhere in this codebase for durable, ordered history.

mod redb_store;

pub use redb_store::RedbMessageLog;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A single message in a channel's append-only log.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub channel: String,
    pub published_at: i64,
    pub writer: String,
    pub r#type: String,
    pub message: String,
}

/// Filter for [`RedbMessageLog::query`].
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    pub before: Option<i64>,
    pub after: Option<i64>,
    pub limit: usize,
    pub newest_first: bool,
}

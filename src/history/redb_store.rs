//! Redb-backed persistent message history.
//!
//! Keys are `"{channel}\0{published_at:020}"` so that a lexicographic
//! range scan within one channel's key prefix visits messages in
//! `published_at` order — the same trick used for ordered, efficiently
//! queryable append logs elsewhere in this codebase.

use super::{HistoryError, Message, MessageQuery};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::sync::Arc;
use std::time::Duration;

const MESSAGES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("messages");

pub struct RedbMessageLog {
    db: Arc<Database>,
}

impl RedbMessageLog {
    pub fn new(path: &str) -> Result<Self, HistoryError> {
        let db = Database::create(path).map_err(|e| HistoryError::Database(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }

    fn make_key(channel: &str, published_at: i64) -> String {
        format!("{channel}\0{published_at:020}")
    }

    /// Append a message; `published_at` must already be unique and
    /// increasing for the channel (the caller assigns it from the bus
    /// publish path, not this store).
    pub async fn append(&self, msg: &Message) -> Result<(), HistoryError> {
        let key = Self::make_key(&msg.channel, msg.published_at);
        let value =
            serde_json::to_vec(msg).map_err(|e| HistoryError::Serialization(e.to_string()))?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| HistoryError::Database(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(MESSAGES_TABLE)
                .map_err(|e| HistoryError::Database(e.to_string()))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(|e| HistoryError::Database(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| HistoryError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn query(
        &self,
        channel: &str,
        filter: MessageQuery,
    ) -> Result<Vec<Message>, HistoryError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| HistoryError::Database(e.to_string()))?;
        let table = read_txn
            .open_table(MESSAGES_TABLE)
            .map_err(|e| HistoryError::Database(e.to_string()))?;

        let start = filter.after.map(|a| a.saturating_add(1)).unwrap_or(0);
        let end = filter.before.unwrap_or(i64::MAX);
        let start_key = Self::make_key(channel, start);
        let end_key = Self::make_key(channel, end);

        let range = table
            .range(start_key.as_str()..=end_key.as_str())
            .map_err(|e| HistoryError::Database(e.to_string()))?;

        let limit = if filter.limit == 0 { usize::MAX } else { filter.limit };
        let mut messages = Vec::new();

        if filter.newest_first {
            for item in range.rev() {
                if messages.len() >= limit {
                    break;
                }
                let (_k, v) = item.map_err(|e| HistoryError::Database(e.to_string()))?;
                let msg: Message = serde_json::from_slice(v.value())
                    .map_err(|e| HistoryError::Serialization(e.to_string()))?;
                messages.push(msg);
            }
        } else {
            for item in range {
                if messages.len() >= limit {
                    break;
                }
                let (_k, v) = item.map_err(|e| HistoryError::Database(e.to_string()))?;
                let msg: Message = serde_json::from_slice(v.value())
                    .map_err(|e| HistoryError::Serialization(e.to_string()))?;
                messages.push(msg);
            }
        }

        Ok(messages)
    }

    /// Count messages with `published_at > after` for the channel.
    pub async fn count_messages(&self, channel: &str, after: i64) -> Result<usize, HistoryError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| HistoryError::Database(e.to_string()))?;
        let table = read_txn
            .open_table(MESSAGES_TABLE)
            .map_err(|e| HistoryError::Database(e.to_string()))?;

        let start_key = Self::make_key(channel, after.saturating_add(1));
        let end_key = Self::make_key(channel, i64::MAX);
        let range = table
            .range(start_key.as_str()..=end_key.as_str())
            .map_err(|e| HistoryError::Database(e.to_string()))?;

        let mut count = 0usize;
        for item in range {
            item.map_err(|e| HistoryError::Database(e.to_string()))?;
            count += 1;
        }
        Ok(count)
    }

    /// Drop messages older than `retention`, across all channels.
    pub async fn prune(&self, retention: Duration, now_nanos: i64) -> Result<usize, HistoryError> {
        let cutoff = now_nanos - retention.as_nanos() as i64;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| HistoryError::Database(e.to_string()))?;
        let mut count = 0;
        {
            let mut table = write_txn
                .open_table(MESSAGES_TABLE)
                .map_err(|e| HistoryError::Database(e.to_string()))?;

            let mut to_delete = Vec::new();
            for item in table
                .iter()
                .map_err(|e| HistoryError::Database(e.to_string()))?
            {
                let (k, _v) = item.map_err(|e| HistoryError::Database(e.to_string()))?;
                let key_str = k.value();
                if let Some((_, ts)) = key_str.split_once('\0')
                    && let Ok(ts) = ts.parse::<i64>()
                    && ts < cutoff
                {
                    to_delete.push(key_str.to_string());
                }
            }

            for k in to_delete {
                table
                    .remove(k.as_str())
                    .map_err(|e| HistoryError::Database(e.to_string()))?;
                count += 1;
            }
        }
        write_txn
            .commit()
            .map_err(|e| HistoryError::Database(e.to_string()))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(channel: &str, published_at: i64, writer: &str) -> Message {
        Message {
            channel: channel.to_string(),
            published_at,
            writer: writer.to_string(),
            r#type: "text".to_string(),
            message: "hi".to_string(),
        }
    }

    #[tokio::test]
    async fn query_returns_messages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = RedbMessageLog::new(dir.path().join("history.redb").to_str().unwrap()).unwrap();

        log.append(&msg("g1", 100, "a")).await.unwrap();
        log.append(&msg("g1", 200, "b")).await.unwrap();
        log.append(&msg("g1", 300, "a")).await.unwrap();

        let newest_first = log
            .query(
                "g1",
                MessageQuery {
                    newest_first: true,
                    limit: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            newest_first.iter().map(|m| m.published_at).collect::<Vec<_>>(),
            vec![300, 200]
        );

        let oldest_first = log
            .query(
                "g1",
                MessageQuery {
                    after: Some(100),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            oldest_first.iter().map(|m| m.published_at).collect::<Vec<_>>(),
            vec![200, 300]
        );
    }

    #[tokio::test]
    async fn count_messages_excludes_seen() {
        let dir = tempfile::tempdir().unwrap();
        let log = RedbMessageLog::new(dir.path().join("history.redb").to_str().unwrap()).unwrap();
        log.append(&msg("g1", 100, "a")).await.unwrap();
        log.append(&msg("g1", 200, "b")).await.unwrap();

        assert_eq!(log.count_messages("g1", 100).await.unwrap(), 1);
        assert_eq!(log.count_messages("g1", 0).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn channels_do_not_interfere() {
        let dir = tempfile::tempdir().unwrap();
        let log = RedbMessageLog::new(dir.path().join("history.redb").to_str().unwrap()).unwrap();
        log.append(&msg("g1", 100, "a")).await.unwrap();
        log.append(&msg("g2", 100, "b")).await.unwrap();

        let g1 = log.query("g1", MessageQuery::default()).await.unwrap();
        assert_eq!(g1.len(), 1);
        assert_eq!(g1[0].channel, "g1");
    }
}

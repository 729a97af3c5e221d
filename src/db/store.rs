//! Relational repository: channels, membership, and audit logs.

use super::models::{Channel, JoinInfo, UsageLog, WithdrawalLog};
use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("not found: {0}")]
    NotFound(String),
}

/// Repository over the relational half of the History Store.
pub struct SqliteStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SqliteStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Atomically create a channel and one `JoinInfo` per member.
    pub async fn insert_channel_with_members(
        &self,
        user_ids: &[String],
        is_group: bool,
        now: i64,
    ) -> Result<(Channel, Vec<JoinInfo>), StoreError> {
        let name = uuid::Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO channels (name, is_group_chat, created_at) VALUES (?, ?, ?)")
            .bind(&name)
            .bind(is_group)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let mut join_infos = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            sqlx::query(
                "INSERT INTO join_infos (channel, user_id, joined_at, last_read_at, last_sent_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&name)
            .bind(user_id)
            .bind(now)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            join_infos.push(JoinInfo::from_row(name.clone(), user_id.clone(), now, now, now));
        }

        tx.commit().await?;

        Ok((
            Channel {
                name,
                is_group_chat: is_group,
                created_at: now,
            },
            join_infos,
        ))
    }

    pub async fn get_channel(&self, name: &str) -> Result<Option<Channel>, StoreError> {
        let row = sqlx::query_as::<_, (String, bool, i64)>(
            "SELECT name, is_group_chat, created_at FROM channels WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(name, is_group_chat, created_at)| Channel {
            name,
            is_group_chat,
            created_at,
        }))
    }

    pub async fn batch_get_channels(&self, names: &[String]) -> Result<Vec<Channel>, StoreError> {
        let mut channels = Vec::with_capacity(names.len());
        // sqlx's query builder doesn't give us a portable `IN (...)` without
        // a dynamic placeholder list, so fetch sequentially; channel lists
        // per user are small (a user's own membership count).
        for name in names {
            if let Some(channel) = self.get_channel(name).await? {
                channels.push(channel);
            }
        }
        Ok(channels)
    }

    /// Find an existing non-group channel containing both `user_id` and
    /// `partner_id`, for `create`'s 1:1 reuse search.
    pub async fn find_private_channel(
        &self,
        user_id: &str,
        partner_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT a.channel FROM join_infos a
             JOIN join_infos b ON a.channel = b.channel
             JOIN channels c ON c.name = a.channel
             WHERE a.user_id = ? AND b.user_id = ? AND c.is_group_chat = 0
             LIMIT 1",
        )
        .bind(user_id)
        .bind(partner_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(channel,)| channel))
    }

    pub async fn join_infos_by_user(&self, user_id: &str) -> Result<Vec<JoinInfo>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, i64, i64, i64)>(
            "SELECT channel, user_id, joined_at, last_read_at, last_sent_at
             FROM join_infos WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(channel, user_id, joined_at, last_read_at, last_sent_at)| {
                JoinInfo::from_row(channel, user_id, joined_at, last_read_at, last_sent_at)
            })
            .collect())
    }

    pub async fn join_infos_by_channel(&self, channel: &str) -> Result<Vec<JoinInfo>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, i64, i64, i64)>(
            "SELECT channel, user_id, joined_at, last_read_at, last_sent_at
             FROM join_infos WHERE channel = ?",
        )
        .bind(channel)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(channel, user_id, joined_at, last_read_at, last_sent_at)| {
                JoinInfo::from_row(channel, user_id, joined_at, last_read_at, last_sent_at)
            })
            .collect())
    }

    pub async fn get_join_info(
        &self,
        channel: &str,
        user_id: &str,
    ) -> Result<Option<JoinInfo>, StoreError> {
        let row = sqlx::query_as::<_, (String, String, i64, i64, i64)>(
            "SELECT channel, user_id, joined_at, last_read_at, last_sent_at
             FROM join_infos WHERE channel = ? AND user_id = ?",
        )
        .bind(channel)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(channel, user_id, joined_at, last_read_at, last_sent_at)| {
            JoinInfo::from_row(channel, user_id, joined_at, last_read_at, last_sent_at)
        }))
    }

    /// Insert a fresh `JoinInfo` (e.g. on `join`), or update cursors on an
    /// existing one (e.g. after `get_channels`/`unread`/`attend` advance
    /// `last_sent_at`/`last_read_at`).
    pub async fn put_join_info(&self, info: &JoinInfo) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO join_infos (channel, user_id, joined_at, last_read_at, last_sent_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(channel, user_id) DO UPDATE SET
                 last_read_at = excluded.last_read_at,
                 last_sent_at = excluded.last_sent_at",
        )
        .bind(&info.channel)
        .bind(&info.user_id)
        .bind(info.joined_at)
        .bind(info.last_read_at)
        .bind(info.last_sent_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_join_info(&self, channel: &str, user_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM join_infos WHERE channel = ? AND user_id = ?")
            .bind(channel)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Snapshot a `JoinInfo` into `withdrawal_log` and delete it, in one
    /// transaction — removal and audit insert are atomic from the user's
    /// perspective.
    pub async fn withdraw(&self, info: &JoinInfo, now: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO withdrawal_log
                 (channel, user_id, joined_at, last_read_at, last_sent_at, withdrawn_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&info.channel)
        .bind(&info.user_id)
        .bind(info.joined_at)
        .bind(info.last_read_at)
        .bind(info.last_sent_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM join_infos WHERE channel = ? AND user_id = ?")
            .bind(&info.channel)
            .bind(&info.user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn put_withdrawal_log(&self, log: &WithdrawalLog) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO withdrawal_log
                 (channel, user_id, joined_at, last_read_at, last_sent_at, withdrawn_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&log.channel)
        .bind(&log.user_id)
        .bind(log.joined_at)
        .bind(log.last_read_at)
        .bind(log.last_sent_at)
        .bind(log.withdrawn_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn put_usage_log(&self, log: &UsageLog) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO usage_log (date, channel, user_id, last_published_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(date, channel, user_id) DO UPDATE SET
                 last_published_at = excluded.last_published_at",
        )
        .bind(&log.date)
        .bind(&log.channel)
        .bind(&log.user_id)
        .bind(log.last_published_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn test_db() -> Database {
        Database::new(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn insert_channel_with_members_creates_join_infos() {
        let db = test_db().await;
        let store = db.store();
        let (channel, infos) = store
            .insert_channel_with_members(&["a".into(), "b".into()], false, 1000)
            .await
            .unwrap();

        assert!(!channel.is_group_chat);
        assert_eq!(infos.len(), 2);
        let fetched = store.join_infos_by_channel(&channel.name).await.unwrap();
        assert_eq!(fetched.len(), 2);
    }

    #[tokio::test]
    async fn find_private_channel_reuses_existing() {
        let db = test_db().await;
        let store = db.store();
        let (channel, _) = store
            .insert_channel_with_members(&["a".into(), "b".into()], false, 1000)
            .await
            .unwrap();

        let found = store.find_private_channel("a", "b").await.unwrap();
        assert_eq!(found, Some(channel.name));
    }

    #[tokio::test]
    async fn withdraw_removes_join_info_and_logs_it() {
        let db = test_db().await;
        let store = db.store();
        let (channel, infos) = store
            .insert_channel_with_members(&["a".into(), "b".into()], true, 1000)
            .await
            .unwrap();

        store.withdraw(&infos[0], 2000).await.unwrap();

        let remaining = store.join_infos_by_channel(&channel.name).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].user_id, "b");
    }
}

//! Subscription Registry: a process-wide mapping channel-name -> set of
//! live sessions, plus the per-session outbound sender used to deliver
//! fan-out frames. Mutated on authenticate/join/create (add), and on
//! disconnect/withdrawal (remove); read by the Fan-out Dispatcher on
//! every bus event.
//!
//! `DashMap`/`DashSet` give us per-shard locking so adds, removes and
//! delivery iteration can run concurrently without a single global lock —
//! the same trade-off the channel manager elsewhere in this codebase
//! makes for its own hot concurrent map.

use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;

pub type SessionId = uuid::Uuid;

/// Process-wide channel subscription table.
#[derive(Default)]
pub struct Registry {
    channels: DashMap<String, DashSet<SessionId>>,
    senders: DashMap<SessionId, mpsc::Sender<Bytes>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session's outbound sender. Must be called once per
    /// session before any `subscribe` call for it.
    pub fn register_session(&self, session: SessionId, sender: mpsc::Sender<Bytes>) {
        self.senders.insert(session, sender);
    }

    /// Add `session` to channel `name`'s subscriber set.
    pub fn subscribe(&self, channel: &str, session: SessionId) {
        self.channels
            .entry(channel.to_string())
            .or_default()
            .insert(session);
    }

    /// Remove `session` from channel `name`'s subscriber set.
    pub fn unsubscribe(&self, channel: &str, session: SessionId) {
        if let Some(set) = self.channels.get(channel) {
            set.remove(&session);
        }
    }

    /// Remove a session from every channel and drop its outbound sender,
    /// on disconnect.
    pub fn remove_session(&self, session: SessionId, channels: &[String]) {
        for channel in channels {
            self.unsubscribe(channel, session);
        }
        self.senders.remove(&session);
    }

    /// Snapshot of sessions subscribed to `channel` at this instant. The
    /// contract only requires a consistent-at-some-point-in-time view, not
    /// a frozen one, so a cloned `Vec` of ids is sufficient.
    pub fn sessions_for(&self, channel: &str) -> Vec<SessionId> {
        match self.channels.get(channel) {
            Some(set) => set.iter().map(|id| *id).collect(),
            None => Vec::new(),
        }
    }

    pub fn sender_for(&self, session: SessionId) -> Option<mpsc::Sender<Bytes>> {
        self.senders.get(&session).map(|s| s.clone())
    }

    /// Number of subscribers for `channel`, for tests and metrics.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_unsubscribe_round_trip() {
        let registry = Registry::new();
        let session = SessionId::new_v4();
        let (tx, _rx) = mpsc::channel(8);
        registry.register_session(session, tx);
        registry.subscribe("g1", session);

        assert_eq!(registry.subscriber_count("g1"), 1);
        assert_eq!(registry.sessions_for("g1"), vec![session]);

        registry.unsubscribe("g1", session);
        assert_eq!(registry.subscriber_count("g1"), 0);
    }

    #[tokio::test]
    async fn remove_session_clears_all_channels() {
        let registry = Registry::new();
        let session = SessionId::new_v4();
        let (tx, _rx) = mpsc::channel(8);
        registry.register_session(session, tx);
        registry.subscribe("g1", session);
        registry.subscribe("g2", session);

        registry.remove_session(session, &["g1".to_string(), "g2".to_string()]);

        assert_eq!(registry.subscriber_count("g1"), 0);
        assert_eq!(registry.subscriber_count("g2"), 0);
        assert!(registry.sender_for(session).is_none());
    }
}

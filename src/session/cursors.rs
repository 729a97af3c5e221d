//! Shared cursor state the Fan-out Dispatcher writes to directly, so it
//! can advance a receiving session's read cursor without round-tripping
//! through the session's own task.
//!
//! This is the explicit-optional-field approach called for in
//! `SPEC_FULL.md` §9: a transient, in-memory marker set only while a
//! session attends a channel, mirrored here as an `ArcSwap`-free, lock-
//! guarded handle shared between the owning session and the dispatcher.

use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::registry::SessionId;

/// Per-session cursor handle: which channel (if any) the session is
/// currently attending, and the cached `last_read_at` for it.
pub struct AttendingHandle {
    attending: Mutex<Option<String>>,
    last_read_at: AtomicI64,
}

impl AttendingHandle {
    fn new() -> Self {
        Self {
            attending: Mutex::new(None),
            last_read_at: AtomicI64::new(0),
        }
    }

    pub fn set_attending(&self, channel: Option<String>, last_read_at: i64) {
        *self.attending.lock().unwrap() = channel;
        self.last_read_at.store(last_read_at, Ordering::SeqCst);
    }

    pub fn attending_channel(&self) -> Option<String> {
        self.attending.lock().unwrap().clone()
    }

    pub fn last_read_at(&self) -> i64 {
        self.last_read_at.load(Ordering::SeqCst)
    }
}

/// Process-wide table of per-session cursor handles, shared between every
/// Session task (which owns the handle for attend/exit transitions) and
/// the Fan-out Dispatcher (which advances `last_read_at` on delivery).
#[derive(Default)]
pub struct SessionCursors {
    handles: DashMap<SessionId, Arc<AttendingHandle>>,
}

impl SessionCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, session: SessionId) -> Arc<AttendingHandle> {
        let handle = Arc::new(AttendingHandle::new());
        self.handles.insert(session, handle.clone());
        handle
    }

    pub fn remove(&self, session: SessionId) {
        self.handles.remove(&session);
    }

    /// Advance `session`'s cached `last_read_at` to `published_at`, but
    /// only if it is currently attending `channel` — this is the
    /// dispatcher's only write into session state (see §4.3).
    pub fn advance_last_read(&self, session: SessionId, channel: &str, published_at: i64) {
        if let Some(handle) = self.handles.get(&session)
            && handle.attending_channel().as_deref() == Some(channel)
        {
            handle.last_read_at.fetch_max(published_at, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_only_for_attended_channel() {
        let cursors = SessionCursors::new();
        let session = SessionId::new_v4();
        let handle = cursors.create(session);
        handle.set_attending(Some("g1".to_string()), 100);

        cursors.advance_last_read(session, "g2", 200);
        assert_eq!(handle.last_read_at(), 100);

        cursors.advance_last_read(session, "g1", 200);
        assert_eq!(handle.last_read_at(), 200);
    }
}

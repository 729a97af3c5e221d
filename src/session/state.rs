//! The Session state machine: `pending -> authenticated -> (attending)`.
//!
//! Unlike a fully consuming typestate (where each transition returns a
//! distinct type), the Session holds one `SessionPhase` enum and replaces
//! it in place. A request dispatch loop naturally needs `&mut Session`
//! across many heterogeneous operations, so one owned enum is simpler to
//! thread through `handlers.rs` than a type-changing `Session<S>`; the
//! gates in `dispatch` enforce the same two-gate contract the fully
//! consuming version would.

use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::Authenticator;
use crate::bus::BusClient;
use crate::db::{Database, JoinInfo};
use crate::history::RedbMessageLog;
use crate::queue::QueueClient;
use crate::registry::{Registry, SessionId};
use crate::session::cursors::{AttendingHandle, SessionCursors};
use crate::time::MonotonicClock;

/// Dependencies shared by every session on a server instance — the
/// "explicit server context" called for instead of module-level
/// singletons.
pub struct ServerContext {
    pub db: Database,
    pub history: Arc<RedbMessageLog>,
    pub bus: Arc<dyn BusClient>,
    pub queue: Arc<dyn QueueClient>,
    pub registry: Arc<Registry>,
    pub cursors: Arc<SessionCursors>,
    pub authenticator: Arc<dyn Authenticator>,
    pub clock: MonotonicClock,
}

/// Per-channel membership snapshot cached on the session so handlers
/// don't round-trip to storage to check "is this user a member".
#[derive(Debug, Clone)]
pub struct JoinInfoCache {
    pub joins: HashMap<String, JoinInfo>,
}

impl JoinInfoCache {
    pub fn from_joins(joins: Vec<JoinInfo>) -> Self {
        Self {
            joins: joins.into_iter().map(|j| (j.channel.clone(), j)).collect(),
        }
    }
}

/// State held once a session has authenticated.
pub struct Authenticated {
    pub user_id: String,
    pub joins: JoinInfoCache,
    pub attending: Option<String>,
    /// Set only while attending, cleared on `exit` — mirrors
    /// `JoinInfo.last_published_at` in §3.
    pub last_published_at: Option<i64>,
}

pub enum SessionPhase {
    Pending,
    Authenticated(Authenticated),
}

pub struct Session {
    pub id: SessionId,
    pub phase: SessionPhase,
    pub ctx: Arc<ServerContext>,
    pub cursor_handle: Arc<AttendingHandle>,
}

impl Session {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        let id = SessionId::new_v4();
        let cursor_handle = ctx.cursors.create(id);
        Self {
            id,
            phase: SessionPhase::Pending,
            ctx,
            cursor_handle,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.phase, SessionPhase::Authenticated(_))
    }

    pub fn authenticated(&self) -> Option<&Authenticated> {
        match &self.phase {
            SessionPhase::Authenticated(a) => Some(a),
            SessionPhase::Pending => None,
        }
    }

    pub fn authenticated_mut(&mut self) -> Option<&mut Authenticated> {
        match &mut self.phase {
            SessionPhase::Authenticated(a) => Some(a),
            SessionPhase::Pending => None,
        }
    }

    /// Tear down: run `exit` bookkeeping, then drop this session from the
    /// Subscription Registry for every channel it held a `JoinInfo` for.
    pub async fn disconnect(&mut self) {
        crate::session::handlers::exit_impl(self).await;
        if let Some(auth) = self.authenticated() {
            let channels: Vec<String> = auth.joins.joins.keys().cloned().collect();
            self.ctx.registry.remove_session(self.id, &channels);
        }
        self.ctx.cursors.remove(self.id);
    }
}

//! Fan-out Dispatcher: one long-lived worker per server instance that
//! demultiplexes bus events to local sessions and advances per-session
//! read cursors.
//!
//! The dispatcher does not interpret type-specific semantics beyond
//! `channel` and `published_at` — it is the sole writer to the transport
//! for fan-out traffic, so it never blocks on one slow session before
//! delivering to the rest.

use std::sync::Arc;
use std::time::Duration;

use relay_proto::Envelope;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::bus::{ALL_TOPICS_PATTERN, BusClient};
use crate::registry::Registry;
use crate::session::SessionCursors;

/// Run the dispatcher until `shutdown` fires. Resubscribes to the bus on
/// disconnect rather than exiting, per the Bus Client contract (a gap in
/// the subscription loses in-flight messages, which is acceptable because
/// `unread` recovers history on reconnect).
pub async fn run(
    bus: Arc<dyn BusClient>,
    registry: Arc<Registry>,
    cursors: Arc<SessionCursors>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let mut rx = match bus.subscribe_pattern(ALL_TOPICS_PATTERN).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(error = %e, "dispatcher failed to subscribe, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(500)) => continue,
                    _ = shutdown.recv() => return,
                }
            }
        };

        info!("dispatcher subscribed to bus");
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(msg) => deliver(&registry, &cursors, &msg.payload),
                        None => {
                            warn!("bus subscription dropped, resubscribing");
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("dispatcher shutting down");
                    return;
                }
            }
        }
    }
}

fn deliver(registry: &Registry, cursors: &SessionCursors, payload: &bytes::Bytes) {
    let envelope = match Envelope::from_bytes(payload) {
        Ok(env) => env,
        Err(e) => {
            warn!(error = %e, "dispatcher received undecodable envelope");
            return;
        }
    };

    let Some(channel) = envelope.channel().map(str::to_string) else {
        return;
    };
    let published_at = envelope.published_at();

    for session in registry.sessions_for(&channel) {
        if let Some(sender) = registry.sender_for(session) {
            // A full outbound channel means a slow consumer; drop this
            // frame for that session rather than block delivery to others.
            if sender.try_send(payload.clone()).is_err() {
                crate::metrics::FAN_OUT_FRAMES_DROPPED.inc();
                warn!(%session, channel = %channel, "dropping fan-out frame for slow session");
            }
        }
        if let Some(published_at) = published_at {
            cursors.advance_last_read(session, &channel, published_at);
        }
    }
}

//! Per-connection driver: frames in, handler dispatch, frames out.
//!
//! Mirrors the teacher's `network::connection::{Connection, event_loop}`
//! split, simplified to this protocol's single unified `tokio::select!`
//! loop (no handshake phase — `authenticate` is just the first gated
//! request, not a separate wire phase).

pub mod cursors;
pub mod handlers;
pub mod state;

pub use cursors::{AttendingHandle, SessionCursors};
pub use state::{Authenticated, JoinInfoCache, ServerContext, Session, SessionPhase};

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use relay_proto::{Envelope, EnvelopeCodec};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;
use tracing::{debug, instrument, warn};

/// Outbound frames queued for this connection by the Fan-out Dispatcher.
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// A connection with no traffic at all for this long is dropped, so a
/// dead peer's session doesn't linger in the Registry forever.
const IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Drive one accepted TCP connection for its full lifetime.
#[instrument(skip(stream, ctx, shutdown))]
pub async fn run_connection(stream: TcpStream, ctx: Arc<ServerContext>, mut shutdown: broadcast::Receiver<()>) {
    let _ = stream.set_nodelay(true);
    let mut framed = Framed::new(stream, EnvelopeCodec);

    let mut session = Session::new(ctx);
    let session_id = session.id;
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Bytes>(OUTBOUND_CHANNEL_CAPACITY);
    session.ctx.registry.register_session(session_id, outbound_tx);
    crate::metrics::CONNECTED_SESSIONS.inc();

    loop {
        tokio::select! {
            frame = framed.next() => {
                match frame {
                    Some(Ok(envelope)) => {
                        if !handle_envelope(&mut framed, &mut session, &envelope).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(session = %session_id, error = %e, "frame decode error, closing connection");
                        break;
                    }
                    None => {
                        debug!(session = %session_id, "peer closed connection");
                        break;
                    }
                }
            }
            frame = outbound_rx.recv() => {
                match frame {
                    Some(payload) => {
                        if !forward_fan_out(&mut framed, &payload).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::time::sleep(IDLE_TIMEOUT) => {
                debug!(session = %session_id, "idle timeout, closing connection");
                break;
            }
            _ = shutdown.recv() => {
                debug!(session = %session_id, "server shutting down, closing connection");
                break;
            }
        }
    }

    crate::metrics::CONNECTED_SESSIONS.dec();
    session.disconnect().await;
}

/// Dispatch one decoded request and write back its reply (success or
/// in-band error). Returns `false` when the connection must close.
async fn handle_envelope(
    framed: &mut Framed<TcpStream, EnvelopeCodec>,
    session: &mut Session,
    envelope: &Envelope,
) -> bool {
    let method = envelope.method().unwrap_or("unknown").to_string();

    match handlers::dispatch(session, envelope).await {
        Ok(Some(reply)) => send(framed, reply).await,
        Ok(None) => true,
        Err(err) => {
            crate::metrics::REQUESTS_FAILED.inc();
            warn!(session = %session.id, %method, error = %err, "request failed");
            match err.to_error_reply(&method) {
                Some(reply) => send(framed, reply).await,
                None => false,
            }
        }
    }
}

/// A fan-out frame arrives pre-encoded in the bus's self-framed
/// representation (see `Envelope::to_bytes`); decode it and re-encode it
/// through this connection's `EnvelopeCodec` so the client sees the usual
/// length-prefixed frame.
async fn forward_fan_out(framed: &mut Framed<TcpStream, EnvelopeCodec>, payload: &Bytes) -> bool {
    match Envelope::from_bytes(payload) {
        Ok(envelope) => send(framed, envelope).await,
        Err(e) => {
            warn!(error = %e, "undecodable fan-out frame, dropping");
            true
        }
    }
}

async fn send(framed: &mut Framed<TcpStream, EnvelopeCodec>, envelope: Envelope) -> bool {
    if let Err(e) = framed.send(envelope).await {
        warn!(error = %e, "failed to write frame, closing connection");
        return false;
    }
    true
}

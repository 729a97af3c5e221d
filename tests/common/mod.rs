//! Integration test harness: a real `ServerContext`, dispatcher, and TCP
//! accept loop wired together in-process, with [`FakeBus`]/[`FakeQueue`]
//! standing in for NATS.

pub mod fakes;

use std::sync::Arc;
use std::time::Duration;

use fakes::{FakeBus, FakeQueue};
use futures_util::{SinkExt, StreamExt};
use relay_proto::{Envelope, EnvelopeCodec};
use relayd::auth::TrustedUserIdAuthenticator;
use relayd::db::Database;
use relayd::history::RedbMessageLog;
use relayd::registry::Registry;
use relayd::session::{ServerContext, SessionCursors};
use relayd::time::MonotonicClock;
use relayd::{dispatcher, session};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::codec::Framed;

pub struct TestServer {
    pub addr: std::net::SocketAddr,
    _history_dir: tempfile::TempDir,
    shutdown: broadcast::Sender<()>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let db = Database::new(":memory:").await.unwrap();
        let history_dir = tempfile::tempdir().unwrap();
        let history = Arc::new(
            RedbMessageLog::new(history_dir.path().join("history.redb").to_str().unwrap()).unwrap(),
        );
        let bus: Arc<dyn relayd::bus::BusClient> = Arc::new(FakeBus::new());
        let queue: Arc<dyn relayd::queue::QueueClient> = Arc::new(FakeQueue::new());
        let registry = Arc::new(Registry::new());
        let cursors = Arc::new(SessionCursors::new());

        let ctx = Arc::new(ServerContext {
            db,
            history,
            bus: bus.clone(),
            queue,
            registry: registry.clone(),
            cursors: cursors.clone(),
            authenticator: Arc::new(TrustedUserIdAuthenticator),
            clock: MonotonicClock::new(),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, _) = broadcast::channel(1);

        tokio::spawn(dispatcher::run(
            bus,
            registry,
            cursors,
            shutdown_tx.subscribe(),
        ));

        let accept_shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = accept_shutdown.subscribe();
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        let ctx = ctx.clone();
                        let conn_shutdown = accept_shutdown.subscribe();
                        tokio::spawn(session::run_connection(stream, ctx, conn_shutdown));
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            _history_dir: history_dir,
            shutdown: shutdown_tx,
        }
    }

    pub async fn connect(&self) -> TestClient {
        TestClient::connect(self.addr).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

pub struct TestClient {
    framed: Framed<TcpStream, EnvelopeCodec>,
}

impl TestClient {
    pub async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            framed: Framed::new(stream, EnvelopeCodec),
        }
    }

    pub async fn send(&mut self, env: Envelope) {
        self.framed.send(env).await.unwrap();
    }

    pub async fn recv(&mut self) -> Envelope {
        self.recv_timeout(Duration::from_secs(2)).await.expect("timed out waiting for a reply")
    }

    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Envelope> {
        match tokio::time::timeout(timeout, self.framed.next()).await {
            Ok(Some(Ok(env))) => Some(env),
            Ok(Some(Err(e))) => panic!("decode error: {e}"),
            Ok(None) => None,
            Err(_) => None,
        }
    }

    pub async fn authenticate(&mut self, user_id: &str) -> Envelope {
        let mut req = Envelope::new("authenticate");
        req.set("user_id", user_id.to_string());
        self.send(req).await;
        self.recv().await
    }
}

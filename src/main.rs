//! relayd — a persistent, multi-tenant chat relay server.

use std::sync::Arc;

use tracing::{error, info};

use relayd::auth::TrustedUserIdAuthenticator;
use relayd::bus::NatsBus;
use relayd::config::{self, Config};
use relayd::db::Database;
use relayd::history::RedbMessageLog;
use relayd::queue::NatsQueue;
use relayd::registry::Registry;
use relayd::session::{self, ServerContext, SessionCursors};
use relayd::time::MonotonicClock;
use relayd::{dispatcher, metrics};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config::resolve_config_path();
    let config = Config::load(&config_path).map_err(|e| {
        eprintln!("ERROR: failed to load config from {config_path}: {e}");
        e
    })?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match config.server.log_format {
        config::LogFormat::Json => {
            tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).json().init();
        }
        config::LogFormat::Pretty => {
            tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).init();
        }
    }

    if let Err(errors) = config::validate(&config) {
        for err in &errors {
            error!(error = %err, "configuration validation failed");
        }
        return Err(anyhow::anyhow!("configuration validation failed with {} error(s)", errors.len()));
    }

    info!(name = %config.server.name, listen = %config.listen.address, "starting relayd");

    let db = Database::new(&config.history.sqlite_path).await?;
    let history = Arc::new(RedbMessageLog::new(&config.history.redb_path)?);

    let bus: Arc<dyn relayd::bus::BusClient> = Arc::new(NatsBus::connect(&config.bus.url).await?);

    let queue_url = if config.queue.url.is_empty() { &config.bus.url } else { &config.queue.url };
    let queue_client = async_nats::connect(queue_url).await?;
    let queue: Arc<dyn relayd::queue::QueueClient> = Arc::new(NatsQueue::connect(queue_client).await?);

    let registry = Arc::new(Registry::new());
    let cursors = Arc::new(SessionCursors::new());
    let authenticator: Arc<dyn relayd::auth::Authenticator> = match config.security.authenticator {
        config::AuthenticatorKind::TrustedUserId => Arc::new(TrustedUserIdAuthenticator),
    };

    let ctx = Arc::new(ServerContext {
        db,
        history,
        bus: bus.clone(),
        queue,
        registry: registry.clone(),
        cursors: cursors.clone(),
        authenticator,
        clock: MonotonicClock::new(),
    });

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
            let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = sigint.recv() => info!("received SIGINT, shutting down"),
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            }
            let _ = shutdown_tx.send(());
        });
    }

    tokio::spawn(dispatcher::run(bus, registry, cursors, shutdown_tx.subscribe()));

    if config.server.metrics_port == 0 {
        info!("metrics disabled");
    } else {
        metrics::init();
        let port = config.server.metrics_port;
        tokio::spawn(async move { metrics::run_http_server(port).await });
        info!(port, "metrics endpoint started");
    }

    let listener = tokio::net::TcpListener::bind(config.listen.address).await?;
    info!(address = %config.listen.address, "accepting connections");

    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let ctx = ctx.clone();
                let shutdown_rx = shutdown_tx.subscribe();
                tokio::spawn(async move {
                    info!(%addr, "accepted connection");
                    session::run_connection(stream, ctx, shutdown_rx).await;
                });
            }
            _ = shutdown_rx.recv() => {
                info!("shutting down listener");
                break;
            }
        }
    }

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    Ok(())
}

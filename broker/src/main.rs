//! Cart event broker.
//!
//! Accepts events over WebSocket, persists each one to `PostgreSQL` and
//! broadcasts it to every connected peer.

use cartstream_broker::metrics::install_exporter;
use cartstream_broker::{AppState, BrokerError, Config, Membership, serve};
use cartstream_postgres::PostgresEventSink;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cartstream_broker=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cart event broker");

    // Load configuration
    let config = Config::from_env();
    info!(
        listen = %config.listen_addr(),
        metrics = %config.metrics_addr(),
        ping_interval_secs = config.connection.ping_interval,
        ping_timeout_secs = config.connection.ping_timeout,
        "Configuration loaded"
    );

    install_exporter(config.metrics_addr()).map_err(BrokerError::from)?;

    // The database must be reachable before any peer is accepted.
    info!("Checking database connection...");
    let sink = PostgresEventSink::new(&config.database.url)
        .map_err(BrokerError::from)?
        .with_connect_timeout(config.database_connect_timeout());
    sink.check_connection().await.map_err(BrokerError::from)?;
    info!("Database reachable");

    let state = AppState::new(
        Membership::spawn(),
        Arc::new(sink),
        config.connection_settings(),
    );

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| BrokerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(address = %addr, "Broker listening");

    serve(listener, state, shutdown_signal()).await?;

    info!("Broker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}

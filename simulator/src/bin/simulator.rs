//! Cart event simulator.
//!
//! Generates shopper activity and streams it to the broker.

use cartstream_core::environment::RngSource;
use cartstream_postgres::PostgresCustomerDirectory;
use cartstream_runtime::generator::{EventGenerator, drive};
use cartstream_simulator::{Config, fetch_catalog};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cartstream_simulator=info,cartstream_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cart event simulator");

    let config = Config::from_env();
    info!(
        broker = %config.broker.url,
        batch_size = config.generator.batch_size,
        backfill_start = %config.generator.backfill_start,
        backfill_end = %config.generator.backfill_end,
        seeded = config.generator.seed.is_some(),
        "Configuration loaded"
    );

    let catalog = fetch_catalog(&reqwest::Client::new(), &config.catalog.url).await?;

    info!("Loading customers...");
    let customers = PostgresCustomerDirectory::new(&config.database.url)?
        .load()
        .await?;
    info!(customers = customers.len(), "Customers loaded");

    let rng = config
        .generator
        .seed
        .map_or_else(RngSource::from_entropy, RngSource::seeded);
    let mut generator = EventGenerator::new(
        Arc::new(catalog),
        customers,
        rng,
        config.generator_config(),
    )?;

    let (sender, receiver) = mpsc::channel(config.channel_capacity());
    let transport = config.transport_client();

    let generating = tokio::spawn(async move { drive(&mut generator, sender).await });
    let sending = tokio::spawn(async move { transport.run(receiver).await });

    tokio::select! {
        result = generating => match result {
            Ok(Ok(())) => info!("Generator stopped"),
            Ok(Err(e)) => {
                error!(error = %e, "Generator failed");
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        },
        result = sending => match result {
            Ok(Ok(())) => info!("Transport stopped"),
            Ok(Err(e)) => {
                error!(error = %e, "Transport failed");
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        },
        () = shutdown_signal() => {}
    }

    info!("Simulator stopped");
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
            info!("Received Ctrl+C signal, shutting down...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down...");
        },
    }
}

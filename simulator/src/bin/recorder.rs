//! Cart event recorder.
//!
//! Connects to the broker and appends every broadcast event to a JSON file.

use cartstream_simulator::{Recorder, RecorderConfig, record_stream};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cartstream_simulator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RecorderConfig::from_env();
    info!(broker = %config.url, file = %config.events_file, "Starting event recorder");

    let mut recorder = Recorder::open(&config.events_file).await?;
    record_stream(&config.url, &mut recorder).await?;

    info!(events = recorder.len(), "Recorder stopped");
    Ok(())
}

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tinylink_gateway::shutdown::shutdown_signal;
use tinylink_gateway::{App, AppState, Cli};
use tinylink_generator::RandomGenerator;
use tinylink_session::{SessionKey, SessionResolver};
use tinylink_shortener::{PipelineSettings, ServiceSettings, ShortenerService};
use tinylink_telemetry::{LogFormat, TelemetryConfig};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tinylink_telemetry::init(
        &TelemetryConfig::builder()
            .service_name("tinylink-gateway")
            .format(LogFormat::from_env()?)
            .build(),
    )?;

    let config = Cli::parse().resolve()?;
    info!(
        server_address = %config.server_address,
        base_url = %config.base_url,
        shortcode_length = config.shortcode_length,
        delete_workers = config.delete_workers,
        trusted_subnet = ?config.trusted_subnet.map(|s| s.to_string()),
        "starting gateway server"
    );

    let storage = tinylink_storage::open(&config.storage)
        .await
        .context("failed to open storage")?;

    let service = Arc::new(ShortenerService::new(
        storage.clone(),
        RandomGenerator::new(),
        ServiceSettings::builder()
            .code_length(config.shortcode_length)
            .pipeline(
                PipelineSettings::builder()
                    .workers(config.delete_workers)
                    .build(),
            )
            .build(),
    ));
    let sessions = SessionResolver::new(&SessionKey::generate(), storage);
    let state = AppState::new(service.clone(), sessions, config.base_url.clone())
        .with_trusted_subnet(config.trusted_subnet);

    let listener = TcpListener::bind(&config.server_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server_address))?;
    info!(listen_addr = %listener.local_addr()?, "gateway listening");

    axum::serve(listener, App::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.shutdown().await;
    info!("gateway stopped");
    Ok(())
}

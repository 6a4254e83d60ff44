mod cli;

use crate::cli::GrpcCli;
use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tinylink_gateway::shutdown::shutdown_signal;
use tinylink_gateway::{App, AppState};
use tinylink_generator::RandomGenerator;
use tinylink_grpc::ShortenerGrpcServer;
use tinylink_proto_schema::v1::shortener_service_server::ShortenerServiceServer;
use tinylink_session::{SessionKey, SessionResolver};
use tinylink_shortener::{PipelineSettings, ServiceSettings, ShortenerService};
use tinylink_telemetry::{LogFormat, TelemetryConfig};
use tokio::net::TcpListener;
use tonic::transport::Server;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tinylink_telemetry::init(
        &TelemetryConfig::builder()
            .service_name("tinylink-grpc")
            .format(LogFormat::from_env()?)
            .build(),
    )?;

    let cli = GrpcCli::parse();
    let grpc_address: SocketAddr = cli
        .grpc_address()
        .parse()
        .with_context(|| format!("invalid gRPC address {}", cli.grpc_address))?;
    let config = cli.http.resolve()?;
    info!(
        grpc_address = %grpc_address,
        server_address = %config.server_address,
        base_url = %config.base_url,
        shortcode_length = config.shortcode_length,
        delete_workers = config.delete_workers,
        "starting shortener servers"
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

    // Both surfaces accept the same session tokens.
    let sessions = SessionResolver::new(&SessionKey::generate(), storage);

    let grpc = ShortenerGrpcServer::new(service.clone(), sessions.clone(), config.base_url.clone())
        .with_trusted_subnet(config.trusted_subnet);
    let state = AppState::new(service.clone(), sessions, config.base_url.clone())
        .with_trusted_subnet(config.trusted_subnet);

    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<ShortenerServiceServer<ShortenerGrpcServer>>()
        .await;

    let listener = TcpListener::bind(&config.server_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server_address))?;
    info!(listen_addr = %listener.local_addr()?, "http listening");
    info!(listen_addr = %grpc_address, "grpc listening");

    let http = async {
        axum::serve(listener, App::router(state))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("http server failed")
    };
    let rpc = async {
        Server::builder()
            .add_service(health_service)
            .add_service(ShortenerServiceServer::new(grpc))
            .serve_with_shutdown(grpc_address, shutdown_signal())
            .await
            .context("grpc server failed")
    };
    tokio::try_join!(http, rpc)?;

    service.shutdown().await;
    info!("shortener servers stopped");
    Ok(())
}

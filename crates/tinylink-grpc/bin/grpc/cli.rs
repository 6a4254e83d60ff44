use clap::Parser;
use tinylink_gateway::config::normalize_listen_address;
use tinylink_gateway::Cli;

pub const GRPC_ADDRESS_ENV: &str = "GRPC_ADDRESS";
pub const DEFAULT_GRPC_ADDRESS: &str = "0.0.0.0:3200";

/// HTTP gateway flags plus the gRPC listen address.
#[derive(Debug, Parser)]
#[command(name = "tinylink-grpc", about = "tinylink URL shortener gRPC and HTTP server")]
pub struct GrpcCli {
    /// gRPC listen address
    #[arg(long, env = GRPC_ADDRESS_ENV, default_value = DEFAULT_GRPC_ADDRESS)]
    pub grpc_address: String,

    #[command(flatten)]
    pub http: Cli,
}

impl GrpcCli {
    pub fn grpc_address(&self) -> String {
        normalize_listen_address(&self.grpc_address)
    }
}

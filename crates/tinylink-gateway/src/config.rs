use crate::subnet::{SubnetParseError, TrustedSubnet};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tinylink_core::shortcode::MAX_LENGTH;
use tinylink_storage::StorageConfig;

pub const SERVER_ADDRESS_ENV: &str = "SERVER_ADDRESS";
pub const BASE_URL_ENV: &str = "BASE_URL";
pub const FILE_STORAGE_PATH_ENV: &str = "FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "DATABASE_DSN";
pub const TRUSTED_SUBNET_ENV: &str = "TRUSTED_SUBNET";
pub const CONFIG_ENV: &str = "CONFIG";
pub const SHORTNAME_LENGTH_ENV: &str = "SHORTNAME_LENGTH";
pub const DELETE_WORKERS_ENV: &str = "DELETE_WORKERS";

pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_SHORTNAME_LENGTH: usize = 8;
pub const DEFAULT_DELETE_WORKERS: usize = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("trusted subnet: {0}")]
    Subnet(#[from] SubnetParseError),
    #[error("{0} must be at least 1")]
    Zero(&'static str),
    #[error("shortcode length {0} exceeds the maximum of {max}", max = MAX_LENGTH)]
    TooLong(usize),
}

/// Command-line flags, each with an environment fallback.
///
/// Values left unset here may still come from the JSON file named by
/// `--config`; anything unset in both takes the built-in default.
#[derive(Debug, Clone, Parser)]
#[command(name = "tinylink-gateway", about = "tinylink URL shortener HTTP server")]
pub struct Cli {
    /// HTTP listen address
    #[arg(short = 'a', long, env = SERVER_ADDRESS_ENV)]
    pub server_address: Option<String>,

    /// Base address of the returned short urls
    #[arg(short = 'b', long, env = BASE_URL_ENV)]
    pub base_url: Option<String>,

    /// JSON file holding the url table
    #[arg(short = 'f', long, env = FILE_STORAGE_PATH_ENV)]
    pub file_storage_path: Option<PathBuf>,

    /// PostgreSQL connection string
    #[arg(short = 'd', long, env = DATABASE_DSN_ENV)]
    pub database_dsn: Option<String>,

    /// CIDR allowed to read /api/internal/stats
    #[arg(short = 't', long, env = TRUSTED_SUBNET_ENV)]
    pub trusted_subnet: Option<String>,

    /// JSON configuration file
    #[arg(short = 'c', long = "config", env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    #[arg(long, env = SHORTNAME_LENGTH_ENV, default_value_t = DEFAULT_SHORTNAME_LENGTH)]
    pub shortcode_length: usize,

    #[arg(long, env = DELETE_WORKERS_ENV, default_value_t = DEFAULT_DELETE_WORKERS)]
    pub delete_workers: usize,
}

/// Shape of the `--config` file. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server_address: Option<String>,
    pub base_url: Option<String>,
    pub file_storage_path: Option<String>,
    pub database_dsn: Option<String>,
    pub trusted_subnet: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Fully resolved settings of the HTTP server.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub server_address: String,
    pub base_url: String,
    pub storage: StorageConfig,
    pub trusted_subnet: Option<TrustedSubnet>,
    pub shortcode_length: usize,
    pub delete_workers: usize,
}

fn set(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// First non-empty of flag/env, then the file.
fn pick(explicit: Option<String>, file: Option<String>) -> Option<String> {
    set(explicit).or_else(|| set(file))
}

/// Accepts Go-style `:8080` as shorthand for all interfaces.
pub fn normalize_listen_address(address: &str) -> String {
    match address.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => address.to_string(),
    }
}

impl Cli {
    pub fn resolve(self) -> Result<GatewayConfig, ConfigError> {
        let file = match &self.config {
            Some(path) if !path.as_os_str().is_empty() => FileConfig::load(path)?,
            _ => FileConfig::default(),
        };
        self.merge(file)
    }

    pub fn merge(self, file: FileConfig) -> Result<GatewayConfig, ConfigError> {
        if self.shortcode_length == 0 {
            return Err(ConfigError::Zero("shortcode length"));
        }
        if self.shortcode_length > MAX_LENGTH {
            return Err(ConfigError::TooLong(self.shortcode_length));
        }
        if self.delete_workers == 0 {
            return Err(ConfigError::Zero("delete workers"));
        }

        let server_address = pick(self.server_address, file.server_address)
            .unwrap_or_else(|| DEFAULT_SERVER_ADDRESS.to_string());
        let base_url = pick(self.base_url, file.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let file_storage_path = pick(
            self.file_storage_path
                .map(|p| p.to_string_lossy().into_owned()),
            file.file_storage_path,
        );
        let database_dsn = pick(self.database_dsn, file.database_dsn);
        let trusted_subnet = pick(self.trusted_subnet, file.trusted_subnet)
            .map(|cidr| cidr.parse::<TrustedSubnet>())
            .transpose()?;

        Ok(GatewayConfig {
            server_address: normalize_listen_address(&server_address),
            base_url: base_url.trim_end_matches('/').to_string(),
            storage: StorageConfig {
                database_dsn,
                file_storage_path: file_storage_path.map(PathBuf::from),
            },
            trusted_subnet,
            shortcode_length: self.shortcode_length,
            delete_workers: self.delete_workers,
        })
    }
}

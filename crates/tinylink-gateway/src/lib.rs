//! HTTP surface of the tinylink URL shortener.
//!
//! [`App::router`] builds the axum router over an [`AppState`]. Every request
//! passes through the session middleware, which resolves the caller's
//! [`UserId`][tinylink_core::UserId] from the `session_token` cookie.

pub mod app;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod model;
pub mod shutdown;
pub mod state;
pub mod subnet;

pub use app::App;
pub use config::{Cli, ConfigError, GatewayConfig};
pub use error::AppError;
pub use state::AppState;
pub use subnet::TrustedSubnet;

//! gRPC surface of the tinylink URL shortener.
//!
//! [`ShortenerGrpcServer`] exposes the same operations as the HTTP gateway.
//! The caller's identity travels in the `session_token` metadata entry.

pub mod error;
pub mod server;

pub use error::GrpcError;
pub use server::ShortenerGrpcServer;

//! Core types and traits for the tinylink URL shortener.
//!
//! This crate provides the shared vocabulary used by the storage backends,
//! the session layer, the shortener service and both request surfaces.

pub mod error;
pub mod shortcode;
pub mod shortener;
pub mod storage;
pub mod user;

pub use error::{CoreError, ShortenerError, StorageError};
pub use shortcode::ShortCode;
pub use shortener::{Shortened, Shortener};
pub use storage::{Resolution, Statistics, Storage, UrlTable};
pub use user::UserId;

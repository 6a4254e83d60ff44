use crate::error::ShortenerError;
use crate::shortcode::ShortCode;
use crate::storage::{Resolution, Statistics};
use crate::user::UserId;
use async_trait::async_trait;

type Result<T> = std::result::Result<T, ShortenerError>;

/// Outcome of shortening a single url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shortened {
    /// A fresh code was issued.
    Created(ShortCode),
    /// The url was already stored (by any user) under this code.
    Existing(ShortCode),
}

impl Shortened {
    pub fn code(&self) -> &ShortCode {
        match self {
            Shortened::Created(code) | Shortened::Existing(code) => code,
        }
    }

    pub fn into_code(self) -> ShortCode {
        match self {
            Shortened::Created(code) | Shortened::Existing(code) => code,
        }
    }

    pub fn is_existing(&self) -> bool {
        matches!(self, Shortened::Existing(_))
    }
}

/// Operations offered to the request surfaces (HTTP and gRPC).
#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Shortens `original_url` on behalf of `owner`.
    async fn shorten(&self, owner: &UserId, original_url: &str) -> Result<Shortened>;

    /// Shortens every url, returning the codes in input order.
    async fn shorten_batch(&self, owner: &UserId, original_urls: &[String])
        -> Result<Vec<ShortCode>>;

    /// Resolves a short code for redirection.
    async fn resolve(&self, code: &ShortCode) -> Result<Resolution>;

    /// Lists the live urls owned by `owner`.
    async fn list(&self, owner: &UserId) -> Result<Vec<(ShortCode, String)>>;

    /// Schedules soft deletion of `codes`. Returns once the request is queued.
    async fn delete(&self, owner: &UserId, codes: Vec<ShortCode>) -> Result<()>;

    /// Checks that the storage backend is reachable.
    async fn ping(&self) -> Result<()>;

    async fn statistics(&self) -> Result<Statistics>;
}

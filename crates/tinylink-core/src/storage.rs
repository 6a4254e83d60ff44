use crate::error::StorageError;
use crate::shortcode::ShortCode;
use crate::user::UserId;
use async_trait::async_trait;
use std::collections::HashMap;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// The complete mapping: user partition -> (short code -> original url).
pub type UrlTable = HashMap<UserId, HashMap<ShortCode, String>>;

/// Prefix marking a tombstoned original url in a [`UrlTable`].
pub const TOMBSTONE_MARKER: char = '-';

/// Marks an original url as deleted.
pub fn tombstone(original_url: &str) -> String {
    format!("{TOMBSTONE_MARKER}{original_url}")
}

/// Returns `true` if the stored value carries the tombstone marker.
pub fn is_tombstoned(stored: &str) -> bool {
    stored.starts_with(TOMBSTONE_MARKER)
}

/// Strips the tombstone marker, if any, returning the original url.
pub fn original_of(stored: &str) -> &str {
    stored.strip_prefix(TOMBSTONE_MARKER).unwrap_or(stored)
}

/// Outcome of looking up a short code across all users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The code maps to a live original url.
    Active(String),
    /// The code exists but has been soft-deleted.
    Deleted,
    /// No user owns the code.
    Missing,
}

impl Resolution {
    /// Interprets a stored table value.
    pub fn from_stored(stored: &str) -> Self {
        if is_tombstoned(stored) {
            Resolution::Deleted
        } else {
            Resolution::Active(stored.to_owned())
        }
    }
}

/// Dataset counters exposed to the admin statistics endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    /// Stored short codes, tombstones included.
    pub urls: u64,
    /// User partitions.
    pub users: u64,
}

impl Statistics {
    pub fn of(table: &UrlTable) -> Self {
        Self {
            urls: table.values().map(|codes| codes.len() as u64).sum(),
            users: table.len() as u64,
        }
    }
}

/// Looks up a short code across every partition of a table.
pub fn resolve_in(table: &UrlTable, code: &ShortCode) -> Resolution {
    table
        .values()
        .find_map(|codes| codes.get(code))
        .map_or(Resolution::Missing, |stored| Resolution::from_stored(stored))
}

/// Finds the code under which an original url is stored, scanning every user.
///
/// Tombstoned entries match as well, since deletion never frees the url.
pub fn find_code_for(table: &UrlTable, original_url: &str) -> Option<ShortCode> {
    table.values().find_map(|codes| {
        codes
            .iter()
            .find(|(_, stored)| original_of(stored) == original_url)
            .map(|(code, _)| code.clone())
    })
}

/// Returns `true` if any user holds the code, tombstoned or not.
pub fn contains_code(table: &UrlTable, code: &ShortCode) -> bool {
    table.values().any(|codes| codes.contains_key(code))
}

/// Persistence contract shared by the in-memory, file and PostgreSQL backends.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Returns the complete mapping. Tombstoned entries carry [`TOMBSTONE_MARKER`].
    async fn read_all(&self) -> Result<UrlTable>;

    /// Upserts the given partitions and inserts every (code, url) pair.
    ///
    /// The call is all-or-nothing. Returns [`StorageError::Conflict`] when one
    /// of the original urls is already stored for any user.
    async fn save(&self, data: UrlTable) -> Result<()>;

    /// Looks up a short code across every user.
    async fn resolve(&self, code: &ShortCode) -> Result<Resolution>;

    /// Soft-deletes the codes owned by `owner` that are not already tombstoned.
    /// Codes owned by other users are left untouched.
    async fn delete(&self, codes: &[ShortCode], owner: &UserId) -> Result<()>;

    /// Liveness probe. Backends without an external dependency return
    /// [`StorageError::NotApplicable`].
    async fn ping(&self) -> Result<()>;

    async fn statistics(&self) -> Result<Statistics>;

    /// Returns `true` if a partition exists for the user.
    async fn has_user(&self, user: &UserId) -> Result<bool> {
        Ok(self.read_all().await?.contains_key(user))
    }
}

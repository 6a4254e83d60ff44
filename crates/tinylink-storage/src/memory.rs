use crate::table;
use async_trait::async_trait;
use parking_lot::RwLock;
use tinylink_core::storage::{contains_code, resolve_in, Result};
use tinylink_core::{
    Resolution, ShortCode, Statistics, Storage, StorageError, UrlTable, UserId,
};
use tracing::debug;

/// In-memory implementation of the [`Storage`] trait.
///
/// The whole table sits behind one `RwLock`: every operation that mutates the
/// mapping holds the write lock for its full read-modify-write cycle. Data is
/// lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    table: RwLock<UrlTable>,
}

impl InMemoryStorage {
    /// Creates an empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage pre-populated with `table`.
    pub fn with_table(table: UrlTable) -> Self {
        Self {
            table: RwLock::new(table),
        }
    }

    /// Returns `true` if any user holds the code.
    pub fn contains(&self, code: &ShortCode) -> bool {
        contains_code(&self.table.read(), code)
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn read_all(&self) -> Result<UrlTable> {
        Ok(self.table.read().clone())
    }

    async fn save(&self, data: UrlTable) -> Result<()> {
        table::merge(&mut self.table.write(), data)
    }

    async fn resolve(&self, code: &ShortCode) -> Result<Resolution> {
        Ok(resolve_in(&self.table.read(), code))
    }

    async fn delete(&self, codes: &[ShortCode], owner: &UserId) -> Result<()> {
        let marked = table::mark_deleted(&mut self.table.write(), codes, owner);
        debug!(owner = %owner, requested = codes.len(), marked, "tombstoned codes in memory");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Err(StorageError::NotApplicable(
            "no database configured, storage is in memory".to_string(),
        ))
    }

    async fn statistics(&self) -> Result<Statistics> {
        Ok(Statistics::of(&self.table.read()))
    }

    async fn has_user(&self, user: &UserId) -> Result<bool> {
        Ok(self.table.read().contains_key(user))
    }
}

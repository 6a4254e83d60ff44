use crate::table;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tinylink_core::storage::{resolve_in, Result};
use tinylink_core::{
    Resolution, ShortCode, Statistics, Storage, StorageError, UrlTable, UserId,
};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// File-backed implementation of the [`Storage`] trait.
///
/// The whole table is one JSON document. Every read decodes the file and every
/// write re-encodes the full table; there are no partial updates. Writes land
/// in a sibling temp file that is renamed over the target once flushed, so a
/// crash mid-write leaves the previous contents intact.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Decodes the file, creating it empty on first access.
    async fn load(&self) -> Result<UrlTable> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents).await?;

        if contents.iter().all(u8::is_ascii_whitespace) {
            trace!(path = %self.path.display(), "storage file is empty");
            return Ok(UrlTable::new());
        }

        serde_json::from_slice(&contents).map_err(|e| {
            StorageError::Serialization(format!(
                "failed to decode {}: {e}",
                self.path.display()
            ))
        })
    }

    /// Replaces the file contents with `table`.
    async fn store(&self, table: &UrlTable) -> Result<()> {
        let encoded = serde_json::to_vec(table)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let temp_path = self.temp_path();
        let file = fs::File::create(&temp_path).await?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&encoded).await?;
        writer.flush().await?;
        writer.get_ref().sync_all().await?;
        drop(writer);

        fs::rename(&temp_path, &self.path).await?;
        debug!(path = %self.path.display(), bytes = encoded.len(), "storage file written");
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn read_all(&self) -> Result<UrlTable> {
        self.load().await
    }

    async fn save(&self, data: UrlTable) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut table = self.load().await?;
        table::merge(&mut table, data)?;
        self.store(&table).await
    }

    async fn resolve(&self, code: &ShortCode) -> Result<Resolution> {
        Ok(resolve_in(&self.load().await?, code))
    }

    async fn delete(&self, codes: &[ShortCode], owner: &UserId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut table = self.load().await?;
        let marked = table::mark_deleted(&mut table, codes, owner);
        if marked > 0 {
            self.store(&table).await?;
        }
        debug!(owner = %owner, requested = codes.len(), marked, "tombstoned codes in file");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Err(StorageError::NotApplicable(format!(
            "no database configured, storage is the file {}",
            self.path.display()
        )))
    }

    async fn statistics(&self) -> Result<Statistics> {
        Ok(Statistics::of(&self.load().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn code(s: &str) -> ShortCode {
        ShortCode::new_unchecked(s)
    }

    fn entry(owner: &str, c: &str, url: &str) -> UrlTable {
        UrlTable::from([(UserId::new(owner), HashMap::from([(code(c), url.to_string())]))])
    }

    fn storage(dir: &TempDir) -> FileStorage {
        FileStorage::new(dir.path().join("urls.json"))
    }

    #[tokio::test]
    async fn first_access_creates_empty_file() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        assert!(storage.read_all().await.unwrap().is_empty());
        assert!(storage.path().exists());
    }

    #[tokio::test]
    async fn data_survives_reopening() {
        let dir = TempDir::new().unwrap();
        storage(&dir)
            .save(entry("alice", "abc123", "https://example.com"))
            .await
            .unwrap();

        let reopened = storage(&dir);
        assert_eq!(
            reopened.read_all().await.unwrap(),
            entry("alice", "abc123", "https://example.com")
        );
        assert!(!storage(&dir).temp_path().exists());
    }

    #[tokio::test]
    async fn save_merges_with_existing_contents() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage
            .save(entry("alice", "aaa", "https://a.example"))
            .await
            .unwrap();
        storage
            .save(entry("alice", "bbb", "https://b.example"))
            .await
            .unwrap();

        let table = storage.read_all().await.unwrap();
        assert_eq!(table[&UserId::new("alice")].len(), 2);
    }

    #[tokio::test]
    async fn duplicate_url_conflicts_without_writing() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage
            .save(entry("alice", "aaa", "https://a.example"))
            .await
            .unwrap();

        let err = storage
            .save(entry("bob", "bbb", "https://a.example"))
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(storage.statistics().await.unwrap().users, 1);
    }

    #[tokio::test]
    async fn delete_tombstones_and_persists() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage
            .save(entry("alice", "aaa", "https://a.example"))
            .await
            .unwrap();

        storage
            .delete(&[code("aaa")], &UserId::new("alice"))
            .await
            .unwrap();

        assert_eq!(
            storage.resolve(&code("aaa")).await.unwrap(),
            Resolution::Deleted
        );
        let table = storage.read_all().await.unwrap();
        assert_eq!(table[&UserId::new("alice")][&code("aaa")], "-https://a.example");
    }

    #[tokio::test]
    async fn corrupt_file_is_a_serialization_error() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        std::fs::write(storage.path(), b"not json").unwrap();

        let err = storage.read_all().await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[tokio::test]
    async fn ping_is_not_applicable() {
        let dir = TempDir::new().unwrap();
        let err = storage(&dir).ping().await.unwrap_err();
        assert!(matches!(err, StorageError::NotApplicable(_)));
    }
}

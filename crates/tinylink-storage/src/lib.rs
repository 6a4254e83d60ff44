//! Storage backends for the tinylink URL shortener.
//!
//! Three backends implement [`Storage`]: [`InMemoryStorage`], [`FileStorage`]
//! and [`PostgresStorage`]. [`open`] picks one from a [`StorageConfig`] once
//! at startup.

pub mod file;
pub mod memory;
pub mod postgres;
mod table;

pub use file::FileStorage;
pub use memory::InMemoryStorage;
pub use postgres::PostgresStorage;
pub use tinylink_core::storage::{Resolution, Statistics, Storage, UrlTable};
pub use tinylink_core::StorageError;

use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use typed_builder::TypedBuilder;

/// Which backend to open. A database DSN wins over a file path; with neither,
/// data is kept in memory.
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct StorageConfig {
    #[builder(default, setter(into, strip_option))]
    pub database_dsn: Option<String>,
    #[builder(default, setter(into, strip_option))]
    pub file_storage_path: Option<PathBuf>,
}

/// The backend a [`StorageConfig`] selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    Postgres(String),
    File(PathBuf),
    InMemory,
}

impl StorageConfig {
    pub fn backend(&self) -> BackendKind {
        let dsn = self.database_dsn.as_deref().filter(|s| !s.is_empty());
        let path = self
            .file_storage_path
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty());

        match (dsn, path) {
            (Some(dsn), _) => BackendKind::Postgres(dsn.to_owned()),
            (None, Some(path)) => BackendKind::File(path.clone()),
            (None, None) => BackendKind::InMemory,
        }
    }
}

/// Opens the configured backend.
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn Storage>, StorageError> {
    match config.backend() {
        BackendKind::Postgres(dsn) => {
            info!(storage_backend = "postgres", "opening storage");
            Ok(Arc::new(PostgresStorage::connect(&dsn).await?))
        }
        BackendKind::File(path) => {
            info!(storage_backend = "file", path = %path.display(), "opening storage");
            Ok(Arc::new(FileStorage::new(path)))
        }
        BackendKind::InMemory => {
            info!(storage_backend = "in-memory", "opening storage");
            Ok(Arc::new(InMemoryStorage::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_dsn_wins_over_file() {
        let config = StorageConfig::builder()
            .database_dsn("postgres://localhost/tinylink")
            .file_storage_path("urls.json")
            .build();
        assert_eq!(
            config.backend(),
            BackendKind::Postgres("postgres://localhost/tinylink".to_string())
        );
    }

    #[test]
    fn file_path_wins_over_memory() {
        let config = StorageConfig::builder()
            .file_storage_path("urls.json")
            .build();
        assert_eq!(config.backend(), BackendKind::File(PathBuf::from("urls.json")));
    }

    #[test]
    fn empty_values_fall_back_to_memory() {
        let config = StorageConfig::builder()
            .database_dsn("")
            .file_storage_path("")
            .build();
        assert_eq!(config.backend(), BackendKind::InMemory);
        assert_eq!(StorageConfig::default().backend(), BackendKind::InMemory);
    }

    #[tokio::test]
    async fn open_memory_backend() {
        let storage = open(&StorageConfig::default()).await.unwrap();
        assert!(storage.read_all().await.unwrap().is_empty());
    }
}

use crate::pipeline::{DeletionPipeline, PipelineSettings};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tinylink_core::storage::{contains_code, find_code_for, is_tombstoned};
use tinylink_core::{
    Resolution, ShortCode, Shortened, Shortener, ShortenerError, Statistics, Storage,
    StorageError, UrlTable, UserId,
};
use tinylink_generator::{unique_code, Generator};
use tokio::sync::Mutex;
use tracing::{debug, info};
use typed_builder::TypedBuilder;

pub const DEFAULT_SHORTCODE_LENGTH: usize = 8;
pub const DEFAULT_STORAGE_DEADLINE: Duration = Duration::from_secs(60);

type Result<T> = std::result::Result<T, ShortenerError>;

#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct ServiceSettings {
    /// Symbols per generated code.
    #[builder(default = DEFAULT_SHORTCODE_LENGTH)]
    pub code_length: usize,
    /// Upper bound on every storage call.
    #[builder(default = DEFAULT_STORAGE_DEADLINE)]
    pub storage_deadline: Duration,
    #[builder(default)]
    pub pipeline: PipelineSettings,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A concrete implementation of the [`Shortener`] trait.
///
/// Wraps a [`Storage`] backend and a [`Generator`]:
/// - generated codes are checked against every stored code, tombstones included
/// - a duplicate original url resolves to the code it already has
/// - deletions are queued on a [`DeletionPipeline`]
///
/// Creation holds a service-wide write gate from the initial read until the
/// save lands, so two requests in this process cannot pick the same code.
pub struct ShortenerService<G> {
    storage: Arc<dyn Storage>,
    generator: Arc<G>,
    settings: ServiceSettings,
    write_gate: Mutex<()>,
    deletions: DeletionPipeline,
}

impl<G> std::fmt::Debug for ShortenerService<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShortenerService")
            .field("settings", &self.settings)
            .field("deletions", &self.deletions)
            .finish_non_exhaustive()
    }
}

impl<G: Generator> ShortenerService<G> {
    /// Creates the service and starts its deletion workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(storage: Arc<dyn Storage>, generator: G, settings: ServiceSettings) -> Self {
        let deletions = DeletionPipeline::start(storage.clone(), settings.pipeline);
        Self::with_pipeline(storage, generator, settings, deletions)
    }

    /// Creates the service around an already running pipeline.
    pub fn with_pipeline(
        storage: Arc<dyn Storage>,
        generator: G,
        settings: ServiceSettings,
        deletions: DeletionPipeline,
    ) -> Self {
        info!(
            code_length = settings.code_length,
            storage_deadline = ?settings.storage_deadline,
            "shortener service ready"
        );
        Self {
            storage,
            generator: Arc::new(generator),
            settings,
            write_gate: Mutex::new(()),
            deletions,
        }
    }

    /// Drains queued deletions and stops the workers.
    pub async fn shutdown(&self) {
        self.deletions.shutdown().await;
    }

    /// Accepts any absolute url, opaque ones such as `mailto:` included.
    fn validate_url(original_url: &str) -> Result<()> {
        url::Url::parse(original_url)
            .map(drop)
            .map_err(|e| ShortenerError::InvalidUrl(format!("{original_url:?}: {e}")))
    }

    /// Runs a storage call under the configured deadline.
    async fn bounded<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, StorageError>>,
    {
        match tokio::time::timeout(self.settings.storage_deadline, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StorageError::Timeout(format!(
                "storage did not answer within {:?}",
                self.settings.storage_deadline
            ))
            .into()),
        }
    }

    /// Finds the code an already stored url lives under.
    async fn existing_code(&self, original_url: &str) -> Result<ShortCode> {
        let table = self.bounded(self.storage.read_all()).await?;
        find_code_for(&table, original_url).ok_or_else(|| {
            StorageError::Conflict {
                original_url: original_url.to_owned(),
            }
            .into()
        })
    }

    /// Single-url creation. The caller holds the write gate.
    async fn shorten_gated(&self, owner: &UserId, original_url: &str) -> Result<Shortened> {
        let table = self.bounded(self.storage.read_all()).await?;
        let code = unique_code(self.generator.as_ref(), self.settings.code_length, |c| {
            contains_code(&table, c)
        });

        let data = UrlTable::from([(
            owner.clone(),
            HashMap::from([(code.clone(), original_url.to_owned())]),
        )]);
        match self.bounded(self.storage.save(data)).await {
            Ok(()) => {
                debug!(owner = %owner, code = %code, "short code created");
                Ok(Shortened::Created(code))
            }
            Err(ShortenerError::Storage(StorageError::Conflict { .. })) => {
                let existing = self.existing_code(original_url).await?;
                debug!(owner = %owner, code = %existing, "url already shortened");
                Ok(Shortened::Existing(existing))
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl<G: Generator> Shortener for ShortenerService<G> {
    async fn shorten(&self, owner: &UserId, original_url: &str) -> Result<Shortened> {
        Self::validate_url(original_url)?;

        let _gate = self.write_gate.lock().await;
        self.shorten_gated(owner, original_url).await
    }

    async fn shorten_batch(
        &self,
        owner: &UserId,
        original_urls: &[String],
    ) -> Result<Vec<ShortCode>> {
        for original_url in original_urls {
            Self::validate_url(original_url)?;
        }
        if original_urls.is_empty() {
            return Ok(Vec::new());
        }

        let _gate = self.write_gate.lock().await;
        let table = self.bounded(self.storage.read_all()).await?;

        let mut issued = HashSet::with_capacity(original_urls.len());
        let mut codes = Vec::with_capacity(original_urls.len());
        for _ in original_urls {
            let code = unique_code(self.generator.as_ref(), self.settings.code_length, |c| {
                issued.contains(c) || contains_code(&table, c)
            });
            issued.insert(code.clone());
            codes.push(code);
        }

        let partition: HashMap<ShortCode, String> =
            codes.iter().cloned().zip(original_urls.iter().cloned()).collect();
        match self
            .bounded(self.storage.save(UrlTable::from([(owner.clone(), partition)])))
            .await
        {
            Ok(()) => {
                debug!(owner = %owner, count = codes.len(), "batch shortened");
                Ok(codes)
            }
            Err(ShortenerError::Storage(StorageError::Conflict { original_url })) => {
                debug!(
                    owner = %owner,
                    original_url = %original_url,
                    "batch contains a known url, shortening one by one"
                );
                let mut codes = Vec::with_capacity(original_urls.len());
                for original_url in original_urls {
                    codes.push(self.shorten_gated(owner, original_url).await?.into_code());
                }
                Ok(codes)
            }
            Err(err) => Err(err),
        }
    }

    async fn resolve(&self, code: &ShortCode) -> Result<Resolution> {
        self.bounded(self.storage.resolve(code)).await
    }

    async fn list(&self, owner: &UserId) -> Result<Vec<(ShortCode, String)>> {
        let mut table = self.bounded(self.storage.read_all()).await?;
        let mut urls: Vec<_> = table
            .remove(owner)
            .unwrap_or_default()
            .into_iter()
            .filter(|(_, stored)| !is_tombstoned(stored))
            .collect();
        urls.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(urls)
    }

    async fn delete(&self, owner: &UserId, codes: Vec<ShortCode>) -> Result<()> {
        if codes.is_empty() {
            return Ok(());
        }
        debug!(owner = %owner, count = codes.len(), "queueing deletion");
        self.deletions.submit(codes, owner.clone()).await
    }

    async fn ping(&self) -> Result<()> {
        self.bounded(self.storage.ping()).await
    }

    async fn statistics(&self) -> Result<Statistics> {
        self.bounded(self.storage.statistics()).await
    }
}

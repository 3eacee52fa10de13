//! Once-per-process dataset materialization.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::{Backend, CollisionStore, LoadError};

/// Materializes a collision store from its source.
#[async_trait]
pub trait DatasetProvider: Send + Sync {
    /// Backend the opened store will report.
    fn backend(&self) -> Backend;

    /// Whether the underlying source file exists, when the provider reads
    /// one.
    fn source_exists(&self) -> Option<bool> {
        None
    }

    /// Opens the store. Called at most once per successful load.
    ///
    /// # Errors
    ///
    /// * If the source cannot be fetched, read, or parsed
    async fn open(&self) -> Result<Arc<dyn CollisionStore>, LoadError>;
}

/// Hands out an already-built store.
struct Preloaded(Arc<dyn CollisionStore>);

#[async_trait]
impl DatasetProvider for Preloaded {
    fn backend(&self) -> Backend {
        self.0.backend()
    }

    async fn open(&self) -> Result<Arc<dyn CollisionStore>, LoadError> {
        Ok(Arc::clone(&self.0))
    }
}

/// Lazily loaded, memoized dataset shared by every request.
///
/// Concurrent first callers wait on a single load. A failed load is not
/// remembered, so the next call tries again.
pub struct Dataset {
    provider: Box<dyn DatasetProvider>,
    store: OnceCell<Arc<dyn CollisionStore>>,
}

impl Dataset {
    /// Creates an unloaded dataset backed by `provider`.
    #[must_use]
    pub fn new(provider: impl DatasetProvider + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            store: OnceCell::new(),
        }
    }

    /// Creates a dataset that is already loaded with `store`.
    #[must_use]
    pub fn preloaded(store: Arc<dyn CollisionStore>) -> Self {
        Self {
            provider: Box::new(Preloaded(Arc::clone(&store))),
            store: OnceCell::new_with(Some(store)),
        }
    }

    /// Returns the loaded store, loading it first if necessary.
    ///
    /// # Errors
    ///
    /// * If the provider fails to open the store
    pub async fn load(&self) -> Result<Arc<dyn CollisionStore>, LoadError> {
        self.store
            .get_or_try_init(|| async {
                log::info!("Loading {} dataset...", self.provider.backend());
                let started = Instant::now();
                let store = self.provider.open().await.inspect_err(|e| {
                    log::error!("Dataset load failed: {e}");
                })?;
                log::info!(
                    "Dataset loaded in {:.2}s ({} columns)",
                    started.elapsed().as_secs_f64(),
                    store.columns().len()
                );
                Ok(store)
            })
            .await
            .cloned()
    }

    /// Returns the store if it has already been loaded.
    #[must_use]
    pub fn get(&self) -> Option<Arc<dyn CollisionStore>> {
        self.store.get().cloned()
    }

    /// Returns `true` once a load has succeeded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.store.initialized()
    }

    /// Backend configured for this dataset.
    #[must_use]
    pub fn backend(&self) -> Backend {
        self.provider.backend()
    }

    /// Whether the provider's source file exists, if it reads one.
    #[must_use]
    pub fn source_exists(&self) -> Option<bool> {
        self.provider.source_exists()
    }
}

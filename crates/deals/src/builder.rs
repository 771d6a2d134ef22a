//! Pipeline builder for assembling an acquisition run.

use std::sync::Arc;

use tracing::debug;

use deals_core::{CacheStore, FetchError, ProviderClient, Result};
use deals_engine::{FallbackChain, FetchOrchestrator, RateController, RunConfig};

/// Builder that wires providers, a cache store, and a run configuration into
/// a [`FetchOrchestrator`].
///
/// Providers are tried in registration order, so register the cheapest and
/// most authoritative sources first.
///
/// # Example
///
/// ```rust,ignore
/// use deals::{AppId, PipelineBuilder, RunConfig};
///
/// #[tokio::main]
/// async fn main() -> deals::Result<()> {
///     let orchestrator = PipelineBuilder::new()
///         .with_steam()
///         .with_itad("my-api-key")
///         .with_sqlite_store("deals.db")?
///         .build()?;
///
///     let ids: Vec<AppId> = vec![AppId::from(620u64), AppId::from(730u64)];
///     let report = orchestrator.run(&ids).await?;
///     println!("fetched {} entries", report.succeeded());
///     Ok(())
/// }
/// ```
#[derive(Default)]
pub struct PipelineBuilder {
    metadata_providers: Vec<Arc<dyn ProviderClient>>,
    price_providers: Vec<Arc<dyn ProviderClient>>,
    store: Option<Arc<dyn CacheStore>>,
    config: RunConfig,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field(
                "metadata_providers",
                &self
                    .metadata_providers
                    .iter()
                    .map(|p| p.name())
                    .collect::<Vec<_>>(),
            )
            .field(
                "price_providers",
                &self
                    .price_providers
                    .iter()
                    .map(|p| p.name())
                    .collect::<Vec<_>>(),
            )
            .field("store", &self.store.as_ref().map(|_| "configured"))
            .field("config", &self.config)
            .finish()
    }
}

impl PipelineBuilder {
    /// Create an empty builder with the default run configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the run configuration.
    #[must_use]
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a metadata provider at the end of the metadata chain.
    pub fn register_metadata(&mut self, provider: Arc<dyn ProviderClient>) {
        debug!(provider = provider.name(), "Registering metadata provider");
        self.metadata_providers.push(provider);
    }

    /// Register a price provider at the end of the price chain.
    pub fn register_price(&mut self, provider: Arc<dyn ProviderClient>) {
        debug!(provider = provider.name(), "Registering price provider");
        self.price_providers.push(provider);
    }

    /// Set the cache store.
    #[must_use]
    pub fn set_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use an in-memory cache store. Nothing survives the process.
    #[must_use]
    pub fn with_memory_store(self) -> Self {
        self.set_store(Arc::new(deals_cache::MemoryStore::new()))
    }

    /// Use a SQLite cache store at the given path, creating the schema if
    /// needed.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or migrated.
    #[cfg(feature = "cache-sqlite")]
    pub fn with_sqlite_store(self, path: impl AsRef<std::path::Path>) -> Result<Self> {
        let store = deals_cache::SqliteStore::new(path)?;
        Ok(self.set_store(Arc::new(store)))
    }

    /// Add the Steam storefront provider for both metadata and prices.
    #[cfg(feature = "steam")]
    #[must_use]
    pub fn with_steam(mut self) -> Self {
        let provider = Arc::new(deals_steam::SteamStoreProvider::new());
        self.register_metadata(provider.clone());
        self.register_price(provider);
        self
    }

    /// Add the SteamSpy provider: a metadata fallback that also recovers
    /// display names for name-search price lookups further down the chain.
    #[cfg(feature = "steam")]
    #[must_use]
    pub fn with_steamspy(mut self) -> Self {
        let provider = Arc::new(deals_steam::SteamSpyProvider::new());
        self.register_metadata(provider.clone());
        self.register_price(provider);
        self
    }

    /// Add the IsThereAnyDeal price providers: direct id lookup first, then
    /// name-assisted search.
    #[cfg(feature = "itad")]
    #[must_use]
    pub fn with_itad(mut self, api_key: &str) -> Self {
        let api = Arc::new(deals_itad::ItadApi::new(api_key));
        self.register_price(Arc::new(deals_itad::ItadByIdProvider::new(api.clone())));
        self.register_price(Arc::new(deals_itad::ItadByNameProvider::new(api)));
        self
    }

    /// Assemble the orchestrator.
    ///
    /// # Errors
    /// Returns an error when no cache store was configured.
    pub fn build(self) -> Result<FetchOrchestrator> {
        let store = self.store.ok_or_else(|| {
            FetchError::InvalidParameter("no cache store configured".to_string())
        })?;

        let rate = Arc::new(RateController::new(self.config.rate_limit_preset));
        let mut chain = FallbackChain::new(rate, self.config.retry.clone(), self.config.call_timeout);
        for provider in self.metadata_providers {
            chain.push_metadata(provider);
        }
        for provider in self.price_providers {
            chain.push_price(provider);
        }

        Ok(FetchOrchestrator::new(chain, store, self.config))
    }
}

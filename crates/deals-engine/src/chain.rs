//! Per-entity-type fallback chains over provider clients.

use std::sync::Arc;
use std::time::Duration;

use deals_core::{
    EntityType, ErrorKind, FetchError, FetchRequest, FetchResult, ProviderClient, Result,
    RetryPolicy,
};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::rate::RateController;

/// Ordered provider list tried until one yields a usable result.
///
/// Providers are tried in registration order; the first success wins and no
/// quality comparison between providers is performed. Cheaper and more
/// authoritative sources go first, which keeps load off the slower fallback
/// sources. Display names discovered by failed providers are merged into the
/// request handed to later ones.
pub struct FallbackChain {
    metadata_providers: Vec<Arc<dyn ProviderClient>>,
    price_providers: Vec<Arc<dyn ProviderClient>>,
    rate: Arc<RateController>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
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
            .finish_non_exhaustive()
    }
}

impl FallbackChain {
    /// Create an empty chain.
    #[must_use]
    pub fn new(rate: Arc<RateController>, retry: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            metadata_providers: Vec::new(),
            price_providers: Vec::new(),
            rate,
            retry,
            call_timeout,
        }
    }

    /// Append a provider to the metadata chain.
    pub fn push_metadata(&mut self, provider: Arc<dyn ProviderClient>) {
        debug!(provider = provider.name(), "Registering metadata provider");
        self.metadata_providers.push(provider);
    }

    /// Append a provider to the price chain.
    pub fn push_price(&mut self, provider: Arc<dyn ProviderClient>) {
        debug!(provider = provider.name(), "Registering price provider");
        self.price_providers.push(provider);
    }

    fn providers_for(&self, entity: EntityType) -> &[Arc<dyn ProviderClient>] {
        match entity {
            EntityType::Metadata => &self.metadata_providers,
            EntityType::Price => &self.price_providers,
        }
    }

    /// Resolve one identifier against the chain for its entity type.
    ///
    /// Retryable failures (`network_error`, `rate_limited`) are retried at
    /// the same provider under the shared retry policy before the chain moves
    /// on. Returns `Err` only for fatal conditions; per-identifier failures
    /// come back as a result with `error = exhausted`.
    pub async fn resolve(&self, request: &FetchRequest) -> Result<FetchResult> {
        let providers = self.providers_for(request.entity);
        if providers.is_empty() {
            return Err(FetchError::ProviderNotConfigured(format!(
                "no {} providers registered",
                request.entity
            )));
        }

        let mut hint = request.name_hint.clone();

        for provider in providers {
            if !provider.supports(request.entity) {
                continue;
            }

            let mut attempt = 1u32;
            loop {
                self.rate.await_slot(provider.kind()).await;

                let attempt_request = FetchRequest {
                    app_id: request.app_id.clone(),
                    entity: request.entity,
                    name_hint: hint.clone(),
                };

                let result = match timeout(self.call_timeout, provider.fetch(&attempt_request)).await
                {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => return Err(e),
                    Err(_) => {
                        debug!(
                            provider = provider.name(),
                            app_id = %request.app_id,
                            "Provider call timed out"
                        );
                        FetchResult::failure(
                            request.app_id.clone(),
                            request.entity,
                            provider.kind(),
                            ErrorKind::Network,
                        )
                    }
                };

                self.rate
                    .record_outcome(provider.kind(), result.is_success());

                if result.is_success() {
                    return Ok(result);
                }

                // Preserve any display name a failed lookup still managed to
                // recover; the next provider may be able to search by it.
                if hint.is_none() {
                    hint = result.name_hint.clone();
                }

                let kind = result.error.unwrap_or(ErrorKind::NotFound);
                if kind.is_retryable() && self.retry.should_retry(attempt) {
                    let backoff = self.retry.delay_for(attempt);
                    debug!(
                        provider = provider.name(),
                        app_id = %request.app_id,
                        error = %kind,
                        attempt,
                        "Retrying provider after transient failure"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                    continue;
                }

                warn!(
                    provider = provider.name(),
                    app_id = %request.app_id,
                    error = %kind,
                    "Provider failed, trying next"
                );
                break;
            }
        }

        let mut exhausted = FetchResult::exhausted(request.app_id.clone(), request.entity);
        if let Some(hint) = hint {
            exhausted = exhausted.with_hint(hint);
        }
        Ok(exhausted)
    }
}

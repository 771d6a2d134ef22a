#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/gamedeals/deals/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! IsThereAnyDeal aggregator provider clients.
//!
//! Two clients share one API connection: [`ItadByIdProvider`] resolves the
//! storefront app id to the aggregator's game id and fetches the current
//! best price; [`ItadByNameProvider`] does the same through a title search,
//! seeded by a display name discovered earlier in the fallback chain.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deals_core::{
    AppId, EntityType, ErrorKind, FetchRequest, FetchResult, LookupMethod, Payload, PriceSnapshot,
    ProviderClient, ProviderKind, Result,
};
use serde::Deserialize;
use tracing::debug;

/// IsThereAnyDeal API base URL.
const API_URL: &str = "https://api.isthereanydeal.com";

/// User agent for HTTP requests.
const USER_AGENT: &str = "deals/0.1 (+https://github.com/gamedeals/deals)";

/// Shared IsThereAnyDeal API client.
///
/// Holds the API key and HTTP client used by both lookup flavors.
#[derive(Debug)]
pub struct ItadApi {
    client: reqwest::Client,
    api_key: String,
    country: String,
}

impl ItadApi {
    /// Create a new API client with the given key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key: api_key.into(),
            country: "US".to_string(),
        }
    }

    /// Override the price country.
    #[must_use]
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    fn lookup_url(&self, app_id: &AppId) -> String {
        format!(
            "{}/games/lookup/v1?key={}&appid={}",
            API_URL,
            self.api_key,
            app_id.as_str()
        )
    }

    fn search_url(&self, title: &str) -> String {
        format!(
            "{}/games/search/v1?key={}&title={}&results=1",
            API_URL,
            self.api_key,
            urlencode(title)
        )
    }

    fn prices_url(&self) -> String {
        format!(
            "{}/games/prices/v3?key={}&country={}",
            API_URL, self.api_key, self.country
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> std::result::Result<T, ErrorKind> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|_| ErrorKind::Network)?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> std::result::Result<T, ErrorKind> {
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ErrorKind::RateLimited);
        }
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ErrorKind::NotFound);
        }
        if !response.status().is_success() {
            return Err(ErrorKind::Network);
        }
        response
            .json::<T>()
            .await
            .map_err(|_| ErrorKind::MalformedResponse)
    }

    /// Resolve a storefront app id to the aggregator's game reference.
    async fn resolve_by_appid(&self, app_id: &AppId) -> std::result::Result<GameRef, ErrorKind> {
        let url = self.lookup_url(app_id);
        debug!("ITAD lookup: {}", url);
        let lookup: LookupResponse = self.get_json(&url).await?;
        if !lookup.found {
            return Err(ErrorKind::NotFound);
        }
        lookup.game.ok_or(ErrorKind::MalformedResponse)
    }

    /// Resolve a title to the aggregator's game reference via search.
    async fn resolve_by_title(&self, title: &str) -> std::result::Result<GameRef, ErrorKind> {
        let url = self.search_url(title);
        debug!("ITAD search: {}", url);
        let results: Vec<GameRef> = self.get_json(&url).await?;
        results.into_iter().next().ok_or(ErrorKind::NotFound)
    }

    /// Fetch the current best price for a resolved game.
    async fn best_price(&self, game: &GameRef) -> std::result::Result<PriceSnapshot, ErrorKind> {
        let url = self.prices_url();
        debug!(game_id = %game.id, "ITAD prices: {}", url);
        let response = self
            .client
            .post(&url)
            .json(&[game.id.as_str()])
            .send()
            .await
            .map_err(|_| ErrorKind::Network)?;
        let prices: Vec<GamePrices> = Self::decode(response).await?;

        prices
            .into_iter()
            .find(|p| p.id == game.id)
            .and_then(|p| p.deals.into_iter().next())
            .map(|deal| deal.into_snapshot())
            .ok_or(ErrorKind::NotFound)
    }
}

/// Percent-encode the characters that matter in a query value.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            b' ' => out.push_str("%20"),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

/// Deal-aggregator lookup by storefront app id.
#[derive(Debug)]
pub struct ItadByIdProvider {
    api: Arc<ItadApi>,
}

impl ItadByIdProvider {
    /// Create a provider over a shared API client.
    #[must_use]
    pub const fn new(api: Arc<ItadApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ProviderClient for ItadByIdProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Itad
    }

    fn name(&self) -> &str {
        "IsThereAnyDeal (by id)"
    }

    fn supports(&self, entity: EntityType) -> bool {
        entity == EntityType::Price
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult> {
        let outcome = async {
            let game = self.api.resolve_by_appid(&request.app_id).await?;
            let price = self.api.best_price(&game).await?;
            Ok::<_, ErrorKind>((game, price))
        }
        .await;

        Ok(match outcome {
            Ok((game, price)) => FetchResult::success(
                request.app_id.clone(),
                Payload::Price(price),
                ProviderKind::Itad,
                LookupMethod::DirectId,
            )
            .with_hint(game.title),
            Err(kind) => FetchResult::failure(
                request.app_id.clone(),
                request.entity,
                ProviderKind::Itad,
                kind,
            ),
        })
    }
}

/// Deal-aggregator lookup by title search.
///
/// Requires a display name carried forward from an earlier provider; without
/// one there is nothing meaningful to search for and the lookup reports
/// not-found.
#[derive(Debug)]
pub struct ItadByNameProvider {
    api: Arc<ItadApi>,
}

impl ItadByNameProvider {
    /// Create a provider over a shared API client.
    #[must_use]
    pub const fn new(api: Arc<ItadApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ProviderClient for ItadByNameProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Itad
    }

    fn name(&self) -> &str {
        "IsThereAnyDeal (by name)"
    }

    fn supports(&self, entity: EntityType) -> bool {
        entity == EntityType::Price
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult> {
        let Some(hint) = request.name_hint.as_deref() else {
            debug!(app_id = %request.app_id, "No name hint, skipping title search");
            return Ok(FetchResult::failure(
                request.app_id.clone(),
                request.entity,
                ProviderKind::Itad,
                ErrorKind::NotFound,
            ));
        };

        let outcome = async {
            let game = self.api.resolve_by_title(hint).await?;
            self.api.best_price(&game).await
        }
        .await;

        Ok(match outcome {
            Ok(price) => FetchResult::success(
                request.app_id.clone(),
                Payload::Price(price),
                ProviderKind::Itad,
                LookupMethod::Assisted,
            ),
            Err(kind) => FetchResult::failure(
                request.app_id.clone(),
                request.entity,
                ProviderKind::Itad,
                kind,
            ),
        })
    }
}

// ============================================================================
// IsThereAnyDeal API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct LookupResponse {
    found: bool,
    game: Option<GameRef>,
}

/// A game as the aggregator identifies it.
#[derive(Debug, Clone, Deserialize)]
struct GameRef {
    id: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct GamePrices {
    id: String,
    deals: Vec<Deal>,
}

#[derive(Debug, Deserialize)]
struct Deal {
    price: DealPrice,
    shop: Shop,
}

#[derive(Debug, Deserialize)]
struct DealPrice {
    amount: f64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct Shop {
    name: String,
}

impl Deal {
    fn into_snapshot(self) -> PriceSnapshot {
        let formatted = format!("{:.2} {}", self.price.amount, self.price.currency);
        PriceSnapshot::new(self.price.amount, formatted, self.shop.name, self.price.currency)
    }
}

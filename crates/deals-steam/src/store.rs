//! Steam store appdetails provider.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use deals_core::{
    AppId, EntityType, ErrorKind, FetchRequest, FetchResult, GameMetadata, LookupMethod, Payload,
    PriceSnapshot, ProviderClient, ProviderKind, Result,
};
use serde::Deserialize;
use tracing::debug;

/// Steam store appdetails API base URL.
const APPDETAILS_URL: &str = "https://store.steampowered.com/api/appdetails";

/// User agent for HTTP requests.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// Steam store provider.
///
/// The primary source for both metadata and price entities; looks titles up
/// directly by app id.
#[derive(Debug)]
pub struct SteamStoreProvider {
    client: reqwest::Client,
    country: String,
}

impl SteamStoreProvider {
    /// Create a new Steam store provider with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_country("us")
    }

    /// Create a provider using the given storefront country code.
    #[must_use]
    pub fn with_country(country: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            country: country.into(),
        }
    }

    /// Create a provider with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            country: "us".to_string(),
        }
    }

    fn build_url(&self, app_id: &AppId) -> String {
        format!(
            "{}?appids={}&cc={}&l=en",
            APPDETAILS_URL,
            app_id.as_str(),
            self.country
        )
    }

    /// Turn an appdetails body into a fetch result for the requested entity.
    ///
    /// Separated from the network call so response handling is testable
    /// against fixtures.
    fn parse_response(request: &FetchRequest, body: &str) -> FetchResult {
        let app_id = request.app_id.clone();
        let parsed: HashMap<String, AppDetailsEnvelope> = match serde_json::from_str(body) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(app_id = %app_id, error = %e, "Unparseable appdetails body");
                return FetchResult::failure(
                    app_id,
                    request.entity,
                    ProviderKind::SteamStore,
                    ErrorKind::MalformedResponse,
                );
            }
        };

        let Some(envelope) = parsed.get(app_id.as_str()) else {
            return FetchResult::failure(
                app_id,
                request.entity,
                ProviderKind::SteamStore,
                ErrorKind::MalformedResponse,
            );
        };

        let Some(data) = envelope.data.as_ref().filter(|_| envelope.success) else {
            return FetchResult::failure(
                app_id,
                request.entity,
                ProviderKind::SteamStore,
                ErrorKind::NotFound,
            );
        };

        match request.entity {
            EntityType::Metadata => {
                let metadata = GameMetadata {
                    name: data.name.clone(),
                    app_type: data.app_type.clone(),
                    is_free: data.is_free,
                    is_dlc: data.app_type == "dlc",
                    categories: data
                        .categories
                        .iter()
                        .map(|c| c.description.clone())
                        .collect(),
                    price: data.price_overview.as_ref().map(PriceOverview::to_snapshot),
                };
                FetchResult::success(
                    app_id,
                    Payload::Metadata(metadata),
                    ProviderKind::SteamStore,
                    LookupMethod::DirectId,
                )
            }
            EntityType::Price => {
                if let Some(overview) = &data.price_overview {
                    FetchResult::success(
                        app_id,
                        Payload::Price(overview.to_snapshot()),
                        ProviderKind::SteamStore,
                        LookupMethod::DirectId,
                    )
                } else if data.is_free {
                    FetchResult::success(
                        app_id,
                        Payload::Price(PriceSnapshot::new(0.0, "Free", "Steam", "USD")),
                        ProviderKind::SteamStore,
                        LookupMethod::DirectId,
                    )
                } else {
                    // No price on the storefront (e.g. delisted). Hand the
                    // display name to the next provider in the chain.
                    FetchResult::failure(
                        app_id,
                        request.entity,
                        ProviderKind::SteamStore,
                        ErrorKind::NotFound,
                    )
                    .with_hint(data.name.clone())
                }
            }
        }
    }
}

impl Default for SteamStoreProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for SteamStoreProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SteamStore
    }

    fn name(&self) -> &str {
        "Steam Store"
    }

    fn supports(&self, _entity: EntityType) -> bool {
        true
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult> {
        let url = self.build_url(&request.app_id);
        debug!("Fetching appdetails: {}", url);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(app_id = %request.app_id, error = %e, "Appdetails request failed");
                return Ok(FetchResult::failure(
                    request.app_id.clone(),
                    request.entity,
                    ProviderKind::SteamStore,
                    ErrorKind::Network,
                ));
            }
        };

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Ok(FetchResult::failure(
                request.app_id.clone(),
                request.entity,
                ProviderKind::SteamStore,
                ErrorKind::RateLimited,
            ));
        }

        if !response.status().is_success() {
            return Ok(FetchResult::failure(
                request.app_id.clone(),
                request.entity,
                ProviderKind::SteamStore,
                ErrorKind::Network,
            ));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!(app_id = %request.app_id, error = %e, "Failed to read appdetails body");
                return Ok(FetchResult::failure(
                    request.app_id.clone(),
                    request.entity,
                    ProviderKind::SteamStore,
                    ErrorKind::Network,
                ));
            }
        };

        Ok(Self::parse_response(request, &body))
    }
}

// ============================================================================
// Steam appdetails API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AppDetailsEnvelope {
    success: bool,
    data: Option<AppDetailsData>,
}

#[derive(Debug, Deserialize)]
struct AppDetailsData {
    name: String,
    #[serde(rename = "type")]
    app_type: String,
    #[serde(default)]
    is_free: bool,
    #[serde(default)]
    categories: Vec<Category>,
    price_overview: Option<PriceOverview>,
}

#[derive(Debug, Deserialize)]
struct Category {
    description: String,
}

#[derive(Debug, Deserialize)]
struct PriceOverview {
    currency: String,
    /// Final price in minor currency units (cents).
    #[serde(rename = "final")]
    final_price: i64,
    final_formatted: String,
}

impl PriceOverview {
    fn to_snapshot(&self) -> PriceSnapshot {
        PriceSnapshot::new(
            self.final_price as f64 / 100.0,
            self.final_formatted.clone(),
            "Steam",
            self.currency.clone(),
        )
    }
}

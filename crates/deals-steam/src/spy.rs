//! SteamSpy catalog provider.

use std::time::Duration;

use async_trait::async_trait;
use deals_core::{
    AppId, EntityType, ErrorKind, FetchRequest, FetchResult, GameMetadata, LookupMethod, Payload,
    ProviderClient, ProviderKind, Result,
};
use serde::Deserialize;
use tracing::debug;

/// SteamSpy API base URL.
const API_URL: &str = "https://steamspy.com/api.php";

/// User agent for HTTP requests.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// SteamSpy catalog provider.
///
/// Secondary metadata source. Useful when the storefront refuses an app id
/// (region locks, delistings); also recovers display names that downstream
/// name-search lookups can use.
#[derive(Debug)]
pub struct SteamSpyProvider {
    client: reqwest::Client,
}

impl SteamSpyProvider {
    /// Create a new SteamSpy provider with default settings.
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Create a provider with a custom HTTP client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_url(&self, app_id: &AppId) -> String {
        format!("{}?request=appdetails&appid={}", API_URL, app_id.as_str())
    }

    /// Turn a SteamSpy body into a fetch result.
    ///
    /// SteamSpy carries no usable price data, so price requests always fail
    /// with not-found; when the title is known its display name rides along
    /// as a hint for name-search providers later in the chain.
    fn parse_response(app_id: AppId, entity: EntityType, body: &str) -> FetchResult {
        let details: SpyDetails = match serde_json::from_str(body) {
            Ok(details) => details,
            Err(e) => {
                debug!(app_id = %app_id, error = %e, "Unparseable SteamSpy body");
                return FetchResult::failure(
                    app_id,
                    entity,
                    ProviderKind::SteamSpy,
                    ErrorKind::MalformedResponse,
                );
            }
        };

        // SteamSpy answers unknown ids with an empty name rather than an
        // HTTP error.
        let Some(name) = details.name.filter(|n| !n.is_empty()) else {
            return FetchResult::failure(
                app_id,
                entity,
                ProviderKind::SteamSpy,
                ErrorKind::NotFound,
            );
        };

        if entity == EntityType::Price {
            return FetchResult::failure(
                app_id,
                entity,
                ProviderKind::SteamSpy,
                ErrorKind::NotFound,
            )
            .with_hint(name);
        }

        let categories: Vec<String> = details
            .genre
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect();

        let metadata = GameMetadata {
            name,
            app_type: "game".to_string(),
            is_free: details.price.as_deref() == Some("0"),
            is_dlc: false,
            categories,
            price: None,
        };

        FetchResult::success(
            app_id,
            Payload::Metadata(metadata),
            ProviderKind::SteamSpy,
            LookupMethod::DirectId,
        )
    }
}

impl Default for SteamSpyProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for SteamSpyProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SteamSpy
    }

    fn name(&self) -> &str {
        "SteamSpy"
    }

    fn supports(&self, _entity: EntityType) -> bool {
        // Metadata is served directly; price requests still go out so a
        // discovered display name can assist later providers.
        true
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult> {
        let url = self.build_url(&request.app_id);
        debug!("Fetching SteamSpy details: {}", url);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(app_id = %request.app_id, error = %e, "SteamSpy request failed");
                return Ok(FetchResult::failure(
                    request.app_id.clone(),
                    request.entity,
                    ProviderKind::SteamSpy,
                    ErrorKind::Network,
                ));
            }
        };

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Ok(FetchResult::failure(
                request.app_id.clone(),
                request.entity,
                ProviderKind::SteamSpy,
                ErrorKind::RateLimited,
            ));
        }

        if !response.status().is_success() {
            return Ok(FetchResult::failure(
                request.app_id.clone(),
                request.entity,
                ProviderKind::SteamSpy,
                ErrorKind::Network,
            ));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!(app_id = %request.app_id, error = %e, "Failed to read SteamSpy body");
                return Ok(FetchResult::failure(
                    request.app_id.clone(),
                    request.entity,
                    ProviderKind::SteamSpy,
                    ErrorKind::Network,
                ));
            }
        };

        Ok(Self::parse_response(
            request.app_id.clone(),
            request.entity,
            &body,
        ))
    }
}

// ============================================================================
// SteamSpy API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct SpyDetails {
    name: Option<String>,
    genre: Option<String>,
    /// Current price in cents, as a string.
    price: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "appid": 620,
        "name": "Portal 2",
        "developer": "Valve",
        "genre": "Action, Adventure",
        "price": "999"
    }"#;

    const UNKNOWN_FIXTURE: &str = r#"{"appid": 999999, "name": "", "price": null}"#;

    #[test]
    fn test_build_url() {
        let provider = SteamSpyProvider::new();
        let url = provider.build_url(&AppId::new("620"));
        assert!(url.contains("request=appdetails"));
        assert!(url.contains("appid=620"));
    }

    #[test]
    fn test_parse_details() {
        let result =
            SteamSpyProvider::parse_response(AppId::new("620"), EntityType::Metadata, FIXTURE);

        assert!(result.is_success());
        assert_eq!(result.provider, Some(ProviderKind::SteamSpy));
        assert_eq!(result.name_hint.as_deref(), Some("Portal 2"));
        match result.payload.unwrap() {
            Payload::Metadata(meta) => {
                assert_eq!(meta.name, "Portal 2");
                assert_eq!(meta.categories, vec!["Action", "Adventure"]);
                assert!(!meta.is_free);
            }
            Payload::Price(_) => panic!("expected metadata payload"),
        }
    }

    #[test]
    fn test_parse_unknown_id() {
        let result = SteamSpyProvider::parse_response(
            AppId::new("999999"),
            EntityType::Metadata,
            UNKNOWN_FIXTURE,
        );
        assert_eq!(result.error, Some(ErrorKind::NotFound));
        assert!(result.name_hint.is_none());
    }

    #[test]
    fn test_price_request_fails_with_name_hint() {
        let result =
            SteamSpyProvider::parse_response(AppId::new("620"), EntityType::Price, FIXTURE);

        assert!(!result.is_success());
        assert_eq!(result.error, Some(ErrorKind::NotFound));
        assert_eq!(result.name_hint.as_deref(), Some("Portal 2"));
    }

    #[test]
    fn test_supports_both_entities() {
        let provider = SteamSpyProvider::default();
        assert!(provider.supports(EntityType::Metadata));
        assert!(provider.supports(EntityType::Price));
    }
}

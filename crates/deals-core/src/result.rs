//! The fetch request/result model passed between workers, the fallback
//! chain, and the batch writer.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::types::{AppId, EntityType, LookupMethod, Payload, ProviderKind};

/// A single lookup handed to a provider client.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchRequest {
    /// Identifier being fetched.
    pub app_id: AppId,
    /// What kind of record is wanted.
    pub entity: EntityType,
    /// Display name discovered by an earlier provider in the chain, if any.
    /// Enables name-based fallback lookups.
    pub name_hint: Option<String>,
}

impl FetchRequest {
    /// Creates a request with no carry-forward context.
    #[must_use]
    pub const fn new(app_id: AppId, entity: EntityType) -> Self {
        Self {
            app_id,
            entity,
            name_hint: None,
        }
    }

    /// Attaches a display name hint.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.name_hint = Some(hint.into());
        self
    }
}

/// The outcome of one lookup for one identifier.
///
/// Created once by a provider client or the fallback chain and never mutated
/// afterwards; it is a value passed from worker to buffer to writer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    /// Identifier this result belongs to.
    pub app_id: AppId,
    /// Entity type that was requested.
    pub entity: EntityType,
    /// The record, present on success.
    pub payload: Option<Payload>,
    /// Provider that produced the payload or final failure.
    pub provider: Option<ProviderKind>,
    /// How the provider located the record.
    pub method: Option<LookupMethod>,
    /// Failure classification, present when `payload` is absent.
    pub error: Option<ErrorKind>,
    /// Display name discovered during the lookup, preserved even on failure
    /// so later providers in the chain can search by name.
    pub name_hint: Option<String>,
}

impl FetchResult {
    /// A successful lookup.
    #[must_use]
    pub fn success(
        app_id: AppId,
        payload: Payload,
        provider: ProviderKind,
        method: LookupMethod,
    ) -> Self {
        let name_hint = payload.display_name().map(str::to_string);
        Self {
            app_id,
            entity: payload.entity(),
            payload: Some(payload),
            provider: Some(provider),
            method: Some(method),
            error: None,
            name_hint,
        }
    }

    /// A failed lookup at one provider.
    #[must_use]
    pub const fn failure(
        app_id: AppId,
        entity: EntityType,
        provider: ProviderKind,
        error: ErrorKind,
    ) -> Self {
        Self {
            app_id,
            entity,
            payload: None,
            provider: Some(provider),
            method: None,
            error: Some(error),
            name_hint: None,
        }
    }

    /// A chain-level failure after every provider was tried.
    #[must_use]
    pub const fn exhausted(app_id: AppId, entity: EntityType) -> Self {
        Self {
            app_id,
            entity,
            payload: None,
            provider: None,
            method: None,
            error: Some(ErrorKind::Exhausted),
            name_hint: None,
        }
    }

    /// Attaches a discovered display name to a failure so the chain can
    /// carry it forward.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.name_hint = Some(hint.into());
        self
    }

    /// Whether the lookup produced a payload.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.payload.is_some()
    }

    /// Whether this success came through an assisted or name-search lookup
    /// rather than a direct id hit.
    #[must_use]
    pub fn via_fallback(&self) -> bool {
        self.is_success() && self.method != Some(LookupMethod::DirectId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GameMetadata, PriceSnapshot};

    #[test]
    fn success_carries_provenance_and_hint() {
        let payload = Payload::Metadata(GameMetadata::new("Celeste"));
        let result = FetchResult::success(
            AppId::new("504230"),
            payload,
            ProviderKind::SteamStore,
            LookupMethod::DirectId,
        );
        assert!(result.is_success());
        assert_eq!(result.provider, Some(ProviderKind::SteamStore));
        assert_eq!(result.method, Some(LookupMethod::DirectId));
        assert_eq!(result.name_hint.as_deref(), Some("Celeste"));
        assert!(!result.via_fallback());
    }

    #[test]
    fn assisted_success_counts_as_fallback() {
        let payload = Payload::Price(PriceSnapshot::new(4.99, "$4.99", "GOG", "USD"));
        let result = FetchResult::success(
            AppId::new("504230"),
            payload,
            ProviderKind::Itad,
            LookupMethod::Assisted,
        );
        assert!(result.via_fallback());
    }

    #[test]
    fn exhausted_has_no_provider() {
        let result = FetchResult::exhausted(AppId::new("1"), EntityType::Price);
        assert!(!result.is_success());
        assert_eq!(result.error, Some(ErrorKind::Exhausted));
        assert!(result.provider.is_none());
    }
}

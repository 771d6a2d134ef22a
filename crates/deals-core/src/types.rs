//! Core data types for game price and metadata records.
//!
//! This module defines the fundamental data structures:
//!
//! - [`AppId`] - Catalog identifier for one title
//! - [`EntityType`] - What kind of record is being fetched
//! - [`ProviderKind`] - Which external source produced a record
//! - [`LookupMethod`] - How the record was located at that source
//! - [`GameMetadata`] - Title metadata (name, type, categories)
//! - [`PriceSnapshot`] - Current best price for a title
//! - [`Payload`] - Either of the above, as carried by a fetch result

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A catalog identifier for one title.
///
/// Identifiers are opaque strings supplied by the caller (typically a numeric
/// storefront app id). Whitespace is trimmed on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppId(String);

impl AppId {
    /// Creates a new identifier from a string, trimming surrounding whitespace.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AppId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for AppId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AppId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<u64> for AppId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// What kind of record is being fetched for an identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    /// Title metadata: name, type, categories.
    Metadata,
    /// Current best price.
    Price,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metadata => write!(f, "metadata"),
            Self::Price => write!(f, "price"),
        }
    }
}

/// The external data source that satisfied a fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Primary storefront API (Steam store appdetails).
    SteamStore,
    /// Secondary catalog API (SteamSpy).
    SteamSpy,
    /// Deal aggregator (IsThereAnyDeal); id and name lookups share this kind.
    Itad,
}

impl ProviderKind {
    /// Stable string form used as the store's `source` column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SteamStore => "steam_store",
            Self::SteamSpy => "steamspy",
            Self::Itad => "itad",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = crate::error::FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "steam_store" => Ok(Self::SteamStore),
            "steamspy" => Ok(Self::SteamSpy),
            "itad" => Ok(Self::Itad),
            other => Err(crate::error::FetchError::InvalidParameter(format!(
                "unknown provider: {other}"
            ))),
        }
    }
}

/// How a record was located at its source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LookupMethod {
    /// Looked up directly by catalog identifier.
    DirectId,
    /// Located through a title search against the raw identifier.
    NameSearch,
    /// Located through a title search seeded with a display name carried
    /// forward from an earlier provider in the chain.
    Assisted,
}

impl LookupMethod {
    /// Stable string form used as the store's `lookup_method` column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DirectId => "direct_id",
            Self::NameSearch => "name_search",
            Self::Assisted => "assisted",
        }
    }
}

impl fmt::Display for LookupMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LookupMethod {
    type Err = crate::error::FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct_id" => Ok(Self::DirectId),
            "name_search" => Ok(Self::NameSearch),
            "assisted" => Ok(Self::Assisted),
            other => Err(crate::error::FetchError::InvalidParameter(format!(
                "unknown lookup method: {other}"
            ))),
        }
    }
}

/// Current best price for a title at one source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    /// Lowest price found, in major currency units.
    pub amount: f64,
    /// Human-readable price string as the source formats it (e.g. "$19.99").
    pub formatted: String,
    /// Shop offering the price.
    pub shop: String,
    /// ISO currency code.
    pub currency: String,
}

impl PriceSnapshot {
    /// Creates a new price snapshot.
    #[must_use]
    pub fn new(
        amount: f64,
        formatted: impl Into<String>,
        shop: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            amount,
            formatted: formatted.into(),
            shop: shop.into(),
            currency: currency.into(),
        }
    }
}

/// Title metadata as assembled from a catalog source.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GameMetadata {
    /// Display name of the title.
    pub name: String,
    /// Source-reported application type (e.g. "game", "dlc", "demo").
    pub app_type: String,
    /// Whether the title is free to play.
    pub is_free: bool,
    /// Whether the title is downloadable content for another title.
    pub is_dlc: bool,
    /// Category/tag labels reported by the source.
    pub categories: Vec<String>,
    /// Price snapshot embedded in the metadata response, if the source
    /// carried one.
    pub price: Option<PriceSnapshot>,
}

impl GameMetadata {
    /// Creates metadata with a display name; remaining fields default.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// The structured record carried by a successful fetch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Title metadata.
    Metadata(GameMetadata),
    /// Price snapshot.
    Price(PriceSnapshot),
}

impl Payload {
    /// Returns the entity type this payload belongs to.
    #[must_use]
    pub const fn entity(&self) -> EntityType {
        match self {
            Self::Metadata(_) => EntityType::Metadata,
            Self::Price(_) => EntityType::Price,
        }
    }

    /// Returns the display name carried by this payload, if any.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        match self {
            Self::Metadata(m) if !m.name.is_empty() => Some(&m.name),
            _ => None,
        }
    }
}

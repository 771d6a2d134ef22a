//! The provider client trait implemented by every external data source.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::error::Result;
use crate::result::{FetchRequest, FetchResult};
use crate::types::{EntityType, ProviderKind};

/// One external data source with its own rate limits and failure modes.
///
/// A client makes exactly one outbound network call per [`fetch`] invocation;
/// retry is the caller's responsibility. Expected conditions (not found,
/// throttled, unparseable body) come back as an [`ErrorKind`] inside the
/// [`FetchResult`], never as `Err` — only conditions that should abort the
/// whole run are `Err`.
///
/// [`fetch`]: ProviderClient::fetch
/// [`ErrorKind`]: crate::error::ErrorKind
#[async_trait]
pub trait ProviderClient: Send + Sync + Debug {
    /// The provider identity stamped on results.
    fn kind(&self) -> ProviderKind;

    /// Human-readable name for logs (e.g. "Steam Store").
    fn name(&self) -> &str;

    /// Whether this client can answer requests for the given entity type.
    fn supports(&self, entity: EntityType) -> bool;

    /// Performs one lookup against the external source.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult>;
}

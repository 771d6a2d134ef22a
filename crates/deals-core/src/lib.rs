#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/gamedeals/deals/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for the deal acquisition engine.
//!
//! This crate provides the foundational abstractions:
//!
//! - [`ProviderClient`](provider::ProviderClient) - One external data source
//! - [`CacheStore`](store::CacheStore) - Embedded cache abstraction
//! - [`FetchResult`](result::FetchResult) - Outcome of one lookup
//! - [`RetryPolicy`](retry::RetryPolicy) - Shared transient-failure policy

/// Error taxonomy for lookups and runs.
pub mod error;
/// Provider client trait.
pub mod provider;
/// Fetch request/result model.
pub mod result;
/// Central retry policy.
pub mod retry;
/// Cache store trait and persisted entry type.
pub mod store;
/// Core data types (AppId, payloads, enums).
pub mod types;

// Re-export commonly used items at crate root
pub use error::{ErrorKind, FetchError, Result};
pub use provider::ProviderClient;
pub use result::{FetchRequest, FetchResult};
pub use retry::RetryPolicy;
pub use store::{CacheEntry, CacheStore, Retention};
pub use types::{AppId, EntityType, GameMetadata, LookupMethod, Payload, PriceSnapshot, ProviderKind};

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/gamedeals/deals/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Steam storefront and SteamSpy catalog provider clients.
//!
//! Both implement [`ProviderClient`](deals_core::ProviderClient) from
//! `deals-core` and classify expected failures (not found, throttled,
//! unparseable body) inside the returned
//! [`FetchResult`](deals_core::FetchResult).

/// SteamSpy catalog provider.
pub mod spy;
/// Steam store appdetails provider.
pub mod store;

pub use spy::SteamSpyProvider;
pub use store::SteamStoreProvider;

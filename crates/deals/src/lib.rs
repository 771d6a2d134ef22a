#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/gamedeals/deals/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Unified game price and metadata acquisition.
//!
//! This crate re-exports the core types, the cache stores, and the provider
//! implementations, and provides a [`PipelineBuilder`] for assembling an
//! acquisition pipeline with automatic provider fallback.
//!
//! # Features
//!
//! - `steam` - Steam storefront and SteamSpy providers
//! - `itad` - IsThereAnyDeal aggregator providers
//! - `cache-sqlite` - SQLite-based cache store
//!
//! # Example
//!
//! ```rust,ignore
//! use deals::{AppId, PipelineBuilder};
//!
//! #[tokio::main]
//! async fn main() -> deals::Result<()> {
//!     let orchestrator = PipelineBuilder::new()
//!         .with_steam()
//!         .with_steamspy()
//!         .with_sqlite_store("deals.db")?
//!         .build()?;
//!
//!     let report = orchestrator.run(&[AppId::from(620u64)]).await?;
//!     report.log_summary();
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use deals_core::*;

// Cache stores
pub use deals_cache::MemoryStore;
#[cfg(feature = "cache-sqlite")]
pub use deals_cache::SqliteStore;

// Providers
#[cfg(feature = "itad")]
pub use deals_itad::{ItadApi, ItadByIdProvider, ItadByNameProvider};
#[cfg(feature = "steam")]
pub use deals_steam::{SteamSpyProvider, SteamStoreProvider};

// Engine
pub use deals_engine::{
    CancelHandle, EntityScope, FallbackChain, FetchOrchestrator, ProgressSnapshot, RatePreset,
    RateController, RunConfig, RunReport,
};

mod builder;
pub use builder::PipelineBuilder;

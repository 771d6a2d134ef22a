#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/gamedeals/deals/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Store implementations for the deal acquisition engine.
//!
//! This crate provides implementations of the [`CacheStore`] trait from
//! `deals-core`:
//!
//! - [`SqliteStore`] - Persistent SQLite-backed store (default, requires the
//!   `sqlite` feature)
//! - [`MemoryStore`] - Simple in-memory store for testing and dry runs

/// In-memory store implementation.
pub mod memory;

/// SQLite-backed store implementation.
#[cfg(feature = "sqlite")]
pub mod sqlite;

// Re-export the trait for convenience
pub use deals_core::CacheStore;

// Re-export implementations
pub use memory::MemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

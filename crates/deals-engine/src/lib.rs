#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/gamedeals/deals/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod config;
pub mod orchestrator;
pub mod rate;
pub mod report;
pub mod writer;

#[cfg(test)]
mod testutil;

pub use chain::FallbackChain;
pub use config::{EntityScope, RatePreset, RunConfig};
pub use orchestrator::{CancelHandle, FetchOrchestrator, ProgressSnapshot};
pub use rate::RateController;
pub use report::RunReport;
pub use writer::{BatchWriter, FlushStats};

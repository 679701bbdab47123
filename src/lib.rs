//! feedtide - adaptive feed poller
//!
//! Polls many external feeds (one catalog file per tenant) at a cadence
//! learned from each feed's own publishing history, records every newly
//! discovered item once, and keeps outbound traffic to one polite fetch at a
//! time across the whole process.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`crawler`] - Fetch gate, HTTP transport and the fetch & diff engine
//! - [`parser`] - Atom/RSS feed document parsing
//! - [`models`] - Core data structures and types
//! - [`storage`] - Catalog schema and tracking store (SQLite)
//! - [`scheduler`] - Cadence prediction, backoff, per-catalog loops and sweeps
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use feedtide::config::Config;
//! use feedtide::crawler::{FeedCrawler, FetchGate};
//! use feedtide::scheduler::{BatchSweep, PollPipeline, SweepLock};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let gate = FetchGate::new(config.politeness_delay());
//!     let crawler = FeedCrawler::new(&config.poller, gate)?;
//!     let pipeline = PollPipeline::new(Arc::new(crawler));
//!
//!     let sweep = BatchSweep::new(pipeline, SweepLock::new(), config.sweep_gap(), config.busy_timeout());
//!     let report = sweep.run("data/catalogs/tenant.db".as_ref()).await?;
//!     println!("{report:?}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod models;
pub mod parser;
pub mod scheduler;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{FeedCrawler, FetchGate, FetchOutcome};
    pub use crate::models::{FeedItem, NextCheck, Rank, TrackingState};
    pub use crate::scheduler::{BatchSweep, CatalogLoop, PollPipeline, SweepLock};
    pub use crate::storage::Catalog;
}

// Direct re-exports for convenience
pub use models::{FeedItem, NextCheck, Rank};

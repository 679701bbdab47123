//! Adaptive polling schedulers
//!
//! This module decides *when* each tracked source is fetched again and
//! drives the fetches: a long-running loop per catalog that always works on
//! whichever source is due first, and an on-demand sweep that walks a whole
//! catalog once.
//!
//! # Overview
//!
//! Every source carries a rank on a dormancy ladder (`day`, `dual`, `week`,
//! `month`, `abandoned`) and a next-due time. A poll that finds new items
//! recomputes both from the source's publish history; a poll that finds
//! nothing pushes the next-due time out by the rank's period and, after
//! enough misses in a row, moves the source one rank down the ladder.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   ┌──────────────────────┐   ┌──────────────┐
//! │  CatalogLoop (a.db)  │   │  CatalogLoop (b.db)  │   │  BatchSweep  │
//! └──────────┬───────────┘   └──────────┬───────────┘   └──────┬───────┘
//!            │                          │               SweepLock
//!            └──────────────┬───────────┴──────────────────────┘
//!                           ▼
//!                    ┌─────────────┐
//!                    │PollPipeline │  backoff + persist (spawn_blocking)
//!                    └──────┬──────┘
//!                           ▼
//!                    ┌─────────────┐
//!                    │ FeedCrawler │  fetch + diff
//!                    └──────┬──────┘
//!                           ▼
//!                    ┌─────────────┐
//!                    │  FetchGate  │  one fetch at a time, process-wide
//!                    └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cadence`] - next-check prediction from publish history
//! - [`backoff`] - counter and rank transitions
//! - [`poll`] - the polling unit of work
//! - [`earliest_due`] - per-catalog loop
//! - [`sweep`] - batch sweep runner and its lock
//! - [`error`] - scheduler and prediction errors
//!
//! # Quick Start
//!
//! ```ignore
//! use feedtide::crawler::{FeedCrawler, FetchGate};
//! use feedtide::scheduler::{spawn_catalog_loops, PollPipeline};
//!
//! let gate = FetchGate::new(config.politeness_delay());
//! let crawler = FeedCrawler::new(&config.poller, gate)?;
//! let pipeline = PollPipeline::new(Arc::new(crawler));
//!
//! let mut loops = spawn_catalog_loops(paths, &pipeline, &config.scheduler, config.busy_timeout());
//! ```
//!
//! # Timings
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `after_process_secs` | 10 | Pause after polling a due source |
//! | `idle_secs` | 43200 | Sleep when nothing is scheduled |
//! | `inconsistent_retry_secs` | 90 | Retry when the earliest row goes missing |
//! | `error_backoff_secs` | 45 | Backoff after an unexpected error |
//! | `busy_retry_secs` | 10 | Retry when the catalog is locked |
//! | `safety_margin_secs` | 5 | Added to every wait-until-due sleep |
//! | `min_sleep_secs` | 3 | Floor of every wait-until-due sleep |

pub mod backoff;
pub mod cadence;
pub mod earliest_due;
pub mod error;
pub mod poll;
pub mod sweep;

// Re-export main types
pub use backoff::{on_discovery, on_no_new, NoNewTransition, PROMOTION_THRESHOLD};
pub use cadence::predict;
pub use earliest_due::{plan, spawn_catalog_loops, CatalogLoop, Step};
pub use error::{PredictionError, SchedulerError, SchedulerResult};
pub use poll::{NoNewCause, PollOutcome, PollPipeline, PollReport};
pub use sweep::{spawn_sweeps, BatchSweep, SweepLock, SweepReport};

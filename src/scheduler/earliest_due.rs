//! Earliest-due loop, one per catalog
//!
//! Each iteration looks at the single tracking row with the smallest
//! scheduled time and either polls it (it is due), sleeps until it will be
//! due, or idles when the catalog has nothing scheduled. A failing iteration
//! never ends the loop; only failing to open the catalog does.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;

use super::error::SchedulerResult;
use super::poll::PollPipeline;
use crate::config::SchedulerConfig;
use crate::models::DueSource;
use crate::storage::{Catalog, StorageError};

/// What one iteration of the loop should do
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Poll this source now
    Process(DueSource),
    /// Nothing due yet; sleep, then look again
    WaitForDue(Duration),
    /// Nothing scheduled at all
    Idle(Duration),
    /// Rows are scheduled but no earliest row came back
    Inconsistent(Duration),
}

/// Decide the next step from the earliest due row
pub fn plan(
    now: DateTime<Utc>,
    earliest: Option<DueSource>,
    has_scheduled: bool,
    config: &SchedulerConfig,
) -> Step {
    match earliest {
        Some(due) if due.next_due_at <= now => Step::Process(due),
        Some(due) => {
            let remaining = (due.next_due_at - now).to_std().unwrap_or_default();
            Step::WaitForDue((remaining + config.safety_margin()).max(config.min_sleep()))
        }
        None if has_scheduled => Step::Inconsistent(config.inconsistent_retry()),
        None => Step::Idle(config.idle()),
    }
}

/// The scheduling loop of one catalog
pub struct CatalogLoop {
    path: PathBuf,
    pipeline: PollPipeline,
    config: SchedulerConfig,
    busy_timeout: Duration,
}

impl CatalogLoop {
    pub fn new(
        path: impl Into<PathBuf>,
        pipeline: PollPipeline,
        config: SchedulerConfig,
        busy_timeout: Duration,
    ) -> Self {
        Self {
            path: path.into(),
            pipeline,
            config,
            busy_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run until the task is dropped
    ///
    /// Returns only when the catalog cannot be opened.
    pub async fn run(self) -> SchedulerResult<()> {
        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;
        let catalog = match tokio::task::spawn_blocking(move || Catalog::open(&path, busy_timeout))
            .await?
        {
            Ok(catalog) => Arc::new(catalog),
            Err(e) => {
                tracing::error!(catalog = %self.path.display(), error = %e, "Cannot open catalog, loop stopped");
                return Err(e.into());
            }
        };

        tracing::info!(catalog = %self.path.display(), "Catalog loop started");

        loop {
            let delay = match self.iterate(&catalog).await {
                Ok(delay) => delay,
                Err(e) if e.is_busy() => {
                    tracing::warn!(catalog = %self.path.display(), error = %e, "Catalog busy, retrying");
                    self.config.busy_retry()
                }
                Err(e) => {
                    tracing::error!(catalog = %self.path.display(), error = %e, "Unexpected error in catalog loop, backing off");
                    self.config.error_backoff()
                }
            };
            tokio::time::sleep(delay).await;
        }
    }

    /// One iteration; returns how long to sleep before the next one
    async fn iterate(&self, catalog: &Arc<Catalog>) -> SchedulerResult<Duration> {
        let reader = Arc::clone(catalog);
        let (earliest, has_scheduled) = tokio::task::spawn_blocking(move || {
            let earliest = reader.earliest_due()?;
            let has_scheduled = earliest.is_some() || reader.has_any_scheduled()?;
            Ok::<_, StorageError>((earliest, has_scheduled))
        })
        .await??;

        match plan(Utc::now(), earliest, has_scheduled, &self.config) {
            Step::Process(due) => {
                tracing::info!(
                    catalog = %self.path.display(),
                    feed_id = %due.feed_id,
                    due = due.next_due_display.as_deref().unwrap_or_default(),
                    "Processing due source"
                );
                let pipeline = self.pipeline.clone();
                let catalog = Arc::clone(catalog);
                // A panicking poll surfaces as a JoinError, not a dead loop
                tokio::spawn(async move {
                    pipeline
                        .poll(catalog, &due.feed_id, due.last_seen_item_id.as_deref())
                        .await
                })
                .await??;
                Ok(self.config.after_process())
            }
            Step::WaitForDue(delay) => {
                tracing::debug!(catalog = %self.path.display(), secs = delay.as_secs(), "Next source not due yet");
                Ok(delay)
            }
            Step::Idle(delay) => {
                tracing::info!(catalog = %self.path.display(), secs = delay.as_secs(), "Nothing scheduled, idling");
                Ok(delay)
            }
            Step::Inconsistent(delay) => {
                tracing::warn!(catalog = %self.path.display(), secs = delay.as_secs(), "Scheduled rows exist but none is earliest, retrying");
                Ok(delay)
            }
        }
    }
}

/// Start one loop per catalog path
///
/// Each task yields its catalog path and the loop's result, which is only
/// ever an open failure.
pub fn spawn_catalog_loops(
    paths: Vec<PathBuf>,
    pipeline: &PollPipeline,
    config: &SchedulerConfig,
    busy_timeout: Duration,
) -> JoinSet<(PathBuf, SchedulerResult<()>)> {
    let mut loops = JoinSet::new();
    for path in paths {
        let catalog_loop = CatalogLoop::new(path.clone(), pipeline.clone(), config.clone(), busy_timeout);
        loops.spawn(async move {
            let result = catalog_loop.run().await;
            (path, result)
        });
    }
    loops
}

//! Batch sweep: every source of one catalog, once, in priority order
//!
//! Sweeps hold a process-wide [`SweepLock`] for each source they process.
//! The lock only orders sweeps against each other; catalog loops do not
//! take it, and the fetch gate remains the only guarantee that fetches
//! never overlap. Both guarantees hold only inside one process, so sweeps
//! meant to run next to the catalog loops go through [`spawn_sweeps`] on the
//! loops' own pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use super::error::{SchedulerError, SchedulerResult};
use super::poll::{PollOutcome, PollPipeline};
use crate::storage::{Catalog, StorageError};

/// Serializes sweep processing across the process
///
/// Cheap to clone; all clones share one lock.
#[derive(Debug, Clone, Default)]
pub struct SweepLock {
    inner: Arc<Mutex<()>>,
}

impl SweepLock {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Totals of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub total: usize,
    pub discovered: usize,
    pub no_new: usize,
    pub failed: usize,
    pub items_inserted: usize,
}

/// Runs sweeps over whole catalogs
///
/// Clones share the pipeline (and with it the fetch gate) and the lock.
#[derive(Clone)]
pub struct BatchSweep {
    pipeline: PollPipeline,
    lock: SweepLock,
    between_sources: Duration,
    busy_timeout: Duration,
}

impl BatchSweep {
    pub fn new(
        pipeline: PollPipeline,
        lock: SweepLock,
        between_sources: Duration,
        busy_timeout: Duration,
    ) -> Self {
        Self {
            pipeline,
            lock,
            between_sources,
            busy_timeout,
        }
    }

    /// Sweep the catalog at `path`
    ///
    /// Only failing to open the catalog or list its sources aborts the sweep;
    /// a failing source is logged and counted.
    pub async fn run(&self, path: &Path) -> SchedulerResult<SweepReport> {
        let label = path.display().to_string();
        let owned = path.to_path_buf();
        let busy_timeout = self.busy_timeout;

        let (catalog, sources) = tokio::task::spawn_blocking(move || {
            let catalog = Catalog::open(&owned, busy_timeout)?;
            let sources = catalog.sweep_order()?;
            Ok::<_, StorageError>((Arc::new(catalog), sources))
        })
        .await?
        .map_err(|source| SchedulerError::SweepListing {
            catalog: label.clone(),
            source,
        })?;

        let total = sources.len();
        let mut report = SweepReport {
            total,
            ..SweepReport::default()
        };
        tracing::info!(catalog = %label, sources = total, "Sweep started");

        for (index, state) in sources.into_iter().enumerate() {
            tracing::info!(catalog = %label, feed_id = %state.feed_id, "[{} / {}] Processing", index + 1, total);

            let result = {
                let _held = self.lock.inner.lock().await;
                self.pipeline
                    .poll(
                        Arc::clone(&catalog),
                        &state.feed_id,
                        state.last_seen_item_id.as_deref(),
                    )
                    .await
            };

            match result {
                Ok(poll) => match poll.outcome {
                    PollOutcome::Discovered { inserted, .. } => {
                        report.discovered += 1;
                        report.items_inserted += inserted;
                    }
                    PollOutcome::NoNew { .. } => report.no_new += 1,
                },
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        catalog = %label,
                        feed_id = %state.feed_id,
                        error = %e,
                        recoverable = e.is_recoverable(),
                        "Source failed during sweep"
                    );
                }
            }

            if index + 1 < total && !self.between_sources.is_zero() {
                tokio::time::sleep(self.between_sources).await;
            }
        }

        tracing::info!(
            catalog = %label,
            discovered = report.discovered,
            no_new = report.no_new,
            failed = report.failed,
            "Sweep finished"
        );
        Ok(report)
    }
}

/// Start one sweep per catalog path
///
/// Every sweep runs on clones of `sweep`, so they share its fetch gate and
/// lock with each other and with any loop built on the same pipeline. Each
/// task yields its catalog path and the sweep's result.
pub fn spawn_sweeps(
    paths: Vec<PathBuf>,
    sweep: &BatchSweep,
) -> JoinSet<(PathBuf, SchedulerResult<SweepReport>)> {
    let mut sweeps = JoinSet::new();
    for path in paths {
        let runner = sweep.clone();
        sweeps.spawn(async move {
            let result = runner.run(&path).await;
            (path, result)
        });
    }
    sweeps
}

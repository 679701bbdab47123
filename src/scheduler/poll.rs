//! The polling unit of work shared by both schedulers
//!
//! fetch + diff (async, through the fetch gate), then backoff + persist
//! (blocking SQLite work, offloaded with `spawn_blocking`).

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::backoff::{self, NoNewTransition};
use super::error::SchedulerResult;
use crate::crawler::{FeedCrawler, FetchOutcome, FetchedFeed};
use crate::models::{NextCheck, Rank};
use crate::storage::{Catalog, StorageError};
use crate::utils::truncate_text;

/// Why a poll produced nothing new
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoNewCause {
    /// The newest item was already known
    Unchanged,
    /// The feed could not be fetched or parsed
    Unavailable,
}

/// What one poll did to a source
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Discovered {
        new_items: usize,
        inserted: usize,
        next: NextCheck,
    },
    NoNew {
        cause: NoNewCause,
        counter: u32,
        rank: Rank,
        next: NextCheck,
    },
}

/// Result of polling one source
#[derive(Debug, Clone, PartialEq)]
pub struct PollReport {
    pub feed_id: String,
    pub outcome: PollOutcome,
}

/// Fetch, diff, backoff and persist for one source at a time
#[derive(Clone)]
pub struct PollPipeline {
    crawler: Arc<FeedCrawler>,
}

impl PollPipeline {
    pub fn new(crawler: Arc<FeedCrawler>) -> Self {
        Self { crawler }
    }

    /// Poll one source of `catalog`
    ///
    /// Fetch and parse failures are absorbed into the no-new path. Only
    /// storage failures are returned. When persisting a discovery fails for
    /// any reason other than a busy catalog, the no-new path is still applied
    /// (best effort) before the error is returned.
    pub async fn poll(
        &self,
        catalog: Arc<Catalog>,
        feed_id: &str,
        last_seen: Option<&str>,
    ) -> SchedulerResult<PollReport> {
        let outcome = self.crawler.fetch_and_diff(feed_id, last_seen).await;
        let feed_id = feed_id.to_string();
        let now = Utc::now();

        let report = match outcome {
            FetchOutcome::Fetched(feed) => {
                tokio::task::spawn_blocking(move || persist_discovery(&catalog, feed_id, feed, now))
                    .await??
            }
            FetchOutcome::Unchanged { .. } => {
                tokio::task::spawn_blocking(move || {
                    persist_no_new(&catalog, feed_id, NoNewCause::Unchanged, now)
                })
                .await??
            }
            FetchOutcome::Unavailable(failure) => {
                tracing::debug!(error = %failure, "Treating failed fetch as no new item");
                tokio::task::spawn_blocking(move || {
                    persist_no_new(&catalog, feed_id, NoNewCause::Unavailable, now)
                })
                .await??
            }
        };

        Ok(report)
    }
}

fn persist_discovery(
    catalog: &Catalog,
    feed_id: String,
    feed: FetchedFeed,
    now: DateTime<Utc>,
) -> Result<PollReport, StorageError> {
    let next = backoff::on_discovery(&feed.recent_timestamps, now);

    for item in &feed.new_items {
        tracing::debug!(feed_id = %feed_id, item_id = %item.id, title = %truncate_text(&item.title, 80), "New item");
    }

    match catalog.record_discovery(&feed_id, &feed, &next) {
        Ok(inserted) => {
            tracing::info!(
                feed_id = %feed_id,
                new_items = feed.new_items.len(),
                inserted,
                rank = %next.rank,
                next_check = %next.display,
                "SUCCESS"
            );
            Ok(PollReport {
                feed_id,
                outcome: PollOutcome::Discovered {
                    new_items: feed.new_items.len(),
                    inserted,
                    next,
                },
            })
        }
        // Busy: leave the schedule alone so the retry still finds the source due
        Err(e) if e.is_busy() => {
            tracing::warn!(feed_id = %feed_id, error = %e, "Catalog busy while persisting discovery");
            Err(e)
        }
        Err(e) => {
            tracing::error!(feed_id = %feed_id, error = %e, "Failed to persist discovery, applying no-new schedule");
            if let Err(fallback) = apply_no_new(catalog, &feed_id, now) {
                tracing::error!(feed_id = %feed_id, error = %fallback, "No-new fallback also failed");
            }
            Err(e)
        }
    }
}

fn persist_no_new(
    catalog: &Catalog,
    feed_id: String,
    cause: NoNewCause,
    now: DateTime<Utc>,
) -> Result<PollReport, StorageError> {
    let transition = apply_no_new(catalog, &feed_id, now)?;
    Ok(PollReport {
        feed_id,
        outcome: PollOutcome::NoNew {
            cause,
            counter: transition.counter,
            rank: transition.rank,
            next: transition.next,
        },
    })
}

fn apply_no_new(
    catalog: &Catalog,
    feed_id: &str,
    now: DateTime<Utc>,
) -> Result<NoNewTransition, StorageError> {
    let current = catalog.tracking(feed_id)?;
    let transition = backoff::on_no_new(current.as_ref(), now);

    if transition.promoted {
        tracing::info!(feed_id = %feed_id, rank = %transition.rank, "Rank promoted after repeated no-new outcomes");
    }

    let updated = catalog.record_no_new(feed_id, transition.counter, transition.rank, &transition.next)?;
    if updated == 0 {
        tracing::warn!(feed_id = %feed_id, "No tracking row to update");
    }

    tracing::info!(
        feed_id = %feed_id,
        counter = transition.counter,
        rank = %transition.rank,
        next_check = %transition.next.display,
        "No new item"
    );
    Ok(transition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollerConfig;
    use crate::crawler::{FeedTransport, FetchGate};
    use crate::utils::error::FetchError;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;

    struct StaticTransport(Option<String>);

    #[async_trait]
    impl FeedTransport for StaticTransport {
        async fn fetch_document(&self, _url: &str) -> Result<String, FetchError> {
            self.0.clone().ok_or(FetchError::Timeout)
        }
    }

    fn pipeline(body: Option<&str>) -> PollPipeline {
        let crawler = FeedCrawler::with_transport(
            Arc::new(StaticTransport(body.map(str::to_string))),
            &PollerConfig::default(),
            FetchGate::new(Duration::ZERO),
        );
        PollPipeline::new(Arc::new(crawler))
    }

    fn catalog(dir: &TempDir) -> Arc<Catalog> {
        let catalog = Catalog::create(&dir.path().join("c.db"), Duration::from_secs(1)).unwrap();
        catalog
            .register_source("UC1", "Chan", "https://example.com/c")
            .unwrap();
        Arc::new(catalog)
    }

    const FEED: &str = r#"<feed xmlns="http://www.w3.org/2005/Atom">
        <title>Chan</title><author><uri>https://example.com/c</uri></author>
        <entry><id>yt:video:b</id><title>B</title><published>2024-05-02T10:00:00+00:00</published></entry>
        <entry><id>yt:video:a</id><title>A</title><published>2024-05-01T10:00:00+00:00</published></entry>
    </feed>"#;

    #[tokio::test]
    async fn test_first_poll_discovers_newest() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);

        let report = pipeline(Some(FEED))
            .poll(Arc::clone(&catalog), "UC1", None)
            .await
            .unwrap();

        assert!(matches!(
            report.outcome,
            PollOutcome::Discovered { new_items: 1, inserted: 1, .. }
        ));
        let state = catalog.tracking("UC1").unwrap().unwrap();
        assert_eq!(state.last_seen_item_id.as_deref(), Some("b"));
        assert_eq!(state.rank, Rank::Week);
        assert!(state.next_due_at.is_some());
    }

    #[tokio::test]
    async fn test_unchanged_increments_counter() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);

        let report = pipeline(Some(FEED))
            .poll(Arc::clone(&catalog), "UC1", Some("b"))
            .await
            .unwrap();

        assert!(matches!(
            report.outcome,
            PollOutcome::NoNew { cause: NoNewCause::Unchanged, counter: 1, rank: Rank::Day, .. }
        ));
        let state = catalog.tracking("UC1").unwrap().unwrap();
        assert_eq!(state.no_new_counter, 1);
        assert!(state.last_seen_item_id.is_none());
    }

    #[tokio::test]
    async fn test_unavailable_feed_backs_off() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);

        let report = pipeline(None)
            .poll(Arc::clone(&catalog), "UC1", None)
            .await
            .unwrap();
        assert!(matches!(
            report.outcome,
            PollOutcome::NoNew { cause: NoNewCause::Unavailable, counter: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_busy_discovery_keeps_schedule() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c.db");
        let catalog = Catalog::create(&path, Duration::from_millis(300)).unwrap();
        catalog
            .register_source("UC1", "Chan", "https://example.com/c")
            .unwrap();
        let due = NextCheck::new(Utc::now() - chrono::Duration::minutes(1), Rank::Day);
        catalog.record_no_new("UC1", 2, Rank::Day, &due).unwrap();
        let before = catalog.tracking("UC1").unwrap().unwrap();
        let catalog = Arc::new(catalog);

        // Another writer holds the catalog past the discovery's busy timeout,
        // but releases it before a follow-up write would give up
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch("BEGIN IMMEDIATE").unwrap();
            locked_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(450));
            conn.execute_batch("COMMIT").unwrap();
        });
        locked_rx.recv().unwrap();

        let result = pipeline(Some(FEED))
            .poll(Arc::clone(&catalog), "UC1", None)
            .await;
        holder.join().unwrap();

        let err = result.unwrap_err();
        assert!(err.is_busy(), "expected busy, got {err}");
        let state = catalog.tracking("UC1").unwrap().unwrap();
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn test_failed_discovery_falls_back_to_no_new() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);
        catalog
            .register_source("UC2", "Other", "https://example.com/d")
            .unwrap();

        // The feed claims UC1's url, so UC2's tracking row would share UC1's source
        let result = pipeline(Some(FEED))
            .poll(Arc::clone(&catalog), "UC2", None)
            .await;

        let err = result.unwrap_err();
        assert!(!err.is_busy());
        let state = catalog.tracking("UC2").unwrap().unwrap();
        assert_eq!(state.no_new_counter, 1);
        assert!(state.next_due_at.is_some());
        assert!(state.last_seen_item_id.is_none());
    }
}

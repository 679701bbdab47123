//! Feed fetching and diffing
//!
//! [`FeedCrawler::fetch_and_diff`] is the fetch & diff engine: it fetches
//! one source's feed through the process-wide [`FetchGate`], parses it,
//! orders the items newest first and diffs them against the source's
//! watermark. Transport and parse failures never escape as errors; they come
//! back as [`FetchOutcome::Unavailable`].

pub mod diff;
pub mod fetcher;
pub mod gate;

use std::sync::Arc;

use thiserror::Error;

use crate::config::PollerConfig;
use crate::models::FeedItem;
use crate::parser::FeedDocument;
use crate::utils::error::{FetchError, ParseError};
use crate::utils::expand_template;

pub use diff::{diff_items, Diff};
pub use fetcher::{FeedTransport, HttpTransport};
pub use gate::FetchGate;

/// Why a feed could not be turned into items this time
#[derive(Error, Debug)]
pub enum TransientFailure {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),
}

/// A fetched feed with at least one new item
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedFeed {
    /// Up to `history_window` most recent publish timestamps, newest first
    pub recent_timestamps: Vec<String>,
    /// New items, newest first
    pub new_items: Vec<FeedItem>,
    pub latest_item_id: String,
    pub source_name: String,
    pub source_url: String,
}

/// Result of one fetch-and-diff
#[derive(Debug)]
pub enum FetchOutcome {
    /// The newest item was already known
    Unchanged { latest_item_id: String },
    /// Something new was found
    Fetched(FetchedFeed),
    /// Transient failure; handled like a no-new outcome
    Unavailable(TransientFailure),
}

/// Parsed feed, items sorted newest first
#[derive(Debug, Clone)]
struct FeedSnapshot {
    items: Vec<FeedItem>,
    source_name: String,
    source_url: String,
}

/// Fetch & diff engine shared by every scheduler
///
/// Safe to call from any number of concurrent tasks; the gate is the only
/// coordination between them.
pub struct FeedCrawler {
    transport: Arc<dyn FeedTransport>,
    gate: FetchGate,
    feed_url_template: String,
    item_url_template: String,
    history_window: usize,
}

impl FeedCrawler {
    /// Create a crawler over HTTP
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(config: &PollerConfig, gate: FetchGate) -> Result<Self, FetchError> {
        let transport = HttpTransport::from_config(config)?;
        Ok(Self::with_transport(Arc::new(transport), config, gate))
    }

    /// Create a crawler over any transport
    pub fn with_transport(
        transport: Arc<dyn FeedTransport>,
        config: &PollerConfig,
        gate: FetchGate,
    ) -> Self {
        Self {
            transport,
            gate,
            feed_url_template: config.feed_url_template.clone(),
            item_url_template: config.item_url_template.clone(),
            history_window: config.history_window.max(1),
        }
    }

    /// The gate this crawler fetches through
    pub fn gate(&self) -> &FetchGate {
        &self.gate
    }

    /// Feed document url for an external feed id
    pub fn feed_url(&self, feed_id: &str) -> String {
        expand_template(&self.feed_url_template, feed_id)
    }

    /// Fetch, parse and diff one source's feed
    pub async fn fetch_and_diff(&self, feed_id: &str, last_seen: Option<&str>) -> FetchOutcome {
        let snapshot = match self.gate.run(|| self.fetch_snapshot(feed_id)).await {
            Ok(snapshot) => snapshot,
            Err(failure) => return FetchOutcome::Unavailable(failure),
        };

        let latest_item_id = snapshot.items[0].id.clone();
        let recent_timestamps = snapshot
            .items
            .iter()
            .take(self.history_window)
            .map(|item| item.published.clone())
            .collect();

        let diff = diff_items(&snapshot.items, last_seen);
        match &diff {
            Diff::Unchanged => {
                tracing::info!(feed_id = %feed_id, latest = %latest_item_id, "No new item (latest already known)");
                return FetchOutcome::Unchanged { latest_item_id };
            }
            Diff::FirstRun(_) => {
                tracing::info!(feed_id = %feed_id, "First run: taking latest item only");
            }
            Diff::Newer(items) => {
                tracing::info!(
                    feed_id = %feed_id,
                    count = items.len(),
                    since = last_seen.unwrap_or_default(),
                    "Found new item(s)"
                );
            }
            Diff::WatermarkLost(_) => {
                tracing::warn!(
                    feed_id = %feed_id,
                    last_seen = last_seen.unwrap_or_default(),
                    "Previously seen item not in feed, falling back to latest"
                );
            }
        }

        FetchOutcome::Fetched(FetchedFeed {
            recent_timestamps,
            new_items: diff.into_new_items(),
            latest_item_id,
            source_name: snapshot.source_name,
            source_url: snapshot.source_url,
        })
    }

    async fn fetch_snapshot(&self, feed_id: &str) -> Result<FeedSnapshot, TransientFailure> {
        let url = self.feed_url(feed_id);

        let body = match self.transport.fetch_document(&url).await {
            Ok(body) => {
                tracing::info!(feed_id = %feed_id, "Fetched feed");
                body
            }
            Err(e) => {
                tracing::error!(
                    feed_id = %feed_id,
                    error = %e,
                    recoverable = e.is_recoverable(),
                    "Error fetching feed"
                );
                return Err(e.into());
            }
        };

        let document = FeedDocument::parse(&body).inspect_err(|e| {
            tracing::error!(feed_id = %feed_id, error = %e, "Unparseable feed document");
        })?;

        if document.entries.is_empty() {
            tracing::info!(feed_id = %feed_id, "No entries in feed");
            return Err(ParseError::EmptyFeed.into());
        }

        let mut items = document.items(&self.item_url_template);
        if items.is_empty() {
            tracing::info!(feed_id = %feed_id, "No valid items parsed from feed");
            return Err(ParseError::NoValidItems.into());
        }

        // Newest first; undated items sink to the end in document order
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        Ok(FeedSnapshot {
            items,
            source_name: document.source_name(),
            source_url: document.source_url(),
        })
    }
}

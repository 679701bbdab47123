//! Common test utilities

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use feedtide::config::PollerConfig;
use feedtide::crawler::{FeedCrawler, FetchGate};
use feedtide::scheduler::PollPipeline;
use feedtide::storage::Catalog;

/// One `<entry>` of a generated feed
pub struct Entry {
    pub id: String,
    pub published: DateTime<Utc>,
}

impl Entry {
    pub fn new(id: &str, published: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            published,
        }
    }
}

/// Entries `v0..v{count}` published `gap_days` apart, newest (`v0`) at `newest`
pub fn daily_entries(newest: DateTime<Utc>, gap_days: i64, count: usize) -> Vec<Entry> {
    (0..count)
        .map(|i| {
            Entry::new(
                &format!("v{i}"),
                newest - ChronoDuration::days(gap_days * i as i64),
            )
        })
        .collect()
}

/// A YouTube-style Atom feed
pub fn atom_feed(channel: &str, channel_url: &str, entries: &[Entry]) -> String {
    let body: String = entries
        .iter()
        .map(|e| {
            format!(
                r#"
  <entry>
    <id>yt:video:{id}</id>
    <yt:videoId>{id}</yt:videoId>
    <title>Video {id}</title>
    <link rel="alternate" href="https://www.youtube.com/watch?v={id}"/>
    <published>{published}</published>
    <media:group>
      <media:thumbnail url="https://i.ytimg.com/vi/{id}/hqdefault.jpg" width="480" height="360"/>
    </media:group>
  </entry>"#,
                id = e.id,
                published = e.published.to_rfc3339(),
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015" xmlns:media="http://search.yahoo.com/mrss/" xmlns="http://www.w3.org/2005/Atom">
  <title>{channel}</title>
  <link rel="alternate" href="{channel_url}"/>
  <author><name>{channel}</name><uri>{channel_url}</uri></author>{body}
</feed>"#
    )
}

/// Poller settings pointing at a mock server, without politeness delay
pub fn poller_config(server_uri: &str) -> PollerConfig {
    PollerConfig {
        feed_url_template: format!("{server_uri}/feeds/{{id}}"),
        request_timeout_secs: 5,
        politeness_delay_ms: 0,
        ..PollerConfig::default()
    }
}

/// HTTP-backed pipeline against a mock server
pub fn http_pipeline(server_uri: &str, delay: Duration) -> PollPipeline {
    let crawler = FeedCrawler::new(&poller_config(server_uri), FetchGate::new(delay))
        .expect("http client");
    PollPipeline::new(Arc::new(crawler))
}

/// Create a fresh catalog file inside `dir`
pub fn create_catalog(dir: &Path, name: &str) -> (PathBuf, Arc<Catalog>) {
    let path = dir.join(name);
    let catalog = Catalog::create(&path, Duration::from_secs(2)).expect("create catalog");
    (path, Arc::new(catalog))
}

/// Register `feed_id` with a url derived from it
pub fn seed_source(catalog: &Catalog, feed_id: &str) -> i64 {
    catalog
        .register_source(feed_id, feed_id, &channel_url(feed_id))
        .expect("register source")
}

pub fn channel_url(feed_id: &str) -> String {
    format!("https://www.youtube.com/channel/{feed_id}")
}

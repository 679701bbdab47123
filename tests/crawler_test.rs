//! Integration tests for the fetch & diff engine using wiremock
//!
//! These tests run the HTTP transport, parser and diff together against a
//! mock feed server.

mod common;

use chrono::{TimeZone, Utc};
use common::{atom_feed, daily_entries, poller_config, Entry};
use feedtide::crawler::{
    FeedCrawler, FeedTransport, FetchGate, FetchOutcome, HttpTransport, TransientFailure,
};
use feedtide::config::PollerConfig;
use feedtide::utils::error::{FetchError, ParseError};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn crawler(server: &MockServer) -> FeedCrawler {
    FeedCrawler::new(&poller_config(&server.uri()), FetchGate::new(Duration::ZERO)).unwrap()
}

async fn serve_feed(server: &MockServer, feed_id: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(format!("/feeds/{feed_id}")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/atom+xml; charset=UTF-8")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

/// First observation takes only the newest item
#[tokio::test]
async fn test_first_run_takes_newest() {
    let server = MockServer::start().await;
    let newest = Utc.with_ymd_and_hms(2024, 5, 10, 14, 0, 0).unwrap();
    serve_feed(
        &server,
        "UC1",
        atom_feed("Chan", "https://www.youtube.com/channel/UC1", &daily_entries(newest, 1, 5)),
    )
    .await;

    let outcome = crawler(&server).fetch_and_diff("UC1", None).await;

    let FetchOutcome::Fetched(feed) = outcome else {
        panic!("expected Fetched, got {outcome:?}");
    };
    assert_eq!(feed.latest_item_id, "v0");
    assert_eq!(feed.new_items.len(), 1);
    assert_eq!(feed.new_items[0].url, "https://www.youtube.com/watch?v=v0");
    assert_eq!(
        feed.new_items[0].thumbnail.as_deref(),
        Some("https://i.ytimg.com/vi/v0/hqdefault.jpg")
    );
    assert_eq!(feed.recent_timestamps.len(), 5);
    assert_eq!(feed.source_name, "Chan");
    assert_eq!(feed.source_url, "https://www.youtube.com/channel/UC1");
}

/// Items are ordered by publish time even when the document is not
#[tokio::test]
async fn test_watermark_diff_on_unordered_feed() {
    let server = MockServer::start().await;
    let day = |d| Utc.with_ymd_and_hms(2024, 5, d, 9, 0, 0).unwrap();
    let entries = vec![
        Entry::new("v2", day(3)),
        Entry::new("v0", day(5)),
        Entry::new("v4", day(1)),
        Entry::new("v1", day(4)),
        Entry::new("v3", day(2)),
    ];
    serve_feed(&server, "UC1", atom_feed("Chan", "https://c", &entries)).await;

    let outcome = crawler(&server).fetch_and_diff("UC1", Some("v2")).await;

    let FetchOutcome::Fetched(feed) = outcome else {
        panic!("expected Fetched, got {outcome:?}");
    };
    let ids: Vec<_> = feed.new_items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["v0", "v1"]);
    assert_eq!(feed.latest_item_id, "v0");
}

#[tokio::test]
async fn test_unchanged_when_watermark_is_newest() {
    let server = MockServer::start().await;
    let newest = Utc.with_ymd_and_hms(2024, 5, 10, 14, 0, 0).unwrap();
    serve_feed(&server, "UC1", atom_feed("Chan", "https://c", &daily_entries(newest, 1, 3))).await;

    let outcome = crawler(&server).fetch_and_diff("UC1", Some("v0")).await;
    assert!(matches!(outcome, FetchOutcome::Unchanged { latest_item_id } if latest_item_id == "v0"));
}

#[tokio::test]
async fn test_lost_watermark_falls_back_to_newest() {
    let server = MockServer::start().await;
    let newest = Utc.with_ymd_and_hms(2024, 5, 10, 14, 0, 0).unwrap();
    serve_feed(&server, "UC1", atom_feed("Chan", "https://c", &daily_entries(newest, 1, 3))).await;

    let outcome = crawler(&server).fetch_and_diff("UC1", Some("long-gone")).await;

    let FetchOutcome::Fetched(feed) = outcome else {
        panic!("expected Fetched, got {outcome:?}");
    };
    assert_eq!(feed.new_items.len(), 1);
    assert_eq!(feed.new_items[0].id, "v0");
}

/// A missing source is a transient failure, not an error
#[tokio::test]
async fn test_not_found_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let outcome = crawler(&server).fetch_and_diff("UCgone", None).await;
    assert!(matches!(
        outcome,
        FetchOutcome::Unavailable(TransientFailure::Fetch(FetchError::Status(404)))
    ));
}

#[tokio::test]
async fn test_malformed_document_is_unavailable() {
    let server = MockServer::start().await;
    serve_feed(&server, "UC1", "<feed><entry><id>yt:video:a</id></feed>".to_string()).await;

    let outcome = crawler(&server).fetch_and_diff("UC1", None).await;
    assert!(matches!(
        outcome,
        FetchOutcome::Unavailable(TransientFailure::Parse(ParseError::Xml(_)))
    ));
}

#[tokio::test]
async fn test_empty_feed_is_unavailable() {
    let server = MockServer::start().await;
    serve_feed(&server, "UC1", atom_feed("Chan", "https://c", &[])).await;

    let outcome = crawler(&server).fetch_and_diff("UC1", None).await;
    assert!(matches!(
        outcome,
        FetchOutcome::Unavailable(TransientFailure::Parse(ParseError::EmptyFeed))
    ));
}

/// The transport asks for feed content types and decodes the declared charset
#[tokio::test]
async fn test_transport_accept_and_charset() {
    let server = MockServer::start().await;
    let latin1: Vec<u8> = b"<rss><channel><title>Caf\xe9</title></channel></rss>".to_vec();
    Mock::given(method("GET"))
        .and(path("/latin1"))
        .and(|req: &Request| {
            req.headers
                .get("accept")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.starts_with("application/atom+xml,application/rss+xml"))
        })
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/rss+xml; charset=ISO-8859-1")
                .set_body_bytes(latin1),
        )
        .mount(&server)
        .await;

    let transport = HttpTransport::new("feedtide-test", Duration::from_secs(5)).unwrap();
    let body = transport
        .fetch_document(&format!("{}/latin1", server.uri()))
        .await
        .unwrap();
    assert!(body.contains("Caf\u{e9}"));
}

#[tokio::test]
async fn test_transport_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let config = PollerConfig {
        request_timeout_secs: 1,
        ..poller_config(&server.uri())
    };
    let transport = HttpTransport::from_config(&config).unwrap();
    let result = transport.fetch_document(&server.uri()).await;
    assert!(matches!(result, Err(FetchError::Timeout)));
}

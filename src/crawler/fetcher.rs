//! HTTP transport for feed documents
//!
//! A single GET per call, no retries: a failed fetch is reported to the
//! caller, which turns it into the no-new/backoff path. Pacing and mutual
//! exclusion are the fetch gate's job, not the transport's.

use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE},
    Client, Response,
};
use std::time::Duration;

use crate::config::PollerConfig;
use crate::utils::error::FetchError;

/// Source of raw feed documents
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Fetch the document at `url` as text
    async fn fetch_document(&self, url: &str) -> Result<String, FetchError>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport with the given user agent and timeout
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .default_headers(Self::default_headers())
            .gzip(true)
            .build()?;

        Ok(Self { client })
    }

    /// Create a transport from poller configuration
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn from_config(config: &PollerConfig) -> Result<Self, FetchError> {
        Self::new(&config.user_agent, config.request_timeout())
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "application/atom+xml,application/rss+xml,application/xml;q=0.9,text/xml;q=0.8,*/*;q=0.5",
            ),
        );
        headers
    }

    async fn decode_response(response: Response) -> Result<String, FetchError> {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_default();

        let bytes = response.bytes().await?;
        decode_bytes(&bytes, &content_type)
    }
}

#[async_trait]
impl FeedTransport for HttpTransport {
    async fn fetch_document(&self, url: &str) -> Result<String, FetchError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        Self::decode_response(response).await
    }
}

/// Decode a response body using the charset from `Content-Type`, else UTF-8
///
/// # Errors
///
/// Returns `FetchError::Decode` if the bytes are not valid in that encoding
pub fn decode_bytes(bytes: &[u8], content_type: &str) -> Result<String, FetchError> {
    let encoding = charset_label(content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);

    let (cow, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(FetchError::Decode(format!(
            "{} decoding errors",
            used.name()
        )));
    }

    Ok(cow.into_owned())
}

fn charset_label(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_lowercase())
        } else {
            None
        }
    })
}

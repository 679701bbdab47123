//! Error types for fetching and parsing feed documents
//!
//! Both are transient from the scheduler's point of view: a source that
//! cannot be fetched or parsed goes down the no-new/backoff path.

use thiserror::Error;

/// Errors that can occur while fetching a feed document
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status code
    #[error("Unexpected status: {0}")]
    Status(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Content decoding error
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Server-side or transport failures worth trying again on a later poll
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout => true,
            Self::Status(code) => matches!(code, 429 | 500 | 502 | 503 | 504),
            Self::Decode(_) | Self::InvalidUrl(_) => false,
        }
    }
}

/// Errors that can occur while parsing a feed document
#[derive(Error, Debug)]
pub enum ParseError {
    /// Malformed XML
    #[error("XML error: {0}")]
    Xml(String),

    /// Document had no entries at all
    #[error("Feed has no entries")]
    EmptyFeed,

    /// Entries were present but none had an extractable id
    #[error("No valid items in feed")]
    NoValidItems,
}

impl From<quick_xml::Error> for ParseError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Xml(err.to_string())
    }
}

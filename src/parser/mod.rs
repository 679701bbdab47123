//! Feed document parsing
//!
//! Turns a raw Atom or RSS document into [`FeedItem`](crate::models::FeedItem)s
//! plus the source metadata (display name, canonical url) the poller upserts.

pub mod feed;

pub use feed::{FeedDocument, RawEntry};

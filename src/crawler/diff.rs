//! Watermark diff over a newest-first item list

use crate::models::FeedItem;

/// How the new items of a feed were determined
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// The newest item is the watermark; nothing new
    Unchanged,
    /// No watermark yet: only the newest item, history is never backfilled
    FirstRun(Vec<FeedItem>),
    /// Everything strictly newer than the watermark
    Newer(Vec<FeedItem>),
    /// Watermark no longer in the feed's window: only the newest item
    WatermarkLost(Vec<FeedItem>),
}

impl Diff {
    /// New items, newest first (empty for `Unchanged`)
    pub fn into_new_items(self) -> Vec<FeedItem> {
        match self {
            Self::Unchanged => Vec::new(),
            Self::FirstRun(items) | Self::Newer(items) | Self::WatermarkLost(items) => items,
        }
    }
}

/// Diff `items` (sorted newest first) against the last seen item id
pub fn diff_items(items: &[FeedItem], last_seen: Option<&str>) -> Diff {
    let Some(newest) = items.first() else {
        return Diff::Newer(Vec::new());
    };

    match last_seen {
        Some(seen) if seen == newest.id => Diff::Unchanged,
        None => Diff::FirstRun(vec![newest.clone()]),
        Some(seen) => match items.iter().position(|item| item.id == seen) {
            Some(k) => Diff::Newer(items[..k].to_vec()),
            None => Diff::WatermarkLost(vec![newest.clone()]),
        },
    }
}

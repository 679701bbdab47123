// Core data structures for the feedtide poller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dormancy tier of a tracked source
///
/// The ladder is ordered by increasing dormancy. Repeated no-new outcomes
/// only ever move a source forward along it; a successful discovery
/// recomputes the rank from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Day,
    Dual,
    Week,
    Month,
    Abandoned,
}

impl Rank {
    /// Ladder in promotion order
    pub const LADDER: [Rank; 5] = [
        Self::Day,
        Self::Dual,
        Self::Week,
        Self::Month,
        Self::Abandoned,
    ];

    /// Base polling period in days for this rank
    pub fn delay_days(&self) -> i64 {
        match self {
            Self::Day => 1,
            Self::Dual => 2,
            Self::Week => 7,
            Self::Month => 30,
            Self::Abandoned => 365,
        }
    }

    /// Next rank on the ladder, saturating at `Abandoned`
    #[must_use]
    pub fn promoted(&self) -> Self {
        match self {
            Self::Day => Self::Dual,
            Self::Dual => Self::Week,
            Self::Week => Self::Month,
            Self::Month | Self::Abandoned => Self::Abandoned,
        }
    }

    /// Get string representation (as persisted)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Dual => "dual",
            Self::Week => "week",
            Self::Month => "month",
            Self::Abandoned => "abandoned",
        }
    }

    /// Parse a persisted rank
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "day" => Some(Self::Day),
            "dual" => Some(Self::Dual),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }

    /// Read a nullable stored rank; anything off the ladder counts as `Day`
    pub fn from_stored(value: Option<&str>) -> Self {
        value.and_then(Self::parse).unwrap_or(Self::Day)
    }
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry parsed out of a feed document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: String,
    pub title: String,
    pub url: String,
    /// Raw publish timestamp as it appeared in the feed
    pub published: String,
    pub published_at: Option<DateTime<Utc>>,
    pub thumbnail: Option<String>,
}

/// One external feed source (`Channel` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub logo: Option<String>,
}

/// Persisted scheduling state for one source (`Channels` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingState {
    /// External feed identifier
    pub feed_id: String,
    pub last_seen_item_id: Option<String>,
    pub next_due_at: Option<DateTime<Utc>>,
    pub next_due_display: Option<String>,
    pub rank: Rank,
    pub no_new_counter: u32,
    pub source_id: i64,
}

/// An item that has been discovered and persisted (`Result` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredItem {
    pub title: String,
    pub url: String,
    pub thumbnail: Option<String>,
    pub source_id: i64,
    pub published_at: Option<String>,
    pub seen: bool,
}

/// The earliest scheduled tracking row of a catalog
#[derive(Debug, Clone, PartialEq)]
pub struct DueSource {
    pub feed_id: String,
    pub last_seen_item_id: Option<String>,
    pub next_due_at: DateTime<Utc>,
    pub next_due_display: Option<String>,
}

/// A next-check time and the rank it was derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextCheck {
    pub display: String,
    pub at: DateTime<Utc>,
    pub rank: Rank,
}

impl NextCheck {
    /// Display format used for `next_due_display`
    pub const DISPLAY_FORMAT: &'static str = "%Y-%m-%d %H:%M";

    /// Build from an absolute time, deriving the display string
    pub fn new(at: DateTime<Utc>, rank: Rank) -> Self {
        Self {
            display: at.format(Self::DISPLAY_FORMAT).to_string(),
            at,
            rank,
        }
    }
}

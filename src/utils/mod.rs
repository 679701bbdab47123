//! Common utilities and helper functions

pub mod error;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse a feed timestamp (RFC 3339, RFC 2822, or naive ISO 8601 taken as UTC)
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Fill the `{id}` placeholder of a url template
pub fn expand_template(template: &str, id: &str) -> String {
    template.replace("{id}", id)
}

/// Extract the item id from an entry id such as `yt:video:abc123`
///
/// Returns the last `:`-separated segment, or `None` if it is empty.
pub fn item_id_from_entry_id(entry_id: &str) -> Option<String> {
    let id = entry_id.trim().rsplit(':').next().unwrap_or_default().trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Truncate text to a maximum length
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(parse_timestamp("2024-05-01T10:00:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T12:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("Wed, 01 May 2024 10:00:00 +0000"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01 10:00"), Some(expected));
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_expand_template() {
        assert_eq!(
            expand_template("https://example.com/feed?id={id}", "UC123"),
            "https://example.com/feed?id=UC123"
        );
    }

    #[test]
    fn test_item_id_from_entry_id() {
        assert_eq!(item_id_from_entry_id("yt:video:abc123"), Some("abc123".into()));
        assert_eq!(item_id_from_entry_id("plain-guid"), Some("plain-guid".into()));
        assert_eq!(item_id_from_entry_id("yt:video:"), None);
        assert_eq!(item_id_from_entry_id(""), None);
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("a longer title here", 10), "a longe...");
    }
}

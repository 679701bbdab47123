//! Rank and counter transitions after a poll
//!
//! A discovery recomputes the schedule from the publish history. Anything
//! else (nothing new, or the feed could not be read) counts one more no-new
//! outcome; more than [`PROMOTION_THRESHOLD`] in a row move the source one
//! step down the dormancy ladder.

use chrono::{DateTime, Duration, Utc};

use super::cadence;
use crate::models::{NextCheck, Rank, TrackingState};

/// No-new outcomes tolerated before a rank promotion
pub const PROMOTION_THRESHOLD: u32 = 5;

/// Days until the next check when the history cannot be used
pub const FALLBACK_DAYS: i64 = 7;

/// Tracking values after a no-new outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoNewTransition {
    pub counter: u32,
    pub rank: Rank,
    pub promoted: bool,
    pub next: NextCheck,
}

/// Apply one no-new outcome to the current tracking state
///
/// A source without tracking state starts from counter 0 at `day`.
pub fn on_no_new(current: Option<&TrackingState>, now: DateTime<Utc>) -> NoNewTransition {
    let (counter, rank) = current
        .map(|state| (state.no_new_counter, state.rank))
        .unwrap_or((0, Rank::Day));

    let counter = counter.saturating_add(1);
    let (counter, rank, promoted) = if counter > PROMOTION_THRESHOLD {
        (0, rank.promoted(), true)
    } else {
        (counter, rank, false)
    };

    let next = NextCheck::new(now + Duration::days(rank.delay_days()), rank);
    NoNewTransition {
        counter,
        rank,
        promoted,
        next,
    }
}

/// Schedule after a discovery, from the recent publish timestamps
///
/// Falls back to a weekly check when the history is empty or unreadable.
pub fn on_discovery(timestamps: &[String], now: DateTime<Utc>) -> NextCheck {
    match cadence::predict(timestamps, now) {
        Ok(next) => next,
        Err(e) => {
            tracing::warn!(error = %e, "Cadence prediction failed, falling back to weekly");
            NextCheck::new(now + Duration::days(FALLBACK_DAYS), Rank::Week)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn state(counter: u32, rank: Rank) -> TrackingState {
        TrackingState {
            feed_id: "UC1".into(),
            last_seen_item_id: Some("v1".into()),
            next_due_at: None,
            next_due_display: None,
            rank,
            no_new_counter: counter,
            source_id: 1,
        }
    }

    #[test]
    fn test_counter_increments_below_threshold() {
        let t = on_no_new(Some(&state(2, Rank::Dual)), now());
        assert_eq!(t.counter, 3);
        assert_eq!(t.rank, Rank::Dual);
        assert!(!t.promoted);
        assert_eq!(t.next.at, now() + Duration::days(2));
    }

    #[test]
    fn test_promotes_when_counter_exceeds_threshold() {
        let t = on_no_new(Some(&state(5, Rank::Day)), now());
        assert_eq!(t.counter, 0);
        assert_eq!(t.rank, Rank::Dual);
        assert!(t.promoted);
        assert_eq!(t.next.at, now() + Duration::days(2));
    }

    #[test]
    fn test_five_outcomes_do_not_promote() {
        let mut current = state(0, Rank::Week);
        for _ in 0..5 {
            let t = on_no_new(Some(&current), now());
            current.no_new_counter = t.counter;
            current.rank = t.rank;
        }
        assert_eq!(current.rank, Rank::Week);
        assert_eq!(current.no_new_counter, 5);

        let t = on_no_new(Some(&current), now());
        assert_eq!((t.counter, t.rank), (0, Rank::Month));
    }

    #[test]
    fn test_abandoned_saturates() {
        let t = on_no_new(Some(&state(5, Rank::Abandoned)), now());
        assert_eq!(t.rank, Rank::Abandoned);
        assert_eq!(t.next.at, now() + Duration::days(365));
    }

    #[test]
    fn test_missing_state_starts_at_day() {
        let t = on_no_new(None, now());
        assert_eq!((t.counter, t.rank), (1, Rank::Day));
        assert_eq!(t.next.at, now() + Duration::days(1));
    }

    #[test]
    fn test_rank_never_moves_backward_on_no_new() {
        let mut current = state(0, Rank::Day);
        let mut previous = current.rank;
        for _ in 0..40 {
            let t = on_no_new(Some(&current), now());
            assert!(t.rank >= previous);
            previous = t.rank;
            current.no_new_counter = t.counter;
            current.rank = t.rank;
        }
        assert_eq!(current.rank, Rank::Abandoned);
    }

    #[test]
    fn test_discovery_fallback() {
        let next = on_discovery(&[], now());
        assert_eq!(next.rank, Rank::Week);
        assert_eq!(next.at, now() + Duration::days(7));

        let next = on_discovery(&["garbage".to_string()], now());
        assert_eq!(next.rank, Rank::Week);
    }

    #[test]
    fn test_discovery_uses_prediction() {
        let history: Vec<String> = (0..8)
            .map(|d| (now() - Duration::days(d)).to_rfc3339())
            .collect();
        let next = on_discovery(&history, now());
        assert_eq!(next.rank, Rank::Day);
        assert!(next.at > now() + Duration::hours(2));
    }
}

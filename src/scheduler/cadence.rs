//! Cadence prediction
//!
//! Turns a source's recent publish history into the next time it is worth
//! checking, together with the rank that cadence corresponds to.
//!
//! # Rules
//!
//! - Last upload more than 365 days ago: `abandoned`, yearly period.
//! - Five uploads or fewer: `week`, not enough history to say more.
//! - Otherwise the median gap between consecutive uploads (rounded up to
//!   whole days) picks the rank: up to 2 days `day`, up to 4 `dual`, up to
//!   14 `week`, beyond that `month`.
//!
//! The check is placed one period after the last upload's date, at the last
//! upload's time of day plus two hours, then pushed forward period by period
//! until it lies more than two hours in the future.

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};

use super::error::PredictionError;
use crate::models::{NextCheck, Rank};
use crate::utils::parse_timestamp;

/// Minimum lead of a prediction over `now`, and the time-of-day buffer
const LEAD_HOURS: i64 = 2;

const ABANDONED_AFTER_DAYS: i64 = 365;
const MIN_HISTORY: usize = 5;

/// Predict the next check from raw publish timestamps
///
/// # Errors
///
/// `EmptyHistory` for an empty list, `UnparseableTimestamp` if any entry
/// cannot be read as a timestamp.
pub fn predict(timestamps: &[String], now: DateTime<Utc>) -> Result<NextCheck, PredictionError> {
    let history = timestamps
        .iter()
        .map(|raw| {
            parse_timestamp(raw).ok_or_else(|| PredictionError::UnparseableTimestamp(raw.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    predict_from(history, now)
}

/// Predict the next check from already parsed timestamps
///
/// # Errors
///
/// `EmptyHistory` if `history` is empty.
pub fn predict_from(
    mut history: Vec<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<NextCheck, PredictionError> {
    history.sort();
    let last = *history.last().ok_or(PredictionError::EmptyHistory)?;

    let rank = if now - last > Duration::days(ABANDONED_AFTER_DAYS) {
        Rank::Abandoned
    } else if history.len() <= MIN_HISTORY {
        Rank::Week
    } else {
        rank_for_gap(median_gap_days(&history))
    };
    let period = Duration::days(rank.delay_days());

    let (preferred_time, wrapped) = preferred_time_of_day(last);
    let mut base_date = last.date_naive() + period;
    if wrapped {
        base_date += Duration::days(1);
    }

    let mut candidate = base_date.and_time(preferred_time).and_utc();
    let horizon = now + Duration::hours(LEAD_HOURS);
    if candidate <= horizon {
        // Skip whole periods at once for very stale history
        let behind = (horizon - candidate).num_seconds() / period.num_seconds();
        candidate += period * behind as i32;
        while candidate <= horizon {
            candidate += period;
        }
    }

    Ok(NextCheck::new(candidate, rank))
}

/// Median gap in whole days, rounded up; lower median for an even count
fn median_gap_days(sorted: &[DateTime<Utc>]) -> i64 {
    let mut gaps: Vec<f64> = sorted
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_seconds() as f64 / 86_400.0)
        .collect();
    gaps.sort_by(f64::total_cmp);

    gaps.get((gaps.len().saturating_sub(1)) / 2)
        .map(|gap| gap.ceil() as i64)
        .unwrap_or(0)
}

fn rank_for_gap(ceil_gap: i64) -> Rank {
    match ceil_gap {
        i64::MIN..=2 => Rank::Day,
        3..=4 => Rank::Dual,
        5..=14 => Rank::Week,
        _ => Rank::Month,
    }
}

/// Last upload's minute of day plus the buffer, and whether that crossed midnight
fn preferred_time_of_day(last: DateTime<Utc>) -> (NaiveTime, bool) {
    let minute = NaiveTime::from_hms_opt(last.hour(), last.minute(), 0).unwrap_or(NaiveTime::MIN);
    let (time, overflow_secs) = minute.overflowing_add_signed(Duration::hours(LEAD_HOURS));
    (time, overflow_secs != 0)
}

//! Cadence predictor scenarios through the public API

use chrono::{DateTime, Duration, TimeZone, Utc};
use feedtide::models::Rank;
use feedtide::scheduler::{predict, PredictionError};
use proptest::prelude::*;

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn history(times: &[DateTime<Utc>]) -> Vec<String> {
    times.iter().map(DateTime::to_rfc3339).collect()
}

#[test]
fn test_every_third_day_is_dual() {
    let start = at(2024, 4, 1, 18, 0);
    let times: Vec<_> = (0..7).map(|i| start + Duration::days(3 * i)).collect();
    let now = at(2024, 4, 19, 20, 0);

    let next = predict(&history(&times), now).unwrap();
    assert_eq!(next.rank, Rank::Dual);
    // last upload 2024-04-19 18:00, +2 days at 20:00
    assert_eq!(next.at, at(2024, 4, 21, 20, 0));
}

#[test]
fn test_sparse_uploads_are_monthly() {
    let start = at(2023, 6, 1, 9, 0);
    let times: Vec<_> = (0..6).map(|i| start + Duration::days(40 * i)).collect();
    let last = *times.last().unwrap();
    let now = last + Duration::days(3);

    let next = predict(&history(&times), now).unwrap();
    assert_eq!(next.rank, Rank::Month);
    assert_eq!(next.at, (last + Duration::days(30) + Duration::hours(2)));
}

#[test]
fn test_late_evening_upload_wraps_to_next_day() {
    let start = at(2024, 5, 1, 23, 15);
    let times: Vec<_> = (0..6).map(|i| start + Duration::days(i)).collect();
    let now = at(2024, 5, 6, 23, 30);

    let next = predict(&history(&times), now).unwrap();
    assert_eq!(next.rank, Rank::Day);
    // 23:15 + 2h crosses midnight: base date moves one more day
    assert_eq!(next.at, at(2024, 5, 8, 1, 15));
    assert_eq!(next.display, "2024-05-08 01:15");
}

#[test]
fn test_stale_history_catches_up_with_now() {
    let start = at(2024, 1, 1, 10, 0);
    let times: Vec<_> = (0..8).map(|i| start + Duration::days(i)).collect();
    let now = at(2024, 3, 15, 9, 0);

    let next = predict(&history(&times), now).unwrap();
    assert_eq!(next.rank, Rank::Day);
    assert!(next.at > now + Duration::hours(2));
    assert!(next.at <= now + Duration::hours(2) + Duration::days(1));
    assert_eq!(next.at.format("%H:%M").to_string(), "12:00");
}

#[test]
fn test_unordered_history_is_sorted() {
    let start = at(2024, 4, 1, 6, 0);
    let mut times: Vec<_> = (0..6).map(|i| start + Duration::days(i)).collect();
    times.reverse();
    times.swap(1, 4);
    let now = at(2024, 4, 6, 7, 0);

    let next = predict(&history(&times), now).unwrap();
    assert_eq!(next.at, at(2024, 4, 7, 8, 0));
}

#[test]
fn test_invalid_history() {
    let now = at(2024, 4, 6, 7, 0);
    assert_eq!(predict(&[], now), Err(PredictionError::EmptyHistory));
    assert!(matches!(
        predict(&["yesterday".to_string()], now),
        Err(PredictionError::UnparseableTimestamp(raw)) if raw == "yesterday"
    ));
}

proptest! {
    #[test]
    fn prop_prediction_is_in_the_future(
        gaps in prop::collection::vec(1i64..40 * 24, 0..15),
        age_hours in 0i64..800 * 24,
    ) {
        let now = at(2025, 1, 1, 0, 0);
        let last = now - Duration::hours(age_hours);
        let mut times = vec![last];
        for gap in &gaps {
            let prev = *times.last().unwrap();
            times.push(prev - Duration::hours(*gap));
        }

        let next = predict(&history(&times), now).unwrap();
        prop_assert!(next.at > now + Duration::hours(2));
        prop_assert!(next.at <= now + Duration::hours(2) + Duration::days(next.rank.delay_days()) + Duration::days(1));
        prop_assert_eq!(next.display, next.at.format("%Y-%m-%d %H:%M").to_string());
    }
}

//! Gapless unique-visitor time series.
//!
//! Slots are generated from the range and granularity alone, then events are
//! dropped into them. The chart consumes the series positionally, so empty
//! slots are emitted with a zero count rather than omitted.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, DurationRound, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;

use crate::analytics::{Granularity, TimeBucketPoint};
use crate::event::Event;
use crate::range::{local_date, local_midnight, TimeRange};

/// Width of the trailing window used for minute granularity.
pub const MINUTE_WINDOW: i64 = 60;

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    label: String,
    start: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct BucketSettings {
    pub timezone: Tz,
    pub week_start: Weekday,
}

impl Default for BucketSettings {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            week_start: Weekday::Mon,
        }
    }
}

pub fn bucket_series(
    events: &[&Event],
    range: &TimeRange,
    granularity: Granularity,
    settings: BucketSettings,
) -> Vec<TimeBucketPoint> {
    let (slots, series_end) = generate_slots(range, granularity, settings);
    let mut visitors: Vec<HashSet<&str>> = vec![HashSet::new(); slots.len()];

    for event in events {
        let (Some(ts), Some(visitor)) = (event.timestamp, event.visitor()) else {
            continue;
        };
        if ts >= series_end {
            continue;
        }
        // Index of the last slot starting at or before `ts`.
        let idx = slots.partition_point(|slot| slot.start <= ts);
        if idx == 0 {
            continue;
        }
        visitors[idx - 1].insert(visitor);
    }

    slots
        .into_iter()
        .zip(visitors)
        .map(|(slot, set)| TimeBucketPoint {
            label: slot.label,
            start: slot.start,
            unique_visitors: set.len() as u64,
        })
        .collect()
}

/// Slot starts for `range`, plus the exclusive end of the last slot.
fn generate_slots(
    range: &TimeRange,
    granularity: Granularity,
    settings: BucketSettings,
) -> (Vec<Slot>, DateTime<Utc>) {
    let tz = settings.timezone;
    let first_day = local_date(tz, range.start);
    let last_day = local_date(tz, range.last_instant());
    let after_last_day = local_midnight(tz, last_day + Duration::days(1));

    match granularity {
        Granularity::Minute => minute_slots(range, tz),
        Granularity::Hour => {
            let mut slots = Vec::new();
            let mut current = local_midnight(tz, first_day);
            let mut previous_hour = String::new();
            while current < after_last_day {
                let local = current.with_timezone(&tz);
                let hour = local.format("%Y-%m-%d %H:00").to_string();
                // The hour repeated when clocks fall back is told apart by its offset.
                let label = if hour == previous_hour {
                    format!("{hour} {}", local.format("%:z"))
                } else {
                    hour.clone()
                };
                slots.push(Slot {
                    label,
                    start: current,
                });
                previous_hour = hour;
                current += Duration::hours(1);
            }
            (slots, after_last_day)
        }
        Granularity::Day => {
            let slots = days_between(first_day, last_day)
                .map(|day| Slot {
                    label: day.format("%Y-%m-%d").to_string(),
                    start: local_midnight(tz, day),
                })
                .collect();
            (slots, after_last_day)
        }
        Granularity::Week => {
            let mut slots = Vec::new();
            let mut week = week_start_of(first_day, settings.week_start);
            while week <= last_day {
                // The first week is clipped to the range start.
                let day = week.max(first_day);
                slots.push(Slot {
                    label: day.format("%Y-%m-%d").to_string(),
                    start: local_midnight(tz, day),
                });
                week += Duration::days(7);
            }
            (slots, after_last_day)
        }
    }
}

fn minute_slots(range: &TimeRange, tz: Tz) -> (Vec<Slot>, DateTime<Utc>) {
    if range.is_empty() {
        return (Vec::new(), range.end);
    }
    let minute = Duration::minutes(1);
    let floor = |ts: DateTime<Utc>| ts.duration_trunc(minute).unwrap_or(ts);
    // The window ends with the minute holding the range's last instant.
    let last = floor(range.last_instant());
    let mut current = floor(range.start).max(last - Duration::minutes(MINUTE_WINDOW - 1));
    let mut slots = Vec::new();
    while current <= last {
        slots.push(Slot {
            label: current.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string(),
            start: current,
        });
        current += minute;
    }
    (slots, current)
}

fn days_between(first: NaiveDate, last: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    first.iter_days().take_while(move |day| *day <= last)
}

pub fn week_start_of(day: NaiveDate, week_start: Weekday) -> NaiveDate {
    let offset = (7 + day.weekday().num_days_from_monday() - week_start.num_days_from_monday()) % 7;
    day - Duration::days(i64::from(offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .expect("valid rfc3339")
            .with_timezone(&Utc)
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid date")
    }

    fn hit(visitor: &str, ts: &str) -> Event {
        Event {
            visitor_id: Some(visitor.to_string()),
            event_type: "pageview".to_string(),
            timestamp: Some(at(ts)),
            ..Default::default()
        }
    }

    fn assert_strictly_increasing(points: &[TimeBucketPoint]) {
        for pair in points.windows(2) {
            assert!(pair[0].start < pair[1].start);
            assert!(pair[0].label < pair[1].label);
        }
    }

    #[test]
    fn day_buckets_are_gapless() {
        let range = TimeRange::new(at("2026-03-01T00:00:00Z"), at("2026-03-08T00:00:00Z"));
        let events = [hit("a", "2026-03-02T10:00:00Z"), hit("a", "2026-03-02T11:00:00Z"), hit("b", "2026-03-05T10:00:00Z")];
        let refs: Vec<&Event> = events.iter().collect();
        let series = bucket_series(&refs, &range, Granularity::Day, BucketSettings::default());
        assert_eq!(series.len(), 7);
        assert_eq!(series[0].label, "2026-03-01");
        assert_eq!(series[1].unique_visitors, 1);
        assert_eq!(series[4].unique_visitors, 1);
        assert_eq!(series[6].label, "2026-03-07");
        assert_eq!(series.iter().map(|p| p.unique_visitors).sum::<u64>(), 2);
        assert_strictly_increasing(&series);
    }

    #[test]
    fn series_length_is_independent_of_volume() {
        let range = TimeRange::new(at("2026-03-01T00:00:00Z"), at("2026-03-03T00:00:00Z"));
        let events: Vec<Event> = (0..50).map(|i| hit(&format!("v{i}"), "2026-03-01T05:30:00Z")).collect();
        let refs: Vec<&Event> = events.iter().collect();
        let busy = bucket_series(&refs, &range, Granularity::Hour, BucketSettings::default());
        let quiet = bucket_series(&[], &range, Granularity::Hour, BucketSettings::default());
        assert_eq!(busy.len(), 48);
        assert_eq!(quiet.len(), 48);
        assert_eq!(busy[5].unique_visitors, 50);
        assert_eq!(busy[5].label, "2026-03-01 05:00");
        assert_strictly_increasing(&busy);
    }

    #[test]
    fn hour_buckets_cover_whole_days_touched() {
        let range = TimeRange::new(at("2026-03-10T00:00:00Z"), at("2026-03-10T15:30:00Z"));
        let series = bucket_series(&[], &range, Granularity::Hour, BucketSettings::default());
        assert_eq!(series.len(), 24);
        assert_eq!(series[23].label, "2026-03-10 23:00");
    }

    #[test]
    fn minute_buckets_cover_last_hour_only() {
        let range = TimeRange::new(at("2026-03-10T00:00:00Z"), at("2026-03-10T15:30:00Z"));
        let events = [hit("a", "2026-03-10T15:29:59Z"), hit("b", "2026-03-10T14:00:00Z")];
        let refs: Vec<&Event> = events.iter().collect();
        let series = bucket_series(&refs, &range, Granularity::Minute, BucketSettings::default());
        assert_eq!(series.len(), 60);
        assert_eq!(series[0].label, "2026-03-10 14:30");
        assert_eq!(series[59].label, "2026-03-10 15:29");
        assert_eq!(series[59].unique_visitors, 1);
        assert_eq!(series.iter().map(|p| p.unique_visitors).sum::<u64>(), 1);
    }

    #[test]
    fn minute_buckets_with_unaligned_end_stay_at_sixty() {
        let range = TimeRange::new(at("2026-03-10T00:00:00Z"), at("2026-03-10T15:30:30Z"));
        let events = [
            hit("a", "2026-03-10T15:30:10Z"),
            hit("b", "2026-03-10T14:30:40Z"),
            hit("c", "2026-03-10T14:31:05Z"),
        ];
        let refs: Vec<&Event> = events.iter().collect();
        let series = bucket_series(&refs, &range, Granularity::Minute, BucketSettings::default());
        assert_eq!(series.len(), 60);
        assert_eq!(series[0].label, "2026-03-10 14:31");
        assert_eq!(series[59].label, "2026-03-10 15:30");
        assert_eq!(series[59].unique_visitors, 1);
        // "b" falls before the first minute of the window.
        assert_eq!(series[0].unique_visitors, 1);
        assert_eq!(series.iter().map(|p| p.unique_visitors).sum::<u64>(), 2);
        assert_strictly_increasing(&series);
    }

    #[test]
    fn minute_buckets_shrink_for_short_ranges() {
        let range = TimeRange::new(at("2026-03-10T00:00:00Z"), at("2026-03-10T00:10:30Z"));
        let series = bucket_series(&[], &range, Granularity::Minute, BucketSettings::default());
        assert_eq!(series.len(), 11);
        assert_strictly_increasing(&series);
    }

    #[test]
    fn week_buckets_start_on_configured_day_and_clip_to_range() {
        // 2026-03-04 is a Wednesday.
        let range = TimeRange::new(at("2026-03-04T00:00:00Z"), at("2026-03-20T00:00:00Z"));
        let monday = bucket_series(&[], &range, Granularity::Week, BucketSettings::default());
        let labels: Vec<&str> = monday.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["2026-03-04", "2026-03-09", "2026-03-16"]);

        let sunday = BucketSettings {
            week_start: Weekday::Sun,
            ..Default::default()
        };
        let series = bucket_series(&[], &range, Granularity::Week, sunday);
        let labels: Vec<&str> = series.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["2026-03-04", "2026-03-08", "2026-03-15"]);
    }

    #[test]
    fn week_start_of_handles_same_day() {
        assert_eq!(week_start_of(date("2026-03-09"), Weekday::Mon), date("2026-03-09"));
        assert_eq!(week_start_of(date("2026-03-08"), Weekday::Mon), date("2026-03-02"));
        assert_eq!(week_start_of(date("2026-03-08"), Weekday::Sun), date("2026-03-08"));
    }

    fn new_york() -> BucketSettings {
        BucketSettings {
            timezone: "America/New_York".parse().expect("tz"),
            ..Default::default()
        }
    }

    #[test]
    fn fall_back_day_has_twenty_five_distinct_hours() {
        // 2026-11-01 00:00 EDT .. 2026-11-02 00:00 EST
        let range = TimeRange::new(at("2026-11-01T04:00:00Z"), at("2026-11-02T05:00:00Z"));
        let events = [hit("a", "2026-11-01T05:30:00Z"), hit("b", "2026-11-01T06:30:00Z")];
        let refs: Vec<&Event> = events.iter().collect();
        let series = bucket_series(&refs, &range, Granularity::Hour, new_york());
        assert_eq!(series.len(), 25);
        assert_eq!(series[1].label, "2026-11-01 01:00");
        assert_eq!(series[2].label, "2026-11-01 01:00 -05:00");
        assert_eq!(series[3].label, "2026-11-01 02:00");
        assert_eq!(series[1].unique_visitors, 1);
        assert_eq!(series[2].unique_visitors, 1);
        assert_strictly_increasing(&series);
    }

    #[test]
    fn spring_forward_day_has_twenty_three_hours() {
        // 2026-03-08 00:00 EST .. 2026-03-09 00:00 EDT
        let range = TimeRange::new(at("2026-03-08T05:00:00Z"), at("2026-03-09T04:00:00Z"));
        let series = bucket_series(&[], &range, Granularity::Hour, new_york());
        assert_eq!(series.len(), 23);
        assert_eq!(series[1].label, "2026-03-08 01:00");
        assert_eq!(series[2].label, "2026-03-08 03:00");
        assert_eq!(series[22].label, "2026-03-08 23:00");
        assert_strictly_increasing(&series);

        let week = TimeRange::new(at("2026-03-07T05:00:00Z"), at("2026-03-10T04:00:00Z"));
        let days = bucket_series(&[], &week, Granularity::Day, new_york());
        let starts: Vec<DateTime<Utc>> = days.iter().map(|p| p.start).collect();
        assert_eq!(
            starts,
            vec![
                at("2026-03-07T05:00:00Z"),
                at("2026-03-08T05:00:00Z"),
                at("2026-03-09T04:00:00Z"),
            ]
        );
    }

    #[test]
    fn hour_buckets_start_after_skipped_midnight() {
        let settings = BucketSettings {
            timezone: "America/Havana".parse().expect("tz"),
            ..Default::default()
        };
        let range = TimeRange::new(at("2026-03-08T05:00:00Z"), at("2026-03-09T04:00:00Z"));
        let series = bucket_series(&[], &range, Granularity::Hour, settings);
        assert_eq!(series.len(), 23);
        assert_eq!(series[0].label, "2026-03-08 01:00");
        assert_eq!(series[0].start, at("2026-03-08T05:00:00Z"));
        assert_strictly_increasing(&series);
    }

    #[test]
    fn day_buckets_use_local_calendar() {
        let tz: Tz = "Asia/Tokyo".parse().expect("tz");
        let settings = BucketSettings {
            timezone: tz,
            ..Default::default()
        };
        // 2026-03-01 00:00 JST .. 2026-03-03 00:00 JST
        let range = TimeRange::new(at("2026-02-28T15:00:00Z"), at("2026-03-02T15:00:00Z"));
        let events = [hit("a", "2026-02-28T16:00:00Z")];
        let refs: Vec<&Event> = events.iter().collect();
        let series = bucket_series(&refs, &range, Granularity::Day, settings);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].label, "2026-03-01");
        assert_eq!(series[0].unique_visitors, 1);
    }
}

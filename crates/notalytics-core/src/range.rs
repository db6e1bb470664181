//! Date-filter resolution.
//!
//! Turns the operator's date-filter selection into a concrete `[start, end)`
//! instant interval. Resolution never fails: incomplete or inconsistent input
//! falls back to `today` so the dashboard always renders something.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DateFilterMode {
    #[default]
    #[serde(rename = "today")]
    Today,
    #[serde(rename = "yesterday")]
    Yesterday,
    #[serde(rename = "last7days")]
    Last7Days,
    #[serde(rename = "last30days")]
    Last30Days,
    #[serde(rename = "custom")]
    Custom,
}

impl DateFilterMode {
    /// Lenient parse; anything unrecognised means `today`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("yesterday") => Self::Yesterday,
            Some("last7days") | Some("last_7_days") => Self::Last7Days,
            Some("last30days") | Some("last_30_days") => Self::Last30Days,
            Some("custom") => Self::Custom,
            _ => Self::Today,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateFilter {
    pub mode: DateFilterMode,
    pub custom_start: Option<NaiveDate>,
    pub custom_end: Option<NaiveDate>,
}

impl DateFilter {
    pub fn mode(mode: DateFilterMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn custom(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self {
            mode: DateFilterMode::Custom,
            custom_start: start,
            custom_end: end,
        }
    }
}

/// A half-open instant interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// The last instant inside the range, or `start` for an empty range.
    pub fn last_instant(&self) -> DateTime<Utc> {
        if self.is_empty() {
            self.start
        } else {
            self.end - Duration::nanoseconds(1)
        }
    }
}

/// UTC instant of local midnight on `date`.
///
/// A DST transition can skip local midnight; the first valid local hour of
/// that day is used instead.
pub fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::default());
    (0..=3)
        .find_map(
            |h| match tz.from_local_datetime(&(midnight + Duration::hours(h))) {
                LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
                LocalResult::Ambiguous(a, b) => Some(a.min(b).with_timezone(&Utc)),
                LocalResult::None => None,
            },
        )
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

pub fn local_date(tz: Tz, ts: DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(&tz).date_naive()
}

pub fn resolve_range(filter: &DateFilter, tz: Tz, now: DateTime<Utc>) -> TimeRange {
    let today = local_date(tz, now);
    let today_range = TimeRange::new(local_midnight(tz, today), now);

    match filter.mode {
        DateFilterMode::Today => today_range,
        DateFilterMode::Yesterday => TimeRange::new(
            local_midnight(tz, today - Duration::days(1)),
            local_midnight(tz, today),
        ),
        DateFilterMode::Last7Days => trailing_days(tz, today, now, 7),
        DateFilterMode::Last30Days => trailing_days(tz, today, now, 30),
        DateFilterMode::Custom => match (filter.custom_start, filter.custom_end) {
            (Some(start), Some(end)) if end >= start => TimeRange::new(
                local_midnight(tz, start),
                local_midnight(tz, end + Duration::days(1)),
            ),
            _ => {
                tracing::debug!(?filter, "incomplete custom range, falling back to today");
                today_range
            }
        },
    }
}

/// `days` calendar days including today, ending now.
fn trailing_days(tz: Tz, today: NaiveDate, now: DateTime<Utc>, days: i64) -> TimeRange {
    TimeRange::new(local_midnight(tz, today - Duration::days(days - 1)), now)
}

/// Lenient `YYYY-MM-DD` parse used for custom bounds.
pub fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

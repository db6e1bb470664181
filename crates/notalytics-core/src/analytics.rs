//! Derived analytics views and the event store abstraction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, StoreError};
use crate::event::Event;
use crate::funnel::StepCategory;
use crate::range::TimeRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Minute,
    Hour,
    #[default]
    Day,
    Week,
}

impl Granularity {
    pub fn parse(raw: Option<&str>) -> Result<Self, CoreError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some("minute") => Ok(Self::Minute),
            Some("hour") => Ok(Self::Hour),
            Some("day") => Ok(Self::Day),
            Some("week") => Ok(Self::Week),
            Some(other) => Err(CoreError::InvalidParameter {
                field: "granularity",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PageViewMode {
    #[default]
    Top,
    Entry,
    Exit,
}

impl PageViewMode {
    pub fn parse(raw: Option<&str>) -> Result<Self, CoreError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some("top") => Ok(Self::Top),
            Some("entry") => Ok(Self::Entry),
            Some("exit") => Ok(Self::Exit),
            Some(other) => Err(CoreError::InvalidParameter {
                field: "page_mode",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewKpis {
    pub unique_visitors: u64,
    pub sessions: u64,
    pub pageviews: u64,
    pub views_per_visit: f64,
    /// Percentage of sessions that touched exactly one distinct page, 0–100.
    pub bounce_rate: u32,
    pub avg_visit_duration_seconds: u64,
    /// `"{m}m {s}s"`.
    pub avg_visit_duration: String,
}

impl Default for OverviewKpis {
    fn default() -> Self {
        Self {
            unique_visitors: 0,
            sessions: 0,
            pageviews: 0,
            views_per_visit: 0.0,
            bounce_rate: 0,
            avg_visit_duration_seconds: 0,
            avg_visit_duration: format_visit_duration(0),
        }
    }
}

pub fn format_visit_duration(seconds: u64) -> String {
    format!("{}m {}s", seconds / 60, seconds % 60)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeBucketPoint {
    pub label: String,
    pub start: DateTime<Utc>,
    pub unique_visitors: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionRollupEntry {
    pub key: String,
    /// Set for region and city rollups, which key on `(country, name)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    pub unique_visitors: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeographyRollups {
    pub countries: Vec<DimensionRollupEntry>,
    pub regions: Vec<DimensionRollupEntry>,
    pub cities: Vec<DimensionRollupEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceRollups {
    pub device_types: Vec<DimensionRollupEntry>,
    pub browsers: Vec<DimensionRollupEntry>,
    pub operating_systems: Vec<DimensionRollupEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageRollup {
    pub mode: PageViewMode,
    pub entries: Vec<DimensionRollupEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelStepMetric {
    pub index: usize,
    pub name: String,
    pub category: StepCategory,
    pub unique_visitors: u64,
    pub conversion_rate: f64,
    pub drop_off_rate: f64,
    /// Step whose reach was used as the conversion denominator.
    pub baseline_index: usize,
    /// Visitors whose furthest completed step is this one.
    pub stalled_visitors: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FunnelReport {
    pub entered: u64,
    pub overall_conversion_rate: f64,
    pub steps: Vec<FunnelStepMetric>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionEntry {
    pub key: String,
    pub clicks: u64,
    pub unique_visitors: u64,
    /// Share of all clicks in this rollup.
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InteractionRollups {
    pub cta_clicks: Vec<InteractionEntry>,
    pub scroll_depth: Vec<InteractionEntry>,
    pub nav_clicks: Vec<InteractionEntry>,
    pub service_clicks: Vec<InteractionEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PassStatus {
    #[default]
    Ok,
    FetchFailed {
        message: String,
    },
}

/// Everything the analytics view renders, produced by one aggregation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregationResult {
    pub overview: OverviewKpis,
    pub timeseries: Vec<TimeBucketPoint>,
    pub geography: GeographyRollups,
    pub devices: DeviceRollups,
    pub languages: Vec<DimensionRollupEntry>,
    pub pages: PageRollup,
    pub funnel: FunnelReport,
    pub interactions: InteractionRollups,
    pub status: PassStatus,
}

/// Source of raw events for an aggregation pass.
#[async_trait::async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// All events with `range.start <= timestamp < range.end`, ordered by
    /// timestamp ascending.
    async fn fetch_events(&self, range: &TimeRange) -> Result<Vec<Event>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visit_duration_formats_minutes_and_seconds() {
        assert_eq!(format_visit_duration(0), "0m 0s");
        assert_eq!(format_visit_duration(59), "0m 59s");
        assert_eq!(format_visit_duration(125), "2m 5s");
    }

    #[test]
    fn default_overview_is_zeroed() {
        let overview = OverviewKpis::default();
        assert_eq!(overview.bounce_rate, 0);
        assert_eq!(overview.avg_visit_duration, "0m 0s");
    }

    #[test]
    fn granularity_and_page_mode_parse() {
        assert_eq!(Granularity::parse(None).expect("default"), Granularity::Day);
        assert_eq!(Granularity::parse(Some("week")).expect("week"), Granularity::Week);
        assert!(Granularity::parse(Some("month")).is_err());
        assert_eq!(PageViewMode::parse(Some("exit")).expect("exit"), PageViewMode::Exit);
        assert!(PageViewMode::parse(Some("landing")).is_err());
    }
}

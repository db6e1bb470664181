//! The aggregation pass: filters in, every analytics view out.

use std::time::Instant;

use chrono::{DateTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

use crate::analytics::{AggregationResult, Granularity, PageViewMode, PassStatus};
use crate::event::{non_blank, Event};
use crate::funnel::{compute_funnel, FunnelDefinition};
use crate::interactions::aggregate_interactions;
use crate::range::{resolve_range, DateFilter, DateFilterMode, TimeRange};
use crate::rollups;
use crate::sessions::reconstruct;
use crate::timeseries::{bucket_series, BucketSettings};

/// Everything the operator can change on the analytics view.
#[derive(Debug, Clone)]
pub struct FilterParameters {
    pub date: DateFilter,
    /// ISO-3166 alpha-2 code; `None` means all countries.
    pub country: Option<String>,
    pub granularity: Granularity,
    pub page_mode: PageViewMode,
    pub timezone: Tz,
    pub week_start: Weekday,
}

impl Default for FilterParameters {
    fn default() -> Self {
        Self {
            date: DateFilter::default(),
            country: None,
            granularity: Granularity::default(),
            page_mode: PageViewMode::default(),
            timezone: Tz::UTC,
            week_start: Weekday::Mon,
        }
    }
}

impl FilterParameters {
    /// Pin the date filter to concrete instants as of `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> ResolvedFilters {
        ResolvedFilters {
            range: resolve_range(&self.date, self.timezone, now),
            mode: self.date.mode,
            country: non_blank(self.country.as_deref()).map(str::to_ascii_uppercase),
            granularity: self.granularity,
            page_mode: self.page_mode,
            buckets: BucketSettings {
                timezone: self.timezone,
                week_start: self.week_start,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedFilters {
    pub range: TimeRange,
    pub mode: DateFilterMode,
    pub country: Option<String>,
    pub granularity: Granularity,
    pub page_mode: PageViewMode,
    pub buckets: BucketSettings,
}

impl ResolvedFilters {
    /// Country and time scoping. The store already scopes by time; events
    /// without a timestamp are kept since they cannot be placed outside it.
    pub fn admits(&self, event: &Event) -> bool {
        if let Some(ts) = event.timestamp {
            if !self.range.contains(ts) {
                return false;
            }
        }
        match &self.country {
            Some(wanted) => non_blank(event.country_code.as_deref())
                .is_some_and(|code| code.eq_ignore_ascii_case(wanted)),
            None => true,
        }
    }

    pub fn summary(&self) -> AppliedFilters {
        AppliedFilters {
            date_filter: self.mode,
            start: self.range.start,
            end: self.range.end,
            country: self.country.clone(),
            granularity: self.granularity,
            page_mode: self.page_mode,
            timezone: self.buckets.timezone.name().to_string(),
        }
    }
}

/// Serializable echo of the filters a published result was computed with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedFilters {
    pub date_filter: DateFilterMode,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub country: Option<String>,
    pub granularity: Granularity,
    pub page_mode: PageViewMode,
    pub timezone: String,
}

/// Recompute every view from scratch over `events`.
pub fn aggregate(
    events: &[Event],
    filters: &ResolvedFilters,
    funnel: &FunnelDefinition,
) -> AggregationResult {
    let started = Instant::now();
    let scoped: Vec<&Event> = events.iter().filter(|e| filters.admits(e)).collect();

    let reconstruction = reconstruct(scoped.iter().copied(), funnel);
    let result = AggregationResult {
        overview: reconstruction.overview(),
        timeseries: bucket_series(
            &scoped,
            &filters.range,
            filters.granularity,
            filters.buckets,
        ),
        geography: rollups::geography(&scoped),
        devices: rollups::devices(&scoped),
        languages: rollups::languages(&scoped),
        pages: rollups::pages(&scoped, filters.page_mode),
        funnel: compute_funnel(funnel, reconstruction.visitors.values()),
        interactions: aggregate_interactions(scoped.iter().copied()),
        status: PassStatus::Ok,
    };

    tracing::debug!(
        fetched = events.len(),
        scoped = scoped.len(),
        visitors = result.overview.unique_visitors,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "aggregation pass computed"
    );
    result
}

impl AggregationResult {
    /// Zeroed views for a pass whose fetch failed. The time series keeps its
    /// full slot layout so the chart still renders.
    pub fn failed(filters: &ResolvedFilters, funnel: &FunnelDefinition, message: String) -> Self {
        Self {
            status: PassStatus::FetchFailed { message },
            ..aggregate(&[], filters, funnel)
        }
    }
}

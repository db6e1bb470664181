//! Per-visitor and per-session reconstruction.
//!
//! Both maps are built fresh for each aggregation pass from the filtered
//! event slice and borrow from it; nothing outlives the pass.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::analytics::{format_visit_duration, OverviewKpis};
use crate::event::{non_blank, Event};
use crate::funnel::FunnelDefinition;
use crate::rollups::round_one_decimal;

#[derive(Debug, Default)]
pub struct Session<'a> {
    pub pages: BTreeSet<&'a str>,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub event_count: u64,
}

impl Session<'_> {
    /// Exactly one distinct page was touched.
    pub fn is_bounce(&self) -> bool {
        self.pages.len() == 1
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.last_seen? - self.first_seen?)
    }
}

#[derive(Debug, Default)]
pub struct Visitor<'a> {
    pub sessions: BTreeSet<&'a str>,
    pub events: Vec<&'a Event>,
    pub completed_steps: BTreeSet<usize>,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub pageviews: u64,
    pub country_code: Option<&'a str>,
    pub country_name: Option<&'a str>,
    pub region: Option<&'a str>,
    pub city: Option<&'a str>,
    pub device_type: Option<&'a str>,
    pub browser_name: Option<&'a str>,
    pub os_name: Option<&'a str>,
    pub language: Option<&'a str>,
}

impl<'a> Visitor<'a> {
    /// Highest completed funnel step index. Progress only moves forward by
    /// index, so a later event for an earlier step never lowers this.
    pub fn furthest_step(&self) -> Option<usize> {
        self.completed_steps.last().copied()
    }

    pub fn has_reached(&self, step: usize) -> bool {
        self.completed_steps.contains(&step)
    }

    /// The visitor's events in time order; events without a timestamp sort last.
    pub fn events_chronological(&self) -> Vec<&'a Event> {
        let mut events = self.events.clone();
        events.sort_by_key(|e| (e.timestamp.is_none(), e.timestamp));
        events
    }

    /// Replay the event history in time order: funnel progress from every
    /// matching event, attributes from the latest non-blank values.
    fn settle(&mut self, funnel: &FunnelDefinition) {
        for event in self.events_chronological() {
            self.completed_steps.extend(funnel.matching_steps(event));
            self.remember_attributes(event);
        }
    }

    fn remember_attributes(&mut self, event: &'a Event) {
        let latest = |slot: &mut Option<&'a str>, value: &'a Option<String>| {
            if let Some(v) = non_blank(value.as_deref()) {
                *slot = Some(v);
            }
        };
        latest(&mut self.country_code, &event.country_code);
        latest(&mut self.country_name, &event.country_name);
        latest(&mut self.region, &event.region);
        latest(&mut self.city, &event.city);
        latest(&mut self.device_type, &event.device_type);
        latest(&mut self.browser_name, &event.browser_name);
        latest(&mut self.os_name, &event.os_name);
        latest(&mut self.language, &event.language);
    }
}

fn widen(
    first: &mut Option<DateTime<Utc>>,
    last: &mut Option<DateTime<Utc>>,
    ts: Option<DateTime<Utc>>,
) {
    let Some(ts) = ts else {
        return;
    };
    *first = Some(first.map_or(ts, |f| f.min(ts)));
    *last = Some(last.map_or(ts, |l| l.max(ts)));
}

#[derive(Debug, Default)]
pub struct Reconstruction<'a> {
    pub visitors: HashMap<&'a str, Visitor<'a>>,
    pub sessions: HashMap<&'a str, Session<'a>>,
}

/// Group `events` by visitor and by session in a single pass.
pub fn reconstruct<'a>(
    events: impl IntoIterator<Item = &'a Event>,
    funnel: &FunnelDefinition,
) -> Reconstruction<'a> {
    let mut out = Reconstruction::default();

    for event in events {
        if let Some(visitor_id) = event.visitor() {
            let visitor = out.visitors.entry(visitor_id).or_default();
            widen(
                &mut visitor.first_seen,
                &mut visitor.last_seen,
                event.timestamp,
            );
            if event.counts_as_pageview() {
                visitor.pageviews += 1;
            }
            if let Some(session_id) = event.session() {
                visitor.sessions.insert(session_id);
            }
            visitor.events.push(event);
        }

        if let Some(session_id) = event.session() {
            let session = out.sessions.entry(session_id).or_default();
            widen(
                &mut session.first_seen,
                &mut session.last_seen,
                event.timestamp,
            );
            if let Some(page) = event.page() {
                session.pages.insert(page);
            }
            session.event_count += 1;
        }
    }

    for visitor in out.visitors.values_mut() {
        visitor.settle(funnel);
    }
    out
}

impl Reconstruction<'_> {
    pub fn pageviews(&self) -> u64 {
        self.visitors.values().map(|v| v.pageviews).sum()
    }

    /// Single-page sessions as a whole percentage of all sessions.
    pub fn bounce_rate(&self) -> u32 {
        if self.sessions.is_empty() {
            return 0;
        }
        let bounces = self.sessions.values().filter(|s| s.is_bounce()).count();
        (bounces as f64 * 100.0 / self.sessions.len() as f64).round() as u32
    }

    /// Mean session length in whole seconds over sessions with a timestamp.
    pub fn avg_visit_duration_seconds(&self) -> u64 {
        let durations: Vec<i64> = self
            .sessions
            .values()
            .filter_map(Session::duration)
            .map(|d| d.num_milliseconds())
            .collect();
        if durations.is_empty() {
            return 0;
        }
        let total: i64 = durations.iter().sum();
        (total as f64 / durations.len() as f64 / 1000.0).round() as u64
    }

    pub fn overview(&self) -> OverviewKpis {
        let sessions = self.sessions.len() as u64;
        let pageviews = self.pageviews();
        let avg_seconds = self.avg_visit_duration_seconds();
        OverviewKpis {
            unique_visitors: self.visitors.len() as u64,
            sessions,
            pageviews,
            views_per_visit: if sessions == 0 {
                0.0
            } else {
                round_one_decimal(pageviews as f64 / sessions as f64)
            },
            bounce_rate: self.bounce_rate(),
            avg_visit_duration_seconds: avg_seconds,
            avg_visit_duration: format_visit_duration(avg_seconds),
        }
    }
}

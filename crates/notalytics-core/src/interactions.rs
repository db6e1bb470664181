//! Ancillary UI-interaction rollups (CTA, scroll depth, navigation, services).

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::analytics::{InteractionEntry, InteractionRollups};
use crate::event::{Event, CTA_CLICK, NAV_CLICK, SCROLL_DEPTH, SERVICE_CLICK};
use crate::rollups::percent_of;

pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InteractionKind {
    Cta,
    ScrollDepth,
    Navigation,
    Service,
}

impl InteractionKind {
    fn of(event_type: &str) -> Option<Self> {
        match event_type {
            CTA_CLICK => Some(Self::Cta),
            SCROLL_DEPTH => Some(Self::ScrollDepth),
            NAV_CLICK => Some(Self::Navigation),
            SERVICE_CLICK => Some(Self::Service),
            _ => None,
        }
    }

    fn field(self) -> &'static str {
        match self {
            Self::Cta => "location",
            Self::ScrollDepth => "depth",
            Self::Navigation => "destination",
            Self::Service => "service_id",
        }
    }
}

#[derive(Default)]
struct Tally<'a> {
    clicks: u64,
    visitors: HashSet<&'a str>,
}

pub fn aggregate_interactions<'a>(events: impl IntoIterator<Item = &'a Event>) -> InteractionRollups {
    let mut cta: HashMap<String, Tally<'a>> = HashMap::new();
    let mut scroll: HashMap<String, Tally<'a>> = HashMap::new();
    let mut nav: HashMap<String, Tally<'a>> = HashMap::new();
    let mut service: HashMap<String, Tally<'a>> = HashMap::new();

    for event in events {
        let Some(kind) = InteractionKind::of(&event.event_type) else {
            continue;
        };
        let label = event.metadata.normalized().label(kind.field());
        let key = match kind {
            InteractionKind::ScrollDepth => label.map(|raw| normalize_depth(&raw)),
            _ => label,
        }
        .unwrap_or_else(|| UNKNOWN.to_string());

        let target = match kind {
            InteractionKind::Cta => &mut cta,
            InteractionKind::ScrollDepth => &mut scroll,
            InteractionKind::Navigation => &mut nav,
            InteractionKind::Service => &mut service,
        };
        let tally = target.entry(key).or_default();
        tally.clicks += 1;
        if let Some(visitor) = event.visitor() {
            tally.visitors.insert(visitor);
        }
    }

    InteractionRollups {
        cta_clicks: ranked_by_clicks(cta),
        scroll_depth: ordered_by_depth(scroll),
        nav_clicks: ranked_by_clicks(nav),
        service_clicks: ranked_by_clicks(service),
    }
}

/// `"50%"`, `"50"`, `50` and `50.0` all become `"50"`.
fn normalize_depth(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('%').trim();
    match trimmed.parse::<f64>() {
        Ok(depth) if depth.is_finite() => format!("{}", depth.round() as i64),
        _ => trimmed.to_string(),
    }
}

fn into_entries(tallies: HashMap<String, Tally<'_>>) -> Vec<InteractionEntry> {
    let total: u64 = tallies.values().map(|t| t.clicks).sum();
    tallies
        .into_iter()
        .map(|(key, tally)| InteractionEntry {
            key,
            clicks: tally.clicks,
            unique_visitors: tally.visitors.len() as u64,
            percentage: percent_of(tally.clicks, total),
        })
        .collect()
}

fn ranked_by_clicks(tallies: HashMap<String, Tally<'_>>) -> Vec<InteractionEntry> {
    let mut entries = into_entries(tallies);
    entries.sort_by(|a, b| b.clicks.cmp(&a.clicks).then_with(|| a.key.cmp(&b.key)));
    entries
}

/// Ascending by numeric depth; non-numeric keys (including `unknown`) last.
fn ordered_by_depth(tallies: HashMap<String, Tally<'_>>) -> Vec<InteractionEntry> {
    let mut entries = into_entries(tallies);
    entries.sort_by(|a, b| {
        match (a.key.parse::<f64>().ok(), b.key.parse::<f64>().ok()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.key.cmp(&b.key),
        }
    });
    entries
}

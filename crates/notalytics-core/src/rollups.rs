//! Unique-visitor rollups by categorical dimension.
//!
//! Every rollup is the same shape: group events by a key, collect the set of
//! visitor ids per key, then rank the keys. Events without a visitor id or
//! without a usable key are skipped.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::analytics::{
    DeviceRollups, DimensionRollupEntry, GeographyRollups, PageRollup, PageViewMode,
};
use crate::event::{non_blank, Event};

pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `part / whole × 100`, one decimal. Callers guard `whole == 0`.
pub fn percent_of(part: u64, whole: u64) -> f64 {
    round_one_decimal(part as f64 * 100.0 / whole as f64)
}

/// One linear pass building `key -> {visitor ids}`.
pub fn group_visitors<'a, K, F>(
    events: impl IntoIterator<Item = &'a Event>,
    mut key_of: F,
) -> HashMap<K, HashSet<&'a str>>
where
    K: Eq + Hash,
    F: FnMut(&'a Event) -> Option<K>,
{
    let mut groups: HashMap<K, HashSet<&'a str>> = HashMap::new();
    for event in events {
        let Some(visitor) = event.visitor() else {
            continue;
        };
        let Some(key) = key_of(event) else {
            continue;
        };
        groups.entry(key).or_default().insert(visitor);
    }
    groups
}

/// Rank a simple rollup by unique visitors descending, ties by key.
pub fn ranked_entries(groups: HashMap<String, HashSet<&str>>) -> Vec<DimensionRollupEntry> {
    let total: u64 = groups.values().map(|v| v.len() as u64).sum();
    let mut entries: Vec<DimensionRollupEntry> = groups
        .into_iter()
        .map(|(key, visitors)| {
            let count = visitors.len() as u64;
            DimensionRollupEntry {
                key,
                country_code: None,
                unique_visitors: count,
                percentage: percent_of(count, total),
            }
        })
        .collect();
    entries.sort_by(|a, b| {
        b.unique_visitors
            .cmp(&a.unique_visitors)
            .then_with(|| a.key.cmp(&b.key))
    });
    entries
}

/// Rank a `(country, name)` rollup: grouped by country code, then by unique
/// visitors descending within each country.
fn ranked_by_country(
    groups: HashMap<(Option<String>, String), HashSet<&str>>,
) -> Vec<DimensionRollupEntry> {
    let total: u64 = groups.values().map(|v| v.len() as u64).sum();
    let mut entries: Vec<DimensionRollupEntry> = groups
        .into_iter()
        .map(|((country_code, key), visitors)| {
            let count = visitors.len() as u64;
            DimensionRollupEntry {
                key,
                country_code,
                unique_visitors: count,
                percentage: percent_of(count, total),
            }
        })
        .collect();
    entries.sort_by(|a, b| {
        a.country_code
            .cmp(&b.country_code)
            .then_with(|| b.unique_visitors.cmp(&a.unique_visitors))
            .then_with(|| a.key.cmp(&b.key))
    });
    entries
}

fn country_code_of(event: &Event) -> Option<String> {
    non_blank(event.country_code.as_deref()).map(str::to_ascii_uppercase)
}

pub fn geography<'a>(events: &[&'a Event]) -> GeographyRollups {
    let countries = group_visitors(events.iter().copied(), |e| {
        non_blank(e.country_name.as_deref())
            .or_else(|| non_blank(e.country_code.as_deref()))
            .map(str::to_string)
    });
    let regions = group_visitors(events.iter().copied(), |e| {
        let region = non_blank(e.region.as_deref())?;
        Some((country_code_of(e), region.to_string()))
    });
    let cities = group_visitors(events.iter().copied(), |e| {
        let city = non_blank(e.city.as_deref())?;
        Some((country_code_of(e), city.to_string()))
    });

    GeographyRollups {
        countries: ranked_entries(countries),
        regions: ranked_by_country(regions),
        cities: ranked_by_country(cities),
    }
}

pub fn devices<'a>(events: &[&'a Event]) -> DeviceRollups {
    let device_types = group_visitors(events.iter().copied(), |e| {
        non_blank(e.device_type.as_deref()).map(str::to_lowercase)
    });
    let browsers = group_visitors(events.iter().copied(), |e| {
        non_blank(e.browser_name.as_deref()).map(str::to_string)
    });
    let operating_systems = group_visitors(events.iter().copied(), |e| {
        non_blank(e.os_name.as_deref()).map(str::to_string)
    });

    DeviceRollups {
        device_types: ranked_entries(device_types),
        browsers: ranked_entries(browsers),
        operating_systems: ranked_entries(operating_systems),
    }
}

pub fn languages<'a>(events: &[&'a Event]) -> Vec<DimensionRollupEntry> {
    ranked_entries(group_visitors(events.iter().copied(), |e| {
        non_blank(e.language.as_deref()).map(str::to_lowercase)
    }))
}

pub fn pages<'a>(events: &[&'a Event], mode: PageViewMode) -> PageRollup {
    let groups = match mode {
        PageViewMode::Top => {
            group_visitors(events.iter().copied(), |e| e.page().map(str::to_string))
        }
        PageViewMode::Entry => first_page_per_session(chronological(events)),
        PageViewMode::Exit => first_page_per_session(chronological(events).into_iter().rev()),
    };
    PageRollup {
        mode,
        entries: ranked_entries(groups),
    }
}

/// Timestamped, session-scoped events carrying a page path, oldest first.
/// The sort is stable so input order breaks timestamp ties.
fn chronological<'a>(events: &[&'a Event]) -> Vec<&'a Event> {
    let mut ordered: Vec<&'a Event> = events
        .iter()
        .copied()
        .filter(|e| e.timestamp.is_some() && e.session().is_some() && e.page().is_some())
        .collect();
    ordered.sort_by_key(|e| e.timestamp);
    ordered
}

fn first_page_per_session<'a>(
    ordered: impl IntoIterator<Item = &'a Event>,
) -> HashMap<String, HashSet<&'a str>> {
    // Anonymous events still claim their session; they just add no visitor.
    let mut seen_sessions: HashSet<&'a str> = HashSet::new();
    let firsts = ordered
        .into_iter()
        .filter(|&e| e.session().is_some_and(|session| seen_sessions.insert(session)));
    group_visitors(firsts, |e| e.page().map(str::to_string))
}

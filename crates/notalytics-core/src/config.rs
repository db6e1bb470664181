use std::time::Duration;

use chrono::Weekday;
use chrono_tz::Tz;

use crate::error::CoreError;
use crate::funnel::FunnelDefinition;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    /// DuckDB `memory_limit`, e.g. `1GB`.
    pub duckdb_memory_limit: String,
    pub timezone: Tz,
    pub week_start: Weekday,
    pub fetch_timeout_ms: u64,
    /// JSON funnel definition; the built-in notarization funnel when unset.
    pub funnel_path: Option<String>,
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            data_dir: "./data".to_string(),
            duckdb_memory_limit: "1GB".to_string(),
            timezone: Tz::UTC,
            week_start: Weekday::Mon,
            fetch_timeout_ms: 10_000,
            funnel_path: None,
            cors_origins: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset and blank values fall
    /// back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            port: match var("NOTALYTICS_PORT") {
                Some(raw) => raw.trim().parse().map_err(|e| format!("invalid port: {e}"))?,
                None => defaults.port,
            },
            data_dir: var("NOTALYTICS_DATA_DIR").unwrap_or(defaults.data_dir),
            duckdb_memory_limit: match var("NOTALYTICS_DUCKDB_MEMORY") {
                Some(raw) => validate_memory_limit(raw.trim())?,
                None => defaults.duckdb_memory_limit,
            },
            timezone: match var("NOTALYTICS_TIMEZONE") {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid timezone: {raw}"))?,
                None => defaults.timezone,
            },
            week_start: match var("NOTALYTICS_WEEK_START").as_deref().map(str::trim) {
                None => defaults.week_start,
                Some(raw) if raw.eq_ignore_ascii_case("monday") => Weekday::Mon,
                Some(raw) if raw.eq_ignore_ascii_case("sunday") => Weekday::Sun,
                Some(raw) => return Err(format!("invalid week start: {raw}")),
            },
            fetch_timeout_ms: match var("NOTALYTICS_FETCH_TIMEOUT_MS") {
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(ms) if ms > 0 => ms,
                    _ => return Err(format!("invalid fetch timeout: {raw}")),
                },
                None => defaults.fetch_timeout_ms,
            },
            funnel_path: var("NOTALYTICS_FUNNEL_PATH"),
            cors_origins: var("NOTALYTICS_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn load_funnel(&self) -> Result<FunnelDefinition, CoreError> {
        match &self.funnel_path {
            Some(path) => FunnelDefinition::from_json(&std::fs::read_to_string(path)?),
            None => Ok(FunnelDefinition::notarization_default()),
        }
    }
}

/// Accepts `<digits><unit>` with a unit DuckDB understands. The value is
/// interpolated into a `SET` statement, so nothing else gets through.
fn validate_memory_limit(raw: &str) -> Result<String, String> {
    let digits = raw.chars().take_while(char::is_ascii_digit).count();
    let (amount, unit) = raw.split_at(digits);
    let unit_ok = ["KB", "MB", "GB", "TB", "KIB", "MIB", "GIB", "TIB"]
        .iter()
        .any(|u| unit.trim().eq_ignore_ascii_case(u));
    if amount.is_empty() || !unit_ok {
        return Err(format!("invalid duckdb memory limit: {raw}"));
    }
    Ok(format!("{amount}{}", unit.trim().to_ascii_uppercase()))
}

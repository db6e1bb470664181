use anyhow::Result;
use chrono::{NaiveDateTime, Utc};

use notalytics_core::event::{Event, Metadata};
use notalytics_core::range::TimeRange;

use crate::backend::TIMESTAMP_FORMAT;
use crate::DuckDbBackend;

/// Every event with `start <= created_at < end`, oldest first. Insertion
/// order breaks timestamp ties.
pub async fn fetch_events_inner(db: &DuckDbBackend, range: &TimeRange) -> Result<Vec<Event>> {
    let conn = db.conn.lock().await;

    let start_str = range.start.format(TIMESTAMP_FORMAT).to_string();
    let end_str = range.end.format(TIMESTAMP_FORMAT).to_string();

    let mut stmt = conn.prepare(
        r#"
        SELECT
            visitor_id, session_id, event_type, page_path,
            country_code, country_name, region, city,
            device_type, browser_name, os_name, language,
            metadata, CAST(created_at AS VARCHAR)
        FROM events
        WHERE created_at >= CAST(?1 AS TIMESTAMP)
          AND created_at < CAST(?2 AS TIMESTAMP)
        ORDER BY created_at ASC, id ASC
        "#,
    )?;

    let rows = stmt.query_map(duckdb::params![start_str, end_str], |row| {
        let metadata: Option<String> = row.get(12)?;
        let created_at: Option<String> = row.get(13)?;
        Ok(Event {
            visitor_id: row.get(0)?,
            session_id: row.get(1)?,
            event_type: row.get(2)?,
            page_path: row.get(3)?,
            country_code: row.get(4)?,
            country_name: row.get(5)?,
            region: row.get(6)?,
            city: row.get(7)?,
            device_type: row.get(8)?,
            browser_name: row.get(9)?,
            os_name: row.get(10)?,
            language: row.get(11)?,
            timestamp: created_at.as_deref().and_then(parse_timestamp),
            metadata: metadata.map(Metadata::Raw).unwrap_or_default(),
        })
    })?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}

/// DuckDB renders `TIMESTAMP` as `YYYY-MM-DD HH:MM:SS[.ffffff]`.
fn parse_timestamp(raw: &str) -> Option<chrono::DateTime<Utc>> {
    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        Ok(naive) => Some(naive.and_utc()),
        Err(err) => {
            tracing::debug!(raw, %err, "unparseable created_at");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_seconds() {
        let whole = parse_timestamp("2026-03-10 10:00:00").expect("whole");
        assert_eq!(whole.to_rfc3339(), "2026-03-10T10:00:00+00:00");
        let fractional = parse_timestamp("2026-03-10 10:00:00.25").expect("fractional");
        assert_eq!(fractional.timestamp_subsec_millis(), 250);
        assert!(parse_timestamp("yesterday").is_none());
    }
}

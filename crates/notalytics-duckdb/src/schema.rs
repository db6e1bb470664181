/// DuckDB initialization SQL, run once per open. Every statement is
/// idempotent so it is safe on each startup.
///
/// `memory_limit` comes from `Config.duckdb_memory_limit`
/// (`NOTALYTICS_DUCKDB_MEMORY`, default `"1GB"`). The DuckDB default of 80%
/// of system RAM is too much for a server process.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

CREATE SEQUENCE IF NOT EXISTS events_id_seq START 1;

-- One row per tracked interaction, as written by the site's collectors.
CREATE TABLE IF NOT EXISTS events (
    id              BIGINT PRIMARY KEY DEFAULT nextval('events_id_seq'),
    visitor_id      VARCHAR,
    session_id      VARCHAR,
    event_type      VARCHAR NOT NULL,                -- 'pageview' | 'form_opened' | 'cta_click' | ...
    page_path       VARCHAR,

    -- GeoIP
    country_code    VARCHAR(2),                      -- ISO 3166-1 alpha-2
    country_name    VARCHAR,
    region          VARCHAR,
    city            VARCHAR,

    -- User agent
    device_type     VARCHAR,
    browser_name    VARCHAR,
    os_name         VARCHAR,
    language        VARCHAR,

    metadata        VARCHAR,                         -- JSON text, possibly double-encoded
    created_at      TIMESTAMP NOT NULL               -- UTC
);
CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at);
"#
    )
}

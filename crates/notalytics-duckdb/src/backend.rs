use std::sync::Arc;

use anyhow::Result;
use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::{info, warn};

use notalytics_core::event::Event;

use crate::schema::init_sql;

/// Text layout used when binding timestamps. DuckDB casts it to `TIMESTAMP`.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// DuckDB-backed event storage.
///
/// DuckDB is single-writer, so the connection sits behind `Arc<Mutex<_>>`.
/// Memory and thread limits are applied by [`init_sql`] at open time.
#[derive(Clone)]
pub struct DuckDbBackend {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl DuckDbBackend {
    /// Open (or create) a database file at `path`.
    pub fn open(path: &str, memory_limit: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(&init_sql(memory_limit))?;
        info!(path, memory_limit, "DuckDB opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database for tests; discarded on drop.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(&init_sql("1GB"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert a batch in a single transaction. Events without a timestamp
    /// cannot be placed in any range and are skipped. Returns the number of
    /// rows written.
    pub async fn insert_events(&self, events: &[Event]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let mut written = 0;

        for event in events {
            let Some(ts) = event.timestamp else {
                warn!(event_type = %event.event_type, "skipping event without timestamp");
                continue;
            };
            tx.execute(
                r#"INSERT INTO events (
                    visitor_id, session_id, event_type, page_path,
                    country_code, country_name, region, city,
                    device_type, browser_name, os_name, language,
                    metadata, created_at
                ) VALUES (
                    ?1,  ?2,  ?3,  ?4,
                    ?5,  ?6,  ?7,  ?8,
                    ?9,  ?10, ?11, ?12,
                    ?13, ?14
                )"#,
                duckdb::params![
                    event.visitor_id,
                    event.session_id,
                    event.event_type,
                    event.page_path,
                    event.country_code,
                    event.country_name,
                    event.region,
                    event.city,
                    event.device_type,
                    event.browser_name,
                    event.os_name,
                    event.language,
                    event.metadata.to_storage_string(),
                    ts.format(TIMESTAMP_FORMAT).to_string(),
                ],
            )?;
            written += 1;
        }

        tx.commit()?;
        info!(written, "inserted events into DuckDB");
        Ok(written)
    }

    /// `SELECT 1` liveness check for `/health`.
    pub async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    /// Direct connection access for integration tests.
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use notalytics_core::analytics::EventStore;
use notalytics_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Structured JSON logging; level controlled via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("notalytics=info".parse()?),
        )
        .json()
        .init();

    let cfg = notalytics_core::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    let funnel = cfg.load_funnel()?;
    info!(
        steps = funnel.len(),
        source = cfg.funnel_path.as_deref().unwrap_or("built-in"),
        "funnel loaded"
    );

    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = format!("{}/notalytics.db", cfg.data_dir);
    let db = notalytics_duckdb::DuckDbBackend::open(&db_path, &cfg.duckdb_memory_limit)?;
    let store: Arc<dyn EventStore> = Arc::new(db);

    let state = Arc::new(AppState::new(store, cfg.clone(), funnel));

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = notalytics_server::app::build_app(Arc::clone(&state));

    info!(
        port = cfg.port,
        timezone = cfg.timezone.name(),
        "Notalytics listening on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}

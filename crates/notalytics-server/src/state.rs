use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use notalytics_core::aggregate::{aggregate, AppliedFilters, FilterParameters, ResolvedFilters};
use notalytics_core::analytics::{AggregationResult, EventStore};
use notalytics_core::event::Event;
use notalytics_core::funnel::FunnelDefinition;
use notalytics_core::range::TimeRange;

use crate::config::Config;
use crate::error::AppError;
use crate::pass::{PassTicket, PassTracker};

/// A published aggregation pass, as served to the analytics view.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub pass_id: u64,
    pub filters: AppliedFilters,
    pub range: TimeRange,
    pub computed_at: DateTime<Utc>,
    pub event_count: usize,
    pub result: AggregationResult,
}

pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub config: Config,
    pub funnel: Arc<FunnelDefinition>,
    pub passes: PassTracker,
    published: RwLock<Option<Arc<DashboardSnapshot>>>,
}

impl AppState {
    pub fn new(store: Arc<dyn EventStore>, config: Config, funnel: FunnelDefinition) -> Self {
        Self {
            store,
            config,
            funnel: Arc::new(funnel),
            passes: PassTracker::new(),
            published: RwLock::new(None),
        }
    }

    /// Filters with the deployment's timezone and week start filled in.
    pub fn default_filters(&self) -> FilterParameters {
        FilterParameters {
            timezone: self.config.timezone,
            week_start: self.config.week_start,
            ..Default::default()
        }
    }

    pub async fn published(&self) -> Option<Arc<DashboardSnapshot>> {
        self.published.read().await.clone()
    }

    /// Run one aggregation pass and publish it unless a newer pass has
    /// started in the meantime.
    ///
    /// A failed or timed-out fetch still publishes: the zeroed result with a
    /// `fetch_failed` status replaces whatever was shown before.
    pub async fn refresh(&self, params: FilterParameters) -> Result<Arc<DashboardSnapshot>, AppError> {
        let mut ticket = self.passes.begin();
        let pass_id = ticket.id();
        let started = Instant::now();
        let filters = params.resolve(Utc::now());

        let fetched = tokio::select! {
            _ = ticket.superseded() => {
                warn!(pass_id, latest = ticket.latest(), "pass superseded during fetch");
                return Err(superseded(&ticket));
            }
            fetched = tokio::time::timeout(
                self.config.fetch_timeout(),
                self.store.fetch_events(&filters.range),
            ) => fetched,
        };

        let (result, event_count) = match fetched {
            Ok(Ok(events)) => {
                let count = events.len();
                (self.aggregate_blocking(events, filters.clone()).await?, count)
            }
            Ok(Err(e)) => {
                error!(pass_id, error = %e, "event fetch failed");
                (
                    AggregationResult::failed(&filters, &self.funnel, e.to_string()),
                    0,
                )
            }
            Err(_) => {
                let message = format!(
                    "event fetch timed out after {} ms",
                    self.config.fetch_timeout_ms
                );
                error!(pass_id, "{message}");
                (AggregationResult::failed(&filters, &self.funnel, message), 0)
            }
        };

        let snapshot = Arc::new(DashboardSnapshot {
            pass_id,
            filters: filters.summary(),
            range: filters.range,
            computed_at: Utc::now(),
            event_count,
            result,
        });

        let mut published = self.published.write().await;
        let newer_published = published.as_ref().is_some_and(|p| p.pass_id > pass_id);
        if !ticket.is_current() || newer_published {
            warn!(pass_id, latest = ticket.latest(), "discarding superseded pass");
            return Err(superseded(&ticket));
        }
        *published = Some(Arc::clone(&snapshot));

        info!(
            pass_id,
            events = event_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analytics pass published"
        );
        Ok(snapshot)
    }

    async fn aggregate_blocking(
        &self,
        events: Vec<Event>,
        filters: ResolvedFilters,
    ) -> Result<AggregationResult, AppError> {
        let funnel = Arc::clone(&self.funnel);
        tokio::task::spawn_blocking(move || aggregate(&events, &filters, &funnel))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("aggregation task failed: {e}")))
    }
}

fn superseded(ticket: &PassTicket) -> AppError {
    AppError::Superseded {
        pass_id: ticket.id(),
        latest: ticket.latest(),
    }
}

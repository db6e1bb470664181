use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use notalytics_core::aggregate::FilterParameters;
use notalytics_core::analytics::{Granularity, PageViewMode};
use notalytics_core::event::non_blank;
use notalytics_core::range::{parse_date, DateFilter, DateFilterMode};

use crate::{error::AppError, state::AppState};

/// Filter controls of the analytics view. Every field is optional; missing
/// values fall back to `today`, all countries, day buckets and top pages.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    pub date_filter: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub country: Option<String>,
    pub granularity: Option<String>,
    pub page_mode: Option<String>,
}

impl RefreshRequest {
    fn into_filters(self, defaults: FilterParameters) -> Result<FilterParameters, AppError> {
        let country = non_blank(self.country.as_deref()).map(str::to_string);
        if let Some(ref code) = country {
            if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(AppError::InvalidField {
                    field: "country",
                    message: "country must be ISO 3166-1 alpha-2 (2 letters)".to_string(),
                });
            }
        }

        let date = match DateFilterMode::parse(self.date_filter.as_deref()) {
            DateFilterMode::Custom => DateFilter::custom(
                parse_date(self.start_date.as_deref()),
                parse_date(self.end_date.as_deref()),
            ),
            mode => DateFilter::mode(mode),
        };

        Ok(FilterParameters {
            date,
            country,
            granularity: Granularity::parse(self.granularity.as_deref())?,
            page_mode: PageViewMode::parse(self.page_mode.as_deref())?,
            ..defaults
        })
    }
}

/// `POST /api/analytics/refresh` - run an aggregation pass.
///
/// 200 with the published snapshot, or 409 `superseded` when a newer refresh
/// started before this one finished.
#[tracing::instrument(skip(state))]
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let params = request.into_filters(state.default_filters())?;
    let snapshot = state.refresh(params).await?;
    Ok(Json(json!({ "data": &*snapshot })))
}

/// `GET /api/analytics` - the latest published snapshot.
#[tracing::instrument(skip(state))]
pub async fn latest(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let snapshot = state
        .published()
        .await
        .ok_or_else(|| AppError::NotFound("no analytics pass has been published yet".to_string()))?;
    Ok(Json(json!({ "data": &*snapshot })))
}

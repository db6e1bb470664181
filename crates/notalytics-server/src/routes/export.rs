use std::borrow::Cow;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
};

use notalytics_core::analytics::{AggregationResult, DimensionRollupEntry};
use notalytics_core::funnel::StepCategory;

use crate::{error::AppError, state::AppState};

/// Rollups of the published snapshot that can be downloaded as CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportView {
    Countries,
    Regions,
    Cities,
    Devices,
    Browsers,
    OperatingSystems,
    Languages,
    Pages,
    Funnel,
    Timeseries,
}

impl ExportView {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "countries" => Self::Countries,
            "regions" => Self::Regions,
            "cities" => Self::Cities,
            "devices" => Self::Devices,
            "browsers" => Self::Browsers,
            "os" => Self::OperatingSystems,
            "languages" => Self::Languages,
            "pages" => Self::Pages,
            "funnel" => Self::Funnel,
            "timeseries" => Self::Timeseries,
            _ => return None,
        })
    }
}

/// `GET /api/analytics/export/{view}` - one rollup of the published snapshot
/// as a CSV attachment.
#[tracing::instrument(skip(state))]
pub async fn export_view(
    State(state): State<Arc<AppState>>,
    Path(view): Path<String>,
) -> Result<Response, AppError> {
    let kind = ExportView::parse(&view)
        .ok_or_else(|| AppError::NotFound(format!("unknown export view: {view}")))?;
    let snapshot = state
        .published()
        .await
        .ok_or_else(|| AppError::NotFound("no analytics pass has been published yet".to_string()))?;

    let csv_bytes = build_csv(kind, &snapshot.result)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
    let filename = format!("{view}-pass-{}.csv", snapshot.pass_id);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(axum::body::Body::from(csv_bytes))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("response build failed: {e}")))
}

/// Spreadsheet apps evaluate cells starting with `=`, `+`, `-`, `@`, TAB or
/// CR as formulas; a leading `'` keeps them literal.
fn sanitize_csv_field(val: &str) -> Cow<'_, str> {
    if val.starts_with(['=', '+', '-', '@', '\t', '\r']) {
        Cow::Owned(format!("'{val}"))
    } else {
        Cow::Borrowed(val)
    }
}

struct CsvOut {
    wtr: csv::Writer<Vec<u8>>,
}

impl CsvOut {
    fn row(&mut self, fields: &[&str]) -> anyhow::Result<()> {
        let cells: Vec<Cow<'_, str>> = fields.iter().map(|f| sanitize_csv_field(f)).collect();
        self.wtr
            .write_record(cells.iter().map(|c| c.as_bytes()))
            .map_err(|e| anyhow::anyhow!("csv write_record failed: {e}"))
    }

    fn dimension(&mut self, column: &str, entries: &[DimensionRollupEntry]) -> anyhow::Result<()> {
        self.row(&[column, "unique_visitors", "percentage"])?;
        for entry in entries {
            self.row(&[
                &entry.key,
                &entry.unique_visitors.to_string(),
                &entry.percentage.to_string(),
            ])?;
        }
        Ok(())
    }

    /// Region and city rows carry the country code they are keyed by.
    fn located(&mut self, column: &str, entries: &[DimensionRollupEntry]) -> anyhow::Result<()> {
        self.row(&["country_code", column, "unique_visitors", "percentage"])?;
        for entry in entries {
            self.row(&[
                entry.country_code.as_deref().unwrap_or(""),
                &entry.key,
                &entry.unique_visitors.to_string(),
                &entry.percentage.to_string(),
            ])?;
        }
        Ok(())
    }
}

fn build_csv(view: ExportView, result: &AggregationResult) -> anyhow::Result<Vec<u8>> {
    let mut out = CsvOut {
        wtr: csv::Writer::from_writer(Vec::new()),
    };

    match view {
        ExportView::Countries => out.dimension("country", &result.geography.countries)?,
        ExportView::Regions => out.located("region", &result.geography.regions)?,
        ExportView::Cities => out.located("city", &result.geography.cities)?,
        ExportView::Devices => out.dimension("device_type", &result.devices.device_types)?,
        ExportView::Browsers => out.dimension("browser", &result.devices.browsers)?,
        ExportView::OperatingSystems => out.dimension("os", &result.devices.operating_systems)?,
        ExportView::Languages => out.dimension("language", &result.languages)?,
        ExportView::Pages => out.dimension("page_path", &result.pages.entries)?,
        ExportView::Funnel => {
            out.row(&[
                "step",
                "name",
                "category",
                "unique_visitors",
                "conversion_rate",
                "drop_off_rate",
                "stalled_visitors",
            ])?;
            for step in &result.funnel.steps {
                let category = match step.category {
                    StepCategory::Awareness => "awareness",
                    StepCategory::Conversion => "conversion",
                };
                out.row(&[
                    &(step.index + 1).to_string(),
                    &step.name,
                    category,
                    &step.unique_visitors.to_string(),
                    &step.conversion_rate.to_string(),
                    &step.drop_off_rate.to_string(),
                    &step.stalled_visitors.to_string(),
                ])?;
            }
        }
        ExportView::Timeseries => {
            out.row(&["bucket", "start", "unique_visitors"])?;
            for point in &result.timeseries {
                out.row(&[
                    &point.label,
                    &point.start.to_rfc3339(),
                    &point.unique_visitors.to_string(),
                ])?;
            }
        }
    }

    out.wtr
        .into_inner()
        .map_err(|e| anyhow::anyhow!("csv flush failed: {e}"))
}

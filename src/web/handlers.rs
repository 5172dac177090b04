use axum::{
    extract::{Query, State},
    response::Html,
    Json,
};
use serde::{Deserialize, Serialize};

use super::error::AppError;
use super::AppState;
use crate::analytics::ReportQuery;
use crate::dates::{StartDate, StartDateError};
use crate::pipeline::{self, aggregate::AggregateRow, RunStats};
use crate::settings::SelectOption;

const DASHBOARD_HTML: &str = include_str!("../../assets/dashboard.html");

pub async fn health() -> &'static str {
    "ok"
}

pub async fn index() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

#[derive(Debug, Serialize)]
pub struct OptionsResponse {
    pub views: Vec<SelectOption>,
    pub windows: Vec<SelectOption>,
    pub default_view: String,
    pub default_window: String,
}

pub async fn options(State(state): State<AppState>) -> Json<OptionsResponse> {
    let s = &state.settings;
    Json(OptionsResponse {
        views: s.views.clone(),
        windows: s.windows.clone(),
        default_view: s.default_view.clone(),
        default_window: s.default_window.clone(),
    })
}

/// Selector values; `data-set-chosen` is accepted as an alias for `view`.
#[derive(Debug, Default, Deserialize)]
pub struct ReportParams {
    #[serde(alias = "data-set-chosen")]
    pub view: Option<String>,
    pub time: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub view: String,
    pub time: String,
    pub columns: Vec<&'static str>,
    pub rows: Vec<AggregateRow>,
    pub stats: RunStats,
    pub empty: bool,
}

pub async fn report(
    State(state): State<AppState>,
    Query(params): Query<ReportParams>,
) -> Result<Json<ReportResponse>, AppError> {
    let settings = &state.settings;
    let view = params.view.unwrap_or_else(|| settings.default_view.clone());
    let time = params.time.unwrap_or_else(|| settings.default_window.clone());

    if settings.view(&view).is_none() {
        return Err(AppError::BadRequest(format!("unknown view {:?}", view)));
    }
    if settings.window(&time).is_none() {
        return Err(AppError::BadRequest(format!("unknown time window {:?}", time)));
    }
    let start: StartDate = time
        .parse()
        .map_err(|e: StartDateError| AppError::BadRequest(e.to_string()))?;

    let query = ReportQuery::new(view.clone(), start).with_page_size(settings.analytics.page_size);
    let table = pipeline::run(state.source.as_ref(), &query).await?;

    Ok(Json(ReportResponse {
        view,
        time,
        empty: table.is_empty(),
        columns: table.columns,
        rows: table.rows,
        stats: table.stats,
    }))
}

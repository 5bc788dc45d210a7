//! Persisted report listing and detail endpoints. Detail lookups key on
//! `analysis_history.id` because `query_id` collides across batch runs.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use storage::ReportFilter;

use crate::{ApiError, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/history", get(list_history))
        .route("/history/{record_id}", get(history_detail))
        .route("/history/{record_id}/news", get(history_news))
}

#[derive(Deserialize)]
struct HistoryQuery {
    #[serde(default, alias = "stock_code")]
    ticker: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    page_size: Option<u32>,
}

async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let date = match &query.date {
        None => None,
        Some(raw) => Some(
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| ApiError::bad_request(format!("bad date: {raw}")))?,
        ),
    };
    let filter = ReportFilter {
        ticker: query.ticker.map(|t| analysis_core::canonicalize(&t)),
        date,
        page: query.page.unwrap_or(0),
        page_size: query.page_size.unwrap_or(20),
    };
    let page = state.store.list_reports(&filter).await?;
    Ok(Json(json!({ "total": page.total, "reports": page.reports })))
}

async fn history_detail(
    State(state): State<AppState>,
    Path(record_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let report = state.store.get_report(record_id).await?;
    Ok(Json(json!({ "report": report })))
}

async fn history_news(
    State(state): State<AppState>,
    Path(record_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // 404 on a missing record rather than an empty list.
    state.store.get_report(record_id).await?;
    let news = state.store.news_for_record(record_id).await?;
    Ok(Json(json!({ "record_id": record_id, "news": news })))
}

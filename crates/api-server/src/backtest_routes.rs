//! Stored backtest results. The engine that produces them lives outside
//! this service; these endpoints persist and serve the artifacts, each
//! stamped with the engine version that wrote it.

use analysis_core::{canonicalize, Market};
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::{ApiError, AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/backtest/results", post(save_result).get(list_results))
}

#[derive(Deserialize)]
struct SaveRequest {
    #[serde(alias = "stock_code")]
    ticker: String,
    /// Arbitrary result document from the backtest run.
    result: serde_json::Value,
    #[serde(default)]
    engine_version: Option<String>,
}

async fn save_result(
    State(state): State<AppState>,
    Json(request): Json<SaveRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ticker = canonicalize(&request.ticker);
    if Market::of(&ticker).is_none() {
        return Err(ApiError::bad_request(format!("unrecognized stock code: {}", request.ticker)));
    }
    if !request.result.is_object() {
        return Err(ApiError::bad_request("result must be a JSON object"));
    }
    let engine_version = request
        .engine_version
        .unwrap_or_else(|| analysis_pipeline::ENGINE_VERSION.to_string());
    let id = state
        .store
        .save_backtest_result(&ticker, &engine_version, &request.result.to_string())
        .await?;
    Ok(Json(json!({ "id": id, "ticker": ticker, "engine_version": engine_version })))
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(alias = "stock_code")]
    ticker: String,
}

async fn list_results(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ticker = canonicalize(&query.ticker);
    let rows = state.store.list_backtest_results(&ticker).await?;
    let results: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|(id, engine_version, result_json)| {
            json!({
                "id": id,
                "engine_version": engine_version,
                "result": serde_json::from_str::<serde_json::Value>(&result_json)
                    .unwrap_or(serde_json::Value::Null),
            })
        })
        .collect();
    Ok(Json(json!({ "ticker": ticker, "results": results })))
}

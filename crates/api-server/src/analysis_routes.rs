//! Analysis submission, task polling and the task SSE stream.

use std::convert::Infallible;

use analysis_core::{canonicalize, Market, ReportType, TaskEventKind, TaskStatus};
use analysis_pipeline::PipelineOutcome;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::Stream;
use serde::Deserialize;
use serde_json::json;
use task_queue::QueueError;
use tokio_util::sync::CancellationToken;

use crate::{ApiError, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/analysis/analyze", post(submit_analysis))
        .route("/analysis/status/{task_id}", get(task_status))
        .route("/analysis/tasks", get(list_tasks))
        .route("/analysis/tasks/stream", get(task_stream))
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    #[serde(alias = "stock_code", alias = "ticker")]
    code: String,
    #[serde(default)]
    report_type: Option<String>,
    /// Async by default; `sync: true` runs inline and returns the report.
    #[serde(default)]
    sync: bool,
    #[serde(default)]
    force_refresh: bool,
}

async fn submit_analysis(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ticker = canonicalize(&request.code);
    if ticker.is_empty() || Market::of(&ticker).is_none() {
        return Err(ApiError::bad_request(format!("unrecognized stock code: {}", request.code)));
    }
    let report_type = match &request.report_type {
        None => ReportType::Detailed,
        Some(raw) => ReportType::parse(raw)
            .ok_or_else(|| ApiError::bad_request(format!("unknown report_type: {raw}")))?,
    };

    if request.sync {
        let query_id = uuid::Uuid::new_v4().simple().to_string();
        let outcome = state
            .pipeline
            .analyze(
                &ticker,
                report_type,
                &query_id,
                request.force_refresh,
                false,
                CancellationToken::new(),
            )
            .await
            .map_err(|e| {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.code(), e.to_string())
            })?;
        return match outcome {
            PipelineOutcome::Completed(report) => {
                Ok((StatusCode::OK, Json(json!({ "report": *report }))).into_response())
            }
            PipelineOutcome::Skipped { reason, .. } => Ok((
                StatusCode::OK,
                Json(json!({ "skipped": true, "reason": reason })),
            )
                .into_response()),
        };
    }

    match state.queue.submit(&ticker, report_type, request.force_refresh) {
        Ok(task) => Ok((StatusCode::ACCEPTED, Json(json!({ "task": task }))).into_response()),
        Err(QueueError::Duplicate { ticker, existing_task_id }) => Ok((
            StatusCode::CONFLICT,
            Json(json!({
                "error": "Conflict",
                "message": format!("{ticker} is already being analyzed"),
                "code": "duplicate_submission",
                "stock_code": ticker,
                "task_id": existing_task_id,
            })),
        )
            .into_response()),
        Err(QueueError::Busy(backlog)) => Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "Service Unavailable",
                "message": format!("queue backlog full ({backlog})"),
                "code": "busy",
            })),
        )
            .into_response()),
    }
}

async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let task = state
        .queue
        .get(&task_id)
        .ok_or_else(|| ApiError::not_found(format!("task {task_id} not found")))?;
    Ok(Json(json!({ "task": task })))
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = match query.status.as_deref() {
        None => None,
        Some("pending") => Some(TaskStatus::Pending),
        Some("processing") => Some(TaskStatus::Processing),
        Some("completed") => Some(TaskStatus::Completed),
        Some("failed") => Some(TaskStatus::Failed),
        Some(other) => return Err(ApiError::bad_request(format!("unknown status: {other}"))),
    };
    let tasks = state.queue.list(status, query.limit.unwrap_or(50));
    Ok(Json(json!({ "tasks": tasks, "stats": state.queue.stats() })))
}

/// SSE stream of task lifecycle events. Each connection is one bus
/// subscriber; disconnect tears the subscription down with the stream.
async fn task_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.bus.subscribe();
    tracing::debug!("task stream subscriber joined ({} active)", state.bus.subscriber_count());

    let stream = async_stream_events(subscription);
    Sse::new(stream).keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15)))
}

/// Emit `connected` first, then bus events as they arrive. The stream
/// ends (and the SSE response closes) when the bus drops the sender.
fn async_stream_events(
    subscription: task_queue::Subscription,
) -> impl Stream<Item = Result<Event, Infallible>> {
    futures_util::stream::unfold(
        (false, subscription),
        |(started, mut subscription)| async move {
            if !started {
                let event = Event::default()
                    .event(TaskEventKind::Connected.as_str())
                    .data(json!({ "ok": true }).to_string());
                return Some((Ok(event), (true, subscription)));
            }
            let task_event = subscription.receiver.recv().await?;
            let event = Event::default()
                .event(task_event.kind.as_str())
                .data(serde_json::to_string(&task_event).unwrap_or_else(|_| "{}".into()));
            Some((Ok(event), (true, subscription)))
        },
    )
}

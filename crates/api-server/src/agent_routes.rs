//! Agent chat SSE stream, strategy listing and session CRUD.

use std::convert::Infallible;

use analysis_core::{ConversationTurn, TurnRole};
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures_util::stream::Stream;
use llm_router::ChatMessage;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::{ApiError, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/agent/chat/stream", post(chat_stream))
        .route("/agent/strategies", get(list_strategies))
        .route("/agent/chat/sessions", get(list_sessions).post(create_session))
        .route("/agent/chat/sessions/{session_id}", get(session_detail))
        .route("/agent/chat/sessions/{session_id}", delete(delete_session))
}

async fn list_strategies(State(state): State<AppState>) -> Json<serde_json::Value> {
    let strategies: Vec<serde_json::Value> = state
        .agent
        .strategies()
        .iter()
        .map(|s| {
            json!({
                "name": s.name,
                "display_name": s.display_name,
                "description": s.description,
                "category": s.category,
                "required_tools": s.required_tools,
            })
        })
        .collect();
    Json(json!({ "strategies": strategies }))
}

async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let sessions = state.store.list_sessions(50).await?;
    Ok(Json(json!({ "sessions": sessions })))
}

/// Mint a session id; the first chat turn actually materializes it.
async fn create_session() -> Json<serde_json::Value> {
    Json(json!({ "session_id": uuid::Uuid::new_v4().simple().to_string() }))
}

async fn session_detail(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let turns = state.store.session_turns(&session_id).await?;
    if turns.is_empty() {
        return Err(ApiError::not_found(format!("session {session_id} not found")));
    }
    Ok(Json(json!({ "session_id": session_id, "turns": turns })))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state.store.delete_session(&session_id).await?;
    if deleted == 0 {
        return Err(ApiError::not_found(format!("session {session_id} not found")));
    }
    Ok(Json(json!({ "deleted": deleted })))
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    skills: Vec<String>,
}

/// Multi-turn agent chat as SSE. Event sequence:
/// `thinking / tool_start / tool_done / generating`* then `done` (or
/// `error`). Both the user turn and the assistant outcome are persisted,
/// including failures, so the session transcript never tears.
async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }
    let session_id = request
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

    let history = state
        .store
        .session_turns(&session_id)
        .await?
        .into_iter()
        .map(|turn| match turn.role {
            TurnRole::User => ChatMessage::user(turn.content),
            TurnRole::Assistant => {
                let mut msg = ChatMessage::assistant(turn.content);
                msg.reasoning_blob = turn.reasoning_blob;
                msg
            }
            TurnRole::Tool => ChatMessage::tool_result("", "", turn.content),
        })
        .collect::<Vec<_>>();

    let (event_tx, event_rx) = mpsc::channel::<serde_json::Value>(64);
    let (progress_tx, mut progress_rx) = mpsc::channel(64);

    // Forward executor progress into the SSE channel.
    let forward_tx = event_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            let value = serde_json::to_value(&event).unwrap_or_else(|_| json!({}));
            if forward_tx.send(value).await.is_err() {
                break;
            }
        }
    });

    let agent = state.agent.clone();
    let store = state.store.clone();
    let message = request.message.clone();
    let skills = request.skills.clone();
    let stream_session = session_id.clone();
    tokio::spawn(async move {
        let user_turn = ConversationTurn {
            session_id: stream_session.clone(),
            role: TurnRole::User,
            content: message.clone(),
            tool_calls: None,
            reasoning_blob: None,
            created_at: Utc::now(),
        };
        if let Err(e) = store.append_turn(&user_turn).await {
            tracing::warn!("user turn persist failed: {e}");
        }

        let outcome = agent.run_chat(history, &message, &skills, Some(progress_tx)).await;

        let (content, reasoning, terminal) = match outcome {
            Ok(outcome) => {
                let reasoning = outcome
                    .transcript
                    .iter()
                    .rev()
                    .find_map(|m| m.reasoning_blob.clone());
                let terminal = json!({
                    "type": "done",
                    "session_id": stream_session,
                    "content": outcome.content,
                    "steps": outcome.steps,
                });
                (outcome.content, reasoning, terminal)
            }
            Err(error) => {
                let note = format!("[analysis failed] {error}");
                let terminal = json!({
                    "type": "error",
                    "session_id": stream_session,
                    "message": error,
                });
                (note, None, terminal)
            }
        };

        let assistant_turn = ConversationTurn {
            session_id: stream_session,
            role: TurnRole::Assistant,
            content,
            tool_calls: None,
            reasoning_blob: reasoning,
            created_at: Utc::now(),
        };
        if let Err(e) = store.append_turn(&assistant_turn).await {
            tracing::warn!("assistant turn persist failed: {e}");
        }

        let _ = event_tx.send(terminal).await;
    });

    let stream = futures_util::stream::unfold(event_rx, |mut rx| async move {
        let value = rx.recv().await?;
        let kind = value
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("message")
            .to_string();
        let event = Event::default().event(kind).data(value.to_string());
        Some((Ok(event), rx))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15))))
}

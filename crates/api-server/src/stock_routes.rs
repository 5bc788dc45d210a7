//! Vision-powered ticker extraction from a screenshot.

use analysis_core::{canonicalize, Market};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use llm_router::{ChatMessage, ChatRole, ContentPart};
use serde::Deserialize;
use serde_json::json;

use crate::{ApiError, AppState};

/// Base64 payloads past this size are refused with 413.
const MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;

const EXTRACT_PROMPT: &str = "This image shows a stock watchlist or brokerage screenshot. \
Extract every stock code you can see. Respond with a JSON array of strings, \
A-share codes as 6 digits, Hong Kong as 5 digits, US symbols as letters. \
No commentary.";

pub fn routes() -> Router<AppState> {
    Router::new().route("/stocks/extract-from-image", post(extract_from_image))
}

#[derive(Deserialize)]
struct ExtractRequest {
    /// data URL (`data:image/png;base64,...`) or external image URL.
    image: String,
}

async fn extract_from_image(
    State(state): State<AppState>,
    Json(request): Json<ExtractRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.image.len() > MAX_IMAGE_BYTES {
        return Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            format!("image exceeds {} bytes", MAX_IMAGE_BYTES),
        ));
    }
    if request.image.trim().is_empty() {
        return Err(ApiError::bad_request("image must not be empty"));
    }

    let message = ChatMessage {
        role: ChatRole::User,
        content: vec![
            ContentPart::Text { text: EXTRACT_PROMPT.to_string() },
            ContentPart::ImageUrl { url: request.image },
        ],
        tool_calls: vec![],
        tool_call_id: None,
        tool_name: None,
        reasoning_blob: None,
    };

    let response = state
        .router
        .chat(&[message], &[])
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_GATEWAY, "llm_failed", e.to_string()))?;
    let content = response
        .content
        .ok_or_else(|| ApiError::internal("model returned no content"))?;

    let tickers = parse_ticker_list(&content);
    Ok(Json(json!({ "stock_codes": tickers })))
}

/// Accept a JSON array anywhere in the response and keep only strings
/// that classify as real tickers.
fn parse_ticker_list(content: &str) -> Vec<String> {
    let window = match (content.find('['), content.rfind(']')) {
        (Some(start), Some(end)) if end > start => &content[start..=end],
        _ => return Vec::new(),
    };
    let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(window) else {
        return Vec::new();
    };
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter_map(|v| v.as_str().map(canonicalize))
        .filter(|t| Market::of(t).is_some())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

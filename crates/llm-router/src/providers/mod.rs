mod anthropic;
mod gemini;
mod openai;

pub use anthropic::AnthropicTransport;
pub use gemini::GeminiTransport;
pub use openai::OpenAiTransport;

use async_trait::async_trait;

use crate::{ChatMessage, LlmError, LlmResponse, ToolSchema};

/// One provider wire dialect. Stateless apart from the HTTP client; keys
/// are supplied per call by the router's pool.
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    fn id(&self) -> &'static str;

    async fn chat(
        &self,
        model: &str,
        key: &str,
        key_index: usize,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<LlmResponse, LlmError>;
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Map an HTTP failure status onto the router error taxonomy.
pub(crate) fn classify_status(
    provider: &'static str,
    key_index: usize,
    status: reqwest::StatusCode,
    body: &str,
) -> LlmError {
    let code = status.as_u16();
    if code == 429 || body.contains("RESOURCE_EXHAUSTED") || body.contains("insufficient_quota") {
        return LlmError::RateLimited { provider, key_index };
    }
    if status.is_client_error() {
        return LlmError::InvalidRequest {
            provider,
            message: format!("HTTP {code}: {}", truncate(body, 300)),
        };
    }
    LlmError::Transport { provider, message: format!("HTTP {code}") }
}

pub(crate) fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

//! Gemini generateContent dialect.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::providers::{classify_status, http_client, ProviderTransport};
use crate::{ChatMessage, ChatRole, ContentPart, LlmError, LlmResponse, ToolCall, ToolSchema, Usage};

const PROVIDER: &str = "gemini";

pub struct GeminiTransport {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiTransport {
    pub fn new() -> Self {
        GeminiTransport {
            client: http_client(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

impl Default for GeminiTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn part_for(content: &ContentPart) -> Value {
    match content {
        ContentPart::Text { text } => json!({ "text": text }),
        ContentPart::ImageUrl { url } => {
            // Data URLs become inline_data; external URLs ride file_data.
            if let Some(rest) = url.strip_prefix("data:") {
                let (mime, data) = rest.split_once(";base64,").unwrap_or(("image/png", rest));
                json!({ "inline_data": { "mime_type": mime, "data": data } })
            } else {
                json!({ "file_data": { "file_uri": url } })
            }
        }
    }
}

/// (system_instruction, contents)
fn wire_contents(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
    let mut system = None;
    let mut contents: Vec<Value> = Vec::new();
    for m in messages {
        match m.role {
            ChatRole::System => system = Some(m.text_content()),
            ChatRole::User => {
                let parts: Vec<Value> = m.content.iter().map(part_for).collect();
                contents.push(json!({ "role": "user", "parts": parts }));
            }
            ChatRole::Assistant => {
                let mut parts: Vec<Value> = Vec::new();
                let text = m.text_content();
                if !text.is_empty() {
                    parts.push(json!({ "text": text }));
                }
                for tc in &m.tool_calls {
                    let mut call = json!({
                        "functionCall": { "name": tc.name, "args": tc.arguments }
                    });
                    // Thought signatures ride on the functionCall part and
                    // must be replayed for multi-turn reasoning contracts.
                    if let Some(blob) = &m.reasoning_blob {
                        call["thoughtSignature"] = Value::String(blob.clone());
                    }
                    parts.push(call);
                }
                if !parts.is_empty() {
                    contents.push(json!({ "role": "model", "parts": parts }));
                }
            }
            ChatRole::Tool => {
                contents.push(json!({
                    "role": "user",
                    "parts": [{
                        "functionResponse": {
                            "name": m.tool_name.clone().unwrap_or_default(),
                            "response": { "result": m.text_content() },
                        }
                    }],
                }));
            }
        }
    }
    (system, contents)
}

#[async_trait]
impl ProviderTransport for GeminiTransport {
    fn id(&self) -> &'static str {
        PROVIDER
    }

    async fn chat(
        &self,
        model: &str,
        key: &str,
        key_index: usize,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<LlmResponse, LlmError> {
        let (system, contents) = wire_contents(messages);
        let mut body = json!({ "contents": contents });
        if let Some(system) = system {
            body["system_instruction"] = json!({ "parts": [{ "text": system }] });
        }
        if !tools.is_empty() {
            let declarations: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!([{ "function_declarations": declarations }]);
        }

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, key
        );
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport { provider: PROVIDER, message: e.to_string() })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Transport { provider: PROVIDER, message: e.to_string() })?;
        if !status.is_success() {
            return Err(classify_status(PROVIDER, key_index, status, &text));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| LlmError::InvalidResponse { provider: PROVIDER, message: e.to_string() })?;
        let parts = parsed["candidates"][0]["content"]["parts"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        if parts.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: PROVIDER,
                message: "empty candidates".into(),
            });
        }

        let mut content: Option<String> = None;
        let mut tool_calls = Vec::new();
        let mut reasoning_blob = None;
        for (i, part) in parts.iter().enumerate() {
            if let Some(text) = part["text"].as_str() {
                content = Some(content.unwrap_or_default() + text);
            }
            if let Some(fc) = part.get("functionCall") {
                tool_calls.push(ToolCall {
                    id: format!("gm_{i}"),
                    name: fc["name"].as_str().unwrap_or_default().to_string(),
                    arguments: fc["args"].clone(),
                });
            }
            if let Some(sig) = part["thoughtSignature"].as_str() {
                reasoning_blob = Some(sig.to_string());
            }
        }

        Ok(LlmResponse {
            content,
            tool_calls,
            usage: Usage {
                prompt_tokens: parsed["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0),
                completion_tokens: parsed["usageMetadata"]["candidatesTokenCount"]
                    .as_u64()
                    .unwrap_or(0),
                total_tokens: parsed["usageMetadata"]["totalTokenCount"].as_u64().unwrap_or(0),
            },
            provider: PROVIDER,
            model: model.to_string(),
            reasoning_blob,
        })
    }
}

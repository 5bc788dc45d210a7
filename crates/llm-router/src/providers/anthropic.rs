//! Anthropic messages dialect.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::providers::{classify_status, http_client, ProviderTransport};
use crate::{ChatMessage, ChatRole, ContentPart, LlmError, LlmResponse, ToolCall, ToolSchema, Usage};

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 8192;

pub struct AnthropicTransport {
    client: reqwest::Client,
    base_url: String,
}

impl AnthropicTransport {
    pub fn new() -> Self {
        AnthropicTransport { client: http_client(), base_url: "https://api.anthropic.com".to_string() }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

impl Default for AnthropicTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn image_block(url: &str) -> Value {
    if let Some(rest) = url.strip_prefix("data:") {
        let (mime, data) = rest.split_once(";base64,").unwrap_or(("image/png", rest));
        json!({
            "type": "image",
            "source": { "type": "base64", "media_type": mime, "data": data },
        })
    } else {
        json!({ "type": "image", "source": { "type": "url", "url": url } })
    }
}

/// (system, messages)
fn wire_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
    let mut system = None;
    let mut out: Vec<Value> = Vec::new();
    for m in messages {
        match m.role {
            ChatRole::System => system = Some(m.text_content()),
            ChatRole::User => {
                let blocks: Vec<Value> = m
                    .content
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                        ContentPart::ImageUrl { url } => image_block(url),
                    })
                    .collect();
                out.push(json!({ "role": "user", "content": blocks }));
            }
            ChatRole::Assistant => {
                let mut blocks: Vec<Value> = Vec::new();
                // Replay captured thinking blocks ahead of text/tool_use,
                // as the API requires for multi-turn tool loops.
                if let Some(blob) = &m.reasoning_blob {
                    if let Ok(block) = serde_json::from_str::<Value>(blob) {
                        blocks.push(block);
                    }
                }
                let text = m.text_content();
                if !text.is_empty() {
                    blocks.push(json!({ "type": "text", "text": text }));
                }
                for tc in &m.tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": tc.id,
                        "name": tc.name,
                        "input": tc.arguments,
                    }));
                }
                if !blocks.is_empty() {
                    out.push(json!({ "role": "assistant", "content": blocks }));
                }
            }
            ChatRole::Tool => {
                out.push(json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": m.tool_call_id.clone().unwrap_or_default(),
                        "content": m.text_content(),
                    }],
                }));
            }
        }
    }
    (system, out)
}

#[async_trait]
impl ProviderTransport for AnthropicTransport {
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
        let (system, wire) = wire_messages(messages);
        let mut body = json!({
            "model": model,
            "max_tokens": MAX_TOKENS,
            "messages": wire,
        });
        if let Some(system) = system {
            body["system"] = Value::String(system);
        }
        if !tools.is_empty() {
            let wire_tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body["tools"] = Value::Array(wire_tools);
        }

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION)
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
        let blocks = parsed["content"].as_array().cloned().unwrap_or_default();
        if blocks.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: PROVIDER,
                message: "empty content".into(),
            });
        }

        let mut content: Option<String> = None;
        let mut tool_calls = Vec::new();
        let mut reasoning_blob = None;
        for block in &blocks {
            match block["type"].as_str() {
                Some("text") => {
                    if let Some(t) = block["text"].as_str() {
                        content = Some(content.unwrap_or_default() + t);
                    }
                }
                Some("tool_use") => {
                    tool_calls.push(ToolCall {
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        arguments: block["input"].clone(),
                    });
                }
                Some("thinking") | Some("redacted_thinking") => {
                    // Kept whole so it can be replayed verbatim.
                    reasoning_blob = Some(block.to_string());
                }
                _ => {}
            }
        }

        Ok(LlmResponse {
            content,
            tool_calls,
            usage: Usage {
                prompt_tokens: parsed["usage"]["input_tokens"].as_u64().unwrap_or(0),
                completion_tokens: parsed["usage"]["output_tokens"].as_u64().unwrap_or(0),
                total_tokens: parsed["usage"]["input_tokens"].as_u64().unwrap_or(0)
                    + parsed["usage"]["output_tokens"].as_u64().unwrap_or(0),
            },
            provider: PROVIDER,
            model: model.to_string(),
            reasoning_blob,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_results_are_user_blocks() {
        let (_, wire) = wire_messages(&[ChatMessage::tool_result("toolu_1", "get_quote", "{}")]);
        assert_eq!(wire[0]["role"], "user");
        assert_eq!(wire[0]["content"][0]["type"], "tool_result");
        assert_eq!(wire[0]["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn thinking_block_replayed_first() {
        let mut msg = ChatMessage::assistant("done");
        msg.reasoning_blob =
            Some(r#"{"type":"thinking","thinking":"...","signature":"s"}"#.into());
        let (_, wire) = wire_messages(&[msg]);
        assert_eq!(wire[0]["content"][0]["type"], "thinking");
        assert_eq!(wire[0]["content"][1]["type"], "text");
    }

    #[test]
    fn external_image_uses_url_source() {
        let block = image_block("https://example.com/chart.png");
        assert_eq!(block["source"]["type"], "url");
        let inline = image_block("data:image/png;base64,QUJD");
        assert_eq!(inline["source"]["type"], "base64");
    }
}

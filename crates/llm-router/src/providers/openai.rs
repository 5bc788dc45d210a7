//! OpenAI-compatible chat-completions dialect. Also serves any
//! OpenAI-compatible gateway via a custom base URL.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::providers::{classify_status, http_client, ProviderTransport};
use crate::{ChatMessage, ChatRole, ContentPart, LlmError, LlmResponse, ToolCall, ToolSchema, Usage};

const PROVIDER: &str = "openai";

pub struct OpenAiTransport {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiTransport {
    pub fn new(base_url: Option<String>) -> Self {
        OpenAiTransport {
            client: http_client(),
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com".to_string()),
        }
    }
}

fn wire_content(message: &ChatMessage) -> Value {
    let has_image = message
        .content
        .iter()
        .any(|p| matches!(p, ContentPart::ImageUrl { .. }));
    if !has_image {
        return Value::String(message.text_content());
    }
    Value::Array(
        message
            .content
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                ContentPart::ImageUrl { url } => {
                    json!({ "type": "image_url", "image_url": { "url": url } })
                }
            })
            .collect(),
    )
}

fn wire_messages(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| match m.role {
            ChatRole::Tool => json!({
                "role": "tool",
                "tool_call_id": m.tool_call_id.clone().unwrap_or_default(),
                "content": m.text_content(),
            }),
            ChatRole::Assistant if !m.tool_calls.is_empty() => {
                let tool_calls: Vec<Value> = m
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": tc.arguments.to_string(),
                            },
                        })
                    })
                    .collect();
                json!({
                    "role": "assistant",
                    "content": m.text_content(),
                    "tool_calls": tool_calls,
                })
            }
            role => json!({
                "role": match role {
                    ChatRole::System => "system",
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                    ChatRole::Tool => unreachable!("handled above"),
                },
                "content": wire_content(m),
            }),
        })
        .collect()
}

#[async_trait]
impl ProviderTransport for OpenAiTransport {
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
        let mut body = json!({
            "model": model,
            "messages": wire_messages(messages),
        });
        if !tools.is_empty() {
            let wire_tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        },
                    })
                })
                .collect();
            body["tools"] = Value::Array(wire_tools);
        }

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(key)
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
        let message = &parsed["choices"][0]["message"];
        if message.is_null() {
            return Err(LlmError::InvalidResponse {
                provider: PROVIDER,
                message: "no choices in response".into(),
            });
        }

        let tool_calls = message["tool_calls"]
            .as_array()
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|tc| {
                        let arguments = tc["function"]["arguments"]
                            .as_str()
                            .and_then(|raw| serde_json::from_str(raw).ok())
                            .unwrap_or(Value::Object(Default::default()));
                        Some(ToolCall {
                            id: tc["id"].as_str()?.to_string(),
                            name: tc["function"]["name"].as_str()?.to_string(),
                            arguments,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content: message["content"].as_str().map(str::to_string),
            tool_calls,
            usage: Usage {
                prompt_tokens: parsed["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
                completion_tokens: parsed["usage"]["completion_tokens"].as_u64().unwrap_or(0),
                total_tokens: parsed["usage"]["total_tokens"].as_u64().unwrap_or(0),
            },
            provider: PROVIDER,
            model: model.to_string(),
            // The reasoning field some gateways attach; opaque either way.
            reasoning_blob: message["reasoning_content"].as_str().map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_messages_carry_call_id() {
        let wire = wire_messages(&[ChatMessage::tool_result("call_1", "get_quote", "{}")]);
        assert_eq!(wire[0]["role"], "tool");
        assert_eq!(wire[0]["tool_call_id"], "call_1");
    }

    #[test]
    fn assistant_tool_calls_stringify_arguments() {
        let mut msg = ChatMessage::assistant("");
        msg.tool_calls.push(ToolCall {
            id: "call_1".into(),
            name: "get_quote".into(),
            arguments: json!({ "ticker": "AAPL" }),
        });
        let wire = wire_messages(&[msg]);
        let args = wire[0]["tool_calls"][0]["function"]["arguments"].as_str().unwrap();
        assert!(args.contains("AAPL"));
    }

    #[test]
    fn image_parts_switch_to_array_content() {
        let msg = ChatMessage {
            role: ChatRole::User,
            content: vec![
                ContentPart::Text { text: "what ticker is this".into() },
                ContentPart::ImageUrl { url: "data:image/png;base64,AA==".into() },
            ],
            tool_calls: vec![],
            tool_call_id: None,
            tool_name: None,
            reasoning_blob: None,
        };
        let wire = wire_messages(&[msg]);
        assert!(wire[0]["content"].is_array());
        assert_eq!(wire[0]["content"][1]["type"], "image_url");
    }
}

use std::sync::Arc;

use llm_router::{ChatMessage, LlmRouter, ToolCall, ToolSchema};
use serde_json::json;
use tokio::sync::mpsc;

use crate::registry::ToolRegistry;
use crate::strategy::{compose_instructions, select, StrategyFile};

const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are an equity analysis agent with live data tools.

Work in phases, waiting for each phase's tool results before the next:
1. Quote and candles: get_realtime_quote, get_daily_history.
2. Technicals: analyze_trend.
3. Intelligence: search_stock_news for announcements, holder sales, earnings warnings and regulatory risk.
4. Final report.

Rules:
- Every number must come from a tool result. Never invent data.
- Do not merge tools from different phases into one call round.
- A failed tool is noted and worked around, never retried in a loop.
- Risk findings take precedence over bullish signals.

The final answer must be one JSON object:
{
  "stock_name": "",
  "sentiment_score": 0,
  "trend_prediction": "",
  "operation_advice": "",
  "analysis_summary": "",
  "risk_warning": "",
  "strategy": { "ideal_buy": 0, "secondary_buy": 0, "stop_loss": 0, "take_profit": 0 }
}
"#;

const CHAT_SYSTEM_PROMPT: &str = r#"You are an equity analysis agent with live data tools, answering free-form questions.

When asked about a specific stock, gather real data first (quote, candles, technicals, news) before giving a view. Every number must come from a tool result. Risk findings take precedence. Answer in plain prose, no JSON required.
"#;

/// Progress event for the SSE stream.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Thinking { step: usize, message: String },
    ToolStart { step: usize, tool: String },
    ToolDone { step: usize, tool: String, success: bool },
    Generating { step: usize },
}

/// What an agent run returns.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub content: String,
    pub steps: usize,
    pub tool_calls: Vec<(String, bool)>,
    /// (message json, reasoning blob) trace for persistence.
    pub transcript: Vec<ChatMessage>,
}

/// ReAct loop over a tool registry, bounded by `max_steps`.
pub struct AgentExecutor {
    router: Arc<LlmRouter>,
    registry: Arc<ToolRegistry>,
    strategies: Vec<StrategyFile>,
    max_steps: usize,
}

impl AgentExecutor {
    pub fn new(
        router: Arc<LlmRouter>,
        registry: Arc<ToolRegistry>,
        strategies: Vec<StrategyFile>,
        max_steps: usize,
    ) -> Self {
        AgentExecutor { router, registry, strategies, max_steps: max_steps.max(1) }
    }

    pub fn strategies(&self) -> &[StrategyFile] {
        &self.strategies
    }

    fn system_prompt(&self, base: &str, skills: &[String]) -> String {
        let picked = select(&self.strategies, skills);
        if picked.is_empty() {
            return base.to_string();
        }
        format!("{base}\n## Active strategies\n\n{}", compose_instructions(&picked))
    }

    /// Run a stock-analysis task to a final JSON answer.
    pub async fn run_analysis(
        &self,
        ticker: &str,
        skills: &[String],
        context_note: Option<&str>,
        progress: Option<mpsc::Sender<AgentEvent>>,
    ) -> Result<AgentOutcome, String> {
        let mut task = format!(
            "Analyze stock {ticker}. Use the tools to gather any missing data, then output the final JSON report."
        );
        if let Some(note) = context_note {
            task.push_str("\n\nAlready-gathered context:\n");
            task.push_str(note);
        }
        let messages = vec![
            ChatMessage::system(self.system_prompt(ANALYSIS_SYSTEM_PROMPT, skills)),
            ChatMessage::user(task),
        ];
        self.run_loop(messages, progress).await
    }

    /// Run one chat turn over prior history.
    pub async fn run_chat(
        &self,
        history: Vec<ChatMessage>,
        user_message: &str,
        skills: &[String],
        progress: Option<mpsc::Sender<AgentEvent>>,
    ) -> Result<AgentOutcome, String> {
        let mut messages =
            vec![ChatMessage::system(self.system_prompt(CHAT_SYSTEM_PROMPT, skills))];
        messages.extend(history);
        messages.push(ChatMessage::user(user_message));
        self.run_loop(messages, progress).await
    }

    async fn run_loop(
        &self,
        mut messages: Vec<ChatMessage>,
        progress: Option<mpsc::Sender<AgentEvent>>,
    ) -> Result<AgentOutcome, String> {
        let schemas: Vec<ToolSchema> = self.registry.schemas();
        let mut tool_log: Vec<(String, bool)> = Vec::new();

        for step in 1..=self.max_steps {
            if let Some(tx) = &progress {
                let message = match tool_log.last() {
                    None => "planning the analysis".to_string(),
                    Some((tool, _)) => format!("{tool} finished, continuing"),
                };
                let _ = tx.send(AgentEvent::Thinking { step, message }).await;
            }

            let response = self
                .router
                .chat(&messages, &schemas)
                .await
                .map_err(|e| e.to_string())?;

            if response.is_final() {
                if let Some(tx) = &progress {
                    let _ = tx.send(AgentEvent::Generating { step }).await;
                }
                let content = response.content.unwrap_or_default();
                if content.is_empty() {
                    return Err("model returned an empty final message".into());
                }
                let mut final_msg = ChatMessage::assistant(content.clone());
                final_msg.reasoning_blob = response.reasoning_blob;
                messages.push(final_msg);
                return Ok(AgentOutcome {
                    content,
                    steps: step,
                    tool_calls: tool_log,
                    transcript: messages,
                });
            }

            // Record the assistant turn with its calls and any reasoning
            // payload so the next request can replay both.
            let mut assistant = ChatMessage::assistant(response.content.clone().unwrap_or_default());
            assistant.tool_calls = response.tool_calls.clone();
            assistant.reasoning_blob = response.reasoning_blob.clone();
            messages.push(assistant);

            let results = self.execute_calls(&response.tool_calls, step, &progress).await;
            for (call, result) in response.tool_calls.iter().zip(results) {
                let (payload, ok) = match result {
                    Ok(value) => (value.to_string(), true),
                    Err(error) => (json!({ "error": error }).to_string(), false),
                };
                tool_log.push((call.name.clone(), ok));
                messages.push(ChatMessage::tool_result(&call.id, &call.name, payload));
            }
        }

        // Step limit hit while the model still wants tools: force a final
        // text answer from whatever was gathered, with tools withheld.
        messages.push(ChatMessage::user(
            "Step limit reached. Produce your final answer now from the data already gathered.",
        ));
        let response = self
            .router
            .chat(&messages, &[])
            .await
            .map_err(|e| e.to_string())?;
        let content = response
            .content
            .filter(|c| !c.is_empty())
            .ok_or_else(|| format!("agent exceeded max steps ({})", self.max_steps))?;
        messages.push(ChatMessage::assistant(content.clone()));
        Ok(AgentOutcome {
            content,
            steps: self.max_steps,
            tool_calls: tool_log,
            transcript: messages,
        })
    }

    /// Execute one round of tool calls concurrently, preserving the
    /// model's call order in the returned results.
    async fn execute_calls(
        &self,
        calls: &[ToolCall],
        step: usize,
        progress: &Option<mpsc::Sender<AgentEvent>>,
    ) -> Vec<Result<serde_json::Value, String>> {
        if let Some(tx) = progress {
            for call in calls {
                let _ = tx
                    .send(AgentEvent::ToolStart { step, tool: call.name.clone() })
                    .await;
            }
        }

        let futures = calls.iter().map(|call| {
            let registry = Arc::clone(&self.registry);
            let name = call.name.clone();
            let args = call.arguments.clone();
            async move { registry.execute(&name, args).await }
        });
        let results = futures_util::future::join_all(futures).await;

        if let Some(tx) = progress {
            for (call, result) in calls.iter().zip(results.iter()) {
                let _ = tx
                    .send(AgentEvent::ToolDone {
                        step,
                        tool: call.name.clone(),
                        success: result.is_ok(),
                    })
                    .await;
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use llm_router::providers::ProviderTransport;
    use llm_router::{LlmError, LlmResponse, RouterConfig};
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::registry::Tool;

    struct CountingTool {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &'static str {
            "get_realtime_quote"
        }
        fn description(&self) -> &'static str {
            "stub quote"
        }
        fn parameters(&self) -> serde_json::Value {
            json!({ "type": "object", "properties": {} })
        }
        async fn execute(&self, _args: serde_json::Value) -> Result<serde_json::Value, String> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(json!({ "price": 1650.0 }))
        }
    }

    /// Pops scripted responses from the back.
    struct ScriptedLlm {
        script: Mutex<Vec<LlmResponse>>,
    }

    #[async_trait]
    impl ProviderTransport for ScriptedLlm {
        fn id(&self) -> &'static str {
            "openai"
        }
        async fn chat(
            &self,
            model: &str,
            _key: &str,
            _key_index: usize,
            _messages: &[ChatMessage],
            _tools: &[ToolSchema],
        ) -> Result<LlmResponse, LlmError> {
            let mut response = self
                .script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| LlmResponse {
                    content: Some("fallback final".into()),
                    ..Default::default()
                });
            response.model = model.to_string();
            Ok(response)
        }
    }

    fn router_with_script(script: Vec<LlmResponse>) -> Arc<LlmRouter> {
        let mut transports: HashMap<&'static str, Arc<dyn ProviderTransport>> = HashMap::new();
        transports.insert("openai", Arc::new(ScriptedLlm { script: Mutex::new(script) }));
        Arc::new(LlmRouter::with_transports(
            RouterConfig {
                model: "gpt-4o-mini".into(),
                openai_keys: vec!["k".into()],
                ..Default::default()
            },
            transports,
        ))
    }

    fn tool_call_response(name: &str) -> LlmResponse {
        LlmResponse {
            content: None,
            tool_calls: vec![ToolCall {
                id: "call_1".into(),
                name: name.into(),
                arguments: json!({ "ticker": "600519" }),
            }],
            ..Default::default()
        }
    }

    fn final_response(text: &str) -> LlmResponse {
        LlmResponse { content: Some(text.into()), ..Default::default() }
    }

    fn executor_with(script: Vec<LlmResponse>, max_steps: usize) -> (AgentExecutor, Arc<CountingTool>) {
        let tool = Arc::new(CountingTool { calls: Default::default() });
        let mut registry = ToolRegistry::new();
        registry.register(tool.clone());
        let executor = AgentExecutor::new(
            router_with_script(script),
            Arc::new(registry),
            crate::strategy::load_strategies(None),
            max_steps,
        );
        (executor, tool)
    }

    #[tokio::test]
    async fn tool_round_then_final_answer() {
        // Popped from the back: tool call first, then the final message.
        let (executor, tool) = executor_with(
            vec![final_response("{\"sentiment_score\": 70}"), tool_call_response("get_realtime_quote")],
            5,
        );
        let (tx, mut rx) = mpsc::channel(64);
        let outcome = executor
            .run_analysis("600519", &[], None, Some(tx))
            .await
            .unwrap();

        assert_eq!(outcome.steps, 2);
        assert_eq!(tool.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(outcome.tool_calls, vec![("get_realtime_quote".to_string(), true)]);
        assert!(outcome.content.contains("sentiment_score"));

        let mut saw_tool_start = false;
        let mut saw_tool_done = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                AgentEvent::ToolStart { tool, .. } => {
                    assert_eq!(tool, "get_realtime_quote");
                    saw_tool_start = true;
                }
                AgentEvent::ToolDone { success, .. } => {
                    assert!(success);
                    saw_tool_done = true;
                }
                _ => {}
            }
        }
        assert!(saw_tool_start && saw_tool_done);
    }

    #[tokio::test]
    async fn namespaced_tool_call_still_dispatches() {
        let (executor, tool) = executor_with(
            vec![final_response("done"), tool_call_response("default_api:get_realtime_quote")],
            5,
        );
        let outcome = executor.run_analysis("600519", &[], None, None).await.unwrap();
        assert_eq!(tool.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(outcome.tool_calls[0].1);
    }

    #[tokio::test]
    async fn max_steps_one_still_yields_final_message() {
        // The model wants a tool at step 1; the step-limit epilogue must
        // still coerce a final text answer.
        let (executor, _tool) = executor_with(
            vec![final_response("forced wrap-up"), tool_call_response("get_realtime_quote")],
            1,
        );
        let outcome = executor.run_analysis("600519", &[], None, None).await.unwrap();
        assert_eq!(outcome.content, "forced wrap-up");
        assert_eq!(outcome.steps, 1);
    }

    #[tokio::test]
    async fn chat_mode_keeps_history_order() {
        let (executor, _) = executor_with(vec![final_response("answer")], 3);
        let history = vec![
            ChatMessage::user("earlier question"),
            ChatMessage::assistant("earlier answer"),
        ];
        let outcome = executor
            .run_chat(history, "and now?", &["trend_following".into()], None)
            .await
            .unwrap();
        // system + 2 history + user + assistant final
        assert_eq!(outcome.transcript.len(), 5);
        assert!(matches!(outcome.transcript[0].role, llm_router::ChatRole::System));
        assert_eq!(outcome.transcript[3].text_content(), "and now?");
    }
}

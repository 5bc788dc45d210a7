use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::keypool::ShuffledKeyPool;
use crate::providers::{AnthropicTransport, GeminiTransport, OpenAiTransport, ProviderTransport};
use crate::{ChatMessage, LlmError, LlmResponse, ToolSchema};

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub model: String,
    pub fallback_models: Vec<String>,
    pub gemini_keys: Vec<String>,
    pub anthropic_keys: Vec<String>,
    pub openai_keys: Vec<String>,
    pub openai_base_url: Option<String>,
    pub key_cooldown: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            model: "gemini-2.5-flash".into(),
            fallback_models: Vec::new(),
            gemini_keys: Vec::new(),
            anthropic_keys: Vec::new(),
            openai_keys: Vec::new(),
            openai_base_url: None,
            key_cooldown: Duration::from_secs(60),
        }
    }
}

/// Counters the operator (and the tests) can watch.
#[derive(Default)]
pub struct RouterMetrics {
    pub keys_used: AtomicU64,
    pub rate_limited_keys: AtomicU64,
    pub model_fallbacks: AtomicU64,
}

/// Which transport a model string resolves to.
fn provider_for(model: &str) -> &'static str {
    if model.starts_with("gemini") {
        "gemini"
    } else if model.starts_with("claude") {
        "anthropic"
    } else {
        "openai"
    }
}

/// Multiplexes chat calls across providers, keys and models.
///
/// Order of escalation for one logical call: same-key transient retries
/// with backoff, then key rotation within the model's provider, then the
/// cross-model fallback chain.
pub struct LlmRouter {
    config: RouterConfig,
    transports: HashMap<&'static str, Arc<dyn ProviderTransport>>,
    pools: HashMap<&'static str, ShuffledKeyPool>,
    metrics: RouterMetrics,
    max_transient_retries: u32,
}

impl LlmRouter {
    pub fn new(config: RouterConfig) -> Self {
        let mut transports: HashMap<&'static str, Arc<dyn ProviderTransport>> = HashMap::new();
        transports.insert("gemini", Arc::new(GeminiTransport::new()));
        transports.insert("anthropic", Arc::new(AnthropicTransport::new()));
        transports
            .insert("openai", Arc::new(OpenAiTransport::new(config.openai_base_url.clone())));
        Self::with_transports(config, transports)
    }

    /// Test seam: inject stub transports.
    pub fn with_transports(
        config: RouterConfig,
        transports: HashMap<&'static str, Arc<dyn ProviderTransport>>,
    ) -> Self {
        let mut pools = HashMap::new();
        pools.insert("gemini", ShuffledKeyPool::new(config.gemini_keys.clone(), config.key_cooldown));
        pools.insert(
            "anthropic",
            ShuffledKeyPool::new(config.anthropic_keys.clone(), config.key_cooldown),
        );
        pools.insert("openai", ShuffledKeyPool::new(config.openai_keys.clone(), config.key_cooldown));
        LlmRouter {
            config,
            transports,
            pools,
            metrics: RouterMetrics::default(),
            max_transient_retries: 3,
        }
    }

    pub fn metrics(&self) -> &RouterMetrics {
        &self.metrics
    }

    /// True when at least one provider in the configured chain has keys.
    pub fn is_available(&self) -> bool {
        self.model_chain().iter().any(|m| {
            self.pools
                .get(provider_for(m))
                .is_some_and(|p| !p.is_empty())
        })
    }

    fn model_chain(&self) -> Vec<String> {
        let mut chain = vec![self.config.model.clone()];
        chain.extend(self.config.fallback_models.iter().cloned());
        chain
    }

    /// One chat round trip with tool support.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<LlmResponse, LlmError> {
        let chain = self.model_chain();
        let mut last_err = LlmError::NoKeys("none");
        for (i, model) in chain.iter().enumerate() {
            if i > 0 {
                self.metrics.model_fallbacks.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("falling back to model {model}: {last_err}");
            }
            match self.call_model(model, messages, tools).await {
                Ok(response) => return Ok(response),
                Err(e) => last_err = e,
            }
        }
        Err(LlmError::AllModelsFailed(Box::new(last_err)))
    }

    async fn call_model(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<LlmResponse, LlmError> {
        let provider = provider_for(model);
        let transport = self
            .transports
            .get(provider)
            .ok_or(LlmError::NoKeys(provider))?;
        let pool = self.pools.get(provider).ok_or(LlmError::NoKeys(provider))?;
        if pool.is_empty() {
            return Err(LlmError::NoKeys(provider));
        }

        // Key rotation first, model fallback second: try each usable key
        // at most once per logical call.
        let budget = pool.available().max(1);
        let mut last_err = LlmError::AllKeysCooling(provider);
        for _ in 0..budget {
            let Some((key_index, key)) = pool.acquire() else {
                return Err(LlmError::AllKeysCooling(provider));
            };
            self.metrics.keys_used.fetch_add(1, Ordering::Relaxed);

            match self
                .attempt_with_backoff(transport.as_ref(), model, &key, key_index, messages, tools)
                .await
            {
                Ok(response) => return Ok(response),
                Err(LlmError::RateLimited { provider, key_index }) => {
                    pool.cool_down(key_index);
                    self.metrics.rate_limited_keys.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("{provider} key #{key_index} cooling for {:?}", self.config.key_cooldown);
                    last_err = LlmError::RateLimited { provider, key_index };
                }
                Err(e @ (LlmError::InvalidRequest { .. } | LlmError::InvalidResponse { .. })) => {
                    // Another key won't fix a bad request; escalate to the
                    // next model.
                    return Err(e);
                }
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    async fn attempt_with_backoff(
        &self,
        transport: &dyn ProviderTransport,
        model: &str,
        key: &str,
        key_index: usize,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<LlmResponse, LlmError> {
        let mut delay = Duration::from_secs(1);
        let mut last_err = None;
        for attempt in 0..=self.max_transient_retries {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(10));
            }
            match transport.chat(model, key, key_index, messages, tools).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.max_transient_retries => {
                    tracing::debug!("transient LLM failure (attempt {}): {e}", attempt + 1);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.expect("loop exits early unless a transient error was stored"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Scripted transport: pops one outcome per call.
    struct ScriptedTransport {
        id: &'static str,
        script: Mutex<Vec<Result<LlmResponse, ScriptedError>>>,
        calls: AtomicUsize,
        keys_seen: Mutex<Vec<String>>,
    }

    enum ScriptedError {
        RateLimited,
        Transport,
        InvalidRequest,
    }

    impl ScriptedTransport {
        fn new(id: &'static str, script: Vec<Result<LlmResponse, ScriptedError>>) -> Arc<Self> {
            Arc::new(ScriptedTransport {
                id,
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
                keys_seen: Mutex::new(Vec::new()),
            })
        }

        fn ok(model: &str) -> Result<LlmResponse, ScriptedError> {
            Ok(LlmResponse {
                content: Some("report".into()),
                model: model.into(),
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl ProviderTransport for ScriptedTransport {
        fn id(&self) -> &'static str {
            self.id
        }

        async fn chat(
            &self,
            model: &str,
            key: &str,
            key_index: usize,
            _messages: &[ChatMessage],
            _tools: &[ToolSchema],
        ) -> Result<LlmResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.keys_seen.lock().unwrap().push(key.to_string());
            let outcome = self.script.lock().unwrap().pop();
            match outcome {
                Some(Ok(mut r)) => {
                    r.model = model.to_string();
                    Ok(r)
                }
                Some(Err(ScriptedError::RateLimited)) => {
                    Err(LlmError::RateLimited { provider: self.id, key_index })
                }
                Some(Err(ScriptedError::Transport)) => {
                    Err(LlmError::Transport { provider: self.id, message: "io".into() })
                }
                Some(Err(ScriptedError::InvalidRequest)) => Err(LlmError::InvalidRequest {
                    provider: self.id,
                    message: "bad schema".into(),
                }),
                None => Err(LlmError::Transport { provider: self.id, message: "script empty".into() }),
            }
        }
    }

    fn router_with(
        config: RouterConfig,
        gemini: Arc<ScriptedTransport>,
        openai: Option<Arc<ScriptedTransport>>,
    ) -> LlmRouter {
        let mut transports: HashMap<&'static str, Arc<dyn ProviderTransport>> = HashMap::new();
        transports.insert("gemini", gemini);
        if let Some(o) = openai {
            transports.insert("openai", o);
        }
        LlmRouter::with_transports(config, transports)
    }

    #[tokio::test]
    async fn rate_limited_key_rotates_to_next() {
        // Script is popped from the back: first call 429, second ok.
        let gemini = ScriptedTransport::new(
            "gemini",
            vec![ScriptedTransport::ok("m"), Err(ScriptedError::RateLimited)],
        );
        let router = router_with(
            RouterConfig {
                model: "gemini-2.5-flash".into(),
                gemini_keys: vec!["k1".into(), "k2".into(), "k3".into()],
                ..Default::default()
            },
            gemini.clone(),
            None,
        );

        let response = router.chat(&[ChatMessage::user("hi")], &[]).await.unwrap();
        assert_eq!(response.content.as_deref(), Some("report"));
        assert_eq!(router.metrics().keys_used.load(Ordering::Relaxed), 2);
        assert_eq!(router.metrics().rate_limited_keys.load(Ordering::Relaxed), 1);
        // The cooled key is excluded from the pool now.
        let keys = gemini.keys_seen.lock().unwrap();
        assert_ne!(keys[0], keys[1]);
    }

    #[tokio::test]
    async fn invalid_request_falls_through_to_next_model() {
        let gemini =
            ScriptedTransport::new("gemini", vec![Err(ScriptedError::InvalidRequest)]);
        let openai = ScriptedTransport::new("openai", vec![ScriptedTransport::ok("gpt")]);
        let router = router_with(
            RouterConfig {
                model: "gemini-2.5-flash".into(),
                fallback_models: vec!["gpt-4o-mini".into()],
                gemini_keys: vec!["g1".into()],
                openai_keys: vec!["o1".into()],
                ..Default::default()
            },
            gemini.clone(),
            Some(openai.clone()),
        );

        let response = router.chat(&[ChatMessage::user("hi")], &[]).await.unwrap();
        assert_eq!(response.model, "gpt-4o-mini");
        // Only one gemini key burned before escalating.
        assert_eq!(gemini.calls.load(Ordering::SeqCst), 1);
        assert_eq!(router.metrics().model_fallbacks.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_retry_with_backoff_then_succeed() {
        let gemini = ScriptedTransport::new(
            "gemini",
            vec![
                ScriptedTransport::ok("m"),
                Err(ScriptedError::Transport),
                Err(ScriptedError::Transport),
            ],
        );
        let router = router_with(
            RouterConfig {
                model: "gemini-2.5-flash".into(),
                gemini_keys: vec!["k1".into()],
                ..Default::default()
            },
            gemini.clone(),
            None,
        );

        let response = router.chat(&[ChatMessage::user("hi")], &[]).await.unwrap();
        assert!(response.content.is_some());
        assert_eq!(gemini.calls.load(Ordering::SeqCst), 3);
        // Three calls, one logical key use.
        assert_eq!(router.metrics().keys_used.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn whole_chain_failure_surfaces_terminal_error() {
        let gemini = ScriptedTransport::new(
            "gemini",
            vec![Err(ScriptedError::RateLimited), Err(ScriptedError::RateLimited)],
        );
        let router = router_with(
            RouterConfig {
                model: "gemini-2.5-flash".into(),
                gemini_keys: vec!["k1".into(), "k2".into()],
                ..Default::default()
            },
            gemini,
            None,
        );

        let err = router.chat(&[ChatMessage::user("hi")], &[]).await.unwrap_err();
        assert!(matches!(err, LlmError::AllModelsFailed(_)));
    }

    #[tokio::test]
    async fn no_keys_is_unavailable() {
        let gemini = ScriptedTransport::new("gemini", vec![]);
        let router = router_with(
            RouterConfig { model: "gemini-2.5-flash".into(), ..Default::default() },
            gemini,
            None,
        );
        assert!(!router.is_available());
        let err = router.chat(&[ChatMessage::user("hi")], &[]).await.unwrap_err();
        assert!(matches!(err, LlmError::AllModelsFailed(_)));
    }
}

//! End-to-end pipeline flow against stubbed sources, search and model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use analysis_core::{Candle, CoreError, Market, Quote, ReportType};
use analysis_pipeline::{Pipeline, PipelineOutcome};
use app_config::Config;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use data_fetcher::{DataFetcher, FetchError, FetcherPool, PoolConfig, SourceDescriptor};
use llm_router::providers::ProviderTransport;
use llm_router::{ChatMessage, LlmError, LlmResponse, LlmRouter, RouterConfig, ToolSchema};
use news_service::{NewsService, NewsServiceConfig, RawHit, SearchError, SearchProvider};
use notification::{DispatchPolicy, Dispatcher, Notifier, RecordingChannel};
use storage::Store;
use tokio_util::sync::CancellationToken;

const CN: &[Market] = &[Market::AShare, Market::HongKong];
const US: &[Market] = &[Market::Us];

struct StubFetcher {
    id: &'static str,
    markets: &'static [Market],
    history_fails: bool,
    quote_fails: bool,
    history_calls: Arc<AtomicUsize>,
}

impl StubFetcher {
    fn new(id: &'static str, markets: &'static [Market]) -> Arc<Self> {
        Arc::new(StubFetcher {
            id,
            markets,
            history_fails: false,
            quote_fails: false,
            history_calls: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl DataFetcher for StubFetcher {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor { id: self.id, priority: 10, markets: self.markets }
    }

    async fn history(&self, _ticker: &str, days: u32) -> Result<Vec<Candle>, FetchError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        if self.history_fails {
            return Err(FetchError::Transport { source_name: self.id, message: "down".into() });
        }
        let base = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        Ok((0..days.min(90) as i64)
            .map(|i| Candle {
                date: base + chrono::Duration::days(i),
                open: 100.0 + i as f64,
                high: 102.0 + i as f64,
                low: 99.0 + i as f64,
                close: 101.0 + i as f64,
                volume: 1e6,
                amount: None,
            })
            .collect())
    }

    async fn realtime(&self, ticker: &str) -> Result<Quote, FetchError> {
        if self.quote_fails {
            return Err(FetchError::Transport { source_name: self.id, message: "down".into() });
        }
        Ok(Quote {
            ticker: ticker.to_string(),
            name: Some("贵州茅台".into()),
            price: 1650.0,
            change_pct: 1.2,
            volume_ratio: Some(1.1),
            turnover_rate: Some(0.8),
            timestamp: Utc::now(),
            source: self.id.to_string(),
        })
    }
}

struct StubSearch;

#[async_trait]
impl SearchProvider for StubSearch {
    fn id(&self) -> &'static str {
        "stub-search"
    }
    fn is_configured(&self) -> bool {
        true
    }
    async fn search(&self, query: &str, _n: usize) -> Result<Vec<RawHit>, SearchError> {
        Ok(vec![RawHit {
            title: format!("hit for {query}"),
            snippet: "body".into(),
            url: format!("https://news.example/{}", query.len()),
            published_at: Some(Utc::now() - chrono::Duration::days(1)),
            score: 0.7,
        }])
    }
}

struct FixedModel {
    body: String,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

#[async_trait]
impl ProviderTransport for FixedModel {
    fn id(&self) -> &'static str {
        "openai"
    }
    async fn chat(
        &self,
        model: &str,
        _key: &str,
        _key_index: usize,
        messages: &[ChatMessage],
        _tools: &[ToolSchema],
    ) -> Result<LlmResponse, LlmError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        Ok(LlmResponse {
            content: Some(self.body.clone()),
            model: model.to_string(),
            ..Default::default()
        })
    }
}

const MODEL_REPORT: &str = r#"```json
{
  "stock_name": "贵州茅台",
  "sentiment_score": 76,
  "trend_prediction": "看多",
  "operation_advice": "持有",
  "analysis_summary": "趋势完好，回踩均线企稳。",
  "risk_warning": "白酒板块估值偏高",
  "strategy": { "ideal_buy": 1600.0, "stop_loss": 1550.0, "take_profit": 1800.0 }
}
```"#;

struct Fixture {
    pipeline: Pipeline,
    channel: Arc<RecordingChannel>,
    store: Store,
    model_calls: Arc<FixedModel>,
}

async fn fixture(fetcher: Arc<StubFetcher>, single_notify: bool) -> Fixture {
    let mut config = base_config();
    config.single_stock_notify = single_notify;
    let config = Arc::new(config);

    let pool = Arc::new(FetcherPool::new(
        vec![fetcher as Arc<dyn DataFetcher>],
        PoolConfig::default(),
    ));
    let news = Arc::new(NewsService::new(
        vec![Arc::new(StubSearch) as Arc<dyn SearchProvider>],
        NewsServiceConfig::default(),
    ));

    let model = Arc::new(FixedModel { body: MODEL_REPORT.into(), calls: Mutex::new(Vec::new()) });
    let mut transports: HashMap<&'static str, Arc<dyn ProviderTransport>> = HashMap::new();
    transports.insert("openai", model.clone());
    let router = Arc::new(LlmRouter::with_transports(
        RouterConfig {
            model: "gpt-4o-mini".into(),
            openai_keys: vec!["k".into()],
            ..Default::default()
        },
        transports,
    ));

    let store = Store::connect("sqlite::memory:").await.unwrap();
    let channel = Arc::new(RecordingChannel::new("rec", vec![], None));
    let dispatcher = Arc::new(Dispatcher::new(
        vec![channel.clone() as Arc<dyn Notifier>],
        DispatchPolicy {
            inter_chunk_delay: std::time::Duration::from_millis(0),
            ..Default::default()
        },
    ));

    let pipeline = Pipeline::new(
        config,
        pool,
        news,
        router,
        store.clone(),
        dispatcher,
        None,
    );
    Fixture { pipeline, channel, store, model_calls: model }
}

fn base_config() -> Config {
    // A bare environment boots with defaults; the gate is bypassed via
    // force_run in these tests so calendar state never matters.
    Config::from_env().expect("default config")
}

#[tokio::test]
async fn happy_path_produces_persisted_report() {
    let f = fixture(StubFetcher::new("primary", CN), false).await;
    let outcome = f
        .pipeline
        .analyze("600519", ReportType::Detailed, "q-1", false, true, CancellationToken::new())
        .await
        .unwrap();

    let report = match outcome {
        PipelineOutcome::Completed(r) => r,
        other => panic!("expected completion, got {other:?}"),
    };
    assert_eq!(report.meta.ticker, "600519");
    assert_eq!(report.meta.name, "贵州茅台");
    assert!(report.summary.sentiment_score <= 100);
    assert_eq!(report.meta.current_price, Some(1650.0));
    assert!(report.strategy.stop_loss.unwrap() < report.strategy.take_profit.unwrap());
    assert!(report.meta.id > 0);

    // Persisted and reloadable by primary key.
    let reloaded = f.store.get_report(report.meta.id).await.unwrap();
    assert_eq!(reloaded.summary, report.summary);

    // News rows reference the report id.
    let news = f.store.news_for_record(report.meta.id).await.unwrap();
    assert!(!news.is_empty());
}

#[tokio::test]
async fn history_failure_is_fatal_for_item() {
    let mut fetcher = StubFetcher::new("primary", CN);
    Arc::get_mut(&mut fetcher).unwrap().history_fails = true;
    let f = fixture(fetcher, false).await;

    let err = f
        .pipeline
        .analyze("600519", ReportType::Detailed, "q-1", false, true, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::SourceExhausted { .. }));
}

#[tokio::test]
async fn quote_failure_falls_back_to_last_close() {
    let mut fetcher = StubFetcher::new("primary", CN);
    Arc::get_mut(&mut fetcher).unwrap().quote_fails = true;
    let f = fixture(fetcher, false).await;

    let outcome = f
        .pipeline
        .analyze("600519", ReportType::Detailed, "q-1", false, true, CancellationToken::new())
        .await
        .unwrap();
    let report = match outcome {
        PipelineOutcome::Completed(r) => r,
        other => panic!("expected completion, got {other:?}"),
    };
    // Last stub close, not the live quote.
    assert_eq!(report.meta.current_price, Some(101.0 + 89.0));
}

#[tokio::test]
async fn single_notify_dispatches_once() {
    let f = fixture(StubFetcher::new("primary", CN), true).await;
    f.pipeline
        .analyze("600519", ReportType::Detailed, "q-1", false, true, CancellationToken::new())
        .await
        .unwrap();
    let messages = f.channel.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].0.contains("600519"));
}

#[tokio::test]
async fn model_sees_rendered_evidence() {
    let f = fixture(StubFetcher::new("primary", CN), false).await;
    f.pipeline
        .analyze("600519", ReportType::Detailed, "q-1", false, true, CancellationToken::new())
        .await
        .unwrap();
    let calls = f.model_calls.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let user_text = calls[0]
        .iter()
        .map(|m| m.text_content())
        .collect::<Vec<_>>()
        .join("\n");
    assert!(user_text.contains("Technicals:"));
    assert!(user_text.contains("Daily candles"));
    assert!(user_text.contains("News intelligence"));
}

#[tokio::test]
async fn cancelled_token_aborts_run() {
    let f = fixture(StubFetcher::new("primary", CN), false).await;
    let token = CancellationToken::new();
    token.cancel();
    let err = f
        .pipeline
        .analyze("600519", ReportType::Detailed, "q-1", false, true, token)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Cancelled(_)));
}

#[tokio::test]
async fn us_ticker_uses_us_source_only() {
    // Pool config pins US traffic to the source named "yahoo".
    let us_fetcher = StubFetcher::new("yahoo", US);
    let f = fixture(us_fetcher.clone(), false).await;
    f.pipeline
        .analyze("AAPL", ReportType::Detailed, "q-1", false, true, CancellationToken::new())
        .await
        .unwrap();
    assert!(us_fetcher.history_calls.load(Ordering::SeqCst) >= 1);
}

use std::sync::Arc;
use std::time::Duration;

use agent_executor::AgentExecutor;
use analysis_core::{
    canonicalize, AnalysisReport, CoreError, Market, NewsIntel, ReportType, Task,
};
use app_config::Config;
use async_trait::async_trait;
use data_fetcher::FetcherPool;
use indicator_engine::{compute_snapshot, SnapshotOptions};
use llm_router::{ChatMessage, LlmRouter};
use market_calendar::{is_trading_day, market_today};
use news_service::NewsService;
use notification::Dispatcher;
use storage::Store;
use task_queue::{TaskOutcome, TaskRunner};
use tokio_util::sync::CancellationToken;

use crate::assemble::{assemble_bundle, render_bundle, BundleBudget};
use crate::parse::parse_report;

const REPORT_SYSTEM_PROMPT: &str = r#"You are an equity analyst. You are given the full evidence for one ticker: live quote, daily candles, technical indicators, and ranked news. Produce a decision report.

Respond with exactly one JSON object:
{
  "stock_name": "",
  "sentiment_score": 0,
  "trend_prediction": "",
  "operation_advice": "",
  "analysis_summary": "",
  "risk_warning": "",
  "strategy": { "ideal_buy": 0, "secondary_buy": 0, "stop_loss": 0, "take_profit": 0 }
}

sentiment_score is an integer 0-100 (0 = maximally bearish). Price levels are numbers in the ticker's own currency; omit a level rather than invent one. Risk findings from the news take precedence over bullish technicals."#;

/// Result of one pipeline run.
#[derive(Debug)]
pub enum PipelineOutcome {
    Completed(Box<AnalysisReport>),
    Skipped { ticker: String, reason: String },
}

/// Orchestrates one ticker end to end: gate, evidence fan-out,
/// technicals, generation, parse, persist, dispatch.
pub struct Pipeline {
    config: Arc<Config>,
    pool: Arc<FetcherPool>,
    news: Arc<NewsService>,
    router: Arc<LlmRouter>,
    store: Store,
    dispatcher: Arc<Dispatcher>,
    agent: Option<Arc<AgentExecutor>>,
}

impl Pipeline {
    pub fn new(
        config: Arc<Config>,
        pool: Arc<FetcherPool>,
        news: Arc<NewsService>,
        router: Arc<LlmRouter>,
        store: Store,
        dispatcher: Arc<Dispatcher>,
        agent: Option<Arc<AgentExecutor>>,
    ) -> Self {
        Pipeline { config, pool, news, router, store, dispatcher, agent }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Analyze one ticker under the configured deadline. Cancellation
    /// (client disconnect, shutdown) aborts between suspension points.
    pub async fn analyze(
        &self,
        raw_ticker: &str,
        report_type: ReportType,
        query_id: &str,
        force_refresh: bool,
        force_run: bool,
        cancel: CancellationToken,
    ) -> Result<PipelineOutcome, CoreError> {
        let deadline = Duration::from_secs(self.config.pipeline_deadline_secs);
        let ticker = canonicalize(raw_ticker);
        let work = self.analyze_inner(&ticker, report_type, query_id, force_refresh, force_run);
        tokio::select! {
            result = tokio::time::timeout(deadline, work) => {
                result.map_err(|_| CoreError::Cancelled(format!(
                    "pipeline deadline of {}s exceeded for {ticker}",
                    deadline.as_secs()
                )))?
            }
            _ = cancel.cancelled() => {
                Err(CoreError::Cancelled(format!("run for {ticker} cancelled")))
            }
        }
    }

    async fn analyze_inner(
        &self,
        ticker: &str,
        report_type: ReportType,
        query_id: &str,
        force_refresh: bool,
        force_run: bool,
    ) -> Result<PipelineOutcome, CoreError> {
        let market = Market::of(ticker);

        // Step 1: calendar gate.
        if self.config.trading_day_check_enabled && !force_run {
            if let Some(market) = market {
                if !is_trading_day(market, market_today(market)) {
                    tracing::info!("{ticker}: market {} closed today, skipping", market.as_str());
                    return Ok(PipelineOutcome::Skipped {
                        ticker: ticker.to_string(),
                        reason: format!("market {} closed", market.as_str()),
                    });
                }
            }
        }
        let market = market.unwrap_or(Market::AShare);

        if force_refresh {
            self.pool.invalidate(ticker, 90);
        }

        // Step 2: evidence fan-out.
        let (history, quote, name, news) = tokio::join!(
            self.pool.get_history(ticker, 90),
            self.pool.get_realtime(ticker),
            self.pool.get_name(ticker),
            self.news.gather(ticker, ""),
        );

        // History is the backbone of the analysis: without it the run
        // fails for this ticker.
        let candles = history.map_err(|e| {
            tracing::error!("{ticker}: history unavailable: {e}");
            CoreError::SourceExhausted { ticker: ticker.to_string(), attempts: 0 }
        })?;

        // Realtime degrades to the last close.
        let quote = match quote {
            Ok(q) => Some(q),
            Err(e) => {
                tracing::warn!("{ticker}: realtime unavailable, using last close: {e}");
                None
            }
        };

        let placeholder_name = name.unwrap_or_else(|_| ticker.to_string());
        if news.search_fallback {
            tracing::warn!("{ticker}: news search degraded to empty fallback");
        }

        // Step 3: technicals.
        let technicals = compute_snapshot(
            &candles,
            quote.as_ref(),
            SnapshotOptions {
                realtime_indicators: self.config.enable_realtime_indicators,
                bias_threshold: self.config.bias_threshold,
                today: market_today(market),
            },
        );

        // Step 4: assemble.
        let previous = self
            .store
            .latest_report(ticker)
            .await
            .ok()
            .flatten()
            .map(|r| {
                format!(
                    "{} | sentiment {} | advice {} | {}",
                    r.meta.created_at.format("%Y-%m-%d"),
                    r.summary.sentiment_score,
                    r.summary.operation_advice,
                    r.summary.analysis_summary
                )
            });
        let bundle = assemble_bundle(
            ticker,
            &placeholder_name,
            market,
            quote.clone(),
            candles,
            Some(technicals),
            news.clone(),
            previous,
            BundleBudget::default(),
        );

        // Step 5: generate.
        let raw = if let Some(agent) = &self.agent {
            let note = render_bundle(&bundle);
            agent
                .run_analysis(ticker, &self.config.agent_skills, Some(&note), None)
                .await
                .map_err(CoreError::LlmInvalidResponse)?
                .content
        } else {
            let messages = vec![
                ChatMessage::system(REPORT_SYSTEM_PROMPT),
                ChatMessage::user(render_bundle(&bundle)),
            ];
            let response = self
                .router
                .chat(&messages, &[])
                .await
                .map_err(|e| CoreError::LlmInvalidResponse(e.to_string()))?;
            response
                .content
                .ok_or_else(|| CoreError::LlmInvalidResponse("empty model response".into()))?
        };

        // Step 6: parse (fatal on failure).
        let mut report = parse_report(
            &raw,
            ticker,
            &placeholder_name,
            report_type,
            query_id,
            crate::ENGINE_VERSION,
        )
        .map_err(CoreError::Parse)?;

        // Step 7: price backfill and level sanity notes.
        if let Some(q) = &bundle.quote {
            report.meta.current_price = Some(q.price);
            report.meta.change_pct = Some(q.change_pct);
        } else if let Some(last) = bundle.candles.last() {
            report.meta.current_price = Some(last.close);
        }
        report.note_level_violations();
        if self.config.save_context_snapshot {
            report.details.context_snapshot = serde_json::to_string(&bundle).ok();
        }

        // Step 8: persist, then write news referencing the new row. The
        // backfilled name rides along on the persisted intel.
        let record_id = self
            .store
            .save_report(&mut report)
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))?;
        self.persist_news(record_id, &news, &report.meta.name).await;

        if self.config.single_stock_notify {
            self.dispatcher.dispatch_single(&report).await;
        }

        Ok(PipelineOutcome::Completed(Box::new(report)))
    }

    /// News persistence never fails the run.
    async fn persist_news(&self, record_id: i64, news: &NewsIntel, name: &str) {
        if news.total_items() == 0 {
            return;
        }
        if let Err(e) = self.store.save_news_intel(record_id, news, name).await {
            tracing::warn!("news intel persist failed for record {record_id}: {e}");
        }
    }
}

/// Adapts the pipeline to the task queue's runner contract.
pub struct PipelineRunner {
    pipeline: Arc<Pipeline>,
    force_run: bool,
}

impl PipelineRunner {
    pub fn new(pipeline: Arc<Pipeline>, force_run: bool) -> Arc<Self> {
        Arc::new(PipelineRunner { pipeline, force_run })
    }
}

#[async_trait]
impl TaskRunner for PipelineRunner {
    async fn run(&self, task: &Task, force_refresh: bool) -> Result<TaskOutcome, String> {
        let outcome = self
            .pipeline
            .analyze(
                &task.ticker,
                task.report_type,
                &task.task_id,
                force_refresh,
                self.force_run,
                CancellationToken::new(),
            )
            .await
            .map_err(|e| format!("{} ({})", e, e.code()))?;

        match outcome {
            PipelineOutcome::Completed(report) => Ok(TaskOutcome {
                record_id: Some(report.meta.id),
                name: Some(report.meta.name.clone()),
                message: None,
            }),
            PipelineOutcome::Skipped { reason, .. } => Ok(TaskOutcome {
                record_id: None,
                name: None,
                message: Some(format!("skipped: {reason}")),
            }),
        }
    }
}

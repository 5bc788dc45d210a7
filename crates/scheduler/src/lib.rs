//! Daily batch trigger: fires at SCHEDULE_TIME in the configured
//! timezone, gates through the trading calendars, fans pipelines out
//! under the batch parallelism cap, and hands results to the dispatcher.

use std::sync::Arc;

use analysis_core::{
    AnalysisReport, ReportType, ReviewRegion, Task, TaskEvent, TaskEventKind, TaskStatus,
};
use analysis_pipeline::{Pipeline, PipelineOutcome};
use app_config::{Config, WatchlistHandle};
use chrono::{Duration as ChronoDuration, NaiveTime, Utc};
use chrono_tz::Tz;
use market_calendar::{effective_review_region, gate_batch, open_markets_today};
use notification::Dispatcher;
use task_queue::EventBus;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Index proxies analyzed for the market-review report.
const CN_REVIEW_TICKER: &str = "510300";
const US_REVIEW_TICKER: &str = "SPX";

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub reports: Vec<AnalysisReport>,
    pub failed: Vec<(String, String)>,
    pub skipped: Vec<String>,
}

pub struct Scheduler {
    config: Arc<Config>,
    watchlist: Arc<WatchlistHandle>,
    pipeline: Arc<Pipeline>,
    dispatcher: Arc<Dispatcher>,
    bus: Arc<EventBus>,
    force_run: bool,
    no_notify: bool,
}

impl Scheduler {
    pub fn new(
        config: Arc<Config>,
        watchlist: Arc<WatchlistHandle>,
        pipeline: Arc<Pipeline>,
        dispatcher: Arc<Dispatcher>,
        bus: Arc<EventBus>,
        force_run: bool,
        no_notify: bool,
    ) -> Self {
        Scheduler { config, watchlist, pipeline, dispatcher, bus, force_run, no_notify }
    }

    /// Run until cancelled: optional immediate batch, then one batch per
    /// day at the configured wall-clock time.
    pub async fn run_forever(&self, shutdown: CancellationToken) {
        if self.config.run_immediately {
            tracing::info!("RUN_IMMEDIATELY set, running a batch at boot");
            self.run_batch().await;
        }

        loop {
            let sleep_for = self.until_next_fire();
            tracing::info!(
                "next scheduled batch in {}h{:02}m",
                sleep_for.num_hours(),
                sleep_for.num_minutes() % 60
            );
            tokio::select! {
                _ = tokio::time::sleep(sleep_for.to_std().unwrap_or_default()) => {
                    self.run_batch().await;
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("scheduler shutting down");
                    return;
                }
            }
        }
    }

    fn until_next_fire(&self) -> ChronoDuration {
        let tz: Tz = self
            .config
            .schedule_timezone
            .parse()
            .unwrap_or(chrono_tz::Asia::Shanghai);
        let (hour, minute) = self.config.schedule_time;
        let now = Utc::now().with_timezone(&tz);
        let fire_time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();
        let today_fire = now.date_naive().and_time(fire_time);
        let naive_now = now.naive_local();
        let next = if naive_now < today_fire {
            today_fire
        } else {
            today_fire + ChronoDuration::days(1)
        };
        next - naive_now
    }

    /// One batch over the current watchlist. Items fail independently;
    /// the summary aggregates successes and a failure list.
    pub async fn run_batch(&self) -> BatchSummary {
        let tickers = self.watchlist.read();
        let query_id = Uuid::new_v4().simple().to_string();
        let mut summary = BatchSummary::default();

        if tickers.is_empty() {
            tracing::info!("watchlist empty, nothing to do");
            return summary;
        }

        let bypass = self.force_run || !self.config.trading_day_check_enabled;
        let decision = gate_batch(&tickers, bypass);
        for (ticker, market) in &decision.skipped {
            tracing::info!(
                "{ticker}: skipped, market {} closed",
                market.map(|m| m.as_str()).unwrap_or("unknown")
            );
            let mut task = Task::new(query_id.clone(), ticker.clone(), ReportType::Detailed);
            task.status = TaskStatus::Completed;
            task.message = Some("skipped: market closed".into());
            self.bus.publish(TaskEvent::of(TaskEventKind::TaskSkipped, task));
            summary.skipped.push(ticker.clone());
        }
        if decision.all_closed {
            tracing::info!("all markets in the batch are closed; no data fetch, no notification");
            return summary;
        }

        // Bounded pipeline fan-out.
        let semaphore = Arc::new(Semaphore::new(self.config.batch_parallelism));
        let mut handles = Vec::with_capacity(decision.run.len());
        for ticker in decision.run {
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore closed");
            let pipeline = Arc::clone(&self.pipeline);
            let query_id = query_id.clone();
            let force_run = bypass;
            handles.push(tokio::spawn(async move {
                let result = pipeline
                    .analyze(
                        &ticker,
                        ReportType::Detailed,
                        &query_id,
                        false,
                        force_run,
                        CancellationToken::new(),
                    )
                    .await;
                drop(permit);
                (ticker, result)
            }));
        }

        for handle in handles {
            match handle.await {
                Ok((ticker, Ok(PipelineOutcome::Completed(report)))) => {
                    tracing::info!("{ticker}: report #{} persisted", report.meta.id);
                    summary.reports.push(*report);
                }
                Ok((ticker, Ok(PipelineOutcome::Skipped { reason, .. }))) => {
                    tracing::info!("{ticker}: {reason}");
                    summary.skipped.push(ticker);
                }
                Ok((ticker, Err(e))) => {
                    tracing::error!("{ticker}: batch item failed: {e}");
                    summary.failed.push((ticker, e.to_string()));
                }
                Err(join_err) => {
                    tracing::error!("pipeline task panicked: {join_err}");
                }
            }
        }

        self.run_market_review(&query_id, &mut summary).await;

        if !self.no_notify && !self.config.single_stock_notify {
            let failed: Vec<String> = summary.failed.iter().map(|(t, _)| t.clone()).collect();
            self.dispatcher.dispatch_batch(&summary.reports, &failed).await;
        }

        tracing::info!(
            "batch {query_id} done: {} reports, {} failed, {} skipped",
            summary.reports.len(),
            summary.failed.len(),
            summary.skipped.len()
        );
        summary
    }

    /// Market review for the effective open region, dispatched to every
    /// configured channel regardless of stock groups.
    async fn run_market_review(&self, query_id: &str, summary: &mut BatchSummary) {
        let bypass = self.force_run || !self.config.trading_day_check_enabled;
        let region = if bypass {
            Some(self.config.market_review_region)
        } else {
            effective_review_region(self.config.market_review_region, &open_markets_today())
        };
        let Some(region) = region else {
            tracing::info!("market review skipped: configured region closed");
            return;
        };

        let tickers: &[&str] = match region {
            ReviewRegion::Cn => &[CN_REVIEW_TICKER],
            ReviewRegion::Us => &[US_REVIEW_TICKER],
            ReviewRegion::Both => &[CN_REVIEW_TICKER, US_REVIEW_TICKER],
        };

        for ticker in tickers {
            match self
                .pipeline
                .analyze(
                    ticker,
                    ReportType::MarketReview,
                    query_id,
                    false,
                    bypass,
                    CancellationToken::new(),
                )
                .await
            {
                Ok(PipelineOutcome::Completed(report)) => {
                    if !self.no_notify {
                        self.dispatcher.dispatch_market_review(&report).await;
                    }
                }
                Ok(PipelineOutcome::Skipped { reason, .. }) => {
                    tracing::info!("market review {ticker}: {reason}");
                }
                Err(e) => {
                    tracing::warn!("market review {ticker} failed: {e}");
                    summary.failed.push((ticker.to_string(), e.to_string()));
                }
            }
        }
    }
}

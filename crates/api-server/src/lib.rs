mod agent_routes;
mod analysis_routes;
mod auth;
mod backtest_routes;
mod brute_force;
mod errors;
mod history_routes;
mod stock_routes;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use agent_executor::{load_strategies, register_data_tools, AgentExecutor, ToolRegistry};
use analysis_pipeline::{Pipeline, PipelineRunner};
use app_config::{Config, ConfigError, WatchlistHandle};
use axum::routing::get;
use axum::Router;
use data_fetcher::{vendors, FetcherPool, PoolConfig};
use llm_router::{LlmRouter, RouterConfig};
use news_service::{
    providers::{BochaProvider, SerpApiProvider, TavilyProvider},
    NewsService, NewsServiceConfig, SearchProvider,
};
use notification::{DispatchPolicy, Dispatcher, EmailChannel, GroupRouting, Notifier, WebhookChannel};
use scheduler::Scheduler;
use storage::Store;
use task_queue::{EventBus, TaskQueue};
use tokio_util::sync::CancellationToken;

pub use errors::ApiError;

#[derive(Debug, Clone, Copy, Default)]
pub struct CliOptions {
    pub serve: bool,
    pub serve_only: bool,
    pub schedule: bool,
    pub no_notify: bool,
    pub single_notify: bool,
    pub force_run: bool,
}

#[derive(Debug)]
pub enum RunError {
    Config(ConfigError),
    Fatal(anyhow::Error),
}

impl From<anyhow::Error> for RunError {
    fn from(e: anyhow::Error) -> Self {
        RunError::Fatal(e)
    }
}

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub queue: Arc<TaskQueue>,
    pub bus: Arc<EventBus>,
    pub pipeline: Arc<Pipeline>,
    pub router: Arc<LlmRouter>,
    pub agent: Arc<AgentExecutor>,
    pub auth: Arc<auth::AuthState>,
}

/// Process entry: wire every component from config, then run the modes
/// the CLI selected.
pub async fn run(options: CliOptions) -> Result<(), RunError> {
    let mut config = Config::from_env().map_err(RunError::Config)?;
    if options.single_notify {
        config.single_stock_notify = true;
    }
    let config = Arc::new(config);

    let watchlist = Arc::new(WatchlistHandle::new(
        config.stock_list.clone(),
        config.stock_list_file.clone(),
    ));

    // REALTIME_SOURCE_PRIORITY lists sources best-first; listed sources
    // outrank every unlisted default. Explicit *_PRIORITY overrides win
    // over the list.
    let mut priority_overrides = std::collections::HashMap::new();
    for (index, source) in config.realtime_source_priority.iter().enumerate() {
        priority_overrides.insert(source.to_ascii_lowercase(), index as i32 - 100);
    }
    priority_overrides.extend(config.source_priority_overrides.clone());
    let pool = Arc::new(FetcherPool::new(
        vendors::default_sources(config.tushare_token.clone()),
        PoolConfig {
            priority_overrides,
            disabled_sources: config.disabled_sources.clone(),
            ..PoolConfig::default()
        },
    ));

    let cooldown = Duration::from_secs(config.llm_key_cooldown_secs);
    let search_providers: Vec<Arc<dyn SearchProvider>> = vec![
        Arc::new(BochaProvider::new(config.bocha_api_keys.clone(), cooldown)),
        Arc::new(TavilyProvider::new(config.tavily_api_keys.clone(), cooldown)),
        Arc::new(SerpApiProvider::new(config.serpapi_api_keys.clone(), cooldown)),
    ];
    let news = Arc::new(NewsService::new(
        search_providers,
        NewsServiceConfig {
            max_age_days: config.news_max_age_days,
            ..NewsServiceConfig::default()
        },
    ));
    if !news.is_available() {
        tracing::warn!("no search provider configured; news will degrade to empty fallback");
    }

    let router = Arc::new(LlmRouter::new(RouterConfig {
        model: config.model.clone(),
        fallback_models: config.fallback_models.clone(),
        gemini_keys: config.gemini_api_keys.clone(),
        anthropic_keys: config.anthropic_api_keys.clone(),
        openai_keys: config.openai_api_keys.clone(),
        openai_base_url: config.openai_base_url.clone(),
        key_cooldown: cooldown,
    }));
    if !router.is_available() {
        tracing::warn!("no LLM key configured; analysis runs will fail until one is set");
    }

    let store = Store::connect(&config.database_url)
        .await
        .map_err(|e| RunError::Fatal(anyhow::anyhow!("database init failed: {e}")))?;

    let mut registry = ToolRegistry::new();
    register_data_tools(&mut registry, pool.clone(), news.clone(), watchlist.read());
    let strategies = load_strategies(config.agent_strategy_dir.as_deref().map(Path::new));
    tracing::info!(
        "agent ready: {} tools, {} strategies",
        registry.len(),
        strategies.len()
    );
    let agent = Arc::new(AgentExecutor::new(
        router.clone(),
        Arc::new(registry),
        strategies,
        config.agent_max_steps,
    ));

    let dispatcher = Arc::new(build_dispatcher(&config, options.no_notify));
    tracing::info!("notification channels configured: {}", dispatcher.channel_count());

    let pipeline = Arc::new(Pipeline::new(
        config.clone(),
        pool,
        news,
        router.clone(),
        store.clone(),
        dispatcher.clone(),
        config.agent_mode.then(|| agent.clone()),
    ));

    let bus = Arc::new(EventBus::new());
    let runner = PipelineRunner::new(pipeline.clone(), options.force_run);
    let queue = TaskQueue::new(config.batch_parallelism, runner, bus.clone());
    queue.spawn_heartbeat();

    let auth = Arc::new(auth::AuthState::init(&config, &store).await.map_err(RunError::Fatal)?);

    let state = AppState {
        config: config.clone(),
        store,
        queue,
        bus: bus.clone(),
        pipeline: pipeline.clone(),
        router,
        agent,
        auth,
    };

    let scheduler = Arc::new(Scheduler::new(
        config.clone(),
        watchlist,
        pipeline,
        dispatcher,
        bus,
        options.force_run,
        options.no_notify,
    ));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    let run_scheduler = options.schedule || (options.serve && !options.serve_only);
    let serve_http = options.serve;
    let one_shot = !options.serve && !options.schedule;

    if one_shot {
        let summary = scheduler.run_batch().await;
        if summary.reports.is_empty() && !summary.failed.is_empty() {
            return Err(RunError::Fatal(anyhow::anyhow!(
                "batch produced no reports ({} failures)",
                summary.failed.len()
            )));
        }
        return Ok(());
    }

    let mut scheduler_handle = None;
    if run_scheduler {
        let scheduler = scheduler.clone();
        let shutdown = shutdown.clone();
        scheduler_handle = Some(tokio::spawn(async move {
            scheduler.run_forever(shutdown).await;
        }));
    }

    if serve_http {
        serve(state, shutdown.clone()).await?;
    } else if let Some(handle) = scheduler_handle.take() {
        handle.await.map_err(|e| RunError::Fatal(e.into()))?;
    }

    shutdown.cancel();
    if let Some(handle) = scheduler_handle {
        handle.await.ok();
    }
    Ok(())
}

fn build_dispatcher(config: &Config, no_notify: bool) -> Dispatcher {
    let mut channels: Vec<Arc<dyn Notifier>> = Vec::new();
    if !no_notify {
        if let Ok(url) = std::env::var("NOTIFY_WEBHOOK_URL") {
            if !url.trim().is_empty() {
                channels.push(Arc::new(WebhookChannel::new(url, config.notify_max_bytes)));
            }
        }
        if let Ok(relay) = std::env::var("EMAIL_RELAY_URL") {
            let recipients: Vec<String> =
                config.email_groups.iter().flatten().cloned().collect();
            if !relay.trim().is_empty() && !recipients.is_empty() {
                // Email-class channels default to the larger page size.
                channels.push(Arc::new(EmailChannel::new(relay, recipients, 20 * 1024)));
            }
        }
    }
    Dispatcher::new(
        channels,
        DispatchPolicy {
            summary_only: config.report_summary_only,
            merge_batch: config.merge_email_notification,
            routing: GroupRouting {
                stock_groups: config.stock_groups.clone(),
                email_groups: config.email_groups.clone(),
            },
            inter_chunk_delay: Duration::from_millis(500),
        },
    )
}

async fn serve(state: AppState, shutdown: CancellationToken) -> Result<(), RunError> {
    let bind = format!("{}:{}", state.config.webui_host, state.config.webui_port);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|e| RunError::Fatal(anyhow::anyhow!("bind {bind} failed: {e}")))?;
    tracing::info!("HTTP server listening on {bind}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| RunError::Fatal(e.into()))?;
    Ok(())
}

/// Assemble the `/api/v1` surface.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(analysis_routes::routes())
        .merge(history_routes::routes())
        .merge(agent_routes::routes())
        .merge(stock_routes::routes())
        .merge(backtest_routes::routes())
        .merge(auth::routes())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api/v1", api)
        .with_state(state)
}

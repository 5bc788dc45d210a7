//! Data tools the agent can call. Thin adapters over the fetcher pool,
//! the news service and the indicator engine.

use std::sync::Arc;

use analysis_core::Market;
use async_trait::async_trait;
use chrono::Utc;
use data_fetcher::FetcherPool;
use indicator_engine::{compute_snapshot, SnapshotOptions};
use news_service::NewsService;
use serde_json::{json, Value};

use crate::registry::{Tool, ToolRegistry};

fn arg_str(args: &Value, key: &str) -> Result<String, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| format!("missing required argument: {key}"))
}

fn ticker_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "ticker": {
                "type": "string",
                "description": "Stock code, e.g. 600519, 00700 or AAPL",
            }
        },
        "required": ["ticker"],
    })
}

struct GetDailyHistory {
    pool: Arc<FetcherPool>,
}

#[async_trait]
impl Tool for GetDailyHistory {
    fn name(&self) -> &'static str {
        "get_daily_history"
    }
    fn description(&self) -> &'static str {
        "Fetch recent daily OHLCV candles for a stock code"
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ticker": { "type": "string", "description": "Stock code" },
                "days": { "type": "integer", "description": "Lookback in days, default 60" }
            },
            "required": ["ticker"],
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let ticker = arg_str(&args, "ticker")?;
        let days = args.get("days").and_then(|v| v.as_u64()).unwrap_or(60) as u32;
        let candles = self
            .pool
            .get_history(&ticker, days)
            .await
            .map_err(|e| e.to_string())?;
        serde_json::to_value(&candles).map_err(|e| e.to_string())
    }
}

struct GetRealtimeQuote {
    pool: Arc<FetcherPool>,
}

#[async_trait]
impl Tool for GetRealtimeQuote {
    fn name(&self) -> &'static str {
        "get_realtime_quote"
    }
    fn description(&self) -> &'static str {
        "Fetch the live quote (price, change %, volume ratio) for a stock code"
    }
    fn parameters(&self) -> Value {
        ticker_schema()
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let ticker = arg_str(&args, "ticker")?;
        let quote = self
            .pool
            .get_realtime(&ticker)
            .await
            .map_err(|e| e.to_string())?;
        serde_json::to_value(&quote).map_err(|e| e.to_string())
    }
}

struct AnalyzeTrend {
    pool: Arc<FetcherPool>,
}

#[async_trait]
impl Tool for AnalyzeTrend {
    fn name(&self) -> &'static str {
        "analyze_trend"
    }
    fn description(&self) -> &'static str {
        "Compute MA5/MA10/MA20, MACD, RSI, bias and trend strength for a stock code"
    }
    fn parameters(&self) -> Value {
        ticker_schema()
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let ticker = arg_str(&args, "ticker")?;
        let candles = self
            .pool
            .get_history(&ticker, 90)
            .await
            .map_err(|e| e.to_string())?;
        let quote = self.pool.get_realtime(&ticker).await.ok();
        let snapshot = compute_snapshot(
            &candles,
            quote.as_ref(),
            SnapshotOptions {
                realtime_indicators: quote.is_some(),
                bias_threshold: 5.0,
                today: Utc::now().date_naive(),
            },
        );
        serde_json::to_value(&snapshot).map_err(|e| e.to_string())
    }
}

struct SearchStockNews {
    news: Arc<NewsService>,
}

#[async_trait]
impl Tool for SearchStockNews {
    fn name(&self) -> &'static str {
        "search_stock_news"
    }
    fn description(&self) -> &'static str {
        "Search recent news, risk signals and earnings chatter for a stock"
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ticker": { "type": "string", "description": "Stock code" },
                "name": { "type": "string", "description": "Company name if known" }
            },
            "required": ["ticker"],
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let ticker = arg_str(&args, "ticker")?;
        let name = args.get("name").and_then(|v| v.as_str()).unwrap_or("");
        let intel = self.news.gather(&ticker, name).await;
        serde_json::to_value(&intel).map_err(|e| e.to_string())
    }
}

struct GetStockInfo {
    pool: Arc<FetcherPool>,
}

#[async_trait]
impl Tool for GetStockInfo {
    fn name(&self) -> &'static str {
        "get_stock_info"
    }
    fn description(&self) -> &'static str {
        "Resolve a stock code to its name and market"
    }
    fn parameters(&self) -> Value {
        ticker_schema()
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let ticker = arg_str(&args, "ticker")?;
        let canonical = analysis_core::canonicalize(&ticker);
        let market = Market::of(&canonical).map(|m| m.as_str());
        let name = self.pool.get_name(&canonical).await.ok();
        Ok(json!({ "ticker": canonical, "name": name, "market": market }))
    }
}

struct GetMarketIndices {
    pool: Arc<FetcherPool>,
}

#[async_trait]
impl Tool for GetMarketIndices {
    fn name(&self) -> &'static str {
        "get_market_indices"
    }
    fn description(&self) -> &'static str {
        "Fetch live quotes for the major US index benchmarks"
    }
    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value) -> Result<Value, String> {
        let mut out = Vec::new();
        for index in ["SPX", "IXIC", "DJI"] {
            if let Ok(quote) = self.pool.get_realtime(index).await {
                out.push(quote);
            }
        }
        if out.is_empty() {
            return Err("no index quotes available".into());
        }
        serde_json::to_value(&out).map_err(|e| e.to_string())
    }
}

struct GetSectorRankings {
    pool: Arc<FetcherPool>,
    watchlist: Vec<String>,
}

#[async_trait]
impl Tool for GetSectorRankings {
    fn name(&self) -> &'static str {
        "get_sector_rankings"
    }
    fn description(&self) -> &'static str {
        "Rank the configured watchlist by today's change percent (gainers first)"
    }
    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value) -> Result<Value, String> {
        if self.watchlist.is_empty() {
            return Err("watchlist is empty".into());
        }
        self.pool.prefetch_realtime(&self.watchlist).await;
        let mut quotes = Vec::new();
        for ticker in &self.watchlist {
            if let Ok(q) = self.pool.get_realtime(ticker).await {
                quotes.push(q);
            }
        }
        quotes.sort_by(|a, b| {
            b.change_pct.partial_cmp(&a.change_pct).unwrap_or(std::cmp::Ordering::Equal)
        });
        serde_json::to_value(&quotes).map_err(|e| e.to_string())
    }
}

/// Wire the standard data tools into a registry.
pub fn register_data_tools(
    registry: &mut ToolRegistry,
    pool: Arc<FetcherPool>,
    news: Arc<NewsService>,
    watchlist: Vec<String>,
) {
    registry.register(Arc::new(GetDailyHistory { pool: pool.clone() }));
    registry.register(Arc::new(GetRealtimeQuote { pool: pool.clone() }));
    registry.register(Arc::new(AnalyzeTrend { pool: pool.clone() }));
    registry.register(Arc::new(SearchStockNews { news }));
    registry.register(Arc::new(GetStockInfo { pool: pool.clone() }));
    registry.register(Arc::new(GetMarketIndices { pool: pool.clone() }));
    registry.register(Arc::new(GetSectorRankings { pool, watchlist }));
}

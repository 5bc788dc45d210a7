use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use analysis_core::{canonicalize, map_us_index, us_index_display_name, Candle, Market, Quote};
use dashmap::DashMap;

use crate::breaker::CircuitBreaker;
use crate::cache::TtlCache;
use crate::source::{validate_series, DataFetcher};
use crate::FetchError;

/// Pool tuning knobs, mapped from the config registry.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// source id -> priority override (lower wins).
    pub priority_overrides: HashMap<String, i32>,
    pub disabled_sources: Vec<String>,
    /// Source all US history / index traffic is pinned to.
    pub us_source: &'static str,
    pub quote_ttl: Duration,
    pub history_ttl: Duration,
    pub breaker_threshold: u32,
    pub breaker_cooldown: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            priority_overrides: HashMap::new(),
            disabled_sources: Vec::new(),
            us_source: "yahoo",
            quote_ttl: Duration::from_secs(60),
            // One mainland trading session.
            history_ttl: Duration::from_secs(4 * 3600),
            breaker_threshold: 3,
            breaker_cooldown: Duration::from_secs(600),
        }
    }
}

struct Registered {
    fetcher: Arc<dyn DataFetcher>,
    breaker: CircuitBreaker,
    effective_priority: i32,
}

/// Multi-source fetcher with priority routing, circuit breaking and TTL
/// caches. All entry points take raw user input and canonicalize it.
pub struct FetcherPool {
    sources: Vec<Registered>,
    config: PoolConfig,
    quote_cache: TtlCache<Quote>,
    history_cache: TtlCache<Vec<Candle>>,
    name_cache: DashMap<String, String>,
}

impl FetcherPool {
    pub fn new(fetchers: Vec<Arc<dyn DataFetcher>>, config: PoolConfig) -> Self {
        let mut sources: Vec<Registered> = fetchers
            .into_iter()
            .filter(|f| {
                let id = f.descriptor().id;
                let enabled = !config.disabled_sources.iter().any(|d| d == id);
                if !enabled {
                    tracing::info!("data source {id} disabled by config");
                }
                enabled
            })
            .map(|fetcher| {
                let desc = fetcher.descriptor();
                let effective_priority = config
                    .priority_overrides
                    .get(desc.id)
                    .copied()
                    .unwrap_or(desc.priority);
                Registered {
                    fetcher,
                    breaker: CircuitBreaker::new(config.breaker_threshold, config.breaker_cooldown),
                    effective_priority,
                }
            })
            .collect();
        sources.sort_by_key(|s| s.effective_priority);

        FetcherPool {
            quote_cache: TtlCache::new(config.quote_ttl),
            history_cache: TtlCache::new(config.history_ttl),
            name_cache: DashMap::new(),
            sources,
            config,
        }
    }

    /// Sources eligible for a market, already priority-sorted. US traffic
    /// is pinned to the configured US source.
    fn route(&self, market: Market) -> Vec<&Registered> {
        if market == Market::Us {
            return self
                .sources
                .iter()
                .filter(|s| s.fetcher.descriptor().id == self.config.us_source)
                .collect();
        }
        self.sources
            .iter()
            .filter(|s| s.fetcher.descriptor().supports(market))
            .collect()
    }

    /// Vendor-facing symbol: US index aliases are translated, everything
    /// else passes through canonical.
    fn dispatch_symbol(ticker: &str) -> String {
        map_us_index(ticker).map(str::to_string).unwrap_or_else(|| ticker.to_string())
    }

    pub async fn get_history(&self, raw: &str, days: u32) -> Result<Vec<Candle>, FetchError> {
        let ticker = canonicalize(raw);
        let cache_key = format!("{ticker}:{days}");
        if let Some(hit) = self.history_cache.get(&cache_key) {
            return Ok(hit);
        }

        let market = Market::of(&ticker)
            .ok_or_else(|| FetchError::NotFound(ticker.clone()))?;
        let symbol = Self::dispatch_symbol(&ticker);
        let routes = self.route(market);
        let mut attempted = 0usize;

        for entry in &routes {
            let id = entry.fetcher.descriptor().id;
            if !entry.breaker.try_acquire() {
                tracing::debug!("{id}: circuit open, skipping for {ticker}");
                continue;
            }
            attempted += 1;
            match entry.fetcher.history(&symbol, days).await {
                Ok(candles) => {
                    if let Err(e) = validate_series(id, &candles) {
                        entry.breaker.record_failure();
                        tracing::warn!("{id}: {e}");
                        continue;
                    }
                    entry.breaker.record_success();
                    self.history_cache.put(cache_key, candles.clone());
                    return Ok(candles);
                }
                Err(e) => {
                    if e.counts_against_breaker() {
                        entry.breaker.record_failure();
                    } else {
                        entry.breaker.record_neutral();
                    }
                    tracing::warn!("{id}: history for {ticker} failed: {e}");
                }
            }
        }

        Err(FetchError::Exhausted { ticker, attempted })
    }

    pub async fn get_realtime(&self, raw: &str) -> Result<Quote, FetchError> {
        let ticker = canonicalize(raw);
        if let Some(hit) = self.quote_cache.get(&ticker) {
            return Ok(hit);
        }

        let market = Market::of(&ticker)
            .ok_or_else(|| FetchError::NotFound(ticker.clone()))?;
        let symbol = Self::dispatch_symbol(&ticker);
        let routes = self.route(market);
        let mut attempted = 0usize;

        for entry in &routes {
            let id = entry.fetcher.descriptor().id;
            if !entry.breaker.try_acquire() {
                continue;
            }
            attempted += 1;
            match entry.fetcher.realtime(&symbol).await {
                Ok(mut quote) => {
                    entry.breaker.record_success();
                    quote.ticker = ticker.clone();
                    if let Some(name) = &quote.name {
                        self.name_cache.insert(ticker.clone(), name.clone());
                    }
                    self.quote_cache.put(ticker.clone(), quote.clone());
                    return Ok(quote);
                }
                Err(e) => {
                    if e.counts_against_breaker() {
                        entry.breaker.record_failure();
                    } else {
                        entry.breaker.record_neutral();
                    }
                    tracing::warn!("{id}: realtime for {ticker} failed: {e}");
                }
            }
        }

        Err(FetchError::Exhausted { ticker, attempted })
    }

    /// One source round trip for many tickers of the same market, filling
    /// the quote cache. Per-ticker failures are silent; callers fall back
    /// to `get_realtime`.
    pub async fn prefetch_realtime(&self, raws: &[String]) {
        let mut by_market: HashMap<Market, Vec<String>> = HashMap::new();
        for raw in raws {
            let ticker = canonicalize(raw);
            if self.quote_cache.get(&ticker).is_some() {
                continue;
            }
            if let Some(market) = Market::of(&ticker) {
                by_market.entry(market).or_default().push(ticker);
            }
        }

        for (market, tickers) in by_market {
            let Some(entry) = self.route(market).into_iter().next() else {
                continue;
            };
            if !entry.breaker.try_acquire() {
                continue;
            }
            let symbols: Vec<String> =
                tickers.iter().map(|t| Self::dispatch_symbol(t)).collect();
            let results = entry.fetcher.realtime_batch(&symbols).await;
            let mut any_ok = false;
            for (ticker, (_, result)) in tickers.iter().zip(results) {
                if let Ok(mut quote) = result {
                    any_ok = true;
                    quote.ticker = ticker.clone();
                    if let Some(name) = &quote.name {
                        self.name_cache.insert(ticker.clone(), name.clone());
                    }
                    self.quote_cache.put(ticker.clone(), quote);
                }
            }
            if any_ok {
                entry.breaker.record_success();
            } else {
                entry.breaker.record_failure();
            }
        }
    }

    pub async fn get_name(&self, raw: &str) -> Result<String, FetchError> {
        let ticker = canonicalize(raw);
        if let Some(name) = us_index_display_name(&ticker) {
            return Ok(name.to_string());
        }
        if let Some(hit) = self.name_cache.get(&ticker) {
            return Ok(hit.clone());
        }

        let market = Market::of(&ticker)
            .ok_or_else(|| FetchError::NotFound(ticker.clone()))?;
        let symbol = Self::dispatch_symbol(&ticker);
        for entry in self.route(market) {
            if !entry.breaker.try_acquire() {
                continue;
            }
            match entry.fetcher.name(&symbol).await {
                Ok(name) => {
                    entry.breaker.record_success();
                    self.name_cache.insert(ticker.clone(), name.clone());
                    return Ok(name);
                }
                Err(e) => {
                    if e.counts_against_breaker() {
                        entry.breaker.record_failure();
                    } else {
                        entry.breaker.record_neutral();
                    }
                }
            }
        }
        Err(FetchError::NotFound(ticker))
    }

    /// Drop any cached quote/history for a ticker (force_refresh path).
    pub fn invalidate(&self, raw: &str, days: u32) {
        let ticker = canonicalize(raw);
        self.quote_cache.invalidate(&ticker);
        self.history_cache.invalidate(&format!("{ticker}:{days}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::SourceId;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Recording stub source for routing assertions.
    struct StubSource {
        id: SourceId,
        priority: i32,
        markets: &'static [Market],
        calls: AtomicUsize,
        symbols_seen: std::sync::Mutex<Vec<String>>,
        fail: bool,
    }

    impl StubSource {
        fn new(id: SourceId, priority: i32, markets: &'static [Market], fail: bool) -> Arc<Self> {
            Arc::new(StubSource {
                id,
                priority,
                markets,
                calls: AtomicUsize::new(0),
                symbols_seen: std::sync::Mutex::new(Vec::new()),
                fail,
            })
        }

        fn quote(&self, ticker: &str) -> Quote {
            Quote {
                ticker: ticker.to_string(),
                name: Some(format!("{}-name", self.id)),
                price: 100.0,
                change_pct: 1.0,
                volume_ratio: None,
                turnover_rate: None,
                timestamp: chrono::Utc::now(),
                source: self.id.to_string(),
            }
        }
    }

    #[async_trait]
    impl DataFetcher for StubSource {
        fn descriptor(&self) -> crate::SourceDescriptor {
            crate::SourceDescriptor { id: self.id, priority: self.priority, markets: self.markets }
        }

        async fn history(&self, ticker: &str, _days: u32) -> Result<Vec<Candle>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(FetchError::Transport { source_name: self.id, message: "down".into() });
            }
            let base = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
            Ok((0..5)
                .map(|i| Candle {
                    date: base + chrono::Duration::days(i),
                    open: 1.0,
                    high: 2.0,
                    low: 0.5,
                    close: 1.5,
                    volume: 10.0,
                    amount: None,
                })
                .collect())
        }

        async fn realtime(&self, ticker: &str) -> Result<Quote, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.symbols_seen.lock().unwrap().push(ticker.to_string());
            if self.fail {
                return Err(FetchError::Transport { source_name: self.id, message: "down".into() });
            }
            Ok(self.quote(ticker))
        }
    }

    const CN: &[Market] = &[Market::AShare, Market::HongKong];
    const US: &[Market] = &[Market::Us];

    fn pool_of(sources: Vec<Arc<StubSource>>) -> FetcherPool {
        let fetchers: Vec<Arc<dyn DataFetcher>> =
            sources.into_iter().map(|s| s as Arc<dyn DataFetcher>).collect();
        FetcherPool::new(fetchers, PoolConfig::default())
    }

    #[tokio::test]
    async fn priority_order_and_fallback() {
        let primary = StubSource::new("primary", 1, CN, true);
        let secondary = StubSource::new("secondary", 2, CN, false);
        let pool = pool_of(vec![primary.clone(), secondary.clone()]);

        let candles = pool.get_history("600519", 30).await.unwrap();
        assert_eq!(candles.len(), 5);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn us_index_pins_to_us_source_and_maps_symbol() {
        let cn = StubSource::new("primary", 1, CN, false);
        let us = StubSource::new("yahoo", 9, US, false);
        let pool = pool_of(vec![cn.clone(), us.clone()]);

        let quote = pool.get_realtime("SPX").await.unwrap();
        // No A-share source contacted despite its better priority.
        assert_eq!(cn.calls.load(Ordering::SeqCst), 0);
        assert_eq!(us.calls.load(Ordering::SeqCst), 1);
        // The vendor saw the mapped index symbol, not the alias.
        assert_eq!(us.symbols_seen.lock().unwrap().as_slice(), ["^GSPC"]);
        // Canonical ticker preserved on the quote.
        assert_eq!(quote.ticker, "SPX");
    }

    #[tokio::test]
    async fn cache_hit_issues_no_call() {
        let src = StubSource::new("primary", 1, CN, false);
        let pool = pool_of(vec![src.clone()]);

        pool.get_realtime("600519").await.unwrap();
        pool.get_realtime("600519").await.unwrap();
        pool.get_realtime("600519").await.unwrap();
        assert_eq!(src.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn breaker_opens_and_skips() {
        let bad = StubSource::new("primary", 1, CN, true);
        let pool = pool_of(vec![bad.clone()]);

        for _ in 0..3 {
            let _ = pool.get_realtime("000001").await;
            pool.invalidate("000001", 30);
        }
        assert_eq!(bad.calls.load(Ordering::SeqCst), 3);
        // Breaker now open: the next call skips without an attempt.
        let err = pool.get_realtime("000001").await.unwrap_err();
        assert!(matches!(err, FetchError::Exhausted { attempted: 0, .. }));
        assert_eq!(bad.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn all_disabled_is_exhausted_not_panic() {
        let src = StubSource::new("primary", 1, CN, false);
        let fetchers: Vec<Arc<dyn DataFetcher>> = vec![src as Arc<dyn DataFetcher>];
        let pool = FetcherPool::new(
            fetchers,
            PoolConfig { disabled_sources: vec!["primary".into()], ..PoolConfig::default() },
        );
        let err = pool.get_history("600519", 30).await.unwrap_err();
        assert!(matches!(err, FetchError::Exhausted { .. }));
    }

    #[tokio::test]
    async fn prefetch_fills_cache_in_one_round_trip() {
        let src = StubSource::new("primary", 1, CN, false);
        let pool = pool_of(vec![src.clone()]);

        pool.prefetch_realtime(&["600519".into(), "000001".into()]).await;
        let calls_after_prefetch = src.calls.load(Ordering::SeqCst);
        pool.get_realtime("600519").await.unwrap();
        pool.get_realtime("000001").await.unwrap();
        // No further vendor calls after the prefetch.
        assert_eq!(src.calls.load(Ordering::SeqCst), calls_after_prefetch);
    }

    #[tokio::test]
    async fn config_priority_override_rewires_routing() {
        let a = StubSource::new("primary", 1, CN, false);
        let b = StubSource::new("secondary", 2, CN, false);
        let fetchers: Vec<Arc<dyn DataFetcher>> =
            vec![a.clone() as _, b.clone() as _];
        let mut overrides = HashMap::new();
        overrides.insert("secondary".to_string(), 0);
        let pool = FetcherPool::new(
            fetchers,
            PoolConfig { priority_overrides: overrides, ..PoolConfig::default() },
        );

        pool.get_realtime("600519").await.unwrap();
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }
}

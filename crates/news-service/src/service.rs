use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use analysis_core::{NewsDimension, NewsIntel, NewsItem};
use chrono::Utc;

use crate::fingerprint::fingerprint;
use crate::providers::{SearchError, SearchProvider};
use crate::templates::queries_for;

#[derive(Debug, Clone)]
pub struct NewsServiceConfig {
    /// Items dropped when older than this. Zero means "no news survives"
    /// but the pipeline still gets an empty (non-fallback) intel.
    pub max_age_days: i64,
    pub max_dimensions: usize,
    pub per_dimension_limit: usize,
    pub cache_capacity: usize,
}

impl Default for NewsServiceConfig {
    fn default() -> Self {
        NewsServiceConfig {
            max_age_days: 7,
            max_dimensions: crate::templates::MAX_SEARCH_DIMENSIONS,
            per_dimension_limit: 5,
            cache_capacity: 500,
        }
    }
}

/// FIFO intel cache keyed by (ticker, dimension count, day bucket): one
/// batch day's repeat lookups cost no HTTP.
struct IntelCache {
    capacity: usize,
    order: VecDeque<String>,
    map: std::collections::HashMap<String, NewsIntel>,
}

impl IntelCache {
    fn new(capacity: usize) -> Self {
        IntelCache { capacity, order: VecDeque::new(), map: std::collections::HashMap::new() }
    }

    fn get(&self, key: &str) -> Option<NewsIntel> {
        self.map.get(key).cloned()
    }

    fn put(&mut self, key: String, value: NewsIntel) {
        if !self.map.contains_key(&key) {
            self.order.push_back(key.clone());
            while self.order.len() > self.capacity {
                if let Some(evicted) = self.order.pop_front() {
                    self.map.remove(&evicted);
                }
            }
        }
        self.map.insert(key, value);
    }
}

/// Multi-provider, multi-dimension news search with dedup and ranking.
pub struct NewsService {
    providers: Vec<Arc<dyn SearchProvider>>,
    config: NewsServiceConfig,
    cache: Mutex<IntelCache>,
}

impl NewsService {
    pub fn new(providers: Vec<Arc<dyn SearchProvider>>, config: NewsServiceConfig) -> Self {
        let cache = Mutex::new(IntelCache::new(config.cache_capacity));
        NewsService { providers, config, cache }
    }

    /// True when at least one provider has keys.
    pub fn is_available(&self) -> bool {
        self.providers.iter().any(|p| p.is_configured())
    }

    /// Gather intel for one ticker across all dimensions.
    ///
    /// Per-dimension provider failover; total provider failure yields an
    /// empty intel flagged `search_fallback` instead of an error.
    pub async fn gather(&self, ticker: &str, name: &str) -> NewsIntel {
        let cache_key = format!(
            "{ticker}:{}:{}",
            self.config.max_dimensions,
            Utc::now().date_naive()
        );
        if let Some(hit) = self.cache.lock().expect("intel cache lock").get(&cache_key) {
            return hit;
        }

        let queries = queries_for(ticker, name, self.config.max_dimensions);
        let mut seen: HashSet<u64> = HashSet::new();
        let mut dimensions = Vec::with_capacity(queries.len());
        let mut any_success = false;

        for (dim, query) in queries {
            let mut items = Vec::new();
            match self.search_with_failover(&query).await {
                Ok(hits) => {
                    any_success = true;
                    let now = Utc::now();
                    for hit in hits {
                        let fp = fingerprint(&hit.title, &hit.url);
                        if !seen.insert(fp) {
                            continue;
                        }
                        if let Some(published) = hit.published_at {
                            let age = now - published;
                            if age > chrono::Duration::days(self.config.max_age_days) {
                                continue;
                            }
                        }
                        let recency = match hit.published_at {
                            Some(published) => {
                                let age_days =
                                    (now - published).num_hours().max(0) as f64 / 24.0;
                                (1.0 - age_days / self.config.max_age_days.max(1) as f64)
                                    .clamp(0.05, 1.0)
                            }
                            // Undated hits rank behind anything dated today.
                            None => 0.3,
                        };
                        items.push(NewsItem {
                            title: hit.title,
                            snippet: hit.snippet,
                            url: hit.url,
                            published_at: hit.published_at,
                            source: dim.as_str().to_string(),
                            fingerprint: fp,
                            relevance: hit.score * recency,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!("news dimension {} failed for {ticker}: {e}", dim.as_str());
                }
            }

            items.sort_by(|a, b| {
                b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal)
            });
            items.truncate(self.config.per_dimension_limit);
            dimensions.push(NewsDimension { name: dim.as_str().to_string(), query, items });
        }

        let intel = NewsIntel {
            ticker: ticker.to_string(),
            dimensions,
            search_fallback: !any_success,
        };

        // Fallback results are not cached: the next call should retry the
        // providers rather than pin an empty answer for the day.
        if any_success {
            self.cache.lock().expect("intel cache lock").put(cache_key, intel.clone());
        }
        intel
    }

    async fn search_with_failover(
        &self,
        query: &str,
    ) -> Result<Vec<crate::providers::RawHit>, SearchError> {
        let mut last_err = SearchError::NoKey("none-configured");
        for provider in &self.providers {
            if !provider.is_configured() {
                continue;
            }
            match provider.search(query, self.config.per_dimension_limit * 2).await {
                Ok(hits) => return Ok(hits),
                Err(e) => {
                    tracing::debug!("provider {} failed: {e}", provider.id());
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}

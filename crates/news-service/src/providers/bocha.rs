use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::json;

use crate::keypool::KeyPool;
use crate::providers::{RawHit, SearchError, SearchProvider};

const PROVIDER: &str = "bocha";

/// Bocha web search: the Chinese-language primary.
pub struct BochaProvider {
    keys: KeyPool,
    client: reqwest::Client,
    base_url: String,
}

impl BochaProvider {
    pub fn new(keys: Vec<String>, cooldown: Duration) -> Self {
        BochaProvider {
            keys: KeyPool::new(keys, cooldown),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: "https://api.bochaai.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[derive(Deserialize)]
struct BochaResponse {
    #[serde(default)]
    data: Option<BochaData>,
}

#[derive(Deserialize)]
struct BochaData {
    #[serde(default, rename = "webPages")]
    web_pages: Option<BochaPages>,
}

#[derive(Deserialize)]
struct BochaPages {
    #[serde(default)]
    value: Vec<BochaPage>,
}

#[derive(Deserialize)]
struct BochaPage {
    name: String,
    url: String,
    #[serde(default)]
    snippet: String,
    #[serde(default, rename = "dateLastCrawled")]
    date_last_crawled: Option<String>,
}

#[async_trait]
impl SearchProvider for BochaProvider {
    fn id(&self) -> &'static str {
        PROVIDER
    }

    fn is_configured(&self) -> bool {
        !self.keys.is_empty()
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<RawHit>, SearchError> {
        let (key_index, key) = self.keys.acquire().ok_or(SearchError::NoKey(PROVIDER))?;

        let response = self
            .client
            .post(format!("{}/v1/web-search", self.base_url))
            .bearer_auth(key)
            .json(&json!({ "query": query, "count": max_results, "freshness": "oneMonth" }))
            .send()
            .await
            .map_err(|e| SearchError::Transport { provider: PROVIDER, message: e.to_string() })?;

        if response.status().as_u16() == 429 {
            self.keys.cool_down(key_index);
            return Err(SearchError::RateLimited { provider: PROVIDER, key_index });
        }
        if !response.status().is_success() {
            return Err(SearchError::Transport {
                provider: PROVIDER,
                message: format!("HTTP {}", response.status()),
            });
        }

        let parsed: BochaResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Malformed { provider: PROVIDER, message: e.to_string() })?;

        let pages = parsed
            .data
            .and_then(|d| d.web_pages)
            .map(|p| p.value)
            .unwrap_or_default();

        Ok(pages
            .into_iter()
            .map(|p| RawHit {
                title: p.name,
                snippet: p.snippet,
                url: p.url,
                published_at: p
                    .date_last_crawled
                    .as_deref()
                    .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
                    .map(|d| d.to_utc()),
                score: 0.5,
            })
            .collect())
    }
}

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::json;

use crate::keypool::KeyPool;
use crate::providers::{RawHit, SearchError, SearchProvider};

const PROVIDER: &str = "tavily";

pub struct TavilyProvider {
    keys: KeyPool,
    client: reqwest::Client,
    base_url: String,
}

impl TavilyProvider {
    pub fn new(keys: Vec<String>, cooldown: Duration) -> Self {
        TavilyProvider {
            keys: KeyPool::new(keys, cooldown),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: "https://api.tavily.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    published_date: Option<String>,
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    fn id(&self) -> &'static str {
        PROVIDER
    }

    fn is_configured(&self) -> bool {
        !self.keys.is_empty()
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<RawHit>, SearchError> {
        let (key_index, key) = self.keys.acquire().ok_or(SearchError::NoKey(PROVIDER))?;

        let body = json!({
            "api_key": key,
            "query": query,
            "topic": "news",
            "max_results": max_results,
        });
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&body)
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

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Malformed { provider: PROVIDER, message: e.to_string() })?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| RawHit {
                title: r.title,
                snippet: r.content,
                url: r.url,
                published_at: r
                    .published_date
                    .as_deref()
                    .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
                    .map(|d| d.to_utc()),
                score: r.score.unwrap_or(0.5),
            })
            .collect())
    }
}

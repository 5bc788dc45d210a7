use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::keypool::KeyPool;
use crate::providers::{RawHit, SearchError, SearchProvider};

const PROVIDER: &str = "serpapi";

/// SerpAPI Google News backend, last in the fanout order.
pub struct SerpApiProvider {
    keys: KeyPool,
    client: reqwest::Client,
    base_url: String,
}

impl SerpApiProvider {
    pub fn new(keys: Vec<String>, cooldown: Duration) -> Self {
        SerpApiProvider {
            keys: KeyPool::new(keys, cooldown),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: "https://serpapi.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[derive(Deserialize)]
struct SerpResponse {
    #[serde(default)]
    news_results: Vec<SerpNewsItem>,
}

#[derive(Deserialize)]
struct SerpNewsItem {
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    date: Option<String>,
}

fn parse_serp_date(raw: &str) -> Option<DateTime<Utc>> {
    // "03/02/2026, 08:00 AM, +0000 UTC" or "2 days ago"
    if let Some(mdy) = raw.split(',').next() {
        if let Ok(date) = NaiveDate::parse_from_str(mdy.trim(), "%m/%d/%Y") {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    let lowered = raw.to_lowercase();
    let number: i64 = lowered.split_whitespace().next()?.parse().ok()?;
    let now = Utc::now();
    if lowered.contains("hour") {
        Some(now - chrono::Duration::hours(number))
    } else if lowered.contains("day") {
        Some(now - chrono::Duration::days(number))
    } else if lowered.contains("week") {
        Some(now - chrono::Duration::weeks(number))
    } else {
        None
    }
}

#[async_trait]
impl SearchProvider for SerpApiProvider {
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
            .get(format!("{}/search.json", self.base_url))
            .query(&[
                ("engine", "google_news"),
                ("q", query),
                ("api_key", &key),
                ("num", &max_results.to_string()),
            ])
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

        let parsed: SerpResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Malformed { provider: PROVIDER, message: e.to_string() })?;

        Ok(parsed
            .news_results
            .into_iter()
            .map(|r| RawHit {
                title: r.title,
                snippet: r.snippet,
                url: r.link,
                published_at: r.date.as_deref().and_then(parse_serp_date),
                score: 0.5,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_dates_resolve() {
        let two_days = parse_serp_date("2 days ago").unwrap();
        assert!(Utc::now() - two_days >= chrono::Duration::days(2) - chrono::Duration::minutes(1));
        assert!(parse_serp_date("someday").is_none());
    }

    #[test]
    fn absolute_dates_resolve() {
        let parsed = parse_serp_date("03/02/2026, 08:00 AM, +0000 UTC").unwrap();
        assert_eq!(parsed.date_naive(), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
    }
}

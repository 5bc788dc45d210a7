mod bocha;
mod serpapi;
mod tavily;

pub use bocha::BochaProvider;
pub use serpapi::SerpApiProvider;
pub use tavily::TavilyProvider;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Unranked hit straight from a provider.
#[derive(Debug, Clone)]
pub struct RawHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Provider's own 0..1 relevance, 0.5 when it reports none.
    pub score: f64,
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("provider {0} has no usable key")]
    NoKey(&'static str),
    #[error("provider {provider} rate limited")]
    RateLimited { provider: &'static str, key_index: usize },
    #[error("provider {provider} transport failure: {message}")]
    Transport { provider: &'static str, message: String },
    #[error("provider {provider} returned malformed payload: {message}")]
    Malformed { provider: &'static str, message: String },
}

/// A web-search backend. Implementations own their key pool.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn id(&self) -> &'static str;

    /// True when at least one key is configured.
    fn is_configured(&self) -> bool;

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<RawHit>, SearchError>;
}

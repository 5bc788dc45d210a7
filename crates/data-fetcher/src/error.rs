use thiserror::Error;

/// Failures surfaced by sources and the pool.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The source does not cover this ticker's market. Never counted
    /// against the breaker.
    #[error("market not supported by {source_name} for {ticker}")]
    MarketUnsupported { source_name: &'static str, ticker: String },

    /// Network / 5xx / timeout. Counted; retried on the next source.
    #[error("transport failure on {source_name}: {message}")]
    Transport { source_name: &'static str, message: String },

    /// The source answered but the payload was unusable. Counted.
    #[error("malformed payload from {source_name}: {message}")]
    Malformed { source_name: &'static str, message: String },

    /// Name lookup found nothing.
    #[error("no name found for {0}")]
    NotFound(String),

    /// The cached quote is past its TTL and no source refreshed it.
    #[error("quote for {0} is stale")]
    Stale(String),

    /// Every eligible source was tried (or breaker-skipped) and failed.
    #[error("all sources exhausted for {ticker} ({attempted} attempted)")]
    Exhausted { ticker: String, attempted: usize },
}

impl FetchError {
    /// Whether this failure ticks the source's circuit breaker.
    pub fn counts_against_breaker(&self) -> bool {
        matches!(self, FetchError::Transport { .. } | FetchError::Malformed { .. })
    }
}

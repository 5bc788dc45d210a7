use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    /// 429 or provider quota message. The offending key is cooling.
    #[error("{provider} rate limited key #{key_index}")]
    RateLimited { provider: &'static str, key_index: usize },

    /// 4xx the caller caused (bad schema, context overflow). Retrying
    /// the same model is pointless; fall through to the next model.
    #[error("{provider} rejected the request: {message}")]
    InvalidRequest { provider: &'static str, message: String },

    /// Network / 5xx. Retried with backoff before counting as a key
    /// failure.
    #[error("{provider} transport failure: {message}")]
    Transport { provider: &'static str, message: String },

    /// The provider answered 200 with an unusable body.
    #[error("{provider} returned an unusable response: {message}")]
    InvalidResponse { provider: &'static str, message: String },

    /// No key configured for the provider a model resolves to.
    #[error("no API key configured for {0}")]
    NoKeys(&'static str),

    /// Every key for this model is cooling.
    #[error("all {0} keys cooling")]
    AllKeysCooling(&'static str),

    /// The whole fallback chain failed. Wraps the terminal error.
    #[error("all models failed; last: {0}")]
    AllModelsFailed(Box<LlmError>),
}

impl LlmError {
    /// Errors worth retrying on the same key with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Transport { .. })
    }
}

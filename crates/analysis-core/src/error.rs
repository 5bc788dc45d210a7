use thiserror::Error;

/// Process-wide error taxonomy. Components map their internal failures
/// onto these variants at their public boundaries.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("market not supported by source {source_name}: {ticker}")]
    MarketUnsupported { source_name: String, ticker: String },

    #[error("transient source error ({source_name}): {message}")]
    SourceTransient { source_name: String, message: String },

    #[error("all data sources exhausted for {ticker}: {attempts} attempted")]
    SourceExhausted { ticker: String, attempts: usize },

    #[error("circuit open for source {0}")]
    CircuitOpen(String),

    #[error("LLM rate limited (provider {provider}, key #{key_index})")]
    LlmRateLimited { provider: String, key_index: usize },

    #[error("LLM returned an unusable response: {0}")]
    LlmInvalidResponse(String),

    #[error("report parse failed: {0}")]
    Parse(String),

    #[error("ticker {ticker} already queued as task {existing_task_id}")]
    DuplicateSubmission { ticker: String, existing_task_id: String },

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl CoreError {
    /// Stable machine code surfaced in API bodies and task events.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "config_error",
            CoreError::MarketUnsupported { .. } => "market_unsupported",
            CoreError::SourceTransient { .. } => "source_transient",
            CoreError::SourceExhausted { .. } => "source_exhausted",
            CoreError::CircuitOpen(_) => "circuit_open",
            CoreError::LlmRateLimited { .. } => "llm_rate_limited",
            CoreError::LlmInvalidResponse(_) => "llm_invalid_response",
            CoreError::Parse(_) => "parse_error",
            CoreError::DuplicateSubmission { .. } => "duplicate_submission",
            CoreError::Cancelled(_) => "cancelled",
            CoreError::Persistence(_) => "persistence_error",
        }
    }

    pub fn failure_class(&self) -> FailureClass {
        match self {
            CoreError::Config(_) => FailureClass::Configuration,
            CoreError::SourceTransient { .. } => FailureClass::Transient,
            CoreError::MarketUnsupported { .. } | CoreError::CircuitOpen(_) => {
                FailureClass::Degraded
            }
            CoreError::LlmRateLimited { .. } => FailureClass::Transient,
            CoreError::SourceExhausted { .. }
            | CoreError::LlmInvalidResponse(_)
            | CoreError::Parse(_)
            | CoreError::Cancelled(_)
            | CoreError::Persistence(_) => FailureClass::FatalForItem,
            CoreError::DuplicateSubmission { .. } => FailureClass::Degraded,
        }
    }
}

/// How a failure is handled by the batch machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retried with backoff.
    Transient,
    /// Logged, continue with a fallback.
    Degraded,
    /// Surface to the operator and stop the process.
    Configuration,
    /// Record the failure for this ticker, continue the batch.
    FatalForItem,
    /// Abort the batch.
    FatalForBatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let err = CoreError::DuplicateSubmission {
            ticker: "AAPL".into(),
            existing_task_id: "t1".into(),
        };
        assert_eq!(err.code(), "duplicate_submission");
        assert_eq!(
            CoreError::SourceExhausted { ticker: "X".into(), attempts: 3 }.code(),
            "source_exhausted"
        );
    }

    #[test]
    fn history_exhaustion_is_fatal_for_item_only() {
        let err = CoreError::SourceExhausted { ticker: "600519".into(), attempts: 2 };
        assert_eq!(err.failure_class(), FailureClass::FatalForItem);
    }
}

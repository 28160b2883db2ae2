/// The classification of a single attempt's failure.
///
/// Mirrors the error kinds of §7: each variant carries just enough context
/// to decide whether (and how expensively) to retry, without leaking
/// transport-specific types into the dispatcher.
#[derive(Debug, thiserror::Error, Clone)]
pub enum AttemptError {
    /// The provider's error message matched a rate-limit pattern.
    #[error("rate limited by provider")]
    RateLimit,

    /// A non-rate-limit error field was present, or the HTTP status was not
    /// 2xx.
    #[error("provider API error: {message}")]
    Api { message: String, status: Option<u16> },

    /// The parsed `finish_reason` was in the configured bad set.
    #[error("invalid finish reason: {0}")]
    InvalidFinishReason(String),

    /// The response body did not conform to the requested schema.
    #[error("response did not match the requested schema: {0}")]
    SchemaMismatch(String),

    /// A read/connect timeout on the HTTP call. Retrying this costs two
    /// attempts instead of one (see SPEC_FULL.md §9).
    #[error("request timed out")]
    Timeout,

    /// Anything else: deserialize failures, connection resets, etc.
    #[error("request failed: {0}")]
    Other(String),
}

impl AttemptError {
    /// Attempts consumed from `attempts_left` when this error occurs.
    pub fn attempt_cost(&self) -> u32 {
        match self {
            AttemptError::Timeout => 2,
            _ => 1,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, AttemptError::RateLimit)
    }
}

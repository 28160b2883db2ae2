use curator_dispatch_core::AttemptError;

/// Failure modes a [`crate::ProviderAdapter`] can report for a single
/// attempt.
#[derive(Debug, thiserror::Error, Clone)]
pub enum ProviderError {
    #[error("rate limited by provider")]
    RateLimit,

    #[error("provider API error: {message}")]
    Api { message: String, status: Option<u16> },

    #[error("request timed out")]
    Timeout,

    #[error("provider call failed: {0}")]
    Other(String),
}

impl From<ProviderError> for AttemptError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::RateLimit => AttemptError::RateLimit,
            ProviderError::Api { message, status } => AttemptError::Api { message, status },
            ProviderError::Timeout => AttemptError::Timeout,
            ProviderError::Other(message) => AttemptError::Other(message),
        }
    }
}

use std::collections::HashSet;

use curator_dispatch_core::{TokenCount, TokenLimitStrategy};

/// Per-provider defaults used when neither a manual value nor a
/// header-probed value is available (§4.8, tier 3).
pub const DEFAULT_RPM: u32 = 3_000;
pub const DEFAULT_TPM: u32 = 250_000;
pub const DEFAULT_MAX_CONCURRENT: usize = 200;

/// Default soft cap on simultaneous HTTP calls inside one session.
const DEFAULT_MAX_BATCH: usize = 50;
const DEFAULT_MAX_RETRIES: u32 = 10;
const DEFAULT_SECONDS_TO_PAUSE_ON_RATE_LIMIT: u64 = 10;

/// Configuration for one dispatcher run.
///
/// Construct via [`DispatcherConfigBuilder`]; every field has a documented
/// default so `DispatcherConfigBuilder::default().build()` is a valid,
/// if conservative, configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub max_requests_per_minute: Option<u32>,
    pub max_tokens_per_minute: Option<TokenCount>,
    pub max_concurrent_requests: Option<usize>,
    pub max_batch: usize,
    pub max_retries: u32,
    pub seconds_to_pause_on_rate_limit: u64,
    pub invalid_finish_reasons: HashSet<String>,
    pub return_completions_object: bool,
    pub token_limit_strategy: TokenLimitStrategy,
}

/// Builder for [`DispatcherConfig`], mirroring the fluent, one-field-at-a-time
/// builders used elsewhere in this workspace for rate limiter and retry
/// configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfigBuilder {
    model: String,
    base_url: String,
    api_key: String,
    max_requests_per_minute: Option<u32>,
    max_tokens_per_minute: Option<TokenCount>,
    max_concurrent_requests: Option<usize>,
    max_batch: usize,
    max_retries: u32,
    seconds_to_pause_on_rate_limit: u64,
    invalid_finish_reasons: HashSet<String>,
    return_completions_object: bool,
    token_limit_strategy: TokenLimitStrategy,
}

impl Default for DispatcherConfigBuilder {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: String::new(),
            max_requests_per_minute: None,
            max_tokens_per_minute: None,
            max_concurrent_requests: None,
            max_batch: DEFAULT_MAX_BATCH,
            max_retries: DEFAULT_MAX_RETRIES,
            seconds_to_pause_on_rate_limit: DEFAULT_SECONDS_TO_PAUSE_ON_RATE_LIMIT,
            invalid_finish_reasons: ["content_filter".to_string()].into_iter().collect(),
            return_completions_object: false,
            token_limit_strategy: TokenLimitStrategy::Total,
        }
    }
}

impl DispatcherConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn max_requests_per_minute(mut self, value: u32) -> Self {
        self.max_requests_per_minute = Some(value);
        self
    }

    pub fn max_tokens_per_minute(mut self, value: TokenCount) -> Self {
        self.max_tokens_per_minute = Some(value);
        self
    }

    pub fn max_concurrent_requests(mut self, value: usize) -> Self {
        self.max_concurrent_requests = Some(value);
        self
    }

    pub fn max_batch(mut self, value: usize) -> Self {
        self.max_batch = value;
        self
    }

    pub fn max_retries(mut self, value: u32) -> Self {
        self.max_retries = value;
        self
    }

    pub fn seconds_to_pause_on_rate_limit(mut self, value: u64) -> Self {
        self.seconds_to_pause_on_rate_limit = value;
        self
    }

    pub fn invalid_finish_reasons(mut self, value: HashSet<String>) -> Self {
        self.invalid_finish_reasons = value;
        self
    }

    pub fn return_completions_object(mut self, value: bool) -> Self {
        self.return_completions_object = value;
        self
    }

    pub fn token_limit_strategy(mut self, value: TokenLimitStrategy) -> Self {
        self.token_limit_strategy = value;
        self
    }

    pub fn build(self) -> DispatcherConfig {
        DispatcherConfig {
            model: self.model,
            base_url: self.base_url,
            api_key: self.api_key,
            max_requests_per_minute: self.max_requests_per_minute,
            max_tokens_per_minute: self.max_tokens_per_minute,
            max_concurrent_requests: self.max_concurrent_requests,
            max_batch: self.max_batch,
            max_retries: self.max_retries,
            seconds_to_pause_on_rate_limit: self.seconds_to_pause_on_rate_limit,
            invalid_finish_reasons: self.invalid_finish_reasons,
            return_completions_object: self.return_completions_object,
            token_limit_strategy: self.token_limit_strategy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_builder_produces_usable_config() {
        let config = DispatcherConfigBuilder::default().build();
        assert_eq!(config.max_batch, DEFAULT_MAX_BATCH);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert!(config.invalid_finish_reasons.contains("content_filter"));
    }

    #[test]
    fn builder_overrides_apply() {
        let config = DispatcherConfigBuilder::new()
            .model("gpt-4o")
            .max_requests_per_minute(100)
            .token_limit_strategy(TokenLimitStrategy::Separated)
            .build();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_requests_per_minute, Some(100));
        assert_eq!(config.token_limit_strategy, TokenLimitStrategy::Separated);
    }
}

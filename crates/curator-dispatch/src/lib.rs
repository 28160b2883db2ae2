//! Drives a file of pre-formatted chat-completion requests to completion
//! under RPM/TPM/concurrency limits, with retries, rate-limit cool-down, and
//! an append-only response log that makes a run resumable.
//!
//! # Quick start
//!
//! ```no_run
//! # async fn example() -> anyhow::Result<()> {
//! use curator_dispatch::{run, DispatcherConfigBuilder};
//! use std::path::Path;
//!
//! let config = DispatcherConfigBuilder::default()
//!     .model("gpt-4o-mini")
//!     .api_key(std::env::var("OPENAI_API_KEY")?)
//!     .build();
//!
//! run(config, Path::new("requests_batch1.jsonl"), None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! This crate wires together the component crates of this workspace:
//! - [`curator_dispatch_capacity`] — leaky-bucket RPM/TPM admission
//! - [`curator_dispatch_status`] — run counters and the moving-average gauge
//! - [`curator_dispatch_log`] — the append-only response log and resume scan
//! - [`curator_dispatch_provider`] — the provider adapter trait and an
//!   OpenAI-compatible reference implementation
//! - [`curator_dispatch_retryqueue`] — the in-memory retry FIFO
//! - [`curator_dispatch_dispatcher`] — the scheduler itself

use std::path::Path;
use std::sync::Arc;

use curator_dispatch_dispatcher::DispatchError;
use curator_dispatch_log::{derive_output_path, scan_resume_set, ResponseLog};
use curator_dispatch_provider::{OpenAiAdapter, ProviderAdapter, CALL_TIMEOUT};

pub use curator_dispatch_core::{
    AttemptError, ChatMessage, DispatchEvent, EventListener, EventListeners, GenericRequest,
    GenericResponse, TokenCount, TokenLimitStrategy, TokenUsage,
};
pub use curator_dispatch_dispatcher::{
    resolve_limits, AttemptOutcome, Dispatcher, DispatcherConfig, DispatcherConfigBuilder,
    NoopValidator, ResolvedLimits, ResponseValidator,
};
pub use curator_dispatch_log::ResponseLog as Log;
pub use curator_dispatch_provider::{OpenAiAdapter as DefaultAdapter, ProviderError};
pub use curator_dispatch_retryqueue::AttemptState;
pub use curator_dispatch_status::{StatusSnapshot, StatusTracker};

/// Default chat-completions endpoint used when neither `--base-url` nor
/// `OPENAI_BASE_URL` is set.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";
/// Environment variable consulted when no API key is passed explicitly,
/// matching the original processor's OpenAI-vs-DeepSeek env var branch.
pub const API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";
/// Environment variable consulted when no base URL is passed explicitly.
pub const BASE_URL_ENV_VAR: &str = "OPENAI_BASE_URL";

/// Resolves an API key from an explicit value or the `OPENAI_API_KEY`
/// environment variable, in that order.
pub fn resolve_api_key(explicit: Option<String>) -> Option<String> {
    explicit
        .filter(|key| !key.is_empty())
        .or_else(|| std::env::var(API_KEY_ENV_VAR).ok())
}

/// Resolves a base URL from an explicit value, the `OPENAI_BASE_URL`
/// environment variable, or [`DEFAULT_BASE_URL`], in that order.
pub fn resolve_base_url(explicit: Option<String>) -> String {
    explicit
        .filter(|url| !url.is_empty())
        .or_else(|| std::env::var(BASE_URL_ENV_VAR).ok())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

/// Runs one full batch: scans `output_path` (or the path derived from
/// `input_path` when `output_path` is `None`) for already-completed rows,
/// resolves rate limits, and drives every remaining request in
/// `input_path` to completion.
///
/// Returns only once the first pass and the retry-drain loop have both
/// finished; per-request failures never surface here; they become
/// permanent-failure log records instead (see [`GenericResponse`]).
pub async fn run(
    config: DispatcherConfig,
    input_path: &Path,
    output_path: Option<&Path>,
) -> Result<(), DispatchError> {
    if config.api_key.is_empty() {
        return Err(DispatchError::MissingApiKey);
    }
    if tokio::fs::metadata(input_path).await.is_err() {
        return Err(DispatchError::InputNotFound(input_path.to_path_buf()));
    }

    let output_path = output_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| derive_output_path(input_path));

    #[cfg(feature = "tracing")]
    tracing::info!(
        input = %input_path.display(),
        output = %output_path.display(),
        "starting dispatch run"
    );

    let resume_set = scan_resume_set(&output_path)
        .await
        .map_err(|source| DispatchError::ResponseLog {
            path: output_path.clone(),
            source,
        })?;
    #[cfg(feature = "tracing")]
    tracing::info!(already_completed = resume_set.len(), "resume scan complete");

    let log = ResponseLog::open(&output_path)
        .await
        .map_err(|source| DispatchError::ResponseLog {
            path: output_path.clone(),
            source,
        })?;

    let adapter: Arc<dyn ProviderAdapter> =
        Arc::new(OpenAiAdapter::new(config.base_url.clone(), config.api_key.clone()));

    let probe_session = reqwest::Client::builder()
        .timeout(CALL_TIMEOUT)
        .build()
        .expect("building the rate-limit probe client cannot fail with this configuration");
    let limits = resolve_limits(&config, adapter.as_ref(), &probe_session).await;

    let dispatcher = Dispatcher::new(config, limits, adapter, log);
    dispatcher.run(input_path, &resume_set).await
}

//! curator-dispatch CLI - drives a file of pre-formatted chat-completion
//! requests to completion under RPM/TPM/concurrency limits.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use curator_dispatch::{resolve_api_key, resolve_base_url, run, DispatcherConfigBuilder};
use curator_dispatch_core::TokenLimitStrategy;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "curator-dispatch", version, about = "Dispatch a batch of chat-completion requests under rate limits")]
struct Cli {
    /// Path to the newline-delimited JSON file of requests.
    #[arg(long)]
    input: PathBuf,

    /// Path to write responses to. Defaults to `input` with its
    /// `requests_` segment replaced by `responses_`.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Model name sent in every request body.
    #[arg(long, default_value = "gpt-4o-mini")]
    model: String,

    /// Chat-completions endpoint. Falls back to `OPENAI_BASE_URL`, then
    /// the OpenAI default.
    #[arg(long)]
    base_url: Option<String>,

    /// API key. Falls back to `OPENAI_API_KEY`.
    #[arg(long)]
    api_key: Option<String>,

    /// Requests-per-minute budget. Auto-detected from provider headers
    /// when omitted.
    #[arg(long)]
    max_rpm: Option<u32>,

    /// Tokens-per-minute budget. Auto-detected from provider headers
    /// when omitted.
    #[arg(long)]
    max_tpm: Option<u64>,

    /// Maximum simultaneous in-flight HTTP calls.
    #[arg(long)]
    max_concurrent_requests: Option<usize>,

    /// Soft cap on live tasks kept in memory at once during scheduling.
    #[arg(long)]
    max_batch: Option<usize>,

    /// Total attempts minus one; a request is retried up to this many
    /// times before becoming a permanent failure.
    #[arg(long)]
    max_retries: Option<u32>,

    /// How long to pause admitting new requests after a rate-limit error.
    #[arg(long)]
    seconds_to_pause_on_rate_limit: Option<u64>,

    /// Log the full parsed response body instead of just the message
    /// content.
    #[arg(long)]
    return_completions_object: bool,

    /// Which token dimensions count against the TPM budget.
    #[arg(long, value_enum, default_value_t = TokenLimitStrategyArg::Total)]
    token_limit_strategy: TokenLimitStrategyArg,

    /// Verbose output (can be repeated: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TokenLimitStrategyArg {
    Total,
    InputOnly,
    Separated,
}

impl From<TokenLimitStrategyArg> for TokenLimitStrategy {
    fn from(arg: TokenLimitStrategyArg) -> Self {
        match arg {
            TokenLimitStrategyArg::Total => TokenLimitStrategy::Total,
            TokenLimitStrategyArg::InputOnly => TokenLimitStrategy::InputOnly,
            TokenLimitStrategyArg::Separated => TokenLimitStrategy::Separated,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let api_key = resolve_api_key(cli.api_key).context(
        "no API key provided: pass --api-key or set OPENAI_API_KEY",
    )?;
    let base_url = resolve_base_url(cli.base_url);

    let mut builder = DispatcherConfigBuilder::default()
        .model(cli.model)
        .base_url(base_url)
        .api_key(api_key)
        .return_completions_object(cli.return_completions_object)
        .token_limit_strategy(cli.token_limit_strategy.into());

    if let Some(rpm) = cli.max_rpm {
        builder = builder.max_requests_per_minute(rpm);
    }
    if let Some(tpm) = cli.max_tpm {
        builder = builder.max_tokens_per_minute(curator_dispatch_core::TokenCount::new(tpm, 0));
    }
    if let Some(value) = cli.max_concurrent_requests {
        builder = builder.max_concurrent_requests(value);
    }
    if let Some(value) = cli.max_batch {
        builder = builder.max_batch(value);
    }
    if let Some(value) = cli.max_retries {
        builder = builder.max_retries(value);
    }
    if let Some(value) = cli.seconds_to_pause_on_rate_limit {
        builder = builder.seconds_to_pause_on_rate_limit(value);
    }

    let config = builder.build();

    run(config, &cli.input, cli.output.as_deref())
        .await
        .context("dispatch run failed")?;

    Ok(())
}

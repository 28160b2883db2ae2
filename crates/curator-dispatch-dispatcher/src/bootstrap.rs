use curator_dispatch_core::TokenCount;
use curator_dispatch_provider::ProviderAdapter;

use crate::config::{DispatcherConfig, DEFAULT_MAX_CONCURRENT, DEFAULT_RPM, DEFAULT_TPM};

/// The resolved RPM/TPM/concurrency limits a dispatcher run will enforce.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedLimits {
    pub max_rpm: u32,
    pub max_tpm: TokenCount,
    pub max_concurrent_requests: usize,
}

/// Resolves RPM/TPM/concurrency in three tiers: manual configuration,
/// then the adapter's header-based probe, then a fixed default table.
/// Logs (at `info` for tiers 1-2, `warn` for the fallback default) which
/// tier was actually used, per §4.8.
pub async fn resolve_limits(
    config: &DispatcherConfig,
    adapter: &dyn ProviderAdapter,
    session: &reqwest::Client,
) -> ResolvedLimits {
    if let (Some(rpm), Some(tpm)) = (config.max_requests_per_minute, config.max_tokens_per_minute) {
        #[cfg(feature = "tracing")]
        tracing::info!(rpm, ?tpm, "rate limits manually set");
        return ResolvedLimits {
            max_rpm: rpm,
            max_tpm: tpm,
            max_concurrent_requests: config
                .max_concurrent_requests
                .unwrap_or(DEFAULT_MAX_CONCURRENT),
        };
    }

    let probed = adapter.probe_rate_limits(session).await;
    if let Some((probed_rpm, probed_tpm)) = probed.filter(|(r, t)| *r > 0 && *t > 0) {
        let max_rpm = config.max_requests_per_minute.unwrap_or(probed_rpm);
        let max_tpm = config
            .max_tokens_per_minute
            .unwrap_or_else(|| TokenCount::new(probed_tpm as u64, 0));
        #[cfg(feature = "tracing")]
        tracing::info!(max_rpm, ?max_tpm, "rate limits automatically set from headers");
        return ResolvedLimits {
            max_rpm,
            max_tpm,
            max_concurrent_requests: config
                .max_concurrent_requests
                .unwrap_or(DEFAULT_MAX_CONCURRENT),
        };
    }

    let max_rpm = config.max_requests_per_minute.unwrap_or(DEFAULT_RPM);
    let max_tpm = config
        .max_tokens_per_minute
        .unwrap_or_else(|| TokenCount::new(DEFAULT_TPM as u64, 0));
    let max_concurrent_requests = config
        .max_concurrent_requests
        .unwrap_or(DEFAULT_MAX_CONCURRENT);

    #[cfg(feature = "tracing")]
    tracing::warn!(
        max_rpm,
        ?max_tpm,
        max_concurrent_requests,
        "no manual or header-based rate limits available; falling back to defaults"
    );

    ResolvedLimits {
        max_rpm,
        max_tpm,
        max_concurrent_requests,
    }
}

use futures::future::BoxFuture;

use curator_dispatch_core::{ChatMessage, GenericRequest, TokenCount, TokenUsage};

use crate::error::ProviderError;

/// A provider-specific request body, opaque to the dispatcher.
#[derive(Debug, Clone)]
pub struct ProviderRequest(pub serde_json::Value);

/// The raw, decoded HTTP response: status plus parsed JSON body.
#[derive(Debug, Clone)]
pub struct RawHttpResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

/// A provider response, parsed into the fields the dispatcher cares about.
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub message: Option<serde_json::Value>,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
    pub cost: Option<f64>,
}

/// Everything the dispatcher needs from a chat-completion backend.
///
/// Object-safe: every `async fn` is expressed as a manually boxed future,
/// the same convention this workspace's `Service` implementations use for
/// their associated `Future` type, so that the dispatcher can hold
/// `Arc<dyn ProviderAdapter>` without a second trait-object layer.
pub trait ProviderAdapter: Send + Sync {
    /// Shapes a generic request into this provider's wire format. Pure.
    fn build(&self, generic: &GenericRequest) -> ProviderRequest;

    /// A conservative upper bound on tokens this request will consume.
    /// `output` is estimator-dependent; `0` when the estimator has no
    /// better guess than "unknown".
    fn estimate_tokens(&self, messages: &[ChatMessage]) -> TokenCount;

    /// Performs exactly one HTTP POST and returns the decoded body.
    fn call<'a>(
        &'a self,
        session: &'a reqwest::Client,
        provider_request: &'a ProviderRequest,
    ) -> BoxFuture<'a, Result<RawHttpResponse, ProviderError>>;

    /// Interprets a raw HTTP response, classifying rate-limit and API
    /// errors.
    fn parse(&self, raw: RawHttpResponse) -> Result<ParsedResponse, ProviderError>;

    /// A one-shot request used at startup to discover RPM/TPM limits from
    /// response headers, if the provider exposes them.
    fn probe_rate_limits<'a>(
        &'a self,
        session: &'a reqwest::Client,
    ) -> BoxFuture<'a, Option<(u32, u32)>>;
}

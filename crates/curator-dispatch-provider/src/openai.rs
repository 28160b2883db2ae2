use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};

use curator_dispatch_core::{ChatMessage, GenericRequest, TokenCount, TokenUsage};

use crate::adapter::{ParsedResponse, ProviderAdapter, ProviderRequest, RawHttpResponse};
use crate::error::ProviderError;

/// HTTP timeout applied to every call made through this adapter.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(1200);

/// A handful of characters per token, used as a conservative input-token
/// estimator when no tokenizer is available. Paired with a flat per-message
/// overhead, mirroring the original adapter's `4 tokens/message` fudge
/// factor for role/name framing.
const CHARS_PER_TOKEN: usize = 4;
const TOKENS_PER_MESSAGE_OVERHEAD: u64 = 4;

/// A chat-completions adapter for OpenAI and OpenAI-compatible (including
/// Azure OpenAI) endpoints.
///
/// Azure deployment URLs (containing `/deployments/`) authenticate with an
/// `api-key` header; every other endpoint uses `Authorization: Bearer`.
pub struct OpenAiAdapter {
    endpoint: String,
    api_key: String,
}

impl OpenAiAdapter {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    fn is_azure_deployment_url(&self) -> bool {
        self.endpoint.contains("/deployments")
    }

    fn authenticate(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.is_azure_deployment_url() {
            request.header("api-key", &self.api_key)
        } else {
            request.bearer_auth(&self.api_key)
        }
    }

    fn is_rate_limit_message(message: &str) -> bool {
        message.to_ascii_lowercase().contains("rate limit")
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn build(&self, generic: &GenericRequest) -> ProviderRequest {
        let messages: Vec<Value> = generic
            .messages
            .iter()
            .map(|m| {
                let mut obj = json!({ "role": m.role, "content": m.content });
                if let Some(name) = &m.name {
                    obj["name"] = json!(name);
                }
                obj
            })
            .collect();

        let mut body = json!({
            "model": generic.model,
            "messages": messages,
        });
        if let Value::Object(extra) = &generic.generation_params {
            if let Value::Object(body_map) = &mut body {
                for (key, value) in extra {
                    body_map.insert(key.clone(), value.clone());
                }
            }
        }
        ProviderRequest(body)
    }

    fn estimate_tokens(&self, messages: &[ChatMessage]) -> TokenCount {
        let input = messages.iter().fold(0u64, |acc, m| {
            let content_tokens = (m.content.chars().count() / CHARS_PER_TOKEN) as u64;
            acc + content_tokens + TOKENS_PER_MESSAGE_OVERHEAD
        });
        // Output tokens are unknowable without a max_tokens hint, which
        // build() has already folded into generation_params rather than
        // surfacing here; 0 signals "unknown" per the estimator contract.
        TokenCount::new(input, 0)
    }

    fn call<'a>(
        &'a self,
        session: &'a reqwest::Client,
        provider_request: &'a ProviderRequest,
    ) -> BoxFuture<'a, Result<RawHttpResponse, ProviderError>> {
        async move {
            let request = session.post(&self.endpoint).json(&provider_request.0);
            let request = self.authenticate(request);

            let response = request.send().await.map_err(|err| {
                if err.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Other(err.to_string())
                }
            })?;

            let status = response.status().as_u16();
            let body: Value = response
                .json()
                .await
                .map_err(|err| ProviderError::Other(err.to_string()))?;

            Ok(RawHttpResponse { status, body })
        }
        .boxed()
    }

    fn parse(&self, raw: RawHttpResponse) -> Result<ParsedResponse, ProviderError> {
        if let Some(error) = raw.body.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown provider error")
                .to_string();
            return Err(if Self::is_rate_limit_message(&message) {
                ProviderError::RateLimit
            } else {
                ProviderError::Api {
                    message,
                    status: Some(raw.status),
                }
            });
        }

        if !(200..300).contains(&raw.status) {
            return Err(ProviderError::Api {
                message: format!("unexpected HTTP status {}", raw.status),
                status: Some(raw.status),
            });
        }

        let choice = raw.body.get("choices").and_then(|c| c.get(0));
        let message = choice.and_then(|c| c.get("message")).cloned();
        let finish_reason = choice
            .and_then(|c| c.get("finish_reason"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let usage = raw.body.get("usage").and_then(|u| {
            Some(TokenUsage {
                prompt_tokens: u.get("prompt_tokens")?.as_u64()?,
                completion_tokens: u.get("completion_tokens")?.as_u64()?,
                total_tokens: u.get("total_tokens")?.as_u64()?,
            })
        });

        Ok(ParsedResponse {
            message,
            finish_reason,
            usage,
            cost: None,
        })
    }

    fn probe_rate_limits<'a>(
        &'a self,
        session: &'a reqwest::Client,
    ) -> BoxFuture<'a, Option<(u32, u32)>> {
        async move {
            let probe_body = json!({
                "model": "gpt-4o-mini",
                "messages": [{ "role": "user", "content": "hi" }],
                "max_tokens": 1,
            });
            let request = session.post(&self.endpoint).json(&probe_body);
            let request = self.authenticate(request);
            let response = request.send().await.ok()?;

            let headers = response.headers();
            let requests_limit = headers
                .get("x-ratelimit-limit-requests")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u32>().ok());
            let tokens_limit = headers
                .get("x-ratelimit-limit-tokens")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u32>().ok());

            match (requests_limit, tokens_limit) {
                (Some(r), Some(t)) => Some((r, t)),
                _ => None,
            }
        }
        .boxed()
    }
}

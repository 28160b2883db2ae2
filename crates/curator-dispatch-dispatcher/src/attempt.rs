use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use curator_dispatch_core::{
    AttemptError, DispatchEvent, EventListeners, GenericResponse, TokenCount, TokenUsage,
};
use curator_dispatch_log::ResponseLog;
use curator_dispatch_provider::ProviderAdapter;
use curator_dispatch_retryqueue::{AttemptState, RetryQueue};
use curator_dispatch_status::StatusTracker;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use crate::validator::ResponseValidator;

/// Everything a single attempt needs, shared (by `Arc`) across every task
/// spawned by the dispatcher for the lifetime of one run.
pub struct DispatchContext {
    pub adapter: Arc<dyn ProviderAdapter>,
    pub session: reqwest::Client,
    pub status: StatusTracker,
    pub log: ResponseLog,
    pub retry_queue: RetryQueue,
    pub inflight: Arc<Semaphore>,
    pub invalid_finish_reasons: HashSet<String>,
    pub return_completions_object: bool,
    pub validator: Arc<dyn ResponseValidator>,
    pub call_timeout: Duration,
    pub events: EventListeners,
    pub rate_limit_pause: Duration,
}

/// How one attempt ended, for the benefit of the caller's bookkeeping
/// (live-task-count tracking in the first-pass and retry-drain loops).
#[derive(Debug)]
pub enum AttemptOutcome {
    Succeeded,
    Retrying,
    PermanentlyFailed,
}

/// Runs the single-attempt lifecycle of §4.7: one HTTP call, its parsing
/// and validation, capacity reconciliation, and either a log write or a
/// re-enqueue onto the retry queue.
///
/// `outer_permit` is held for the duration of the attempt and released by
/// RAII drop when this function returns, regardless of outcome; the same
/// holds for the inner `inflight` permit acquired internally.
pub async fn execute_attempt(
    ctx: Arc<DispatchContext>,
    _outer_permit: OwnedSemaphorePermit,
    mut state: AttemptState,
    estimate: TokenCount,
) -> AttemptOutcome {
    let _inflight_permit = ctx
        .inflight
        .clone()
        .acquire_owned()
        .await
        .expect("inflight semaphore is never closed while a dispatcher run is active");

    let created_at = state.created_at;

    let result = run_call(&ctx, &state, estimate).await;

    match result {
        Ok((parsed_message, finish_reason, usage, cost, raw_body)) => {
            let actual = usage
                .map(|u| TokenCount::new(u.prompt_tokens, u.completion_tokens))
                .unwrap_or(TokenCount::ZERO);
            ctx.status.capacity().reconcile(estimate, actual);

            let response_message = if ctx.return_completions_object {
                Some(raw_body.clone())
            } else {
                parsed_message.as_ref().and_then(|m| m.get("content")).cloned()
            };

            let response = GenericResponse {
                response_message,
                response_errors: None,
                raw_request: state.provider_request.0.clone(),
                raw_response: Some(raw_body),
                generic_request: state.generic_request.clone(),
                created_at,
                finished_at: Utc::now(),
                token_usage: usage,
                response_cost: cost,
                finish_reason,
            };

            if let Err(err) = ctx.log.append(&response).await {
                #[cfg(feature = "tracing")]
                tracing::error!(?err, task_id = state.task_id, "failed to append response log entry");
            }

            ctx.status.record_success(
                usage.map(|u| u.completion_tokens as u32).unwrap_or(0),
            );
            ctx.events.emit(&DispatchEvent::Succeeded {
                task_id: state.task_id,
                timestamp: Instant::now(),
                attempts: state.errors.len() as u32 + 1,
            });
            AttemptOutcome::Succeeded
        }
        Err(error) => {
            ctx.status.record_attempt_error(&error);
            if error.is_rate_limit() {
                ctx.events.emit(&DispatchEvent::RateLimited {
                    timestamp: Instant::now(),
                    cool_down: ctx.rate_limit_pause,
                });
            }
            let cost = error.attempt_cost();
            state.record_error(error.to_string(), cost);

            #[cfg(feature = "tracing")]
            tracing::warn!(
                task_id = state.task_id,
                attempts_left = state.attempts_left,
                %error,
                "attempt failed"
            );

            if state.exhausted() {
                let response = GenericResponse {
                    response_message: None,
                    response_errors: Some(state.errors.clone()),
                    raw_request: state.provider_request.0.clone(),
                    raw_response: None,
                    generic_request: state.generic_request.clone(),
                    created_at,
                    finished_at: Utc::now(),
                    token_usage: None,
                    response_cost: None,
                    finish_reason: None,
                };
                if let Err(err) = ctx.log.append(&response).await {
                    #[cfg(feature = "tracing")]
                    tracing::error!(?err, task_id = state.task_id, "failed to append permanent-failure record");
                }
                ctx.status.record_failed();
                ctx.events.emit(&DispatchEvent::PermanentlyFailed {
                    task_id: state.task_id,
                    timestamp: Instant::now(),
                });
                AttemptOutcome::PermanentlyFailed
            } else {
                let task_id = state.task_id;
                let attempts_left = state.attempts_left;
                ctx.retry_queue.enqueue(state);
                ctx.events.emit(&DispatchEvent::Retrying {
                    task_id,
                    timestamp: Instant::now(),
                    attempts_left,
                });
                AttemptOutcome::Retrying
            }
        }
    }
}

type CallSuccess = (
    Option<serde_json::Value>,
    Option<String>,
    Option<TokenUsage>,
    Option<f64>,
    serde_json::Value,
);

async fn run_call(
    ctx: &DispatchContext,
    state: &AttemptState,
    _estimate: TokenCount,
) -> Result<CallSuccess, AttemptError> {
    let call = ctx.adapter.call(&ctx.session, &state.provider_request);
    let raw = match timeout(ctx.call_timeout, call).await {
        Ok(Ok(raw)) => raw,
        Ok(Err(provider_err)) => return Err(provider_err.into()),
        Err(_elapsed) => return Err(AttemptError::Timeout),
    };

    let raw_body = raw.body.clone();
    let parsed = ctx.adapter.parse(raw).map_err(AttemptError::from)?;

    if let Some(reason) = &parsed.finish_reason {
        if ctx.invalid_finish_reasons.contains(reason) {
            return Err(AttemptError::InvalidFinishReason(reason.clone()));
        }
    }

    if let (Some(schema), Some(message)) = (&state.generic_request.response_schema, &parsed.message) {
        if let Err(reason) = ctx.validator.validate(message, schema) {
            return Err(AttemptError::SchemaMismatch(reason));
        }
    }

    Ok((parsed.message, parsed.finish_reason, parsed.usage, parsed.cost, raw_body))
}

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use curator_dispatch_core::{DispatchEvent, EventListeners, GenericRequest, TokenCount};
use curator_dispatch_log::ResponseLog;
use curator_dispatch_provider::{ProviderAdapter, CALL_TIMEOUT};
use curator_dispatch_retryqueue::{AttemptState, RetryQueue, RetryQueueReceiver};
use curator_dispatch_status::StatusTracker;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::attempt::{execute_attempt, AttemptOutcome, DispatchContext};
use crate::bootstrap::ResolvedLimits;
use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::validator::{NoopValidator, ResponseValidator};

const CAPACITY_POLL_INTERVAL: Duration = Duration::from_millis(300);
const RETRY_QUEUE_WAIT: Duration = Duration::from_millis(500);

/// The admission/reservation/retry scheduler. One instance per run.
pub struct Dispatcher {
    config: DispatcherConfig,
    ctx: Arc<DispatchContext>,
    admission: Arc<Semaphore>,
    retry_receiver: RetryQueueReceiver,
    next_task_id: u64,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        limits: ResolvedLimits,
        adapter: Arc<dyn ProviderAdapter>,
        log: ResponseLog,
    ) -> Self {
        Self::with_validator(config, limits, adapter, log, Arc::new(NoopValidator))
    }

    pub fn with_validator(
        config: DispatcherConfig,
        limits: ResolvedLimits,
        adapter: Arc<dyn ProviderAdapter>,
        log: ResponseLog,
        validator: Arc<dyn ResponseValidator>,
    ) -> Self {
        let capacity = curator_dispatch_capacity::CapacityTracker::new(
            limits.max_rpm,
            limits.max_tpm,
            config.token_limit_strategy,
        );
        let status = StatusTracker::new(capacity);
        let session = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .expect("building the shared HTTP client cannot fail with this configuration");

        // max_concurrent_requests has already passed through the same
        // manual/header/default resolution as RPM/TPM (bootstrap::resolve_limits),
        // so it is always a concrete value by the time it reaches the semaphore.
        let admission = Arc::new(Semaphore::new(limits.max_concurrent_requests));
        let inflight = Arc::new(Semaphore::new(config.max_batch));
        let (retry_queue, retry_receiver) = RetryQueue::unbounded();

        let ctx = Arc::new(DispatchContext {
            adapter,
            session,
            status,
            log,
            retry_queue,
            inflight,
            invalid_finish_reasons: config.invalid_finish_reasons.clone(),
            return_completions_object: config.return_completions_object,
            validator,
            call_timeout: CALL_TIMEOUT,
            events: EventListeners::new(),
            rate_limit_pause: Duration::from_secs(config.seconds_to_pause_on_rate_limit),
        });

        Self {
            config,
            ctx,
            admission,
            retry_receiver,
            next_task_id: 0,
        }
    }

    pub fn status(&self) -> &StatusTracker {
        &self.ctx.status
    }

    /// Registers event listeners to notify at each lifecycle point (§4.7).
    /// Must be called before `run`; listeners added afterward would miss
    /// events already emitted by in-flight tasks.
    pub fn with_events(mut self, events: EventListeners) -> Self {
        if let Some(ctx) = Arc::get_mut(&mut self.ctx) {
            ctx.events = events;
        }
        self
    }

    fn allocate_task_id(&mut self) -> u64 {
        let id = self.next_task_id;
        self.next_task_id += 1;
        id
    }

    /// Polls `has_capacity` every 300ms until it's true, then sleeps out
    /// any remaining rate-limit cool-down window (§4.6 steps 5-6).
    async fn wait_for_admission(&self, estimate: Option<TokenCount>) {
        while !self.ctx.status.capacity().has_capacity(estimate) {
            tokio::time::sleep(CAPACITY_POLL_INTERVAL).await;
        }
        let pause = Duration::from_secs(self.config.seconds_to_pause_on_rate_limit);
        if let Some(remaining) = self.ctx.status.rate_limit_cooldown_remaining(pause) {
            tokio::time::sleep(remaining).await;
        }
    }

    /// Runs the full first-pass scan of `input_path` followed by the
    /// retry-drain loop. Requests whose `original_row_idx` appears in
    /// `resume_set` are skipped without admission.
    pub async fn run(mut self, input_path: &Path, resume_set: &HashSet<i64>) -> Result<(), DispatchError> {
        let file = match tokio::fs::File::open(input_path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(DispatchError::InputNotFound(input_path.to_path_buf()));
            }
            Err(err) => return Err(DispatchError::InputIo(err)),
        };

        let mut lines = BufReader::new(file).lines();
        let backpressure_bound = 3 * self.config.max_batch;
        let mut live: FuturesUnordered<JoinHandle<AttemptOutcome>> = FuturesUnordered::new();
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await.map_err(DispatchError::InputIo)? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }

            let outer_permit = Arc::clone(&self.admission)
                .acquire_owned()
                .await
                .expect("admission semaphore is never closed during a run");

            let generic: GenericRequest = serde_json::from_str(&line)
                .map_err(|source| DispatchError::MalformedRequest { line: line_no, source })?;

            if resume_set.contains(&generic.original_row_idx) {
                drop(outer_permit);
                continue;
            }

            self.admit_and_spawn(&mut live, outer_permit, generic).await;

            if live.len() >= backpressure_bound {
                live.next().await;
            }
        }

        while live.next().await.is_some() {}

        self.drain_retries().await;
        Ok(())
    }

    async fn admit_and_spawn(
        &mut self,
        live: &mut FuturesUnordered<JoinHandle<AttemptOutcome>>,
        outer_permit: tokio::sync::OwnedSemaphorePermit,
        generic: GenericRequest,
    ) {
        let provider_request = self.ctx.adapter.build(&generic);
        let estimate = self.ctx.adapter.estimate_tokens(&generic.messages);

        self.wait_for_admission(Some(estimate)).await;
        self.ctx.status.capacity().reserve(Some(estimate));

        let task_id = self.allocate_task_id();
        // Counted once per request, here at first admission, not inside
        // execute_attempt -- a retried request re-spawns execute_attempt
        // without passing through this method again.
        self.ctx.status.record_started();
        self.ctx.events.emit(&DispatchEvent::Admitted {
            task_id,
            timestamp: Instant::now(),
        });

        // attempts_left starts at max_retries + 1 so the total number of
        // attempts (initial + retries) never exceeds max_retries + 1 (§8
        // property 5), not max_retries.
        let state = AttemptState::new(task_id, generic, provider_request, self.config.max_retries + 1);
        let ctx = Arc::clone(&self.ctx);
        live.push(tokio::spawn(execute_attempt(ctx, outer_permit, state, estimate)));
    }

    async fn drain_retries(&mut self) {
        let mut live: FuturesUnordered<JoinHandle<AttemptOutcome>> = FuturesUnordered::new();

        loop {
            while !self.retry_receiver.is_empty() && live.len() < self.config.max_batch {
                let Some(state) = self.retry_receiver.try_dequeue() else {
                    break;
                };
                let outer_permit = Arc::clone(&self.admission)
                    .acquire_owned()
                    .await
                    .expect("admission semaphore is never closed during a run");

                let estimate = self.ctx.adapter.estimate_tokens(&state.generic_request.messages);
                self.wait_for_admission(Some(estimate)).await;
                self.ctx.status.capacity().reserve(Some(estimate));

                let ctx = Arc::clone(&self.ctx);
                live.push(tokio::spawn(execute_attempt(ctx, outer_permit, state, estimate)));
            }

            if live.is_empty() {
                if self.retry_receiver.is_empty() {
                    break;
                }
                // Queue non-empty but at the max_batch cap already reached
                // zero live tasks is impossible unless max_batch is zero;
                // guard against a degenerate configuration by waiting on
                // the queue directly instead of spinning.
                tokio::time::sleep(RETRY_QUEUE_WAIT).await;
                continue;
            }

            live.next().await;
        }
    }
}

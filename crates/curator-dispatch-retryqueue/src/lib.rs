//! The retry queue: an in-memory FIFO of [`AttemptState`]s whose most
//! recent attempt failed transiently.
//!
//! Backed by `tokio::sync::mpsc::unbounded_channel`. Unbounded because the
//! dispatcher's own outer admission semaphore already bounds the number of
//! requests that can be in flight (first attempt or retry) at once, so the
//! channel itself never needs its own backpressure; an `Arc<AtomicUsize>`
//! tracks its length since `UnboundedReceiver` does not expose one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use curator_dispatch_core::GenericRequest;
use curator_dispatch_provider::ProviderRequest;
use tokio::sync::mpsc;

/// One request's in-flight retry state. Created at admission; mutated only
/// by its owning task and the dispatcher when re-enqueued; destroyed on
/// terminal success or permanent failure.
#[derive(Debug)]
pub struct AttemptState {
    pub task_id: u64,
    pub generic_request: GenericRequest,
    pub provider_request: ProviderRequest,
    pub attempts_left: u32,
    pub created_at: DateTime<Utc>,
    pub errors: Vec<String>,
}

impl AttemptState {
    /// `attempts_allowed` is the total number of attempts (initial call
    /// plus retries) this request may make before becoming a permanent
    /// failure.
    pub fn new(
        task_id: u64,
        generic_request: GenericRequest,
        provider_request: ProviderRequest,
        attempts_allowed: u32,
    ) -> Self {
        Self {
            task_id,
            generic_request,
            provider_request,
            attempts_left: attempts_allowed,
            created_at: Utc::now(),
            errors: Vec::new(),
        }
    }

    pub fn record_error(&mut self, message: String, cost: u32) {
        self.errors.push(message);
        self.attempts_left = self.attempts_left.saturating_sub(cost);
    }

    pub fn exhausted(&self) -> bool {
        self.attempts_left == 0
    }
}

/// The sending half; cheap to clone, shared by every task that can produce
/// a transient failure.
#[derive(Clone)]
pub struct RetryQueue {
    sender: mpsc::UnboundedSender<AttemptState>,
    length: Arc<AtomicUsize>,
}

/// The receiving half; owned by the dispatcher's retry-drain loop.
pub struct RetryQueueReceiver {
    receiver: mpsc::UnboundedReceiver<AttemptState>,
    length: Arc<AtomicUsize>,
}

impl RetryQueue {
    pub fn unbounded() -> (RetryQueue, RetryQueueReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let length = Arc::new(AtomicUsize::new(0));
        (
            RetryQueue {
                sender,
                length: Arc::clone(&length),
            },
            RetryQueueReceiver { receiver, length },
        )
    }

    /// Enqueues `state`. Fails silently (the task is dropped) only if the
    /// receiver half has already been torn down, which only happens at
    /// process shutdown.
    pub fn enqueue(&self, state: AttemptState) {
        if self.sender.send(state).is_ok() {
            self.length.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn len(&self) -> usize {
        self.length.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RetryQueueReceiver {
    /// Awaits the next queued state, or `None` once every [`RetryQueue`]
    /// sender has been dropped.
    pub async fn dequeue(&mut self) -> Option<AttemptState> {
        let state = self.receiver.recv().await;
        if state.is_some() {
            self.length.fetch_sub(1, Ordering::SeqCst);
        }
        state
    }

    /// Non-blocking dequeue, used by the drain loop to pull work without
    /// waiting when it already knows the queue is non-empty.
    pub fn try_dequeue(&mut self) -> Option<AttemptState> {
        match self.receiver.try_recv() {
            Ok(state) => {
                self.length.fetch_sub(1, Ordering::SeqCst);
                Some(state)
            }
            Err(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.length.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curator_dispatch_core::ChatMessage;
    use serde_json::Value;

    fn sample_request() -> GenericRequest {
        GenericRequest {
            original_row_idx: 0,
            model: "gpt-4o-mini".into(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: "hi".into(),
                name: None,
            }],
            response_schema: None,
            generation_params: Value::Null,
        }
    }

    fn sample_state(task_id: u64) -> AttemptState {
        AttemptState::new(task_id, sample_request(), ProviderRequest(Value::Null), 3)
    }

    #[test]
    fn record_error_decrements_attempts_left_by_cost() {
        let mut state = sample_state(1);
        state.record_error("boom".into(), 1);
        assert_eq!(state.attempts_left, 2);
        assert!(!state.exhausted());

        state.record_error("timeout".into(), 2);
        assert_eq!(state.attempts_left, 0);
        assert!(state.exhausted());
    }

    #[test]
    fn attempts_left_never_underflows_past_zero() {
        let mut state = sample_state(1);
        state.attempts_left = 1;
        state.record_error("double timeout".into(), 2);
        assert_eq!(state.attempts_left, 0);
    }

    #[tokio::test]
    async fn enqueue_then_dequeue_preserves_fifo_order() {
        let (queue, mut receiver) = RetryQueue::unbounded();
        queue.enqueue(sample_state(1));
        queue.enqueue(sample_state(2));
        assert_eq!(queue.len(), 2);

        let first = receiver.dequeue().await.unwrap();
        assert_eq!(first.task_id, 1);
        assert_eq!(receiver.len(), 1);
        let second = receiver.dequeue().await.unwrap();
        assert_eq!(second.task_id, 2);
        assert_eq!(receiver.len(), 0);
    }

    #[test]
    fn try_dequeue_on_empty_queue_returns_none() {
        let (_queue, mut receiver) = RetryQueue::unbounded();
        assert!(receiver.try_dequeue().is_none());
    }
}

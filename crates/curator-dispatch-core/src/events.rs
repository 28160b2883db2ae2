//! Event system for observability.
//!
//! Shaped after the resilience-pattern event listeners used throughout this
//! workspace's ancestor crates: a simple `Vec<Arc<dyn EventListener>>` that
//! is notified synchronously. There's no async dispatch here -- listeners
//! are expected to be cheap (increment a counter, push to a log channel).

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One observable moment in the dispatcher's lifecycle.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// A request was admitted and its HTTP call is starting.
    Admitted { task_id: u64, timestamp: Instant },
    /// A request succeeded.
    Succeeded {
        task_id: u64,
        timestamp: Instant,
        attempts: u32,
    },
    /// A request failed on this attempt and will be retried.
    Retrying {
        task_id: u64,
        timestamp: Instant,
        attempts_left: u32,
    },
    /// A request exhausted all retries and was recorded as a permanent
    /// failure.
    PermanentlyFailed { task_id: u64, timestamp: Instant },
    /// A rate-limit error was observed; the dispatcher will cool down.
    RateLimited {
        timestamp: Instant,
        cool_down: Duration,
    },
}

/// Trait for listening to [`DispatchEvent`]s.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &DispatchEvent);
}

impl<F> EventListener for F
where
    F: Fn(&DispatchEvent) + Send + Sync,
{
    fn on_event(&self, event: &DispatchEvent) {
        self(event)
    }
}

/// A collection of event listeners, notified in registration order.
///
/// A panicking listener is caught so that one misbehaving listener cannot
/// prevent the others from observing the event.
#[derive(Clone, Default)]
pub struct EventListeners {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl fmt::Debug for EventListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("count", &self.listeners.len())
            .finish()
    }
}

impl EventListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    pub fn emit(&self, event: &DispatchEvent) {
        for listener in &self.listeners {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));
            if result.is_err() {
                #[cfg(feature = "tracing")]
                tracing::warn!("event listener panicked while handling {:?}", event);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

//! Run-level status: task counters, the rate-limit cooldown clock, and a
//! bounded moving average of completion tokens, wrapping a
//! [`curator_dispatch_capacity::CapacityTracker`].

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use curator_dispatch_capacity::CapacityTracker;
use curator_dispatch_core::AttemptError;
use serde::Serialize;

const OUTPUT_MVA_WINDOW: usize = 50;

#[derive(Debug, Default)]
struct Counters {
    started: u64,
    in_progress: u64,
    succeeded: u64,
    failed: u64,
    rate_limit_errors: u64,
    api_errors: u64,
    other_errors: u64,
    time_of_last_rate_limit_error: Option<Instant>,
    output_tokens_mva: VecDeque<u32>,
}

/// A point-in-time, `Clone + Serialize` view of run progress, suitable for
/// a renderer (progress bar, periodic log line, status endpoint).
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub started: u64,
    pub in_progress: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rate_limit_errors: u64,
    pub api_errors: u64,
    pub other_errors: u64,
    pub seconds_since_last_rate_limit_error: Option<f64>,
    pub avg_output_tokens: Option<f64>,
}

/// Wraps a [`CapacityTracker`] with the run's bookkeeping counters.
///
/// Cloning shares the same underlying state (both the counters and the
/// capacity tracker are reference-counted internally).
#[derive(Clone)]
pub struct StatusTracker {
    capacity: CapacityTracker,
    counters: std::sync::Arc<Mutex<Counters>>,
}

impl StatusTracker {
    pub fn new(capacity: CapacityTracker) -> Self {
        Self {
            capacity,
            counters: std::sync::Arc::new(Mutex::new(Counters::default())),
        }
    }

    pub fn capacity(&self) -> &CapacityTracker {
        &self.capacity
    }

    pub fn record_started(&self) {
        let mut c = self.counters.lock().unwrap();
        c.started += 1;
        c.in_progress += 1;
    }

    /// Folds a completed attempt's `completion_tokens` into the 50-sample
    /// moving average and decrements `in_progress`, then increments
    /// `succeeded`. Must be called after the attempt's capacity reservation
    /// has been reconciled.
    pub fn record_success(&self, completion_tokens: u32) {
        let mut c = self.counters.lock().unwrap();
        if c.output_tokens_mva.len() == OUTPUT_MVA_WINDOW {
            c.output_tokens_mva.pop_front();
        }
        c.output_tokens_mva.push_back(completion_tokens);
        c.in_progress -= 1;
        c.succeeded += 1;

        #[cfg(feature = "metrics")]
        metrics::counter!("dispatch_requests_succeeded_total").increment(1);
    }

    /// Records a single attempt's failure in the disjoint error buckets,
    /// without touching `in_progress` or `failed` (those only change once
    /// the request's retry budget is exhausted; see [`Self::record_failed`]).
    pub fn record_attempt_error(&self, error: &AttemptError) {
        let mut c = self.counters.lock().unwrap();
        if error.is_rate_limit() {
            c.rate_limit_errors += 1;
            c.time_of_last_rate_limit_error = Some(Instant::now());
        } else if matches!(error, AttemptError::Api { .. }) {
            c.api_errors += 1;
        } else {
            c.other_errors += 1;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(?error, "attempt error recorded");
    }

    /// Marks a request permanently failed after its retries are exhausted.
    pub fn record_failed(&self) {
        let mut c = self.counters.lock().unwrap();
        c.in_progress -= 1;
        c.failed += 1;
    }

    /// How long to sleep, if any, to respect `seconds_to_pause_on_rate_limit`
    /// since the last observed rate-limit error.
    pub fn rate_limit_cooldown_remaining(&self, pause: Duration) -> Option<Duration> {
        let c = self.counters.lock().unwrap();
        let last = c.time_of_last_rate_limit_error?;
        let elapsed = last.elapsed();
        if elapsed >= pause {
            None
        } else {
            Some(pause - elapsed)
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let c = self.counters.lock().unwrap();
        let avg_output_tokens = if c.output_tokens_mva.is_empty() {
            None
        } else {
            let sum: u64 = c.output_tokens_mva.iter().map(|&v| v as u64).sum();
            Some(sum as f64 / c.output_tokens_mva.len() as f64)
        };
        StatusSnapshot {
            started: c.started,
            in_progress: c.in_progress,
            succeeded: c.succeeded,
            failed: c.failed,
            rate_limit_errors: c.rate_limit_errors,
            api_errors: c.api_errors,
            other_errors: c.other_errors,
            seconds_since_last_rate_limit_error: c
                .time_of_last_rate_limit_error
                .map(|t| t.elapsed().as_secs_f64()),
            avg_output_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curator_dispatch_core::{TokenCount, TokenLimitStrategy};

    fn tracker() -> StatusTracker {
        StatusTracker::new(CapacityTracker::new(
            100,
            TokenCount::new(10_000, 0),
            TokenLimitStrategy::Total,
        ))
    }

    #[test]
    fn started_then_succeeded_keeps_in_progress_at_zero() {
        let status = tracker();
        status.record_started();
        assert_eq!(status.snapshot().in_progress, 1);
        status.record_success(42);
        let snap = status.snapshot();
        assert_eq!(snap.in_progress, 0);
        assert_eq!(snap.succeeded, 1);
        assert_eq!(snap.avg_output_tokens, Some(42.0));
    }

    #[test]
    fn error_buckets_are_disjoint() {
        let status = tracker();
        status.record_attempt_error(&AttemptError::RateLimit);
        status.record_attempt_error(&AttemptError::Api {
            message: "boom".into(),
            status: Some(500),
        });
        status.record_attempt_error(&AttemptError::Timeout);

        let snap = status.snapshot();
        assert_eq!(snap.rate_limit_errors, 1);
        assert_eq!(snap.api_errors, 1);
        assert_eq!(snap.other_errors, 1);
    }

    #[test]
    fn rate_limit_sets_cooldown_clock() {
        let status = tracker();
        assert!(status
            .rate_limit_cooldown_remaining(Duration::from_secs(10))
            .is_none());
        status.record_attempt_error(&AttemptError::RateLimit);
        let remaining = status
            .rate_limit_cooldown_remaining(Duration::from_secs(10))
            .expect("cooldown should be active immediately after a rate-limit error");
        assert!(remaining <= Duration::from_secs(10));
    }

    #[test]
    fn moving_average_window_is_capped_at_fifty() {
        let status = tracker();
        for i in 0..60u32 {
            status.record_started();
            status.record_success(i);
        }
        // Average of the last 50 values 10..=59 is 34.5.
        let snap = status.snapshot();
        assert_eq!(snap.succeeded, 60);
        assert!((snap.avg_output_tokens.unwrap() - 34.5).abs() < 1e-9);
    }

    #[test]
    fn monotone_counters_invariant() {
        let status = tracker();
        for _ in 0..3 {
            status.record_started();
        }
        status.record_success(1);
        status.record_failed();
        let snap = status.snapshot();
        assert!(snap.succeeded + snap.failed <= snap.started);
    }
}

//! A dual leaky-bucket capacity tracker for requests-per-minute (RPM) and
//! tokens-per-minute (TPM).
//!
//! Shaped after the fixed-window rate limiter state machine used elsewhere
//! in this workspace's lineage (a plain struct mutated under one
//! [`std::sync::Mutex`], never held across an `.await`), but generalized to
//! two independently-leaking buckets with a reserve/reconcile protocol
//! instead of a single "acquire a permit" call: the caller reserves a
//! conservative upper-bound estimate before making an HTTP call, then
//! reconciles it against the actual usage once the response is known.

use std::sync::Mutex;
use std::time::Instant;

use curator_dispatch_core::{TokenCount, TokenLimitStrategy};

#[cfg(feature = "metrics")]
use metrics::gauge;

/// Available token credit, tracked as floats so that sub-second leak
/// increments aren't lost to integer truncation.
#[derive(Debug, Clone, Copy, Default)]
struct FloatTokens {
    input: f64,
    output: f64,
}

#[derive(Debug)]
struct CapacityInner {
    max_rpm: f64,
    max_tpm: TokenCount,
    strategy: TokenLimitStrategy,
    available_requests: f64,
    available_tokens: FloatTokens,
    pending_reservations: TokenCount,
    last_leak: Instant,
}

impl CapacityInner {
    fn leak(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_leak).as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }
        self.last_leak = now;

        self.available_requests = (self.available_requests + self.max_rpm * elapsed / 60.0)
            .min(self.max_rpm);

        match self.strategy {
            TokenLimitStrategy::Total => {
                let cap = self.max_tpm.total() as f64;
                self.available_tokens.input =
                    (self.available_tokens.input + cap * elapsed / 60.0).min(cap);
            }
            TokenLimitStrategy::InputOnly => {
                let cap = self.max_tpm.input as f64;
                self.available_tokens.input =
                    (self.available_tokens.input + cap * elapsed / 60.0).min(cap);
            }
            TokenLimitStrategy::Separated => {
                let cap_in = self.max_tpm.input as f64;
                let cap_out = self.max_tpm.output as f64;
                self.available_tokens.input =
                    (self.available_tokens.input + cap_in * elapsed / 60.0).min(cap_in);
                self.available_tokens.output =
                    (self.available_tokens.output + cap_out * elapsed / 60.0).min(cap_out);
            }
        }
    }

    fn fits(&self, estimate: &TokenCount) -> bool {
        match self.strategy {
            TokenLimitStrategy::Total => self.available_tokens.input >= estimate.total() as f64,
            TokenLimitStrategy::InputOnly => self.available_tokens.input >= estimate.input as f64,
            TokenLimitStrategy::Separated => {
                self.available_tokens.input >= estimate.input as f64
                    && self.available_tokens.output >= estimate.output as f64
            }
        }
    }

    fn debit_tokens(&mut self, estimate: &TokenCount) {
        match self.strategy {
            TokenLimitStrategy::Total => {
                self.available_tokens.input -= estimate.total() as f64;
            }
            TokenLimitStrategy::InputOnly => {
                self.available_tokens.input -= estimate.input as f64;
            }
            TokenLimitStrategy::Separated => {
                self.available_tokens.input -= estimate.input as f64;
                self.available_tokens.output -= estimate.output as f64;
            }
        }
    }

    fn credit_tokens(&mut self, credit: &TokenCount) {
        match self.strategy {
            TokenLimitStrategy::Total => {
                let cap = self.max_tpm.total() as f64;
                self.available_tokens.input =
                    (self.available_tokens.input + credit.total() as f64).min(cap);
            }
            TokenLimitStrategy::InputOnly => {
                let cap = self.max_tpm.input as f64;
                self.available_tokens.input =
                    (self.available_tokens.input + credit.input as f64).min(cap);
            }
            TokenLimitStrategy::Separated => {
                let cap_in = self.max_tpm.input as f64;
                let cap_out = self.max_tpm.output as f64;
                self.available_tokens.input =
                    (self.available_tokens.input + credit.input as f64).min(cap_in);
                self.available_tokens.output =
                    (self.available_tokens.output + credit.output as f64).min(cap_out);
            }
        }
    }
}

/// A snapshot of the currently available capacity, for observability.
#[derive(Debug, Clone, Copy)]
pub struct CapacitySnapshot {
    pub available_requests: f64,
    pub available_input_tokens: f64,
    pub available_output_tokens: f64,
    pub pending_reservations: TokenCount,
}

/// Shared, clonable handle to a run's RPM/TPM capacity state.
///
/// Cloning is cheap (an `Arc` under the hood); all clones observe and
/// mutate the same underlying buckets.
#[derive(Clone)]
pub struct CapacityTracker {
    inner: std::sync::Arc<Mutex<CapacityInner>>,
}

impl CapacityTracker {
    pub fn new(max_rpm: u32, max_tpm: TokenCount, strategy: TokenLimitStrategy) -> Self {
        Self {
            inner: std::sync::Arc::new(Mutex::new(CapacityInner {
                max_rpm: max_rpm as f64,
                max_tpm,
                strategy,
                available_requests: max_rpm as f64,
                available_tokens: match strategy {
                    TokenLimitStrategy::Total => FloatTokens {
                        input: max_tpm.total() as f64,
                        output: 0.0,
                    },
                    TokenLimitStrategy::InputOnly => FloatTokens {
                        input: max_tpm.input as f64,
                        output: 0.0,
                    },
                    TokenLimitStrategy::Separated => FloatTokens {
                        input: max_tpm.input as f64,
                        output: max_tpm.output as f64,
                    },
                },
                pending_reservations: TokenCount::ZERO,
                last_leak: Instant::now(),
            })),
        }
    }

    /// Leaks both buckets forward to `now`, then reports whether one
    /// request slot and (if `estimate` is given) enough tokens are
    /// available.
    pub fn has_capacity(&self, estimate: Option<TokenCount>) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.leak(Instant::now());
        if inner.available_requests < 1.0 {
            return false;
        }
        match estimate {
            Some(estimate) => inner.fits(&estimate),
            None => true,
        }
    }

    /// Debits one request slot and (if present) the token estimate.
    ///
    /// Callers must only invoke this after `has_capacity` most recently
    /// returned `true` for the same estimate; debug builds assert this.
    pub fn reserve(&self, estimate: Option<TokenCount>) {
        let mut inner = self.inner.lock().unwrap();
        debug_assert!(
            inner.available_requests >= 1.0 - 1e-9,
            "reserve() called without available request capacity"
        );
        inner.available_requests -= 1.0;
        if let Some(estimate) = estimate {
            inner.debit_tokens(&estimate);
            inner.pending_reservations = inner.pending_reservations + estimate;
        }

        #[cfg(feature = "metrics")]
        {
            gauge!("dispatch_capacity_available_requests").set(inner.available_requests);
        }
    }

    /// Credits back `max(reserved - actual, 0)` element-wise and reduces
    /// `pending_reservations` by `reserved`.
    pub fn reconcile(&self, reserved: TokenCount, actual: TokenCount) {
        let mut inner = self.inner.lock().unwrap();
        let credit = reserved.saturating_sub(&actual);
        inner.pending_reservations = inner.pending_reservations.saturating_sub(&reserved);
        inner.credit_tokens(&credit);

        #[cfg(feature = "tracing")]
        tracing::debug!(?reserved, ?actual, ?credit, "reconciled token reservation");
    }

    pub fn snapshot(&self) -> CapacitySnapshot {
        let inner = self.inner.lock().unwrap();
        CapacitySnapshot {
            available_requests: inner.available_requests,
            available_input_tokens: inner.available_tokens.input,
            available_output_tokens: inner.available_tokens.output,
            pending_reservations: inner.pending_reservations,
        }
    }
}

//! The dispatcher: admits requests under a leaky-bucket RPM/TPM budget and
//! a concurrency cap, drives each to completion with retries, and persists
//! every terminal outcome to an append-only log.

mod attempt;
mod bootstrap;
mod config;
mod dispatcher;
mod error;
mod validator;

pub use attempt::{AttemptOutcome, DispatchContext};
pub use bootstrap::{resolve_limits, ResolvedLimits};
pub use config::{DispatcherConfig, DispatcherConfigBuilder, DEFAULT_MAX_CONCURRENT, DEFAULT_RPM, DEFAULT_TPM};
pub use dispatcher::Dispatcher;
pub use error::DispatchError;
pub use validator::{NoopValidator, ResponseValidator};

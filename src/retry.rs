//! Bounded retry for transient work.
//!
//! A [`RetryPolicy`] is resolved from a module's options (`retry`,
//! `retry_delay`, `debug`) plus call-site overrides, then turned into one of
//! two adapters:
//!
//! - [`BlockingRetry`] for plain closures, sleeping the worker thread between
//!   attempts
//! - [`AsyncRetry`] for closures returning futures, suspending on
//!   `tokio::time::sleep` between attempts
//!
//! Neither adapter raises once attempts run out. The caller receives
//! [`RetryOutcome::Exhausted`] and decides how to surface it.

use crate::config::ModuleOptions;
use std::fmt;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Receives progress messages while a call is being retried
pub trait RetrySink: Send + Sync {
    fn report(&self, message: &str);
}

/// Values that can count as "nothing came back".
///
/// An empty value consumes an attempt exactly like an error does.
pub trait RetryValue {
    fn is_empty_result(&self) -> bool {
        false
    }
}

impl RetryValue for () {}

impl RetryValue for String {
    fn is_empty_result(&self) -> bool {
        self.trim().is_empty()
    }
}

impl RetryValue for &str {
    fn is_empty_result(&self) -> bool {
        self.trim().is_empty()
    }
}

impl<T> RetryValue for Vec<T> {
    fn is_empty_result(&self) -> bool {
        self.is_empty()
    }
}

impl<T> RetryValue for Option<T> {
    fn is_empty_result(&self) -> bool {
        self.is_none()
    }
}

impl RetryValue for serde_json::Value {
    fn is_empty_result(&self) -> bool {
        match self {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.is_empty(),
            serde_json::Value::Array(a) => a.is_empty(),
            serde_json::Value::Object(o) => o.is_empty(),
            _ => false,
        }
    }
}

/// Result of a retried call
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T> {
    Success(T),
    Exhausted {
        attempts: u32,
        last_error: Option<String>,
    },
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_exhausted(&self) -> bool {
        !self.is_success()
    }

    /// Collapse to `None` on exhaustion
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Exhausted { .. } => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RetryOutcome<U> {
        match self {
            Self::Success(value) => RetryOutcome::Success(f(value)),
            Self::Exhausted {
                attempts,
                last_error,
            } => RetryOutcome::Exhausted {
                attempts,
                last_error,
            },
        }
    }
}

/// Call-site values that take precedence over module options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryOverrides {
    pub attempts: Option<u32>,
    pub delay: Option<Duration>,
    pub debug: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub debug: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            debug: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            debug: false,
        }
    }

    /// Resolve from module options, then apply overrides on top
    pub fn resolve(options: Option<&ModuleOptions>, overrides: &RetryOverrides) -> Self {
        let mut policy = Self::default();

        if let Some(options) = options {
            if let Some(attempts) = options.retry() {
                policy.max_attempts = attempts;
            }
            if let Some(delay) = options.retry_delay() {
                policy.delay = delay;
            }
            if let Some(debug) = options.debug() {
                policy.debug = debug;
            }
        }

        if let Some(attempts) = overrides.attempts {
            policy.max_attempts = attempts;
        }
        if let Some(delay) = overrides.delay {
            policy.delay = delay;
        }
        if let Some(debug) = overrides.debug {
            policy.debug = debug;
        }

        // A policy always runs the work at least once
        policy.max_attempts = policy.max_attempts.max(1);
        policy
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Wrap a blocking closure
    pub fn blocking<'s, F>(&self, f: F) -> BlockingRetry<'s, F> {
        BlockingRetry {
            policy: self.clone(),
            label: "retry".to_string(),
            sink: None,
            f,
        }
    }

    /// Wrap a closure that returns a future
    pub fn future<'s, F>(&self, f: F) -> AsyncRetry<'s, F> {
        AsyncRetry {
            policy: self.clone(),
            label: "retry".to_string(),
            sink: None,
            f,
        }
    }
}

/// Attempt bookkeeping for one wrapped call
struct RetryState<'a> {
    policy: &'a RetryPolicy,
    label: &'a str,
    sink: Option<&'a dyn RetrySink>,
    attempt: u32,
}

impl<'a> RetryState<'a> {
    fn new(policy: &'a RetryPolicy, label: &'a str, sink: Option<&'a dyn RetrySink>) -> Self {
        Self {
            policy,
            label,
            sink,
            attempt: 0,
        }
    }

    /// Record a failed attempt. Returns the delay before the next attempt,
    /// or the final outcome when none remain.
    fn fail<T>(&mut self, reason: String) -> Result<Duration, RetryOutcome<T>> {
        self.attempt += 1;

        if self.attempt >= self.policy.max_attempts {
            log::warn!(
                "{}: giving up after {} attempt(s): {}",
                self.label,
                self.attempt,
                reason
            );
            return Err(RetryOutcome::Exhausted {
                attempts: self.attempt,
                last_error: Some(reason),
            });
        }

        let message = format!(
            "{}: attempt {}/{} failed ({}), retrying in {:.1}s",
            self.label,
            self.attempt,
            self.policy.max_attempts,
            reason,
            self.policy.delay.as_secs_f64()
        );
        log::debug!("{}", message);

        if self.policy.debug {
            if let Some(sink) = self.sink {
                sink.report(&message);
            }
        }

        Ok(self.policy.delay)
    }

    fn succeed<T>(&self, value: T) -> RetryOutcome<T> {
        if self.attempt > 0 {
            log::debug!("{}: succeeded after {} retries", self.label, self.attempt);
        }
        RetryOutcome::Success(value)
    }
}

fn classify<T: RetryValue, E: fmt::Display>(result: Result<T, E>) -> Result<T, String> {
    match result {
        Ok(value) if value.is_empty_result() => Err("empty result".to_string()),
        Ok(value) => Ok(value),
        Err(e) => Err(e.to_string()),
    }
}

/// Retry adapter for blocking work
pub struct BlockingRetry<'s, F> {
    policy: RetryPolicy,
    label: String,
    sink: Option<&'s dyn RetrySink>,
    f: F,
}

impl<'s, F> BlockingRetry<'s, F> {
    /// Label used in log lines and progress messages
    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_sink(mut self, sink: &'s dyn RetrySink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn call<T, E>(&self) -> RetryOutcome<T>
    where
        F: Fn() -> Result<T, E>,
        T: RetryValue,
        E: fmt::Display,
    {
        let mut state = RetryState::new(&self.policy, &self.label, self.sink);
        loop {
            match classify((self.f)()) {
                Ok(value) => return state.succeed(value),
                Err(reason) => match state.fail(reason) {
                    Ok(delay) => {
                        if !delay.is_zero() {
                            std::thread::sleep(delay);
                        }
                    }
                    Err(outcome) => return outcome,
                },
            }
        }
    }
}

/// Retry adapter for async work
pub struct AsyncRetry<'s, F> {
    policy: RetryPolicy,
    label: String,
    sink: Option<&'s dyn RetrySink>,
    f: F,
}

impl<'s, F> AsyncRetry<'s, F> {
    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_sink(mut self, sink: &'s dyn RetrySink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn call<T, E, Fut>(&self) -> RetryOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: RetryValue,
        E: fmt::Display,
    {
        let mut state = RetryState::new(&self.policy, &self.label, self.sink);
        loop {
            match classify((self.f)().await) {
                Ok(value) => return state.succeed(value),
                Err(reason) => match state.fail(reason) {
                    Ok(delay) => {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                    Err(outcome) => return outcome,
                },
            }
        }
    }
}

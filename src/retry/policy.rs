//! Retry policy and executor.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default maximum number of attempts.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry, in milliseconds.
const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Default multiplier applied to the delay after each failed attempt.
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Upper bound on a grown backoff delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// Classification of a failed unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The request timed out.
    Timeout,
    /// Connection refused, reset or otherwise broken.
    Connection,
    /// The server answered with a 5xx status.
    ServerError,
    /// The server answered with 429.
    RateLimited,
    /// The server answered with a non-retryable 4xx status.
    ClientError,
    /// The payload did not have the expected shape.
    MalformedResponse,
    /// Local IO failure.
    Io,
}

impl FailureKind {
    /// Kinds retried by [`RetryPolicy::default`].
    pub fn transient() -> HashSet<FailureKind> {
        [
            FailureKind::Timeout,
            FailureKind::Connection,
            FailureKind::ServerError,
            FailureKind::RateLimited,
        ]
        .into_iter()
        .collect()
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Connection => write!(f, "connection"),
            FailureKind::ServerError => write!(f, "server_error"),
            FailureKind::RateLimited => write!(f, "rate_limited"),
            FailureKind::ClientError => write!(f, "client_error"),
            FailureKind::MalformedResponse => write!(f, "malformed_response"),
            FailureKind::Io => write!(f, "io"),
        }
    }
}

/// Errors that know their own [`FailureKind`].
pub trait Classify {
    fn failure_kind(&self) -> FailureKind;
}

/// A successful result together with the number of attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// The last error of a retry sequence, annotated with the attempt count.
#[derive(Debug, Error)]
#[error("{error} (kind={kind}, attempts={attempts})")]
pub struct RetryError<E: std::fmt::Display + std::fmt::Debug> {
    pub error: E,
    pub kind: FailureKind,
    pub attempts: u32,
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(rename = "base_delay_ms", with = "duration_ms")]
    pub base_delay: Duration,
    /// Multiplier applied to the delay after every failed attempt.
    pub backoff_multiplier: f64,
    /// Failure kinds that trigger another attempt.
    #[serde(rename = "retryable_error_kinds")]
    pub retryable: HashSet<FailureKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            retryable: FailureKind::transient(),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sets the maximum number of attempts (clamped to at least 1).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Replaces the set of retryable failure kinds.
    pub fn with_retryable(mut self, kinds: impl IntoIterator<Item = FailureKind>) -> Self {
        self.retryable = kinds.into_iter().collect();
        self
    }

    /// Checks the policy invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(format!(
                "backoff_multiplier must be a finite number >= 1, got {}",
                self.backoff_multiplier
            ));
        }
        Ok(())
    }

    /// Returns true if `kind` is retried by this policy.
    pub fn is_retryable(&self, kind: FailureKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// Growth saturates at [`MAX_RETRY_DELAY`], or at `base_delay` when that
    /// is already larger.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let cap = self.base_delay.max(MAX_RETRY_DELAY);
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let secs = self.base_delay.as_secs_f64() * factor;
        if secs.is_finite() && secs <= cap.as_secs_f64() {
            self.base_delay.mul_f64(factor).min(cap)
        } else {
            cap
        }
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// attempts are exhausted.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn execute<T, E, F, Fut>(&self, mut op: F) -> Result<Attempted<T>, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + std::fmt::Display + std::fmt::Debug,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempts = attempt, "Operation succeeded after retry");
                    }
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    });
                }
                Err(error) => {
                    let kind = error.failure_kind();

                    if !self.is_retryable(kind) || attempt >= max_attempts {
                        return Err(RetryError {
                            error,
                            kind,
                            attempts: attempt,
                        });
                    }

                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        kind = %kind,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

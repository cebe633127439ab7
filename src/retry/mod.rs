//! Bounded retry with exponential backoff, and batch fan-out built on it.
//!
//! A [`RetryPolicy`] is an explicit object invoked around a unit of work.
//! Errors are classified through the [`Classify`] trait so the policy can
//! tell transient failures (timeouts, 5xx, connection resets) from permanent
//! ones (malformed payloads, 4xx).
//!
//! ```rust,ignore
//! let policy = RetryPolicy::default().with_max_attempts(3);
//! let fetched = policy.execute(|_attempt| source.fetch_json(&url)).await?;
//! println!("took {} attempt(s)", fetched.attempts);
//! ```

mod batch;
mod policy;

pub use batch::{fan_out, BatchOutcome, CancelSignal, ItemFailure, ItemSuccess};
pub use policy::{Attempted, Classify, FailureKind, RetryError, RetryPolicy, MAX_RETRY_DELAY};

//! Batch fan-out over many independent items.
//!
//! Every item gets its own retry sequence; one item exhausting its attempts
//! never stops the others. Concurrency is bounded by a semaphore and results
//! are collected one slot per item index.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::ExtractionError;

use super::policy::{Classify, FailureKind, RetryPolicy};

/// Cooperative cancellation flag for long-running fan-outs.
///
/// Cancelling stops new items from being scheduled; items already running
/// finish their retry sequence normally.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An item that produced a value.
#[derive(Debug, Clone)]
pub struct ItemSuccess<T> {
    pub index: usize,
    pub item: String,
    pub value: T,
    pub attempts: u32,
}

/// An item whose retry sequence ended in an error.
#[derive(Debug)]
pub struct ItemFailure<E> {
    pub index: usize,
    pub item: String,
    pub error: E,
    pub kind: FailureKind,
    pub attempts: u32,
}

enum Slot<T, E> {
    Done(ItemSuccess<T>),
    Failed(ItemFailure<E>),
    Cancelled(usize, String),
}

/// Mixed result of a fan-out, ordered by item index.
#[derive(Debug)]
pub struct BatchOutcome<T, E> {
    pub successes: Vec<ItemSuccess<T>>,
    pub failures: Vec<ItemFailure<E>>,
    /// Items never started because the fan-out was cancelled.
    pub cancelled: Vec<String>,
}

impl<T, E> BatchOutcome<T, E> {
    /// Total number of items submitted.
    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len() + self.cancelled.len()
    }

    /// Returns true if every item succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.cancelled.is_empty()
    }

    /// Returns true if some item failed with a malformed payload.
    pub fn has_schema_error(&self) -> bool {
        self.failures
            .iter()
            .any(|f| f.kind == FailureKind::MalformedResponse)
    }
}

impl<T, E: std::fmt::Display> BatchOutcome<T, E> {
    /// Turns the outcome into an error if the batch as a whole failed.
    ///
    /// A batch fails when no item succeeded or when any item hit a
    /// non-retryable schema error. Partial success is returned as-is for the
    /// caller to inspect.
    pub fn into_result(self) -> Result<Self, ExtractionError> {
        let total = self.total();
        if total == 0 {
            return Ok(self);
        }

        if let Some(schema) = self
            .failures
            .iter()
            .find(|f| f.kind == FailureKind::MalformedResponse)
        {
            return Err(ExtractionError::Batch {
                succeeded: self.successes.len(),
                total,
                message: format!("schema error in '{}': {}", schema.item, schema.error),
            });
        }

        if self.successes.is_empty() {
            let message = self
                .failures
                .first()
                .map(|f| format!("first failure '{}': {}", f.item, f.error))
                .unwrap_or_else(|| "all items cancelled".to_string());
            return Err(ExtractionError::Batch {
                succeeded: 0,
                total,
                message,
            });
        }

        Ok(self)
    }
}

/// Runs `op` for every item with at most `concurrency` items in flight.
///
/// Each item is wrapped independently by `policy`.
pub async fn fan_out<T, E, F, Fut>(
    items: Vec<String>,
    concurrency: usize,
    policy: &RetryPolicy,
    cancel: &CancelSignal,
    op: F,
) -> BatchOutcome<T, E>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + std::fmt::Display + std::fmt::Debug,
{
    let total = items.len();
    let limiter = Semaphore::new(concurrency.max(1));
    let op = &op;
    let limiter = &limiter;

    info!(items = total, concurrency = concurrency.max(1), "Starting batch fan-out");

    let futures = items.into_iter().enumerate().map(|(index, item)| async move {
        let _permit = match limiter.acquire().await {
            Ok(permit) => permit,
            Err(_) => return Slot::Cancelled(index, item),
        };

        if cancel.is_cancelled() {
            debug!(index = index, item = %item, "Skipping item after cancellation");
            return Slot::Cancelled(index, item);
        }

        match policy.execute(|_| op(item.clone())).await {
            Ok(done) => Slot::Done(ItemSuccess {
                index,
                item,
                value: done.value,
                attempts: done.attempts,
            }),
            Err(failed) => {
                warn!(
                    index = index,
                    item = %item,
                    attempts = failed.attempts,
                    kind = %failed.kind,
                    error = %failed.error,
                    "Item failed"
                );
                Slot::Failed(ItemFailure {
                    index,
                    item,
                    error: failed.error,
                    kind: failed.kind,
                    attempts: failed.attempts,
                })
            }
        }
    });

    // join_all keeps input order, so slot i belongs to item i.
    let slots = futures::future::join_all(futures).await;

    let mut outcome = BatchOutcome {
        successes: Vec::new(),
        failures: Vec::new(),
        cancelled: Vec::new(),
    };
    for slot in slots {
        match slot {
            Slot::Done(success) => outcome.successes.push(success),
            Slot::Failed(failure) => outcome.failures.push(failure),
            Slot::Cancelled(_, item) => outcome.cancelled.push(item),
        }
    }

    info!(
        succeeded = outcome.successes.len(),
        failed = outcome.failures.len(),
        cancelled = outcome.cancelled.len(),
        "Batch fan-out finished"
    );

    outcome
}

//! Bounded retry for outbound calls whose outcome is a value, not an error.
//!
//! Callers decide what is retryable with a predicate over the outcome, so a
//! remote "already exists" or "bad request" can never be retried by accident.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// How many extra attempts are allowed and how long to pause between them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries (not including the initial attempt).
    pub max_retries: u32,
    /// Pause before each retry.
    pub delay: Duration,
}

impl RetryPolicy {
    /// A single immediate retry.
    pub fn once() -> Self {
        Self {
            max_retries: 1,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Total number of times the operation may run.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// The final outcome plus how many attempts produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub outcome: T,
    pub attempts: u32,
}

/// Run `f` until `should_retry` rejects its outcome or the policy is exhausted.
///
/// `f` receives the 1-based attempt number. The outcome of the last attempt
/// is returned as-is, including one the predicate still considers retryable.
pub async fn retry_when<T, F, Fut, P>(
    policy: &RetryPolicy,
    operation_name: &str,
    should_retry: P,
    mut f: F,
) -> Attempted<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = T>,
    P: Fn(&T) -> bool,
{
    let mut attempt = 1;

    loop {
        let outcome = f(attempt).await;

        if !should_retry(&outcome) {
            if attempt > 1 {
                info!(
                    operation = operation_name,
                    attempt, "Call settled after retry"
                );
            }
            return Attempted {
                outcome,
                attempts: attempt,
            };
        }

        if attempt >= policy.max_attempts() {
            warn!(
                operation = operation_name,
                attempt, "Call still retryable after max retries, giving up"
            );
            return Attempted {
                outcome,
                attempts: attempt,
            };
        }

        warn!(
            operation = operation_name,
            attempt,
            delay_ms = policy.delay.as_millis() as u64,
            "Retryable outcome, trying again"
        );

        if !policy.delay.is_zero() {
            sleep(policy.delay).await;
        }
        attempt += 1;
    }
}

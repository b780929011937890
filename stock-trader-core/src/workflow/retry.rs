//! Retry policy engine shared by every task step

use crate::error::{StepFailure, TaskError};
use crate::models::workflow::{RetrySpec, StateName};
use crate::workflow::clock::Clock;
use std::future::Future;
use std::sync::Arc;

/// Successful step result with the number of invocations it took
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Wraps a single step with bounded exponential-backoff retry
#[derive(Clone)]
pub struct RetryPolicyEngine {
    clock: Arc<dyn Clock>,
}

impl RetryPolicyEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Run `step` until it succeeds, fails with an error class the spec does
    /// not cover, or has been invoked `spec.max_attempts` times.
    ///
    /// The wait before retry `n` (0-based) is `spec.delay_for_retry(n)`.
    /// Counters are local to this call, so every execution starts fresh.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        state: StateName,
        spec: &RetrySpec,
        mut step: F,
    ) -> Result<Attempted<T>, StepFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TaskError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            tracing::debug!(
                state = %state,
                attempt,
                max_attempts = spec.max_attempts,
                "Invoking step"
            );

            let error = match step().await {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    })
                }
                Err(error) => error,
            };

            if !spec.covers(error.class()) {
                tracing::error!(
                    state = %state,
                    attempt,
                    error_class = error.class(),
                    error = %error,
                    "Non-retryable failure"
                );
                return Err(StepFailure {
                    state,
                    attempts: attempt,
                    error,
                });
            }

            if attempt >= spec.max_attempts {
                tracing::error!(
                    state = %state,
                    attempts = attempt,
                    error = %error,
                    "Retries exhausted"
                );
                return Err(StepFailure {
                    state,
                    attempts: attempt,
                    error,
                });
            }

            let delay = spec.delay_for_retry(attempt - 1);
            tracing::warn!(
                state = %state,
                attempt,
                max_attempts = spec.max_attempts,
                error_class = error.class(),
                delay_ms = delay.as_millis() as u64,
                "Step failed, retrying after backoff"
            );
            self.clock.sleep(delay).await;
        }
    }
}

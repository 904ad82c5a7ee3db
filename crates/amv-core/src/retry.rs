//! Deadline and backoff harness shared by every remote call.

use std::future::Future;
use std::time::Duration;

use crate::{Error, Result};

/// How often and how patiently a remote call is retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub backoff_cap: Duration,
    /// Deadline for a single attempt.
    pub timeout: Duration,
    pub retryable: fn(&Error) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
            retryable: Error::is_retryable,
        }
    }
}

impl RetryPolicy {
    /// Sleep after the failed attempt with 0-based index `attempt`:
    /// `min(base * 2^attempt, cap)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor).min(self.backoff_cap)
    }
}

/// Runs remote operations under a per-attempt deadline with bounded retries.
///
/// Each attempt is spawned onto the runtime and awaited through its
/// `JoinHandle`. When the deadline passes the handle is dropped, which
/// detaches the task rather than cancelling it: the request may still
/// complete in the background and its result is discarded.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn run<T, F, Fut>(&self, operation: &'static str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.run_with(operation, self.policy.timeout, op).await
    }

    /// Like [`run`](Self::run) with a deadline other than the policy's.
    pub async fn run_with<T, F, Fut>(
        &self,
        operation: &'static str,
        timeout: Duration,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match Self::attempt(operation, timeout, op()).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !(self.policy.retryable)(&err) {
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    error = %err,
                    "remote call failed, not retrying"
                );
                return Err(err);
            }
            if attempt >= max_attempts {
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    error = %err,
                    "remote call failed, attempts exhausted"
                );
                return Err(err);
            }

            let delay = self.policy.backoff(attempt - 1);
            tracing::warn!(
                operation,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "remote call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt<T, Fut>(operation: &'static str, timeout: Duration, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::spawn(fut);
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(Error::Worker(join.to_string())),
            Err(_) => Err(Error::Timeout {
                operation,
                after: timeout,
            }),
        }
    }
}

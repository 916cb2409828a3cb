// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! # Retry Policy
//!
//! Bounded fixed-delay retry for venue submissions. The policy is a plain
//! value passed explicitly to each operation; what counts as retryable is
//! decided by one predicate (defaulting to [`VenueError::is_transient`])
//! instead of string matching at call sites.

use std::future::Future;
use std::time::Duration;

use super::error::{LedgerError, VenueError};

/// Default delay between attempts.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Default attempt bound.
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

fn default_delay(_attempt: u32) -> Duration {
    DEFAULT_RETRY_DELAY
}

fn no_delay(_attempt: u32) -> Duration {
    Duration::ZERO
}

/// Bounded retry policy for a single venue operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before attempt `n + 1`, given the attempt that just failed.
    pub delay: fn(u32) -> Duration,
    /// Whether a failure is worth retrying.
    pub retryable: fn(&VenueError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: default_delay,
            retryable: VenueError::is_transient,
        }
    }
}

impl RetryPolicy {
    /// Policy with the default classification but no sleeping. Used by tests
    /// and by callers that already sit behind an outer delay.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: no_delay,
            retryable: VenueError::is_transient,
        }
    }

    /// Run `op` until it succeeds, fails fatally, or the attempt bound is
    /// exhausted.
    ///
    /// Retryable failures that outlive the bound surface as
    /// [`LedgerError::TransientInfra`]; everything else is classified through
    /// [`LedgerError::from_venue`] on first occurrence.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, LedgerError>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<T, VenueError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if (self.retryable)(&err) => {
                    if attempt >= self.max_attempts {
                        return Err(LedgerError::TransientInfra {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    tracing::warn!(attempt, error = %err, "transient venue failure, retrying");
                    tokio::time::sleep((self.delay)(attempt)).await;
                }
                Err(err) => return Err(LedgerError::from_venue(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(5);

        let result = policy
            .run(|_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(VenueError::RateLimited)
                    } else {
                        Ok(41 + 1)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(5);

        let result: Result<(), _> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(VenueError::InsufficientDeposit) }
            })
            .await;

        assert!(matches!(result, Err(LedgerError::InsufficientFunds(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_transient_infra() {
        let policy = RetryPolicy::immediate(3);

        let result: Result<(), _> = policy
            .run(|_| async { Err(VenueError::RateLimited) })
            .await;

        match result {
            Err(LedgerError::TransientInfra { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn custom_predicate_overrides_classification() {
        let policy = RetryPolicy {
            max_attempts: 2,
            delay: |_| Duration::ZERO,
            retryable: |_| false,
        };

        let result: Result<(), _> = policy
            .run(|_| async { Err(VenueError::RateLimited) })
            .await;

        // RateLimited is normally retryable; the predicate says otherwise.
        assert!(matches!(result, Err(LedgerError::UnknownProgram(_))));
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! # Bounded Polling
//!
//! The delegation lifecycle waits on two eventually-consistent transitions:
//! ephemeral materialization after delegate, and base commit-back after
//! undelegate. Both are expressed as bounded fixed-interval polls that take
//! an explicit cancellation token and return a typed outcome instead of
//! looping unconditionally.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::error::VenueError;

/// Default interval between probes.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(400);

/// Default probe bound.
const DEFAULT_MAX_ITERATIONS: u32 = 30;

/// Bounded fixed-interval polling policy.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    /// Maximum number of probes before giving up.
    pub max_iterations: u32,
    /// Fixed delay between probes.
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Result of a bounded poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The probe observed the awaited state.
    Ready(T),
    /// The iteration bound was exhausted without observing it.
    TimedOut { iterations: u32 },
    /// The caller's cancellation token fired first.
    Cancelled,
}

impl<T> PollOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready(_))
    }
}

/// Probe until `probe` returns `Some`, the bound is exhausted, or `cancel`
/// fires.
///
/// The probe decides how venue errors are treated: returning `Ok(None)` for
/// a transient read failure keeps polling, while returning `Err` aborts the
/// wait immediately.
pub async fn poll_until<T, F, Fut>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<PollOutcome<T>, VenueError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, VenueError>>,
{
    for iteration in 1..=policy.max_iterations {
        if cancel.is_cancelled() {
            return Ok(PollOutcome::Cancelled);
        }

        if let Some(value) = probe(iteration).await? {
            return Ok(PollOutcome::Ready(value));
        }

        if iteration < policy.max_iterations {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
                _ = tokio::time::sleep(policy.interval) => {}
            }
        }
    }

    Ok(PollOutcome::TimedOut {
        iterations: policy.max_iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_iterations: u32) -> PollPolicy {
        PollPolicy {
            max_iterations,
            interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn ready_when_probe_observes_state() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let outcome = poll_until(&fast(10), &cancel, |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(if n >= 3 { Some("settled") } else { None }) }
        })
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Ready("settled"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn times_out_after_bound() {
        let cancel = CancellationToken::new();

        let outcome: PollOutcome<()> = poll_until(&fast(4), &cancel, |_| async { Ok(None) })
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut { iterations: 4 });
    }

    #[tokio::test]
    async fn cancellation_wins_over_sleep() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome: PollOutcome<()> = poll_until(&fast(100), &cancel, |_| async { Ok(None) })
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Cancelled);
    }

    #[tokio::test]
    async fn probe_errors_abort_the_wait() {
        let cancel = CancellationToken::new();

        let result: Result<PollOutcome<()>, _> = poll_until(&fast(10), &cancel, |_| async {
            Err(VenueError::Rpc("boom".into()))
        })
        .await;

        assert!(result.is_err());
    }
}

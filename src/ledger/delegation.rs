// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! # Delegation Lifecycle Manager
//!
//! Drives a record between base-resident and ephemeral-resident states:
//!
//! ```text
//! Resident -> create_permission -> delegate -> (ephemeral materializes) -> Delegated
//! Delegated -> undelegate -> (base commits back, async) -> Resident
//! ```
//!
//! Both waits are bounded polls (`PollPolicy` + cancellation token); both
//! submissions tolerate re-invocation ("permission already exists" and
//! "already delegated" are expected retry outcomes, not failures). The
//! commit-back wait is the eventual-consistency boundary of the whole
//! system: exhausting it leaves ledger state ambiguous between venues and
//! surfaces as [`LedgerError::DelegationTimeout`] for operator attention.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::client::DepositLedgerClient;
use super::error::{LedgerError, VenueError};
use super::poll::{poll_until, PollOutcome, PollPolicy};
use super::retry::RetryPolicy;
use super::types::{Address, DelegationState, Identity, LedgerAccount};

/// Orchestrates delegate/undelegate transitions for single records.
pub struct DelegationManager {
    client: Arc<DepositLedgerClient>,
    retry: RetryPolicy,
    poll: PollPolicy,
}

impl DelegationManager {
    pub fn new(client: Arc<DepositLedgerClient>, retry: RetryPolicy, poll: PollPolicy) -> Self {
        Self {
            client,
            retry,
            poll,
        }
    }

    /// Delegate `record` to `validator` and wait until the ephemeral venue
    /// reflects it.
    ///
    /// Returns the materialized record. Must complete before any transfer is
    /// attempted on the ephemeral venue.
    pub async fn delegate(
        &self,
        record: &Address,
        validator: &Identity,
        cancel: &CancellationToken,
    ) -> Result<LedgerAccount, LedgerError> {
        let base = self.client.base();

        match self.retry.run(|_| base.create_permission(record)).await {
            Ok(()) | Err(LedgerError::UnknownProgram(VenueError::AccountExists)) => {}
            Err(err) => return Err(err),
        }

        match self.retry.run(|_| base.delegate(record, validator)).await {
            Ok(()) | Err(LedgerError::UnknownProgram(VenueError::AlreadyDelegated)) => {}
            Err(err) => return Err(err),
        }

        tracing::info!(%record, %validator, "delegation submitted, awaiting materialization");

        let ephemeral = Arc::clone(self.client.ephemeral().await?);
        let outcome = poll_until(&self.poll, cancel, |_| {
            let ephemeral = Arc::clone(&ephemeral);
            async move {
                match ephemeral.account(record).await {
                    Ok(found) => Ok(found),
                    // Transient read failures keep the wait alive
                    Err(err) if err.is_transient() => Ok(None),
                    Err(err) => Err(err),
                }
            }
        })
        .await
        .map_err(LedgerError::from_venue)?;

        self.settle(outcome, record)
    }

    /// Initiate the return of `record` to the base venue and wait until the
    /// base venue shows the committed state.
    ///
    /// `expected_amount` is the balance the caller last observed on the
    /// ephemeral venue; the wait completes only once the base venue serves
    /// that amount on a `Resident` record.
    pub async fn undelegate(
        &self,
        record: &Address,
        expected_amount: u64,
        cancel: &CancellationToken,
    ) -> Result<LedgerAccount, LedgerError> {
        let ephemeral = Arc::clone(self.client.ephemeral().await?);

        match self.retry.run(|_| ephemeral.undelegate(record)).await {
            // A retry after the commit already landed reports NotDelegated
            Ok(()) | Err(LedgerError::UnknownProgram(VenueError::NotDelegated)) => {}
            Err(err) => return Err(err),
        }

        tracing::info!(%record, expected_amount, "undelegation submitted, awaiting base commit");

        let base = Arc::clone(self.client.base());
        let outcome = poll_until(&self.poll, cancel, |_| {
            let base = Arc::clone(&base);
            async move {
                let account = match base.account(record).await {
                    Ok(Some(account)) if account.amount() == expected_amount => account,
                    Ok(_) => return Ok(None),
                    Err(err) if err.is_transient() => return Ok(None),
                    Err(err) => return Err(err),
                };
                // The amount matching is not enough: the record must be
                // trusted as resident again before callers act on it.
                match base.delegation_state(record).await {
                    Ok(DelegationState::Resident) => Ok(Some(account)),
                    Ok(_) => Ok(None),
                    Err(err) if err.is_transient() => Ok(None),
                    Err(err) => Err(err),
                }
            }
        })
        .await
        .map_err(LedgerError::from_venue)?;

        self.settle(outcome, record)
    }

    fn settle(
        &self,
        outcome: PollOutcome<LedgerAccount>,
        record: &Address,
    ) -> Result<LedgerAccount, LedgerError> {
        match outcome {
            PollOutcome::Ready(account) => Ok(account),
            PollOutcome::TimedOut { iterations } => {
                tracing::error!(%record, iterations, "delegation transition did not settle");
                Err(LedgerError::DelegationTimeout {
                    record: *record,
                    iterations,
                })
            }
            PollOutcome::Cancelled => Err(LedgerError::Cancelled { record: *record }),
        }
    }
}

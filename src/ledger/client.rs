// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! # Deposit Ledger Client
//!
//! Issues the ledger mutation instructions against whichever venue currently
//! holds write authority for the touched records. Responsibilities:
//!
//! - client-side fast-fail validation before any network call
//! - residency-based venue routing (base vs. delegated ephemeral)
//! - transient-failure retries through an explicit [`RetryPolicy`]
//! - lazy, single-flight construction of the ephemeral-venue connection
//!
//! The venue enforces every invariant a second time; this client exists to
//! fail fast and to route, not to be trusted.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::OnceCell;

use super::address::{deposit_address, username_deposit_address};
use super::error::{LedgerError, VenueError};
use super::retry::RetryPolicy;
use super::types::{
    Address, AssetId, DelegationState, DepositRecord, Identity, Session, Username,
    UsernameDepositRecord, VenueKind,
};
use super::venue::Venue;

/// Future returned by an ephemeral-venue connector.
pub type VenueFuture =
    Pin<Box<dyn Future<Output = Result<Arc<dyn Venue>, VenueError>> + Send>>;

/// Factory building the ephemeral-venue connection on first use.
pub type EphemeralConnector = Box<dyn Fn() -> VenueFuture + Send + Sync>;

/// Client for the deposit ledger instructions.
pub struct DepositLedgerClient {
    base: Arc<dyn Venue>,
    ephemeral: OnceCell<Arc<dyn Venue>>,
    connect_ephemeral: EphemeralConnector,
    retry: RetryPolicy,
}

impl DepositLedgerClient {
    /// Client that dials the ephemeral venue lazily via `connect`.
    ///
    /// Concurrent first uses converge on a single in-flight connection
    /// attempt (the cell is single-flight), never racing duplicate setup.
    pub fn new(base: Arc<dyn Venue>, connect: EphemeralConnector, retry: RetryPolicy) -> Self {
        Self {
            base,
            ephemeral: OnceCell::new(),
            connect_ephemeral: connect,
            retry,
        }
    }

    /// Client over an already-connected venue pair (memory mode, tests).
    pub fn with_connected(
        base: Arc<dyn Venue>,
        ephemeral: Arc<dyn Venue>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            base,
            ephemeral: OnceCell::new_with(Some(ephemeral)),
            connect_ephemeral: Box::new(|| {
                Box::pin(async {
                    Err::<Arc<dyn Venue>, _>(VenueError::Rpc(
                        "no ephemeral connector configured".to_string(),
                    ))
                })
            }),
            retry,
        }
    }

    /// The base-venue connection.
    pub fn base(&self) -> &Arc<dyn Venue> {
        &self.base
    }

    /// The ephemeral-venue connection, dialing it on first use.
    pub async fn ephemeral(&self) -> Result<&Arc<dyn Venue>, LedgerError> {
        self.ephemeral
            .get_or_try_init(|| (self.connect_ephemeral)())
            .await
            .map_err(LedgerError::from_venue)
    }

    // -------------------------------------------------------------------------
    // Routing
    // -------------------------------------------------------------------------

    async fn state_of(&self, record: &Address) -> Result<DelegationState, LedgerError> {
        self.base
            .delegation_state(record)
            .await
            .map_err(LedgerError::from_venue)
    }

    /// The venue allowed to mutate `record` right now.
    async fn venue_for(&self, record: &Address) -> Result<Arc<dyn Venue>, LedgerError> {
        match self.state_of(record).await?.writable_on() {
            Some(VenueKind::Base) => Ok(Arc::clone(&self.base)),
            Some(VenueKind::Ephemeral) => Ok(Arc::clone(self.ephemeral().await?)),
            None => Err(LedgerError::Validation(format!(
                "record {record} is migrating between venues; wait for delegation to settle"
            ))),
        }
    }

    fn ensure_positive(amount: u64) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::Validation(
                "amount must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Fetch `owner`'s deposit record from the venue holding it.
    pub async fn deposit(
        &self,
        owner: &Identity,
        asset: &AssetId,
    ) -> Result<Option<DepositRecord>, LedgerError> {
        let record = deposit_address(owner, asset);
        let venue = match self.state_of(&record).await? {
            DelegationState::Delegated { .. } | DelegationState::Delegating => {
                Arc::clone(self.ephemeral().await?)
            }
            _ => Arc::clone(&self.base),
        };
        venue
            .deposit(owner, asset)
            .await
            .map_err(LedgerError::from_venue)
    }

    /// Fetch the username-addressed record from the venue holding it.
    pub async fn username_deposit(
        &self,
        username: &Username,
        asset: &AssetId,
    ) -> Result<Option<UsernameDepositRecord>, LedgerError> {
        let record = username_deposit_address(username, asset);
        let venue = match self.state_of(&record).await? {
            DelegationState::Delegated { .. } | DelegationState::Delegating => {
                Arc::clone(self.ephemeral().await?)
            }
            _ => Arc::clone(&self.base),
        };
        venue
            .username_deposit(username, asset)
            .await
            .map_err(LedgerError::from_venue)
    }

    /// Fetch `owner`'s session record.
    pub async fn session(&self, owner: &Identity) -> Result<Option<Session>, LedgerError> {
        self.base
            .session(owner)
            .await
            .map_err(LedgerError::from_venue)
    }

    /// External holding of `identity`.
    pub async fn native_balance(&self, identity: &Identity) -> Result<u64, LedgerError> {
        self.base
            .native_balance(identity)
            .await
            .map_err(LedgerError::from_venue)
    }

    // -------------------------------------------------------------------------
    // Instructions
    // -------------------------------------------------------------------------

    /// Create `owner`'s deposit record if it does not exist, then return the
    /// current record. Idempotent: "already exists" is a success.
    pub async fn initialize_deposit(
        &self,
        owner: &Identity,
        asset: &AssetId,
    ) -> Result<DepositRecord, LedgerError> {
        let created = self
            .retry
            .run(|_| self.base.initialize_deposit(owner, asset))
            .await;
        match created {
            Ok(()) | Err(LedgerError::UnknownProgram(VenueError::AccountExists)) => {}
            Err(err) => return Err(err),
        }

        let address = deposit_address(owner, asset);
        self.base
            .deposit(owner, asset)
            .await
            .map_err(LedgerError::from_venue)?
            .ok_or(LedgerError::UnknownProgram(VenueError::AccountNotFound(
                address,
            )))
    }

    /// Move `amount` between `owner`'s external holding and the vault.
    pub async fn modify_balance(
        &self,
        owner: &Identity,
        asset: &AssetId,
        amount: u64,
        increase: bool,
    ) -> Result<DepositRecord, LedgerError> {
        Self::ensure_positive(amount)?;
        let venue = self.venue_for(&deposit_address(owner, asset)).await?;
        self.retry
            .run(|_| venue.modify_balance(owner, asset, amount, increase))
            .await
    }

    /// Record-to-record transfer between two deposit records. Both must
    /// currently be writable on the same venue.
    pub async fn transfer_deposit(
        &self,
        source: &Identity,
        destination: &Identity,
        asset: &AssetId,
        amount: u64,
    ) -> Result<(), LedgerError> {
        Self::ensure_positive(amount)?;
        let source_addr = deposit_address(source, asset);
        let dest_addr = deposit_address(destination, asset);
        let venue = self.common_venue(&source_addr, &dest_addr).await?;
        self.retry
            .run(|_| venue.transfer_deposit(source, destination, asset, amount))
            .await
    }

    /// Record-to-record transfer into a username-addressed record.
    pub async fn transfer_to_username_deposit(
        &self,
        source: &Identity,
        username: &Username,
        asset: &AssetId,
        amount: u64,
    ) -> Result<(), LedgerError> {
        Self::ensure_positive(amount)?;
        let source_addr = deposit_address(source, asset);
        let dest_addr = username_deposit_address(username, asset);
        let venue = self.common_venue(&source_addr, &dest_addr).await?;
        self.retry
            .run(|_| venue.transfer_to_username_deposit(source, username, asset, amount))
            .await
    }

    /// The single venue on which both records are currently writable.
    async fn common_venue(
        &self,
        source: &Address,
        destination: &Address,
    ) -> Result<Arc<dyn Venue>, LedgerError> {
        let source_on = self.state_of(source).await?.writable_on();
        let dest_on = self.state_of(destination).await?.writable_on();
        match (source_on, dest_on) {
            (Some(VenueKind::Base), Some(VenueKind::Base)) => Ok(Arc::clone(&self.base)),
            (Some(VenueKind::Ephemeral), Some(VenueKind::Ephemeral)) => {
                Ok(Arc::clone(self.ephemeral().await?))
            }
            _ => Err(LedgerError::SplitResidency {
                src: *source,
                destination: *destination,
            }),
        }
    }

    /// Fund a username-addressed record from `depositor`'s external holding.
    /// Anyone may fund any username; the record is created on first use.
    pub async fn deposit_for_username(
        &self,
        depositor: &Identity,
        username: &Username,
        asset: &AssetId,
        amount: u64,
    ) -> Result<UsernameDepositRecord, LedgerError> {
        Self::ensure_positive(amount)?;
        self.retry
            .run(|_| self.base.deposit_for_username(depositor, username, asset, amount))
            .await
    }

    /// Release `amount` from the username record to `recipient`, gated on a
    /// verified session matching the record's username.
    ///
    /// The session is checked here before submission (fast fail); the venue
    /// independently enforces the same gate.
    pub async fn claim_username_deposit(
        &self,
        username: &Username,
        asset: &AssetId,
        amount: u64,
        recipient: &Identity,
    ) -> Result<UsernameDepositRecord, LedgerError> {
        Self::ensure_positive(amount)?;

        let session = self
            .session(recipient)
            .await?
            .ok_or(LedgerError::NotVerified)?;
        if !session.verified || &session.username != username {
            return Err(LedgerError::NotVerified);
        }

        self.retry
            .run(|_| self.base.claim_username_deposit(username, asset, amount, recipient))
            .await
    }

    /// Grant delegation authority for `owner`'s deposit record. Idempotent.
    pub async fn create_permission(
        &self,
        owner: &Identity,
        asset: &AssetId,
    ) -> Result<(), LedgerError> {
        self.create_permission_for(&deposit_address(owner, asset)).await
    }

    /// Grant delegation authority for a username-addressed record. Idempotent.
    pub async fn create_username_permission(
        &self,
        username: &Username,
        asset: &AssetId,
    ) -> Result<(), LedgerError> {
        self.create_permission_for(&username_deposit_address(username, asset))
            .await
    }

    async fn create_permission_for(&self, record: &Address) -> Result<(), LedgerError> {
        match self
            .retry
            .run(|_| self.base.create_permission(record))
            .await
        {
            Ok(()) | Err(LedgerError::UnknownProgram(VenueError::AccountExists)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::{MemoryVenue, MemoryVenueConfig};

    fn asset() -> AssetId {
        AssetId::from("USDT")
    }

    fn client_over(
        config: MemoryVenueConfig,
    ) -> (DepositLedgerClient, Arc<MemoryVenue>, Arc<MemoryVenue>) {
        let (base, ephemeral) = MemoryVenue::pair(config);
        let client = DepositLedgerClient::with_connected(
            base.clone() as Arc<dyn Venue>,
            ephemeral.clone() as Arc<dyn Venue>,
            RetryPolicy::immediate(4),
        );
        (client, base, ephemeral)
    }

    fn instant() -> (DepositLedgerClient, Arc<MemoryVenue>, Arc<MemoryVenue>) {
        client_over(MemoryVenueConfig {
            clone_lag: 0,
            commit_lag: 0,
            ..MemoryVenueConfig::default()
        })
    }

    #[tokio::test]
    async fn zero_amounts_fail_before_any_venue_call() {
        let (client, base, _) = instant();
        let owner = Identity::new([1; 32]);
        let username = Username::parse("validuser123").unwrap();

        assert!(matches!(
            client.modify_balance(&owner, &asset(), 0, true).await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            client.transfer_deposit(&owner, &Identity::new([2; 32]), &asset(), 0).await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            client.deposit_for_username(&owner, &username, &asset(), 0).await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            client.claim_username_deposit(&username, &asset(), 0, &owner).await,
            Err(LedgerError::Validation(_))
        ));

        // Nothing was created venue-side
        assert!(base.deposit(&owner, &asset()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn initialize_deposit_is_idempotent() {
        let (client, _, _) = instant();
        let owner = Identity::new([1; 32]);

        let first = client.initialize_deposit(&owner, &asset()).await.unwrap();
        let second = client.initialize_deposit(&owner, &asset()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.amount, 0);
    }

    #[tokio::test]
    async fn create_permission_is_idempotent() {
        let (client, _, _) = instant();
        let owner = Identity::new([1; 32]);
        client.initialize_deposit(&owner, &asset()).await.unwrap();

        client.create_permission(&owner, &asset()).await.unwrap();
        client.create_permission(&owner, &asset()).await.unwrap();
    }

    #[tokio::test]
    async fn modify_balance_roundtrip() {
        let (client, base, _) = instant();
        let owner = Identity::new([1; 32]);
        base.credit_native(&owner, 2_000_000);
        client.initialize_deposit(&owner, &asset()).await.unwrap();

        let up = client
            .modify_balance(&owner, &asset(), 1_000_000, true)
            .await
            .unwrap();
        assert_eq!(up.amount, 1_000_000);
        let down = client
            .modify_balance(&owner, &asset(), 1_000_000, false)
            .await
            .unwrap();
        assert_eq!(down.amount, 0);
    }

    #[tokio::test]
    async fn split_residency_is_rejected_before_submission() {
        let (client, base, _) = instant();
        let alice = Identity::new([1; 32]);
        let bob = Identity::new([2; 32]);
        let validator = Identity::new([9; 32]);
        base.credit_native(&alice, 1_000_000);
        client.initialize_deposit(&alice, &asset()).await.unwrap();
        client.initialize_deposit(&bob, &asset()).await.unwrap();
        client
            .modify_balance(&alice, &asset(), 500_000, true)
            .await
            .unwrap();

        let record = deposit_address(&alice, &asset());
        client.create_permission(&alice, &asset()).await.unwrap();
        base.delegate(&record, &validator).await.unwrap();

        assert!(matches!(
            client.transfer_deposit(&alice, &bob, &asset(), 100).await,
            Err(LedgerError::SplitResidency { .. })
        ));
    }

    #[tokio::test]
    async fn transfer_routes_to_ephemeral_when_both_delegated() {
        let (client, base, _ephemeral) = instant();
        let alice = Identity::new([1; 32]);
        let bob = Identity::new([2; 32]);
        let validator = Identity::new([9; 32]);
        base.credit_native(&alice, 1_000_000);
        client.initialize_deposit(&alice, &asset()).await.unwrap();
        client.initialize_deposit(&bob, &asset()).await.unwrap();
        client
            .modify_balance(&alice, &asset(), 600_000, true)
            .await
            .unwrap();

        for who in [&alice, &bob] {
            client.create_permission(who, &asset()).await.unwrap();
            base.delegate(&deposit_address(who, &asset()), &validator)
                .await
                .unwrap();
        }

        client
            .transfer_deposit(&alice, &bob, &asset(), 250_000)
            .await
            .unwrap();

        let alice_record = client.deposit(&alice, &asset()).await.unwrap().unwrap();
        let bob_record = client.deposit(&bob, &asset()).await.unwrap().unwrap();
        assert_eq!(alice_record.amount, 350_000);
        assert_eq!(bob_record.amount, 250_000);
    }

    #[tokio::test]
    async fn claim_fast_fails_on_session_problems() {
        let (client, base, _) = instant();
        let depositor = Identity::new([2; 32]);
        let recipient = Identity::new([3; 32]);
        let username = Username::parse("validuser123").unwrap();
        base.credit_native(&depositor, 1_000_000);
        client
            .deposit_for_username(&depositor, &username, &asset(), 300_000)
            .await
            .unwrap();

        // No session stored for the recipient
        assert!(matches!(
            client
                .claim_username_deposit(&username, &asset(), 100, &recipient)
                .await,
            Err(LedgerError::NotVerified)
        ));

        // Record is untouched either way
        let record = client
            .username_deposit(&username, &asset())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.amount, 300_000);
    }
}

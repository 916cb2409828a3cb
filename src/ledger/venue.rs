// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! # Venue Boundary
//!
//! The execution venues (durable base ledger, delegated ephemeral ledger)
//! are external systems whose internal instruction execution is opaque.
//! [`Venue`] captures their observable contract: typed reads, mutation
//! instructions with venue-enforced invariants, the delegation protocol and
//! the session instructions.
//!
//! Two implementations exist:
//!
//! - [`crate::ledger::memory::MemoryVenue`] - in-process reference venue
//!   used by tests and the `memory` runtime mode
//! - [`crate::ledger::rpc::RpcVenue`] - JSON-RPC adapter for external nodes

use async_trait::async_trait;

use super::error::VenueError;
use super::types::{
    Address, AssetId, DelegationState, DepositRecord, Identity, LedgerAccount, Session,
    StoreSessionTx, Username, UsernameDepositRecord, Vault, VenueKind,
};

/// Observable contract of an execution venue.
///
/// Every instruction is atomic venue-side; callers never lock. Mutating a
/// record requires that the record currently be writable on the receiving
/// venue ([`VenueError::NotResident`] otherwise), which is what makes the
/// delegate/undelegate protocol safe.
#[async_trait]
pub trait Venue: Send + Sync {
    /// Which venue this connection talks to.
    fn kind(&self) -> VenueKind;

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Fetch `owner`'s deposit record for `asset`, if it exists here.
    async fn deposit(
        &self,
        owner: &Identity,
        asset: &AssetId,
    ) -> Result<Option<DepositRecord>, VenueError>;

    /// Fetch the username-addressed record for `(username, asset)`.
    async fn username_deposit(
        &self,
        username: &Username,
        asset: &AssetId,
    ) -> Result<Option<UsernameDepositRecord>, VenueError>;

    /// Fetch whichever balance record lives at `address`.
    async fn account(&self, address: &Address) -> Result<Option<LedgerAccount>, VenueError>;

    /// Fetch the pooled vault for `asset`.
    async fn vault(&self, asset: &AssetId) -> Result<Option<Vault>, VenueError>;

    /// Fetch `owner`'s session record.
    async fn session(&self, owner: &Identity) -> Result<Option<Session>, VenueError>;

    /// Where write authority for `record` currently lives, as this venue
    /// sees it. Venues may disagree while a transition materializes.
    async fn delegation_state(&self, record: &Address) -> Result<DelegationState, VenueError>;

    /// External (non-custodied) asset holding of `identity`.
    async fn native_balance(&self, identity: &Identity) -> Result<u64, VenueError>;

    // -------------------------------------------------------------------------
    // Ledger instructions
    // -------------------------------------------------------------------------

    /// Create `owner`'s deposit record for `asset` with a zero balance.
    /// Fails with [`VenueError::AccountExists`] when already present.
    async fn initialize_deposit(
        &self,
        owner: &Identity,
        asset: &AssetId,
    ) -> Result<(), VenueError>;

    /// Move `amount` between `owner`'s external holding and the vault,
    /// crediting (`increase`) or debiting the deposit record.
    async fn modify_balance(
        &self,
        owner: &Identity,
        asset: &AssetId,
        amount: u64,
        increase: bool,
    ) -> Result<DepositRecord, VenueError>;

    /// Record-to-record move between two deposit records. No vault movement.
    /// Both records must be writable on this venue.
    async fn transfer_deposit(
        &self,
        source: &Identity,
        destination: &Identity,
        asset: &AssetId,
        amount: u64,
    ) -> Result<(), VenueError>;

    /// Record-to-record move from a deposit record into a username-addressed
    /// record. No vault movement. Both records must be writable here.
    async fn transfer_to_username_deposit(
        &self,
        source: &Identity,
        username: &Username,
        asset: &AssetId,
        amount: u64,
    ) -> Result<(), VenueError>;

    /// Fund a username-addressed record from `depositor`'s external holding,
    /// creating the record on first use. Anyone may fund any username.
    async fn deposit_for_username(
        &self,
        depositor: &Identity,
        username: &Username,
        asset: &AssetId,
        amount: u64,
    ) -> Result<UsernameDepositRecord, VenueError>;

    /// Release `amount` from the username record to `recipient`'s external
    /// holding. Requires a verified session for `recipient` whose username
    /// matches the record; shortfalls surface as
    /// [`VenueError::InsufficientDeposit`].
    async fn claim_username_deposit(
        &self,
        username: &Username,
        asset: &AssetId,
        amount: u64,
        recipient: &Identity,
    ) -> Result<UsernameDepositRecord, VenueError>;

    /// Move external holdings directly between identities (fee-payer funded
    /// reserve top-ups).
    async fn transfer_native(
        &self,
        from: &Identity,
        to: &Identity,
        amount: u64,
    ) -> Result<(), VenueError>;

    // -------------------------------------------------------------------------
    // Delegation instructions
    // -------------------------------------------------------------------------

    /// Create the delegation permission account for `record`. Fails with
    /// [`VenueError::AccountExists`] when already present; callers treat
    /// that as success.
    async fn create_permission(&self, record: &Address) -> Result<(), VenueError>;

    /// Hand write authority for `record` to `validator` on the ephemeral
    /// venue. The ephemeral copy materializes asynchronously.
    async fn delegate(&self, record: &Address, validator: &Identity) -> Result<(), VenueError>;

    /// Initiate the return of `record` to the base venue. The base venue
    /// reflects the committed state asynchronously.
    async fn undelegate(&self, record: &Address) -> Result<(), VenueError>;

    // -------------------------------------------------------------------------
    // Session instructions
    // -------------------------------------------------------------------------

    /// Persist a session from a fully co-signed store transaction. The venue
    /// re-derives the username from the payload and rejects malformed
    /// handles with the invalid-username program code.
    async fn submit_store_session(&self, tx: &StoreSessionTx) -> Result<Session, VenueError>;

    /// Check `signature` over the validation string of `owner`'s stored
    /// payload against the verifying-key allow-list; on success the session
    /// becomes (irreversibly) verified. Already-verified sessions succeed
    /// unchanged.
    async fn verify_session(
        &self,
        owner: &Identity,
        signature: &[u8],
        verifying_key: &[u8; 32],
    ) -> Result<Session, VenueError>;
}

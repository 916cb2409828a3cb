// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! # In-Process Reference Venue
//!
//! A pair of [`Venue`] handles (base + ephemeral) over one shared ledger
//! world, used by tests and the `memory` runtime mode. It enforces the same
//! invariants the external program does: per-instruction atomicity,
//! non-negative amounts, vault >= sum of backed records, residency checks,
//! session gating and real Ed25519 signature verification.
//!
//! ## Eventual consistency
//!
//! The delegate/undelegate protocol settles asynchronously on the real
//! venues. Here the lag is deterministic and advances on content reads:
//!
//! - after `delegate`, the ephemeral venue answers `None` for the record's
//!   first `clone_lag` reads (mutations fail `CloneInProgress`, which is
//!   retryable) before the clone becomes visible
//! - after `undelegate`, the base venue serves the stale pre-delegation
//!   balance for `commit_lag` reads of that record before applying the
//!   committed ephemeral state and returning it to `Resident`
//!
//! Polling loops with an iteration bound above the configured lag therefore
//! always converge, and loops with a smaller bound observe real timeouts.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use ring::signature::{UnparsedPublicKey, ED25519};

use crate::session::payload::ValidationPayload;

use super::address::{
    deposit_address, permission_address, session_address, username_deposit_address, vault_address,
};
use super::error::VenueError;
use super::types::{
    Address, AssetId, DelegationState, DepositRecord, Identity, LedgerAccount, Session,
    StoreSessionTx, Username, UsernameDepositRecord, Vault, VenueKind,
};
use super::venue::Venue;

/// Program code for delegating a record with no permission account.
const PERMISSION_MISSING_CODE: u32 = 4100;
/// Program code for delegating a record whose undelegation is still settling.
const UNDELEGATION_PENDING_CODE: u32 = 4200;

/// Configuration of the reference venue pair.
#[derive(Debug, Clone)]
pub struct MemoryVenueConfig {
    /// Ephemeral content reads before a delegated record becomes visible.
    pub clone_lag: u32,
    /// Base content reads before an undelegated record commits back.
    pub commit_lag: u32,
    /// Bot identifier bound into the session validation string.
    pub bot_id: i64,
    /// Allow-listed session verifying keys (production + test channels).
    pub verifying_keys: Vec<[u8; 32]>,
}

impl Default for MemoryVenueConfig {
    fn default() -> Self {
        Self {
            clone_lag: 1,
            commit_lag: 2,
            bot_id: 0,
            verifying_keys: Vec::new(),
        }
    }
}

struct DepositEntry {
    owner: Identity,
    asset: AssetId,
    amount: u64,
}

struct UsernameEntry {
    username: Username,
    asset: AssetId,
    amount: u64,
}

/// Delegation bookkeeping for one record address.
struct Delegation {
    validator: Identity,
    undelegating: bool,
    /// Remaining ephemeral reads until the clone is visible.
    clone_in: u32,
    /// Remaining base reads until the commit applies.
    commit_in: u32,
    /// Authoritative amount while the record lives on the ephemeral venue.
    ephemeral_amount: u64,
}

#[derive(Default)]
struct World {
    deposits: HashMap<Address, DepositEntry>,
    username_deposits: HashMap<Address, UsernameEntry>,
    vaults: HashMap<AssetId, u64>,
    native: HashMap<Identity, u64>,
    sessions: HashMap<Identity, Session>,
    permissions: HashSet<Address>,
    delegations: HashMap<Address, Delegation>,
}

impl World {
    /// Advance the commit-back lag for `address` on a base content read and
    /// apply the committed amount once it reaches zero.
    fn base_read_tick(&mut self, address: &Address) {
        let committed = match self.delegations.get_mut(address) {
            Some(d) if d.undelegating => {
                if d.commit_in > 0 {
                    d.commit_in -= 1;
                    None
                } else {
                    Some(d.ephemeral_amount)
                }
            }
            _ => None,
        };
        if let Some(amount) = committed {
            self.delegations.remove(address);
            if let Some(entry) = self.deposits.get_mut(address) {
                entry.amount = amount;
            } else if let Some(entry) = self.username_deposits.get_mut(address) {
                entry.amount = amount;
            }
        }
    }

    /// Whether `address` is visible on the ephemeral venue, advancing the
    /// clone lag on each content read.
    fn ephemeral_visible_tick(&mut self, address: &Address) -> bool {
        match self.delegations.get_mut(address) {
            Some(d) if !d.undelegating => {
                if d.clone_in > 0 {
                    d.clone_in -= 1;
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    fn require_base_writable(&self, address: &Address) -> Result<(), VenueError> {
        if self.delegations.contains_key(address) {
            Err(VenueError::NotResident {
                record: *address,
                venue: VenueKind::Base,
            })
        } else {
            Ok(())
        }
    }

    /// Ephemeral-writability check; mutation attempts also advance the
    /// clone lag so bounded retries on `CloneInProgress` converge.
    fn require_ephemeral_writable(&mut self, address: &Address) -> Result<(), VenueError> {
        match self.delegations.get_mut(address) {
            Some(d) if !d.undelegating => {
                if d.clone_in > 0 {
                    d.clone_in -= 1;
                    Err(VenueError::CloneInProgress)
                } else {
                    Ok(())
                }
            }
            _ => Err(VenueError::NotResident {
                record: *address,
                venue: VenueKind::Ephemeral,
            }),
        }
    }

    fn record_amount(&self, address: &Address) -> Option<u64> {
        self.deposits
            .get(address)
            .map(|e| e.amount)
            .or_else(|| self.username_deposits.get(address).map(|e| e.amount))
    }

    fn debit_native(&mut self, identity: &Identity, amount: u64) -> Result<(), VenueError> {
        let balance = self.native.entry(*identity).or_insert(0);
        *balance = balance
            .checked_sub(amount)
            .ok_or(VenueError::InsufficientNativeBalance)?;
        Ok(())
    }

    fn credit_native(&mut self, identity: &Identity, amount: u64) {
        *self.native.entry(*identity).or_insert(0) += amount;
    }
}

/// One side of the reference venue pair.
pub struct MemoryVenue {
    kind: VenueKind,
    world: Arc<Mutex<World>>,
    config: Arc<MemoryVenueConfig>,
}

impl MemoryVenue {
    /// Build a connected base + ephemeral pair over a fresh ledger world.
    pub fn pair(config: MemoryVenueConfig) -> (Arc<MemoryVenue>, Arc<MemoryVenue>) {
        let world = Arc::new(Mutex::new(World::default()));
        let config = Arc::new(config);
        let base = Arc::new(MemoryVenue {
            kind: VenueKind::Base,
            world: Arc::clone(&world),
            config: Arc::clone(&config),
        });
        let ephemeral = Arc::new(MemoryVenue {
            kind: VenueKind::Ephemeral,
            world,
            config,
        });
        (base, ephemeral)
    }

    /// Faucet for tests and the `memory` runtime mode.
    pub fn credit_native(&self, identity: &Identity, amount: u64) {
        let mut world = self.world.lock().expect("ledger world poisoned");
        world.credit_native(identity, amount);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, World> {
        self.world.lock().expect("ledger world poisoned")
    }

    fn unsupported(&self, what: &str) -> VenueError {
        VenueError::Unsupported(format!("{what} settles on the base venue only"))
    }

    fn verify_ed25519(
        key: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), VenueError> {
        if signature.is_empty() {
            return Err(VenueError::MissingSignature);
        }
        UnparsedPublicKey::new(&ED25519, key)
            .verify(message, signature)
            .map_err(|_| VenueError::InvalidSignature)
    }
}

#[async_trait]
impl Venue for MemoryVenue {
    fn kind(&self) -> VenueKind {
        self.kind
    }

    async fn deposit(
        &self,
        owner: &Identity,
        asset: &AssetId,
    ) -> Result<Option<DepositRecord>, VenueError> {
        let address = deposit_address(owner, asset);
        let mut world = self.lock();
        match self.kind {
            VenueKind::Base => {
                world.base_read_tick(&address);
                Ok(world.deposits.get(&address).map(|e| DepositRecord {
                    owner: e.owner,
                    asset: e.asset.clone(),
                    amount: e.amount,
                    address,
                }))
            }
            VenueKind::Ephemeral => {
                if !world.ephemeral_visible_tick(&address) {
                    return Ok(None);
                }
                let amount = world
                    .delegations
                    .get(&address)
                    .map(|d| d.ephemeral_amount)
                    .unwrap_or(0);
                Ok(world.deposits.get(&address).map(|e| DepositRecord {
                    owner: e.owner,
                    asset: e.asset.clone(),
                    amount,
                    address,
                }))
            }
        }
    }

    async fn username_deposit(
        &self,
        username: &Username,
        asset: &AssetId,
    ) -> Result<Option<UsernameDepositRecord>, VenueError> {
        let address = username_deposit_address(username, asset);
        let mut world = self.lock();
        match self.kind {
            VenueKind::Base => {
                world.base_read_tick(&address);
                Ok(world
                    .username_deposits
                    .get(&address)
                    .map(|e| UsernameDepositRecord {
                        username: e.username.clone(),
                        asset: e.asset.clone(),
                        amount: e.amount,
                        address,
                    }))
            }
            VenueKind::Ephemeral => {
                if !world.ephemeral_visible_tick(&address) {
                    return Ok(None);
                }
                let amount = world
                    .delegations
                    .get(&address)
                    .map(|d| d.ephemeral_amount)
                    .unwrap_or(0);
                Ok(world
                    .username_deposits
                    .get(&address)
                    .map(|e| UsernameDepositRecord {
                        username: e.username.clone(),
                        asset: e.asset.clone(),
                        amount,
                        address,
                    }))
            }
        }
    }

    async fn account(&self, address: &Address) -> Result<Option<LedgerAccount>, VenueError> {
        let mut world = self.lock();
        let amount = match self.kind {
            VenueKind::Base => {
                world.base_read_tick(address);
                None
            }
            VenueKind::Ephemeral => {
                if !world.ephemeral_visible_tick(address) {
                    return Ok(None);
                }
                world.delegations.get(address).map(|d| d.ephemeral_amount)
            }
        };

        if let Some(entry) = world.deposits.get(address) {
            return Ok(Some(LedgerAccount::Deposit(DepositRecord {
                owner: entry.owner,
                asset: entry.asset.clone(),
                amount: amount.unwrap_or(entry.amount),
                address: *address,
            })));
        }
        if let Some(entry) = world.username_deposits.get(address) {
            return Ok(Some(LedgerAccount::UsernameDeposit(UsernameDepositRecord {
                username: entry.username.clone(),
                asset: entry.asset.clone(),
                amount: amount.unwrap_or(entry.amount),
                address: *address,
            })));
        }
        Ok(None)
    }

    async fn vault(&self, asset: &AssetId) -> Result<Option<Vault>, VenueError> {
        let world = self.lock();
        Ok(world.vaults.get(asset).map(|amount| Vault {
            asset: asset.clone(),
            amount: *amount,
            address: vault_address(asset),
        }))
    }

    async fn session(&self, owner: &Identity) -> Result<Option<Session>, VenueError> {
        let world = self.lock();
        Ok(world.sessions.get(owner).cloned())
    }

    async fn delegation_state(&self, record: &Address) -> Result<DelegationState, VenueError> {
        let world = self.lock();
        let state = match world.delegations.get(record) {
            None => DelegationState::Resident,
            Some(d) if d.undelegating => DelegationState::Undelegating,
            Some(d) => match self.kind {
                VenueKind::Base => DelegationState::Delegated {
                    validator: d.validator,
                },
                VenueKind::Ephemeral if d.clone_in > 0 => DelegationState::Delegating,
                VenueKind::Ephemeral => DelegationState::Delegated {
                    validator: d.validator,
                },
            },
        };
        Ok(state)
    }

    async fn native_balance(&self, identity: &Identity) -> Result<u64, VenueError> {
        let world = self.lock();
        Ok(world.native.get(identity).copied().unwrap_or(0))
    }

    async fn initialize_deposit(
        &self,
        owner: &Identity,
        asset: &AssetId,
    ) -> Result<(), VenueError> {
        if self.kind != VenueKind::Base {
            return Err(self.unsupported("account creation"));
        }
        let address = deposit_address(owner, asset);
        let mut world = self.lock();
        if world.deposits.contains_key(&address) {
            return Err(VenueError::AccountExists);
        }
        world.deposits.insert(
            address,
            DepositEntry {
                owner: *owner,
                asset: asset.clone(),
                amount: 0,
            },
        );
        world.vaults.entry(asset.clone()).or_insert(0);
        Ok(())
    }

    async fn modify_balance(
        &self,
        owner: &Identity,
        asset: &AssetId,
        amount: u64,
        increase: bool,
    ) -> Result<DepositRecord, VenueError> {
        if self.kind != VenueKind::Base {
            return Err(self.unsupported("vault custody movement"));
        }
        let address = deposit_address(owner, asset);
        let mut world = self.lock();
        world.base_read_tick(&address);
        if !world.deposits.contains_key(&address) {
            return Err(VenueError::AccountNotFound(address));
        }
        world.require_base_writable(&address)?;

        if increase {
            world.debit_native(owner, amount)?;
            *world.vaults.entry(asset.clone()).or_insert(0) += amount;
            let entry = world.deposits.get_mut(&address).expect("checked above");
            entry.amount += amount;
        } else {
            let entry = world.deposits.get_mut(&address).expect("checked above");
            entry.amount = entry
                .amount
                .checked_sub(amount)
                .ok_or(VenueError::InsufficientDeposit)?;
            let vault = world.vaults.entry(asset.clone()).or_insert(0);
            *vault = vault.saturating_sub(amount);
            world.credit_native(owner, amount);
        }

        let entry = world.deposits.get(&address).expect("checked above");
        Ok(DepositRecord {
            owner: entry.owner,
            asset: entry.asset.clone(),
            amount: entry.amount,
            address,
        })
    }

    async fn transfer_deposit(
        &self,
        source: &Identity,
        destination: &Identity,
        asset: &AssetId,
        amount: u64,
    ) -> Result<(), VenueError> {
        let source_addr = deposit_address(source, asset);
        let dest_addr = deposit_address(destination, asset);
        let mut world = self.lock();
        for addr in [&source_addr, &dest_addr] {
            if !world.deposits.contains_key(addr) {
                return Err(VenueError::AccountNotFound(*addr));
            }
        }

        match self.kind {
            VenueKind::Base => {
                world.require_base_writable(&source_addr)?;
                world.require_base_writable(&dest_addr)?;
                let entry = world.deposits.get_mut(&source_addr).expect("checked above");
                entry.amount = entry
                    .amount
                    .checked_sub(amount)
                    .ok_or(VenueError::InsufficientDeposit)?;
                let entry = world.deposits.get_mut(&dest_addr).expect("checked above");
                entry.amount += amount;
            }
            VenueKind::Ephemeral => {
                world.require_ephemeral_writable(&source_addr)?;
                world.require_ephemeral_writable(&dest_addr)?;
                let d = world
                    .delegations
                    .get_mut(&source_addr)
                    .expect("writability implies delegation");
                d.ephemeral_amount = d
                    .ephemeral_amount
                    .checked_sub(amount)
                    .ok_or(VenueError::InsufficientDeposit)?;
                let d = world
                    .delegations
                    .get_mut(&dest_addr)
                    .expect("writability implies delegation");
                d.ephemeral_amount += amount;
            }
        }
        Ok(())
    }

    async fn transfer_to_username_deposit(
        &self,
        source: &Identity,
        username: &Username,
        asset: &AssetId,
        amount: u64,
    ) -> Result<(), VenueError> {
        let source_addr = deposit_address(source, asset);
        let dest_addr = username_deposit_address(username, asset);
        let mut world = self.lock();
        if !world.deposits.contains_key(&source_addr) {
            return Err(VenueError::AccountNotFound(source_addr));
        }
        if !world.username_deposits.contains_key(&dest_addr) {
            return Err(VenueError::AccountNotFound(dest_addr));
        }

        match self.kind {
            VenueKind::Base => {
                world.require_base_writable(&source_addr)?;
                world.require_base_writable(&dest_addr)?;
                let entry = world.deposits.get_mut(&source_addr).expect("checked above");
                entry.amount = entry
                    .amount
                    .checked_sub(amount)
                    .ok_or(VenueError::InsufficientDeposit)?;
                let entry = world
                    .username_deposits
                    .get_mut(&dest_addr)
                    .expect("checked above");
                entry.amount += amount;
            }
            VenueKind::Ephemeral => {
                world.require_ephemeral_writable(&source_addr)?;
                world.require_ephemeral_writable(&dest_addr)?;
                let d = world
                    .delegations
                    .get_mut(&source_addr)
                    .expect("writability implies delegation");
                d.ephemeral_amount = d
                    .ephemeral_amount
                    .checked_sub(amount)
                    .ok_or(VenueError::InsufficientDeposit)?;
                let d = world
                    .delegations
                    .get_mut(&dest_addr)
                    .expect("writability implies delegation");
                d.ephemeral_amount += amount;
            }
        }
        Ok(())
    }

    async fn deposit_for_username(
        &self,
        depositor: &Identity,
        username: &Username,
        asset: &AssetId,
        amount: u64,
    ) -> Result<UsernameDepositRecord, VenueError> {
        if self.kind != VenueKind::Base {
            return Err(self.unsupported("vault custody movement"));
        }
        let address = username_deposit_address(username, asset);
        let mut world = self.lock();
        world.base_read_tick(&address);
        if world.username_deposits.contains_key(&address) {
            world.require_base_writable(&address)?;
        }

        world.debit_native(depositor, amount)?;
        *world.vaults.entry(asset.clone()).or_insert(0) += amount;
        let entry = world
            .username_deposits
            .entry(address)
            .or_insert_with(|| UsernameEntry {
                username: username.clone(),
                asset: asset.clone(),
                amount: 0,
            });
        entry.amount += amount;

        Ok(UsernameDepositRecord {
            username: entry.username.clone(),
            asset: entry.asset.clone(),
            amount: entry.amount,
            address,
        })
    }

    async fn claim_username_deposit(
        &self,
        username: &Username,
        asset: &AssetId,
        amount: u64,
        recipient: &Identity,
    ) -> Result<UsernameDepositRecord, VenueError> {
        if self.kind != VenueKind::Base {
            return Err(self.unsupported("claim settlement"));
        }
        let address = username_deposit_address(username, asset);
        let mut world = self.lock();
        world.base_read_tick(&address);
        if !world.username_deposits.contains_key(&address) {
            return Err(VenueError::AccountNotFound(address));
        }
        world.require_base_writable(&address)?;

        // Session gate: a missing session is as unproven as an unverified one.
        let session = world
            .sessions
            .get(recipient)
            .ok_or(VenueError::NotVerified)?;
        if !session.verified {
            return Err(VenueError::NotVerified);
        }
        if &session.username != username {
            return Err(VenueError::invalid_username(format!(
                "session is for {}, record is for {}",
                session.username, username
            )));
        }

        let entry = world
            .username_deposits
            .get_mut(&address)
            .expect("checked above");
        entry.amount = entry
            .amount
            .checked_sub(amount)
            .ok_or(VenueError::InsufficientDeposit)?;
        let vault = world.vaults.entry(asset.clone()).or_insert(0);
        *vault = vault.saturating_sub(amount);
        world.credit_native(recipient, amount);

        let entry = world.username_deposits.get(&address).expect("checked above");
        Ok(UsernameDepositRecord {
            username: entry.username.clone(),
            asset: entry.asset.clone(),
            amount: entry.amount,
            address,
        })
    }

    async fn transfer_native(
        &self,
        from: &Identity,
        to: &Identity,
        amount: u64,
    ) -> Result<(), VenueError> {
        if self.kind != VenueKind::Base {
            return Err(self.unsupported("native transfer"));
        }
        let mut world = self.lock();
        world.debit_native(from, amount)?;
        world.credit_native(to, amount);
        Ok(())
    }

    async fn create_permission(&self, record: &Address) -> Result<(), VenueError> {
        if self.kind != VenueKind::Base {
            return Err(self.unsupported("permission creation"));
        }
        let mut world = self.lock();
        if world.record_amount(record).is_none() {
            return Err(VenueError::AccountNotFound(*record));
        }
        let permission = permission_address(record);
        if !world.permissions.insert(permission) {
            return Err(VenueError::AccountExists);
        }
        Ok(())
    }

    async fn delegate(&self, record: &Address, validator: &Identity) -> Result<(), VenueError> {
        if self.kind != VenueKind::Base {
            return Err(self.unsupported("delegation"));
        }
        let mut world = self.lock();
        let amount = world
            .record_amount(record)
            .ok_or(VenueError::AccountNotFound(*record))?;
        if !world.permissions.contains(&permission_address(record)) {
            return Err(VenueError::Program {
                code: PERMISSION_MISSING_CODE,
                message: "delegation permission account missing".to_string(),
            });
        }
        match world.delegations.get(record) {
            Some(d) if d.undelegating => Err(VenueError::Program {
                code: UNDELEGATION_PENDING_CODE,
                message: "undelegation still settling".to_string(),
            }),
            Some(_) => Err(VenueError::AlreadyDelegated),
            None => {
                world.delegations.insert(
                    *record,
                    Delegation {
                        validator: *validator,
                        undelegating: false,
                        clone_in: self.config.clone_lag,
                        commit_in: 0,
                        ephemeral_amount: amount,
                    },
                );
                Ok(())
            }
        }
    }

    async fn undelegate(&self, record: &Address) -> Result<(), VenueError> {
        if self.kind != VenueKind::Ephemeral {
            return Err(VenueError::Unsupported(
                "undelegation is submitted on the ephemeral venue".to_string(),
            ));
        }
        let commit_lag = self.config.commit_lag;
        let mut world = self.lock();
        match world.delegations.get_mut(record) {
            None => Err(VenueError::NotDelegated),
            // Re-invocation while settling is an expected retry outcome.
            Some(d) if d.undelegating => Ok(()),
            Some(d) => {
                if d.clone_in > 0 {
                    d.clone_in -= 1;
                    return Err(VenueError::CloneInProgress);
                }
                d.undelegating = true;
                d.commit_in = commit_lag;
                Ok(())
            }
        }
    }

    async fn submit_store_session(&self, tx: &StoreSessionTx) -> Result<Session, VenueError> {
        if self.kind != VenueKind::Base {
            return Err(self.unsupported("session storage"));
        }

        let message = tx.signing_bytes();
        Self::verify_ed25519(tx.owner.as_bytes(), &message, &tx.owner_signature)?;
        let fee_payer = tx.fee_payer.ok_or(VenueError::MissingSignature)?;
        let fee_signature = tx
            .fee_payer_signature
            .as_ref()
            .ok_or(VenueError::MissingSignature)?;
        Self::verify_ed25519(fee_payer.as_bytes(), &message, fee_signature)?;

        let payload = ValidationPayload::parse(&tx.payload)
            .map_err(|e| VenueError::invalid_username(e.to_string()))?;
        let username = payload
            .username()
            .map_err(|e| VenueError::invalid_username(e.to_string()))?;

        let session = Session {
            owner: tx.owner,
            username,
            payload: tx.payload.clone(),
            verified: false,
            created_at: tx.created_at,
            verified_at: None,
        };
        let mut world = self.lock();
        world.sessions.insert(tx.owner, session.clone());
        Ok(session)
    }

    async fn verify_session(
        &self,
        owner: &Identity,
        signature: &[u8],
        verifying_key: &[u8; 32],
    ) -> Result<Session, VenueError> {
        if self.kind != VenueKind::Base {
            return Err(self.unsupported("session verification"));
        }
        if !self.config.verifying_keys.contains(verifying_key) {
            return Err(VenueError::UnknownVerifyingKey);
        }

        let mut world = self.lock();
        let session = world
            .sessions
            .get_mut(owner)
            .ok_or_else(|| VenueError::AccountNotFound(session_address(owner)))?;
        if session.verified {
            return Ok(session.clone());
        }

        let payload = ValidationPayload::parse(&session.payload)
            .map_err(|e| VenueError::invalid_username(e.to_string()))?;
        let message = payload.check_string(self.config.bot_id);
        Self::verify_ed25519(verifying_key, message.as_bytes(), signature)?;

        session.verified = true;
        session.verified_at = Some(Utc::now());
        Ok(session.clone())
    }
}

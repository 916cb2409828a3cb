// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! # Address Derivation
//!
//! Pure, deterministic mapping from `(owner | username, asset)` to ledger
//! record addresses and from `asset` to the pooled vault address.
//!
//! Derivation must be byte-identical between this module and the venue
//! program. A divergence has no runtime symptom other than "account not
//! found", so the scheme is deliberately rigid: SHA-256 over a domain
//! separator seed followed by length-prefixed input components.

use sha2::{Digest, Sha256};

use super::types::{Address, AssetId, Identity, Username};

/// Seed for per-owner deposit records.
pub const DEPOSIT_SEED: &[u8] = b"deposit";
/// Seed for username-addressed deposit records.
pub const USERNAME_DEPOSIT_SEED: &[u8] = b"username_deposit";
/// Seed for per-asset pooled vaults.
pub const VAULT_SEED: &[u8] = b"vault";
/// Seed for per-owner session records.
pub const SESSION_SEED: &[u8] = b"tg_session";
/// Seed for per-record delegation permission accounts.
pub const PERMISSION_SEED: &[u8] = b"permission:";

/// Hash `seed` plus length-prefixed components into a record address.
///
/// Length prefixes keep the mapping injective: `("ab", "c")` and
/// `("a", "bc")` hash differently.
fn derive(seed: &[u8], components: &[&[u8]]) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(seed);
    for component in components {
        hasher.update((component.len() as u64).to_le_bytes());
        hasher.update(component);
    }
    Address::new(hasher.finalize().into())
}

/// Address of `owner`'s deposit record for `asset`.
pub fn deposit_address(owner: &Identity, asset: &AssetId) -> Address {
    derive(DEPOSIT_SEED, &[owner.as_bytes(), asset.as_bytes()])
}

/// Address of the username-addressed deposit record for `(username, asset)`.
pub fn username_deposit_address(username: &Username, asset: &AssetId) -> Address {
    derive(
        USERNAME_DEPOSIT_SEED,
        &[username.as_bytes(), asset.as_bytes()],
    )
}

/// Address of the pooled vault custodying `asset`.
pub fn vault_address(asset: &AssetId) -> Address {
    derive(VAULT_SEED, &[asset.as_bytes()])
}

/// Address of `owner`'s session record.
pub fn session_address(owner: &Identity) -> Address {
    derive(SESSION_SEED, &[owner.as_bytes()])
}

/// Address of the delegation permission account attached to `record`.
pub fn permission_address(record: &Address) -> Address {
    derive(PERMISSION_SEED, &[record.as_bytes()])
}

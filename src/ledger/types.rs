// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! # Ledger Data Model
//!
//! Core types shared by the deposit ledger client, the delegation lifecycle
//! manager and the venues:
//!
//! - [`Identity`] - Ed25519 public key identifying an owner or validator
//! - [`Address`] - derived ledger-record address (see `ledger::address`)
//! - [`AssetId`] - opaque asset identifier, one [`Vault`] per asset
//! - [`Username`] - validated off-platform handle
//! - [`DepositRecord`] / [`UsernameDepositRecord`] - balance accounts
//! - [`DelegationState`] - where write authority for a record currently lives
//! - [`Session`] - stored (and optionally verified) identity assertion
//! - [`StoreSessionTx`] - partially-signed transaction persisting a session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Minimum accepted handle length.
pub const USERNAME_MIN_LEN: usize = 5;
/// Maximum accepted handle length.
pub const USERNAME_MAX_LEN: usize = 32;

// =============================================================================
// Identity & Address
// =============================================================================

/// Ed25519 public key identifying an account holder, validator or fee payer.
///
/// Rendered as `0x`-prefixed lowercase hex (64 hex chars) in JSON and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "0x4f6e2a8c9b1d3e5f4f6e2a8c9b1d3e5f4f6e2a8c9b1d3e5f4f6e2a8c9b1d3e5f")]
pub struct Identity([u8; 32]);

impl Identity {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse from `0x`-prefixed or bare hex.
    pub fn parse(s: &str) -> Result<Self, String> {
        decode_hex32(s).map(Self)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl TryFrom<String> for Identity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(value: Identity) -> Self {
        value.to_string()
    }
}

/// Derived address of a ledger record (deposit, username deposit, vault,
/// session or permission account).
///
/// Same wire format as [`Identity`]; the two are kept distinct so a record
/// address can never be passed where a signing identity is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String)]
pub struct Address([u8; 32]);

impl Address {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn parse(s: &str) -> Result<Self, String> {
        decode_hex32(s).map(Self)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl TryFrom<String> for Address {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.to_string()
    }
}

fn decode_hex32(s: &str) -> Result<[u8; 32], String> {
    let raw = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(raw).map_err(|e| format!("invalid hex: {e}"))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| "expected 32 bytes".to_string())?;
    Ok(arr)
}

// =============================================================================
// Asset & Username
// =============================================================================

/// Opaque asset identifier. One pooled [`Vault`] exists per asset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AssetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Validated off-platform handle: 5-32 characters, letters/digits/underscore.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "dig13371337")]
pub struct Username(String);

impl Username {
    /// Parse and validate a handle against the strict pattern
    /// `^[A-Za-z0-9_]{5,32}$`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw.len() < USERNAME_MIN_LEN || raw.len() > USERNAME_MAX_LEN {
            return Err(format!(
                "username must be {USERNAME_MIN_LEN}-{USERNAME_MAX_LEN} characters, got {}",
                raw.len()
            ));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err("username may only contain letters, digits and underscore".to_string());
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Username {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}

// =============================================================================
// Venues & Delegation
// =============================================================================

/// Which execution venue a call is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VenueKind {
    /// Durable, authoritative ledger where records normally reside.
    Base,
    /// Fast delegated execution venue; not authoritative until committed back.
    Ephemeral,
}

impl std::fmt::Display for VenueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VenueKind::Base => write!(f, "base"),
            VenueKind::Ephemeral => write!(f, "ephemeral"),
        }
    }
}

/// Where write authority for a record currently lives.
///
/// Transitions are driven by the delegation lifecycle manager and
/// materialized asynchronously by the venues themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum DelegationState {
    /// Record is writable on the base venue.
    Resident,
    /// Delegation submitted, ephemeral venue not yet authoritative.
    Delegating,
    /// Record is writable on the ephemeral venue under the given validator.
    Delegated { validator: Identity },
    /// Undelegation submitted, base venue not yet caught up.
    Undelegating,
}

impl DelegationState {
    /// The venue that may currently mutate the record, if unambiguous.
    pub fn writable_on(&self) -> Option<VenueKind> {
        match self {
            DelegationState::Resident => Some(VenueKind::Base),
            DelegationState::Delegated { .. } => Some(VenueKind::Ephemeral),
            DelegationState::Delegating | DelegationState::Undelegating => None,
        }
    }
}

// =============================================================================
// Balance records
// =============================================================================

/// Per-owner, per-asset deposit account backed by the asset's [`Vault`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DepositRecord {
    /// Owner identity.
    pub owner: Identity,
    /// Asset this record is denominated in.
    pub asset: AssetId,
    /// Current balance in the asset's smallest unit.
    pub amount: u64,
    /// Derived record address.
    pub address: Address,
}

/// Username-addressed deposit account, claimable by whoever proves control
/// of the handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UsernameDepositRecord {
    /// Handle this record is addressed to.
    pub username: Username,
    /// Asset this record is denominated in.
    pub asset: AssetId,
    /// Current balance in the asset's smallest unit.
    pub amount: u64,
    /// Derived record address.
    pub address: Address,
}

/// Pooled custody account for one asset, backing every deposit record
/// denominated in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Vault {
    pub asset: AssetId,
    /// Custodied balance. Invariant: >= sum of all backed record amounts.
    pub amount: u64,
    pub address: Address,
}

/// Either kind of balance record, for callers that only need the amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerAccount {
    Deposit(DepositRecord),
    UsernameDeposit(UsernameDepositRecord),
}

impl LedgerAccount {
    pub fn amount(&self) -> u64 {
        match self {
            LedgerAccount::Deposit(r) => r.amount,
            LedgerAccount::UsernameDeposit(r) => r.amount,
        }
    }

    pub fn address(&self) -> Address {
        match self {
            LedgerAccount::Deposit(r) => r.address,
            LedgerAccount::UsernameDeposit(r) => r.address,
        }
    }
}

// =============================================================================
// Sessions
// =============================================================================

/// Stored identity assertion binding an owner identity to a claimed handle.
///
/// Created by `store`; `verified` flips false -> true exactly once on a
/// successful `verify` and never back. One session exists per owner at a
/// time: a new `store` replaces the previous session wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Session {
    /// Owner identity the session is keyed by.
    pub owner: Identity,
    /// Handle claimed by the payload (re-parsed from it, never caller-supplied).
    pub username: Username,
    /// Raw validation payload bytes as presented at store time.
    #[serde(with = "base64_bytes")]
    #[schema(value_type = String, format = Byte)]
    pub payload: Vec<u8>,
    /// Whether the payload signature has been verified.
    pub verified: bool,
    /// When the session was stored.
    pub created_at: DateTime<Utc>,
    /// When verification succeeded, if it has.
    pub verified_at: Option<DateTime<Utc>>,
}

/// Partially-signed transaction persisting a session on the venue.
///
/// The owner signs the canonical bytes client-side; the fee payer (the
/// gasless relay) co-signs before submission. The venue rejects submissions
/// missing either signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSessionTx {
    /// Session owner (and first required signer).
    pub owner: Identity,
    /// Raw validation payload to persist.
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    /// Client-side creation timestamp, bound into the signed bytes.
    pub created_at: DateTime<Utc>,
    /// Owner's Ed25519 signature over [`StoreSessionTx::signing_bytes`].
    #[serde(with = "base64_bytes")]
    pub owner_signature: Vec<u8>,
    /// Fee payer identity, filled in by the relay.
    #[serde(default)]
    pub fee_payer: Option<Identity>,
    /// Fee payer's signature over the same bytes, filled in by the relay.
    #[serde(default, with = "base64_bytes_opt")]
    pub fee_payer_signature: Option<Vec<u8>>,
}

impl StoreSessionTx {
    /// Canonical bytes both signers commit to.
    ///
    /// Payload is length-prefixed so the timestamp can never be absorbed
    /// into it (or vice versa) under a different split.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.payload.len());
        out.extend_from_slice(b"tipvault:store_session:v1");
        out.extend_from_slice(self.owner.as_bytes());
        out.extend_from_slice(&(self.payload.len() as u64).to_le_bytes());
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&self.created_at.timestamp_millis().to_le_bytes());
        out
    }
}

// =============================================================================
// Base64 serde helpers
// =============================================================================

/// Serde adapter rendering `Vec<u8>` as standard base64.
pub mod base64_bytes {
    use base64ct::{Base64, Encoding};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&Base64::encode_string(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        Base64::decode_vec(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `Option<Vec<u8>>` as base64.
pub mod base64_bytes_opt {
    use base64ct::{Base64, Encoding};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => serializer.serialize_some(&Base64::encode_string(b)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| Base64::decode_vec(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_hex_roundtrip() {
        let id = Identity::new([0xab; 32]);
        let rendered = id.to_string();
        assert!(rendered.starts_with("0x"));
        assert_eq!(rendered.len(), 66);
        assert_eq!(Identity::parse(&rendered).unwrap(), id);
        // Bare hex is accepted too
        assert_eq!(Identity::parse(&rendered[2..]).unwrap(), id);
    }

    #[test]
    fn identity_rejects_wrong_length() {
        assert!(Identity::parse("0xabcd").is_err());
        assert!(Identity::parse("not hex at all").is_err());
    }

    #[test]
    fn username_accepts_valid_handles() {
        for ok in ["dig13371337", "valid_user", "ABCDE", "a_b_c_1_2_3"] {
            assert!(Username::parse(ok).is_ok(), "expected {ok} to parse");
        }
    }

    #[test]
    fn username_rejects_invalid_handles() {
        // Too short, too long, bad characters
        assert!(Username::parse("abcd").is_err());
        assert!(Username::parse(&"x".repeat(33)).is_err());
        assert!(Username::parse("has space").is_err());
        assert!(Username::parse("dash-ed").is_err());
        assert!(Username::parse("émigré_user").is_err());
    }

    #[test]
    fn delegation_state_writable_venue() {
        assert_eq!(
            DelegationState::Resident.writable_on(),
            Some(VenueKind::Base)
        );
        assert_eq!(
            DelegationState::Delegated {
                validator: Identity::new([1; 32])
            }
            .writable_on(),
            Some(VenueKind::Ephemeral)
        );
        assert_eq!(DelegationState::Delegating.writable_on(), None);
        assert_eq!(DelegationState::Undelegating.writable_on(), None);
    }

    #[test]
    fn store_tx_signing_bytes_commit_to_every_field() {
        let tx = StoreSessionTx {
            owner: Identity::new([7; 32]),
            payload: b"user={}".to_vec(),
            created_at: Utc::now(),
            owner_signature: vec![],
            fee_payer: None,
            fee_payer_signature: None,
        };
        let bytes = tx.signing_bytes();

        let mut other = tx.clone();
        other.payload = b"user={ }".to_vec();
        assert_ne!(bytes, other.signing_bytes());

        let mut other = tx.clone();
        other.owner = Identity::new([8; 32]);
        assert_ne!(bytes, other.signing_bytes());

        // Signatures are not part of the signed bytes
        let mut other = tx.clone();
        other.owner_signature = vec![1, 2, 3];
        assert_eq!(bytes, other.signing_bytes());
    }

    #[test]
    fn store_tx_json_uses_base64_payload() {
        let tx = StoreSessionTx {
            owner: Identity::new([7; 32]),
            payload: b"abc".to_vec(),
            created_at: Utc::now(),
            owner_signature: vec![0xde, 0xad],
            fee_payer: None,
            fee_payer_signature: None,
        };
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["payload"], "YWJj");
        let back: StoreSessionTx = serde_json::from_value(json).unwrap();
        assert_eq!(back, tx);
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! # JSON-RPC Venue Adapter
//!
//! [`RpcVenue`] speaks JSON-RPC 2.0 to an external venue node (base or
//! ephemeral). One RPC method exists per read and per mutation instruction;
//! node-reported error codes are mapped onto [`VenueError`] in one place so
//! the rest of the crate never sees raw JSON-RPC failures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::error::VenueError;
use super::types::{
    Address, AssetId, DelegationState, DepositRecord, Identity, LedgerAccount, Session,
    StoreSessionTx, Username, UsernameDepositRecord, Vault, VenueKind,
};
use super::venue::Venue;

/// Request timeout for venue calls.
const RPC_TIMEOUT: Duration = Duration::from_secs(10);

// Venue node error codes, as published by the node.
const CODE_ACCOUNT_NOT_FOUND: i64 = 1001;
const CODE_ACCOUNT_EXISTS: i64 = 1002;
const CODE_INSUFFICIENT_DEPOSIT: i64 = 1003;
const CODE_INSUFFICIENT_NATIVE: i64 = 1004;
const CODE_NOT_VERIFIED: i64 = 1005;
const CODE_NOT_RESIDENT: i64 = 1006;
const CODE_ALREADY_DELEGATED: i64 = 1007;
const CODE_NOT_DELEGATED: i64 = 1008;
const CODE_MISSING_SIGNATURE: i64 = 1009;
const CODE_INVALID_SIGNATURE: i64 = 1010;
const CODE_UNKNOWN_VERIFYING_KEY: i64 = 1011;
const CODE_RATE_LIMITED: i64 = -32001;
const CODE_CLONE_IN_PROGRESS: i64 = -32002;
const CODE_BLOCKHASH_EXPIRED: i64 = -32003;

/// JSON-RPC 2.0 connection to one venue node.
pub struct RpcVenue {
    kind: VenueKind,
    url: url::Url,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcVenue {
    /// Create a connection to the node at `url`.
    pub fn new(kind: VenueKind, url: &str) -> Result<Self, VenueError> {
        let url: url::Url = url
            .parse()
            .map_err(|e: url::ParseError| VenueError::Rpc(format!("invalid venue url: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .map_err(|e| VenueError::Rpc(format!("failed to build http client: {e}")))?;
        Ok(Self {
            kind,
            url,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, VenueError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| VenueError::Rpc(e.to_string()))?;

        if response.status().as_u16() == 429 {
            return Err(VenueError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(VenueError::Rpc(format!(
                "HTTP {} from venue node",
                response.status()
            )));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| VenueError::Rpc(format!("malformed rpc response: {e}")))?;

        if let Some(error) = envelope.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown venue error")
                .to_string();
            return Err(map_rpc_error(self.kind, code, message, error.get("data")));
        }

        let result = envelope
            .get("result")
            .cloned()
            .ok_or_else(|| VenueError::Rpc("rpc response missing result".to_string()))?;
        serde_json::from_value(result)
            .map_err(|e| VenueError::Rpc(format!("malformed rpc result: {e}")))
    }
}

/// Map a node-reported JSON-RPC error onto the venue taxonomy.
fn map_rpc_error(kind: VenueKind, code: i64, message: String, data: Option<&Value>) -> VenueError {
    let data_address = data
        .and_then(|d| d.get("address"))
        .and_then(Value::as_str)
        .and_then(|s| Address::parse(s).ok());

    match code {
        CODE_ACCOUNT_NOT_FOUND => match data_address {
            Some(address) => VenueError::AccountNotFound(address),
            None => VenueError::Rpc(format!("account not found: {message}")),
        },
        CODE_ACCOUNT_EXISTS => VenueError::AccountExists,
        CODE_INSUFFICIENT_DEPOSIT => VenueError::InsufficientDeposit,
        CODE_INSUFFICIENT_NATIVE => VenueError::InsufficientNativeBalance,
        CODE_NOT_VERIFIED => VenueError::NotVerified,
        CODE_NOT_RESIDENT => VenueError::NotResident {
            record: data_address.unwrap_or(Address::new([0; 32])),
            venue: kind,
        },
        CODE_ALREADY_DELEGATED => VenueError::AlreadyDelegated,
        CODE_NOT_DELEGATED => VenueError::NotDelegated,
        CODE_MISSING_SIGNATURE => VenueError::MissingSignature,
        CODE_INVALID_SIGNATURE => VenueError::InvalidSignature,
        CODE_UNKNOWN_VERIFYING_KEY => VenueError::UnknownVerifyingKey,
        CODE_RATE_LIMITED => VenueError::RateLimited,
        CODE_CLONE_IN_PROGRESS => VenueError::CloneInProgress,
        CODE_BLOCKHASH_EXPIRED => VenueError::BlockhashExpired,
        code if code >= 6000 => VenueError::Program {
            code: code as u32,
            message,
        },
        other => VenueError::Rpc(format!("venue error {other}: {message}")),
    }
}

#[async_trait]
impl Venue for RpcVenue {
    fn kind(&self) -> VenueKind {
        self.kind
    }

    async fn deposit(
        &self,
        owner: &Identity,
        asset: &AssetId,
    ) -> Result<Option<DepositRecord>, VenueError> {
        self.call("vault_getDeposit", json!({ "owner": owner, "asset": asset }))
            .await
    }

    async fn username_deposit(
        &self,
        username: &Username,
        asset: &AssetId,
    ) -> Result<Option<UsernameDepositRecord>, VenueError> {
        self.call(
            "vault_getUsernameDeposit",
            json!({ "username": username, "asset": asset }),
        )
        .await
    }

    async fn account(&self, address: &Address) -> Result<Option<LedgerAccount>, VenueError> {
        // The node answers with either record shape; try both.
        let value: Option<Value> = self
            .call("vault_getAccount", json!({ "address": address }))
            .await?;
        let Some(value) = value else { return Ok(None) };
        if let Ok(record) = serde_json::from_value::<DepositRecord>(value.clone()) {
            return Ok(Some(LedgerAccount::Deposit(record)));
        }
        let record: UsernameDepositRecord = serde_json::from_value(value)
            .map_err(|e| VenueError::Rpc(format!("malformed account result: {e}")))?;
        Ok(Some(LedgerAccount::UsernameDeposit(record)))
    }

    async fn vault(&self, asset: &AssetId) -> Result<Option<Vault>, VenueError> {
        self.call("vault_getVault", json!({ "asset": asset })).await
    }

    async fn session(&self, owner: &Identity) -> Result<Option<Session>, VenueError> {
        self.call("vault_getSession", json!({ "owner": owner })).await
    }

    async fn delegation_state(&self, record: &Address) -> Result<DelegationState, VenueError> {
        self.call("vault_delegationState", json!({ "record": record }))
            .await
    }

    async fn native_balance(&self, identity: &Identity) -> Result<u64, VenueError> {
        self.call("vault_nativeBalance", json!({ "identity": identity }))
            .await
    }

    async fn initialize_deposit(
        &self,
        owner: &Identity,
        asset: &AssetId,
    ) -> Result<(), VenueError> {
        self.call(
            "vault_initializeDeposit",
            json!({ "owner": owner, "asset": asset }),
        )
        .await
    }

    async fn modify_balance(
        &self,
        owner: &Identity,
        asset: &AssetId,
        amount: u64,
        increase: bool,
    ) -> Result<DepositRecord, VenueError> {
        self.call(
            "vault_modifyBalance",
            json!({ "owner": owner, "asset": asset, "amount": amount, "increase": increase }),
        )
        .await
    }

    async fn transfer_deposit(
        &self,
        source: &Identity,
        destination: &Identity,
        asset: &AssetId,
        amount: u64,
    ) -> Result<(), VenueError> {
        self.call(
            "vault_transferDeposit",
            json!({
                "source": source,
                "destination": destination,
                "asset": asset,
                "amount": amount,
            }),
        )
        .await
    }

    async fn transfer_to_username_deposit(
        &self,
        source: &Identity,
        username: &Username,
        asset: &AssetId,
        amount: u64,
    ) -> Result<(), VenueError> {
        self.call(
            "vault_transferToUsernameDeposit",
            json!({
                "source": source,
                "username": username,
                "asset": asset,
                "amount": amount,
            }),
        )
        .await
    }

    async fn deposit_for_username(
        &self,
        depositor: &Identity,
        username: &Username,
        asset: &AssetId,
        amount: u64,
    ) -> Result<UsernameDepositRecord, VenueError> {
        self.call(
            "vault_depositForUsername",
            json!({
                "depositor": depositor,
                "username": username,
                "asset": asset,
                "amount": amount,
            }),
        )
        .await
    }

    async fn claim_username_deposit(
        &self,
        username: &Username,
        asset: &AssetId,
        amount: u64,
        recipient: &Identity,
    ) -> Result<UsernameDepositRecord, VenueError> {
        self.call(
            "vault_claimUsernameDeposit",
            json!({
                "username": username,
                "asset": asset,
                "amount": amount,
                "recipient": recipient,
            }),
        )
        .await
    }

    async fn transfer_native(
        &self,
        from: &Identity,
        to: &Identity,
        amount: u64,
    ) -> Result<(), VenueError> {
        self.call(
            "vault_transferNative",
            json!({ "from": from, "to": to, "amount": amount }),
        )
        .await
    }

    async fn create_permission(&self, record: &Address) -> Result<(), VenueError> {
        self.call("vault_createPermission", json!({ "record": record }))
            .await
    }

    async fn delegate(&self, record: &Address, validator: &Identity) -> Result<(), VenueError> {
        self.call(
            "vault_delegate",
            json!({ "record": record, "validator": validator }),
        )
        .await
    }

    async fn undelegate(&self, record: &Address) -> Result<(), VenueError> {
        self.call("vault_undelegate", json!({ "record": record })).await
    }

    async fn submit_store_session(&self, tx: &StoreSessionTx) -> Result<Session, VenueError> {
        self.call("vault_storeSession", json!({ "tx": tx })).await
    }

    async fn verify_session(
        &self,
        owner: &Identity,
        signature: &[u8],
        verifying_key: &[u8; 32],
    ) -> Result<Session, VenueError> {
        self.call(
            "vault_verifySession",
            json!({
                "owner": owner,
                "signature": Base64::encode_string(signature),
                "verifyingKey": Base64::encode_string(verifying_key),
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_url() {
        assert!(RpcVenue::new(VenueKind::Base, "not a url").is_err());
        assert!(RpcVenue::new(VenueKind::Base, "https://base-venue.example/rpc").is_ok());
    }

    #[test]
    fn maps_known_error_codes() {
        let map = |code, msg: &str| map_rpc_error(VenueKind::Base, code, msg.to_string(), None);

        assert!(matches!(map(CODE_ACCOUNT_EXISTS, ""), VenueError::AccountExists));
        assert!(matches!(
            map(CODE_INSUFFICIENT_DEPOSIT, ""),
            VenueError::InsufficientDeposit
        ));
        assert!(matches!(map(CODE_NOT_VERIFIED, ""), VenueError::NotVerified));
        assert!(matches!(map(CODE_RATE_LIMITED, ""), VenueError::RateLimited));
        assert!(matches!(
            map(CODE_CLONE_IN_PROGRESS, ""),
            VenueError::CloneInProgress
        ));
        assert!(matches!(
            map(6015, "invalid username"),
            VenueError::Program { code: 6015, .. }
        ));
        assert!(matches!(map(-32602, "bad params"), VenueError::Rpc(_)));
    }

    #[test]
    fn not_found_uses_data_address_when_present() {
        let address = Address::new([7; 32]);
        let data = json!({ "address": address });
        let err = map_rpc_error(
            VenueKind::Base,
            CODE_ACCOUNT_NOT_FOUND,
            "missing".to_string(),
            Some(&data),
        );
        match err {
            VenueError::AccountNotFound(a) => assert_eq!(a, address),
            other => panic!("unexpected: {other:?}"),
        }
    }
}

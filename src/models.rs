// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! # API Data Models
//!
//! Request and response structures of the REST API. All types derive
//! `Serialize`/`Deserialize` and `ToSchema` for JSON handling and OpenAPI
//! documentation.
//!
//! The gasless claim request keeps every field optional and byte fields as
//! base64 strings: presence and well-formedness are validated by the
//! handler so that malformed requests map to `400` (not the framework's
//! default rejection), per the relay contract.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ledger::types::{Address, Identity};

// =============================================================================
// Gasless claim
// =============================================================================

/// Body of `POST /api/gasless/claim`.
///
/// Byte fields (`storeTx`, `processedInitDataBytes`,
/// `telegramSignatureBytes`, `telegramPublicKeyBytes`) are base64-encoded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GaslessClaimRequest {
    /// Caller-prepared, owner-signed store-session transaction (base64 JSON).
    pub store_tx: Option<String>,
    /// Recipient public key (hex).
    pub recipient_pub_key: Option<String>,
    /// Caller-claimed username; checked against the payload server-side.
    pub username: Option<String>,
    /// Amount to claim, in the asset's smallest unit.
    pub amount: Option<u64>,
    /// Raw validation payload bytes (base64).
    pub processed_init_data_bytes: Option<String>,
    /// Detached platform signature bytes (base64).
    pub telegram_signature_bytes: Option<String>,
    /// Verifying key the signature is presented under (base64, 32 bytes).
    pub telegram_public_key_bytes: Option<String>,
}

/// Success body of `POST /api/gasless/claim`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GaslessClaimResponse {
    pub success: bool,
}

// =============================================================================
// Deposit reads
// =============================================================================

/// Balance view of a per-owner deposit record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DepositBalanceResponse {
    /// Owner identity.
    pub owner: Identity,
    /// Asset identifier.
    pub asset: String,
    /// Current balance in the asset's smallest unit.
    pub amount: u64,
    /// Derived record address.
    pub address: Address,
}

/// Balance view of a username-addressed deposit record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UsernameDepositBalanceResponse {
    /// Handle the record is addressed to.
    pub username: String,
    /// Asset identifier.
    pub asset: String,
    /// Current balance in the asset's smallest unit.
    pub amount: u64,
    /// Derived record address.
    pub address: Address,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gasless_request_uses_camel_case_wire_names() {
        let json = serde_json::json!({
            "storeTx": "e30=",
            "recipientPubKey": "0xabab",
            "username": "validuser123",
            "amount": 200000,
            "processedInitDataBytes": "YQ==",
            "telegramSignatureBytes": "Yg==",
            "telegramPublicKeyBytes": "Yw==",
        });
        let request: GaslessClaimRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.username.as_deref(), Some("validuser123"));
        assert_eq!(request.amount, Some(200_000));
        assert_eq!(request.store_tx.as_deref(), Some("e30="));
    }

    #[test]
    fn gasless_request_tolerates_missing_fields() {
        // Presence is the handler's job; deserialization must not reject.
        let request: GaslessClaimRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(request.store_tx.is_none());
        assert!(request.amount.is_none());
    }

    #[test]
    fn claim_response_shape() {
        let body = serde_json::to_value(GaslessClaimResponse { success: true }).unwrap();
        assert_eq!(body, serde_json::json!({ "success": true }));
    }
}

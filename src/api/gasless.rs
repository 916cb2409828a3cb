// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! Gasless claim endpoint.
//!
//! Decodes and validates the wire request (every problem here is a `400`),
//! then hands the typed input to the relay. Internal relay failures render
//! as an opaque `500`; the detail goes to the log only.

use axum::{extract::State, Json};
use base64ct::{Base64, Encoding};

use crate::{
    error::ApiError,
    ledger::address::username_deposit_address,
    ledger::types::{Identity, StoreSessionTx, Username},
    models::{GaslessClaimRequest, GaslessClaimResponse},
    relay::{GaslessClaimInput, RelayError},
    state::AppState,
};

fn require<T>(value: Option<T>, name: &str) -> Result<T, ApiError> {
    value.ok_or_else(|| ApiError::bad_request(format!("missing required field: {name}")))
}

fn decode_base64(value: &str, name: &str) -> Result<Vec<u8>, ApiError> {
    Base64::decode_vec(value)
        .map_err(|_| ApiError::bad_request(format!("field {name} is not valid base64")))
}

/// Validate presence and shape of every wire field.
pub(crate) fn decode_request(request: GaslessClaimRequest) -> Result<GaslessClaimInput, ApiError> {
    let store_tx_b64 = require(request.store_tx, "storeTx")?;
    let recipient_hex = require(request.recipient_pub_key, "recipientPubKey")?;
    let username_raw = require(request.username, "username")?;
    let amount = require(request.amount, "amount")?;
    let init_data_b64 = require(request.processed_init_data_bytes, "processedInitDataBytes")?;
    let signature_b64 = require(request.telegram_signature_bytes, "telegramSignatureBytes")?;
    let key_b64 = require(request.telegram_public_key_bytes, "telegramPublicKeyBytes")?;

    let store_tx_bytes = decode_base64(&store_tx_b64, "storeTx")?;
    let store_tx: StoreSessionTx = serde_json::from_slice(&store_tx_bytes)
        .map_err(|e| ApiError::bad_request(format!("malformed store transaction: {e}")))?;
    let recipient = Identity::parse(&recipient_hex)
        .map_err(|e| ApiError::bad_request(format!("invalid recipientPubKey: {e}")))?;
    let username = Username::parse(&username_raw)
        .map_err(|e| ApiError::bad_request(format!("invalid username: {e}")))?;
    let init_data = decode_base64(&init_data_b64, "processedInitDataBytes")?;
    let signature = decode_base64(&signature_b64, "telegramSignatureBytes")?;
    let verifying_key: [u8; 32] = decode_base64(&key_b64, "telegramPublicKeyBytes")?
        .try_into()
        .map_err(|_| ApiError::bad_request("telegramPublicKeyBytes must be 32 bytes"))?;

    Ok(GaslessClaimInput {
        store_tx,
        recipient,
        username,
        amount,
        init_data,
        signature,
        verifying_key,
    })
}

/// Sponsor a store-verify-claim flow for a caller who cannot pay fees.
#[utoipa::path(
    post,
    path = "/api/gasless/claim",
    request_body = GaslessClaimRequest,
    tag = "Gasless",
    responses(
        (status = 200, description = "Claim relayed successfully", body = GaslessClaimResponse),
        (status = 400, description = "Malformed request or username mismatch"),
        (status = 500, description = "Relay failure (opaque)")
    )
)]
pub async fn gasless_claim(
    State(state): State<AppState>,
    Json(request): Json<GaslessClaimRequest>,
) -> Result<Json<GaslessClaimResponse>, ApiError> {
    let input = decode_request(request)?;
    let username = input.username.clone();

    match state.relay.handle(input).await {
        Ok(_outcome) => {
            // The claim touched this record; drop any cached read of it.
            let record = username_deposit_address(&username, state.relay.asset());
            state.balances.invalidate(&record);
            Ok(Json(GaslessClaimResponse { success: true }))
        }
        Err(RelayError::BadRequest(message)) => Err(ApiError::bad_request(message)),
        Err(err @ RelayError::Internal(_)) => {
            if let RelayError::Internal(detail) = &err {
                tracing::error!(%detail, "gasless claim failed");
            }
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::cache::CacheService;
    use crate::ledger::memory::testutil::{generate_key, signed_store_tx, TestKey};
    use crate::ledger::memory::{MemoryVenue, MemoryVenueConfig};
    use crate::ledger::types::AssetId;
    use crate::ledger::{DepositLedgerClient, RetryPolicy, Venue};
    use crate::relay::GaslessRelay;
    use crate::session::{SessionGate, ValidationPayload, VerifyingKeySet};
    use crate::signer::{KeypairSigner, Signer};

    const BOT_ID: i64 = 7_654_321;

    struct TestApp {
        state: AppState,
        base: Arc<MemoryVenue>,
        platform: TestKey,
    }

    async fn test_app() -> TestApp {
        let platform = generate_key();
        let keys = VerifyingKeySet {
            production: *platform.identity.as_bytes(),
            test: VerifyingKeySet::platform_defaults().test,
        };
        let (base, ephemeral) = MemoryVenue::pair(MemoryVenueConfig {
            clone_lag: 0,
            commit_lag: 0,
            bot_id: BOT_ID,
            verifying_keys: keys.to_vec(),
        });
        let client = Arc::new(DepositLedgerClient::with_connected(
            base.clone() as Arc<dyn Venue>,
            ephemeral as Arc<dyn Venue>,
            RetryPolicy::immediate(4),
        ));
        let gate = Arc::new(SessionGate::new(base.clone() as Arc<dyn Venue>, keys, BOT_ID));
        let signer = Arc::new(KeypairSigner::generate().unwrap());
        base.credit_native(&signer.public_identity().await.unwrap(), 10_000_000);

        let relay = Arc::new(GaslessRelay::new(
            Arc::clone(&client),
            gate,
            signer,
            AssetId::from("USDT"),
            50_000,
        ));
        let balances = Arc::new(CacheService::new(64, Duration::from_secs(5)));
        TestApp {
            state: AppState::new(relay, client, balances),
            base,
            platform,
        }
    }

    fn well_formed_request(app: &TestApp, recipient: &TestKey, username: &str) -> GaslessClaimRequest {
        let helper = generate_key();
        let mut tx = signed_store_tx(recipient, &helper, username);
        tx.fee_payer = None;
        tx.fee_payer_signature = None;

        let parsed = ValidationPayload::parse(&tx.payload).unwrap();
        let signature = app
            .platform
            .keypair
            .sign(parsed.check_string(BOT_ID).as_bytes());

        GaslessClaimRequest {
            store_tx: Some(Base64::encode_string(&serde_json::to_vec(&tx).unwrap())),
            recipient_pub_key: Some(recipient.identity.to_string()),
            username: Some(username.to_string()),
            amount: Some(200_000),
            processed_init_data_bytes: Some(Base64::encode_string(&tx.payload)),
            telegram_signature_bytes: Some(Base64::encode_string(signature.as_ref())),
            telegram_public_key_bytes: Some(Base64::encode_string(app.platform.identity.as_bytes())),
        }
    }

    #[tokio::test]
    async fn missing_fields_are_rejected_with_field_name() {
        let err = decode_request(GaslessClaimRequest::default()).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
        assert!(err.message.contains("storeTx"), "got: {}", err.message);
    }

    #[tokio::test]
    async fn undecodable_bytes_are_rejected() {
        let app = test_app().await;
        let recipient = generate_key();
        let mut request = well_formed_request(&app, &recipient, "validuser123");
        request.telegram_public_key_bytes = Some("@@not-base64@@".to_string());

        let err = decode_request(request).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn end_to_end_claim_over_the_handler() {
        let app = test_app().await;
        let recipient = generate_key();

        // Fund the username deposit first
        let depositor = crate::ledger::types::Identity::new([0xdd; 32]);
        app.base.credit_native(&depositor, 500_000);
        app.state
            .client
            .deposit_for_username(
                &depositor,
                &Username::parse("validuser123").unwrap(),
                &AssetId::from("USDT"),
                500_000,
            )
            .await
            .unwrap();

        let request = well_formed_request(&app, &recipient, "validuser123");
        let response = gasless_claim(State(app.state.clone()), Json(request))
            .await
            .expect("claim relays");
        assert!(response.0.success);

        let record = app
            .state
            .client
            .username_deposit(&Username::parse("validuser123").unwrap(), &AssetId::from("USDT"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.amount, 300_000);
    }

    #[tokio::test]
    async fn mismatched_username_maps_to_400() {
        let app = test_app().await;
        let recipient = generate_key();
        let mut request = well_formed_request(&app, &recipient, "validuser123");
        request.username = Some("wronguser12".to_string());

        let err = gasless_claim(State(app.state.clone()), Json(request))
            .await
            .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
    }
}

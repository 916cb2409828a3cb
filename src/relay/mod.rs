// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! # Gasless Claim Relay
//!
//! Fee-sponsoring boundary for callers whose external holding cannot cover
//! transaction fees. For each request the relay:
//!
//! 1. receives validated, decoded inputs from the API layer
//! 2. re-derives the username from the raw payload and requires it to match
//!    the caller's claim (mismatch is rejected before anything is submitted)
//! 3. co-signs and submits the caller-prepared store-session transaction,
//!    paying fees itself; recognized invalid-username program failures map
//!    to a caller error, everything else to an opaque internal error
//! 4. runs signature verification for the recipient's session
//! 5. settles the claim when the username record is base-resident (see
//!    below), then tops the recipient's external holding up to the
//!    configured reserve floor from the relay's own funds
//! 6. reports success only after every step completed
//!
//! Claim settlement on this path is deliberately conditional: the direct
//! claim instruction cannot run against the ephemeral venue, so when the
//! username record is currently delegated the relay skips settlement (with
//! a warning) and only restores the reserve floor. Base-resident records
//! are claimed for real.

use std::sync::Arc;

use uuid::Uuid;

use crate::ledger::address::username_deposit_address;
use crate::ledger::{
    AssetId, DelegationState, DepositLedgerClient, Identity, StoreSessionTx, Username, Venue,
};
use crate::session::SessionGate;
use crate::signer::Signer;

/// Decoded, well-typed gasless claim request.
#[derive(Debug)]
pub struct GaslessClaimInput {
    /// Caller-prepared, owner-signed store-session transaction.
    pub store_tx: StoreSessionTx,
    /// Recipient of the claim (and owner of the session).
    pub recipient: Identity,
    /// Caller-claimed username; checked against the payload, never trusted.
    pub username: Username,
    /// Amount to claim from the username deposit.
    pub amount: u64,
    /// Raw validation payload bytes.
    pub init_data: Vec<u8>,
    /// Detached platform signature over the payload's validation string.
    pub signature: Vec<u8>,
    /// Verifying key the signature is presented under.
    pub verifying_key: [u8; 32],
}

/// What the relay actually did for a successful request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaslessClaimOutcome {
    /// Whether the claim itself was settled (false when the record was
    /// delegated and only the reserve top-up ran).
    pub claim_settled: bool,
    /// Units transferred from the relay to restore the reserve floor.
    pub reserve_topped_up: u64,
}

/// Relay failures, already split by who is at fault.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Caller problem; maps to HTTP 400 with the given message.
    #[error("{0}")]
    BadRequest(String),

    /// Anything else; maps to HTTP 500 with an opaque message. The detail
    /// is logged, never returned.
    #[error("failed to claim deposit")]
    Internal(String),
}

/// Recognize the venue's invalid-username program failure in serialized
/// failure text. The relay only sees stringified errors from the submission
/// path, so this is deliberately a text match on the known spellings.
pub fn is_invalid_username_failure(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("invalid username") || lower.contains("0x177f") || lower.contains("6015")
}

/// Fee-sponsoring claim relay.
pub struct GaslessRelay {
    client: Arc<DepositLedgerClient>,
    gate: Arc<SessionGate>,
    signer: Arc<dyn Signer>,
    /// Asset username deposits are denominated in on this deployment.
    asset: AssetId,
    /// Reserve floor for recipient external holdings.
    min_reserve: u64,
}

impl GaslessRelay {
    pub fn new(
        client: Arc<DepositLedgerClient>,
        gate: Arc<SessionGate>,
        signer: Arc<dyn Signer>,
        asset: AssetId,
        min_reserve: u64,
    ) -> Self {
        Self {
            client,
            gate,
            signer,
            asset,
            min_reserve,
        }
    }

    /// Asset username deposits are denominated in on this deployment.
    pub fn asset(&self) -> &AssetId {
        &self.asset
    }

    /// Run one gasless claim end to end.
    pub async fn handle(&self, input: GaslessClaimInput) -> Result<GaslessClaimOutcome, RelayError> {
        let claim_id = Uuid::new_v4();

        if input.amount == 0 {
            return Err(RelayError::BadRequest(
                "amount must be a positive integer".to_string(),
            ));
        }
        if input.store_tx.owner != input.recipient {
            return Err(RelayError::BadRequest(
                "store transaction owner does not match recipient".to_string(),
            ));
        }
        if input.store_tx.payload != input.init_data {
            return Err(RelayError::BadRequest(
                "store transaction payload does not match init data".to_string(),
            ));
        }

        // Never trust the caller's username: re-derive it from the payload.
        let extracted = self
            .gate
            .extract_username(&input.init_data)
            .map_err(|e| RelayError::BadRequest(format!("invalid init data: {e}")))?;
        if extracted != input.username {
            tracing::warn!(
                %claim_id,
                claimed = %input.username,
                extracted = %extracted,
                "rejecting claim with mismatched username"
            );
            return Err(RelayError::BadRequest(
                "username does not match init data".to_string(),
            ));
        }

        // Co-sign and submit the caller-prepared store transaction.
        let mut store_tx = input.store_tx;
        self.signer
            .sign_transaction(&mut store_tx)
            .await
            .map_err(|e| RelayError::Internal(format!("fee-payer signing failed: {e}")))?;
        if let Err(err) = self.gate.store(&store_tx).await {
            let text = err.to_string();
            return if is_invalid_username_failure(&text) {
                Err(RelayError::BadRequest(text))
            } else {
                Err(RelayError::Internal(format!("store failed: {text}")))
            };
        }

        // Verification failures stay opaque to the caller.
        self.gate
            .verify(&input.recipient, &input.signature, &input.verifying_key)
            .await
            .map_err(|e| RelayError::Internal(format!("verification failed: {e}")))?;

        let claim_settled = self
            .settle_claim(&claim_id, &input.username, input.amount, &input.recipient)
            .await?;
        let reserve_topped_up = self.top_up_reserve(&claim_id, &input.recipient).await?;

        tracing::info!(
            %claim_id,
            recipient = %input.recipient,
            username = %input.username,
            amount = input.amount,
            claim_settled,
            reserve_topped_up,
            "gasless claim completed"
        );

        Ok(GaslessClaimOutcome {
            claim_settled,
            reserve_topped_up,
        })
    }

    /// Settle the claim when the record is base-resident; skip when it is
    /// delegated (the claim instruction cannot run against the ephemeral
    /// venue).
    async fn settle_claim(
        &self,
        claim_id: &Uuid,
        username: &Username,
        amount: u64,
        recipient: &Identity,
    ) -> Result<bool, RelayError> {
        let record = username_deposit_address(username, &self.asset);
        let state = self
            .client
            .base()
            .delegation_state(&record)
            .await
            .map_err(|e| RelayError::Internal(format!("residency lookup failed: {e}")))?;

        if state != DelegationState::Resident {
            tracing::warn!(
                %claim_id,
                %record,
                ?state,
                "username record is not base-resident; skipping claim settlement"
            );
            return Ok(false);
        }

        self.client
            .claim_username_deposit(username, &self.asset, amount, recipient)
            .await
            .map_err(|e| RelayError::Internal(format!("claim failed: {e}")))?;
        Ok(true)
    }

    /// Fund the recipient's external holding up to the reserve floor.
    async fn top_up_reserve(
        &self,
        claim_id: &Uuid,
        recipient: &Identity,
    ) -> Result<u64, RelayError> {
        let balance = self
            .client
            .native_balance(recipient)
            .await
            .map_err(|e| RelayError::Internal(format!("balance lookup failed: {e}")))?;
        if balance >= self.min_reserve {
            return Ok(0);
        }

        let shortfall = self.min_reserve - balance;
        let relay_identity = self
            .signer
            .public_identity()
            .await
            .map_err(|e| RelayError::Internal(format!("relay identity unavailable: {e}")))?;
        self.client
            .base()
            .transfer_native(&relay_identity, recipient, shortfall)
            .await
            .map_err(|e| RelayError::Internal(format!("reserve top-up failed: {e}")))?;

        tracing::debug!(%claim_id, %recipient, shortfall, "reserve floor restored");
        Ok(shortfall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::testutil::{generate_key, signed_store_tx, TestKey};
    use crate::ledger::memory::{MemoryVenue, MemoryVenueConfig};
    use crate::ledger::{RetryPolicy, Venue};
    use crate::session::{ValidationPayload, VerifyingKeySet};
    use crate::signer::KeypairSigner;

    const BOT_ID: i64 = 7_654_321;
    const MIN_RESERVE: u64 = 50_000;

    struct Harness {
        relay: GaslessRelay,
        base: Arc<MemoryVenue>,
        client: Arc<DepositLedgerClient>,
        platform: TestKey,
        relay_identity: Identity,
    }

    async fn harness() -> Harness {
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
        let gate = Arc::new(SessionGate::new(
            base.clone() as Arc<dyn Venue>,
            keys,
            BOT_ID,
        ));
        let signer = Arc::new(KeypairSigner::generate().unwrap());
        let relay_identity = signer.public_identity().await.unwrap();
        base.credit_native(&relay_identity, 10_000_000);

        let relay = GaslessRelay::new(
            Arc::clone(&client),
            gate,
            signer,
            AssetId::from("USDT"),
            MIN_RESERVE,
        );
        Harness {
            relay,
            base,
            client,
            platform,
            relay_identity,
        }
    }

    fn platform_signature(platform: &TestKey, payload: &[u8]) -> Vec<u8> {
        let parsed = ValidationPayload::parse(payload).unwrap();
        platform
            .keypair
            .sign(parsed.check_string(BOT_ID).as_bytes())
            .as_ref()
            .to_vec()
    }

    async fn fund_username(harness: &Harness, username: &str, amount: u64) {
        let depositor = Identity::new([0xdd; 32]);
        harness.base.credit_native(&depositor, amount);
        harness
            .client
            .deposit_for_username(
                &depositor,
                &Username::parse(username).unwrap(),
                &AssetId::from("USDT"),
                amount,
            )
            .await
            .unwrap();
    }

    fn claim_input(
        recipient: &TestKey,
        platform: &TestKey,
        fee_placeholder: &TestKey,
        username: &str,
        claimed_username: &str,
        amount: u64,
    ) -> GaslessClaimInput {
        // The caller signs only as owner; the relay replaces the fee-payer
        // fields with its own before submission.
        let tx = signed_store_tx(recipient, fee_placeholder, username);
        let init_data = tx.payload.clone();
        let signature = platform_signature(platform, &init_data);
        GaslessClaimInput {
            store_tx: StoreSessionTx {
                fee_payer: None,
                fee_payer_signature: None,
                ..tx
            },
            recipient: recipient.identity,
            username: Username::parse(claimed_username).unwrap(),
            amount,
            init_data,
            signature,
            verifying_key: *platform.identity.as_bytes(),
        }
    }

    #[tokio::test]
    async fn well_formed_claim_succeeds() {
        let h = harness().await;
        let recipient = generate_key();
        let helper = generate_key();
        fund_username(&h, "validuser123", 400_000).await;

        let input = claim_input(&recipient, &h.platform, &helper, "validuser123", "validuser123", 200_000);
        let outcome = h.relay.handle(input).await.unwrap();

        assert!(outcome.claim_settled);
        // Claim already lifted the recipient above the reserve floor
        assert_eq!(outcome.reserve_topped_up, 0);

        let record = h
            .client
            .username_deposit(&Username::parse("validuser123").unwrap(), &AssetId::from("USDT"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.amount, 200_000);
        assert_eq!(
            h.client.native_balance(&recipient.identity).await.unwrap(),
            200_000
        );
    }

    #[tokio::test]
    async fn small_claim_still_restores_reserve_floor() {
        let h = harness().await;
        let recipient = generate_key();
        let helper = generate_key();
        fund_username(&h, "validuser123", 400_000).await;

        let input = claim_input(&recipient, &h.platform, &helper, "validuser123", "validuser123", 10_000);
        let outcome = h.relay.handle(input).await.unwrap();

        assert!(outcome.claim_settled);
        assert_eq!(outcome.reserve_topped_up, MIN_RESERVE - 10_000);
        assert_eq!(
            h.client.native_balance(&recipient.identity).await.unwrap(),
            MIN_RESERVE
        );
        // The top-up came out of the relay's own funds
        assert_eq!(
            h.client.native_balance(&h.relay_identity).await.unwrap(),
            10_000_000 - (MIN_RESERVE - 10_000)
        );
    }

    #[tokio::test]
    async fn mismatched_username_is_rejected_before_any_mutation() {
        let h = harness().await;
        let recipient = generate_key();
        let helper = generate_key();
        fund_username(&h, "validuser123", 400_000).await;

        let input = claim_input(&recipient, &h.platform, &helper, "validuser123", "wronguser12", 200_000);
        let result = h.relay.handle(input).await;
        assert!(matches!(result, Err(RelayError::BadRequest(_))));

        // No session stored, no balance moved
        assert!(h
            .client
            .session(&recipient.identity)
            .await
            .unwrap()
            .is_none());
        let record = h
            .client
            .username_deposit(&Username::parse("validuser123").unwrap(), &AssetId::from("USDT"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.amount, 400_000);
        assert_eq!(h.client.native_balance(&recipient.identity).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unverifiable_signature_is_an_opaque_failure() {
        let h = harness().await;
        let recipient = generate_key();
        let helper = generate_key();
        fund_username(&h, "validuser123", 400_000).await;

        let mut input =
            claim_input(&recipient, &h.platform, &helper, "validuser123", "validuser123", 200_000);
        input.signature = vec![0u8; 64];

        let result = h.relay.handle(input).await;
        match result {
            Err(RelayError::Internal(detail)) => {
                // The public rendering stays opaque regardless of detail
                assert_eq!(
                    RelayError::Internal(detail).to_string(),
                    "failed to claim deposit"
                );
            }
            other => panic!("unexpected: {other:?}"),
        }

        let record = h
            .client
            .username_deposit(&Username::parse("validuser123").unwrap(), &AssetId::from("USDT"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.amount, 400_000);
    }

    #[tokio::test]
    async fn delegated_record_skips_settlement_but_tops_up() {
        let h = harness().await;
        let recipient = generate_key();
        let helper = generate_key();
        fund_username(&h, "validuser123", 400_000).await;

        // Delegate the username record away from the base venue
        let record = username_deposit_address(
            &Username::parse("validuser123").unwrap(),
            &AssetId::from("USDT"),
        );
        h.base.create_permission(&record).await.unwrap();
        h.base
            .delegate(&record, &Identity::new([9; 32]))
            .await
            .unwrap();

        let input = claim_input(&recipient, &h.platform, &helper, "validuser123", "validuser123", 200_000);
        let outcome = h.relay.handle(input).await.unwrap();

        assert!(!outcome.claim_settled);
        assert_eq!(outcome.reserve_topped_up, MIN_RESERVE);
        assert_eq!(
            h.client.native_balance(&recipient.identity).await.unwrap(),
            MIN_RESERVE
        );
    }

    #[test]
    fn invalid_username_failure_matching() {
        assert!(is_invalid_username_failure(
            "custom program error: 0x177f (6015): invalid username"
        ));
        assert!(is_invalid_username_failure("Error: Invalid Username"));
        assert!(is_invalid_username_failure("program failed with code 6015"));
        assert!(!is_invalid_username_failure("insufficient deposit balance"));
        assert!(!is_invalid_username_failure("rate limited by venue"));
    }
}

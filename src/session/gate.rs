// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! # Session Verification Gate
//!
//! Two instructions over session records:
//!
//! - `store` persists raw payload bytes (no authenticity proven yet)
//! - `verify` checks a detached Ed25519 signature over the payload's
//!   validation string against a two-entry allow-list of platform verifying
//!   keys (production and test channels)
//!
//! The signature is always checked against the payload *stored on the
//! session being verified*, so a signature lifted from one session can
//! never verify a different one. Claim-gated operations referencing a
//! session before `verify` fail with the venue's not-verified code.

use std::sync::Arc;

use ring::signature::{UnparsedPublicKey, ED25519};

use crate::ledger::types::{Identity, Session, StoreSessionTx, Username};
use crate::ledger::venue::Venue;
use crate::ledger::VenueError;

use super::payload::{PayloadError, ValidationPayload};

/// Platform verifying key for the production channel.
const PRODUCTION_VERIFYING_KEY_HEX: &str =
    "e7bf03a2fa4602af4580703d88dda5bb59f32ed8b02a56c187fe7d34caed242d";

/// Platform verifying key for the test channel.
const TEST_VERIFYING_KEY_HEX: &str =
    "40055058a4ee38156a06562e52eece92a771bcd8346a8c4615cb7376eddf72ec";

/// The allow-list of keys a session signature may verify against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyingKeySet {
    pub production: [u8; 32],
    pub test: [u8; 32],
}

impl VerifyingKeySet {
    /// The platform's published production and test channel keys.
    pub fn platform_defaults() -> Self {
        Self {
            production: decode_key(PRODUCTION_VERIFYING_KEY_HEX),
            test: decode_key(TEST_VERIFYING_KEY_HEX),
        }
    }

    pub fn contains(&self, key: &[u8; 32]) -> bool {
        key == &self.production || key == &self.test
    }

    pub fn to_vec(&self) -> Vec<[u8; 32]> {
        vec![self.production, self.test]
    }
}

fn decode_key(hex_key: &str) -> [u8; 32] {
    let bytes = hex::decode(hex_key).expect("verifying key constant is valid hex");
    bytes
        .try_into()
        .expect("verifying key constant is 32 bytes")
}

/// Errors from the session gate.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("no session stored for {0}")]
    NoSession(Identity),

    #[error("verifying key is not on the allow-list")]
    UnknownVerifyingKey,

    #[error("payload signature verification failed")]
    InvalidSignature,

    #[error("venue rejected the session instruction: {0}")]
    Venue(#[from] VenueError),
}

/// Gate composing payload parsing, signature checks and the venue's
/// session instructions.
pub struct SessionGate {
    venue: Arc<dyn Venue>,
    keys: VerifyingKeySet,
    bot_id: i64,
}

impl SessionGate {
    pub fn new(venue: Arc<dyn Venue>, keys: VerifyingKeySet, bot_id: i64) -> Self {
        Self {
            venue,
            keys,
            bot_id,
        }
    }

    pub fn keys(&self) -> &VerifyingKeySet {
        &self.keys
    }

    /// Re-parse the username out of raw payload bytes.
    ///
    /// Callers supplying a username of their own are checked against this,
    /// never the other way around.
    pub fn extract_username(&self, payload: &[u8]) -> Result<Username, SessionError> {
        let payload = ValidationPayload::parse(payload)?;
        Ok(payload.username()?)
    }

    /// Submit a co-signed store transaction, persisting the session.
    ///
    /// The payload is parsed client-side first so malformed handles fail
    /// before any submission.
    pub async fn store(&self, tx: &StoreSessionTx) -> Result<Session, SessionError> {
        self.extract_username(&tx.payload)?;
        Ok(self.venue.submit_store_session(tx).await?)
    }

    /// Verify `owner`'s stored session against `signature` and
    /// `verifying_key`, flipping it to verified.
    ///
    /// The signature is checked client-side over the stored payload's
    /// validation string before the venue instruction is submitted, so
    /// obviously-bad requests never reach the venue.
    pub async fn verify(
        &self,
        owner: &Identity,
        signature: &[u8],
        verifying_key: &[u8; 32],
    ) -> Result<Session, SessionError> {
        if !self.keys.contains(verifying_key) {
            return Err(SessionError::UnknownVerifyingKey);
        }

        let session = self
            .venue
            .session(owner)
            .await?
            .ok_or(SessionError::NoSession(*owner))?;
        let payload = ValidationPayload::parse(&session.payload)?;
        let message = payload.check_string(self.bot_id);
        UnparsedPublicKey::new(&ED25519, verifying_key.as_slice())
            .verify(message.as_bytes(), signature)
            .map_err(|_| SessionError::InvalidSignature)?;

        Ok(self
            .venue
            .verify_session(owner, signature, verifying_key)
            .await?)
    }
}

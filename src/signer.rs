// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! # Signer Capability Interface
//!
//! Consumers of signing need exactly three operations: the signer's public
//! identity, a detached signature over a message, and co-signing a store
//! transaction as fee payer. [`Signer`] exposes those and nothing else;
//! the concrete key shape is chosen once at construction:
//!
//! - [`KeypairSigner`] - raw in-memory Ed25519 key material
//! - [`SealedKeySigner`] - PKCS#8 PEM key file, loaded lazily single-flight
//! - [`RemoteSigner`] - HTTP signing service holding the key elsewhere

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::ledger::types::{Identity, StoreSessionTx};

/// Request timeout against a remote signing service.
const REMOTE_SIGNER_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from signing operations.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("failed to load signing key: {0}")]
    KeyLoad(String),

    #[error("remote signer failure: {0}")]
    Remote(String),
}

/// Signing capability, independent of where the key lives.
#[async_trait]
pub trait Signer: Send + Sync {
    /// The signer's ledger identity (Ed25519 public key).
    async fn public_identity(&self) -> Result<Identity, SignerError>;

    /// Detached Ed25519 signature over `message`.
    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, SignerError>;

    /// Co-sign `tx` as fee payer, filling the fee-payer fields.
    async fn sign_transaction(&self, tx: &mut StoreSessionTx) -> Result<(), SignerError> {
        let identity = self.public_identity().await?;
        tx.fee_payer = Some(identity);
        let signature = self.sign_message(&tx.signing_bytes()).await?;
        tx.fee_payer_signature = Some(signature);
        Ok(())
    }
}

// =============================================================================
// Raw key material
// =============================================================================

/// Signer over an in-memory Ed25519 keypair.
pub struct KeypairSigner {
    keypair: Ed25519KeyPair,
    identity: Identity,
}

impl KeypairSigner {
    /// Parse a PKCS#8 DER keypair.
    pub fn from_pkcs8(der: &[u8]) -> Result<Self, SignerError> {
        let keypair = Ed25519KeyPair::from_pkcs8(der)
            .map_err(|e| SignerError::KeyLoad(format!("invalid pkcs8 key: {e}")))?;
        let identity = Identity::new(
            keypair
                .public_key()
                .as_ref()
                .try_into()
                .map_err(|_| SignerError::KeyLoad("unexpected public key length".to_string()))?,
        );
        Ok(Self { keypair, identity })
    }

    /// Generate a fresh keypair (memory mode and tests).
    pub fn generate() -> Result<Self, SignerError> {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng)
            .map_err(|e| SignerError::KeyLoad(format!("keygen failed: {e}")))?;
        Self::from_pkcs8(pkcs8.as_ref())
    }
}

#[async_trait]
impl Signer for KeypairSigner {
    async fn public_identity(&self) -> Result<Identity, SignerError> {
        Ok(self.identity)
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        Ok(self.keypair.sign(message).as_ref().to_vec())
    }
}

// =============================================================================
// Sealed key file
// =============================================================================

/// Signer over a PKCS#8 PEM key file, parsed once on first use.
///
/// Concurrent first uses converge on a single load (the cell is
/// single-flight); the parsed keypair is cached for the process lifetime.
pub struct SealedKeySigner {
    path: PathBuf,
    loaded: OnceCell<Arc<KeypairSigner>>,
}

impl SealedKeySigner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loaded: OnceCell::new(),
        }
    }

    async fn keypair(&self) -> Result<&Arc<KeypairSigner>, SignerError> {
        self.loaded
            .get_or_try_init(|| async {
                let pem_bytes = std::fs::read(&self.path).map_err(|e| {
                    SignerError::KeyLoad(format!("cannot read {}: {e}", self.path.display()))
                })?;
                let pem_str = std::str::from_utf8(&pem_bytes)
                    .map_err(|_| SignerError::KeyLoad("key file is not UTF-8".to_string()))?;
                let parsed = pem::parse(pem_str)
                    .map_err(|e| SignerError::KeyLoad(format!("invalid PEM: {e}")))?;
                Ok(Arc::new(KeypairSigner::from_pkcs8(parsed.contents())?))
            })
            .await
    }
}

#[async_trait]
impl Signer for SealedKeySigner {
    async fn public_identity(&self) -> Result<Identity, SignerError> {
        self.keypair().await?.public_identity().await
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        self.keypair().await?.sign_message(message).await
    }
}

// =============================================================================
// Remote signing service
// =============================================================================

#[derive(Deserialize)]
struct RemoteIdentityResponse {
    identity: Identity,
}

#[derive(Deserialize)]
struct RemoteSignResponse {
    signature: String,
}

/// Signer delegating to an HTTP signing service.
pub struct RemoteSigner {
    base_url: url::Url,
    client: reqwest::Client,
    identity: OnceCell<Identity>,
}

impl RemoteSigner {
    pub fn new(base_url: &str) -> Result<Self, SignerError> {
        let base_url: url::Url = base_url
            .parse()
            .map_err(|e: url::ParseError| SignerError::Remote(format!("invalid url: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(REMOTE_SIGNER_TIMEOUT)
            .build()
            .map_err(|e| SignerError::Remote(format!("failed to build http client: {e}")))?;
        Ok(Self {
            base_url,
            client,
            identity: OnceCell::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<url::Url, SignerError> {
        self.base_url
            .join(path)
            .map_err(|e| SignerError::Remote(format!("invalid endpoint {path}: {e}")))
    }
}

#[async_trait]
impl Signer for RemoteSigner {
    async fn public_identity(&self) -> Result<Identity, SignerError> {
        let identity = self
            .identity
            .get_or_try_init(|| async {
                let response = self
                    .client
                    .get(self.endpoint("identity")?)
                    .send()
                    .await
                    .map_err(|e| SignerError::Remote(e.to_string()))?
                    .error_for_status()
                    .map_err(|e| SignerError::Remote(e.to_string()))?;
                let body: RemoteIdentityResponse = response
                    .json()
                    .await
                    .map_err(|e| SignerError::Remote(format!("malformed identity response: {e}")))?;
                Ok(body.identity)
            })
            .await?;
        Ok(*identity)
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        let response = self
            .client
            .post(self.endpoint("sign")?)
            .json(&serde_json::json!({ "message": Base64::encode_string(message) }))
            .send()
            .await
            .map_err(|e| SignerError::Remote(e.to_string()))?
            .error_for_status()
            .map_err(|e| SignerError::Remote(e.to_string()))?;
        let body: RemoteSignResponse = response
            .json()
            .await
            .map_err(|e| SignerError::Remote(format!("malformed sign response: {e}")))?;
        Base64::decode_vec(&body.signature)
            .map_err(|e| SignerError::Remote(format!("signature is not base64: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring::signature::{UnparsedPublicKey, ED25519};

    #[tokio::test]
    async fn keypair_signer_signatures_verify() {
        let signer = KeypairSigner::generate().unwrap();
        let identity = signer.public_identity().await.unwrap();
        let signature = signer.sign_message(b"hello").await.unwrap();

        UnparsedPublicKey::new(&ED25519, identity.as_bytes().as_slice())
            .verify(b"hello", &signature)
            .expect("signature verifies against the public identity");
    }

    #[tokio::test]
    async fn sign_transaction_fills_fee_payer_fields() {
        let signer = KeypairSigner::generate().unwrap();
        let owner = KeypairSigner::generate().unwrap();
        let mut tx = StoreSessionTx {
            owner: owner.public_identity().await.unwrap(),
            payload: b"auth_date=1".to_vec(),
            created_at: chrono::Utc::now(),
            owner_signature: Vec::new(),
            fee_payer: None,
            fee_payer_signature: None,
        };

        signer.sign_transaction(&mut tx).await.unwrap();

        let fee_payer = tx.fee_payer.expect("fee payer set");
        let signature = tx.fee_payer_signature.clone().expect("signature set");
        assert_eq!(fee_payer, signer.public_identity().await.unwrap());
        UnparsedPublicKey::new(&ED25519, fee_payer.as_bytes().as_slice())
            .verify(&tx.signing_bytes(), &signature)
            .expect("fee payer signature covers the canonical bytes");
    }

    #[tokio::test]
    async fn sealed_key_signer_loads_pem() {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        let pem_text = pem::encode(&pem::Pem::new("PRIVATE KEY", pkcs8.as_ref().to_vec()));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay-key.pem");
        std::fs::write(&path, pem_text).unwrap();

        let signer = SealedKeySigner::new(&path);
        let identity = signer.public_identity().await.unwrap();
        let signature = signer.sign_message(b"payload").await.unwrap();
        UnparsedPublicKey::new(&ED25519, identity.as_bytes().as_slice())
            .verify(b"payload", &signature)
            .expect("sealed key signature verifies");
    }

    #[tokio::test]
    async fn sealed_key_signer_reports_missing_file() {
        let signer = SealedKeySigner::new("/nonexistent/relay-key.pem");
        assert!(matches!(
            signer.public_identity().await,
            Err(SignerError::KeyLoad(_))
        ));
    }

    #[test]
    fn remote_signer_rejects_invalid_url() {
        assert!(RemoteSigner::new("not a url").is_err());
        assert!(RemoteSigner::new("https://signer.internal/v1/").is_ok());
    }
}

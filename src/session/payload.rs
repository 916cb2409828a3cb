// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! # Validation Payload Parsing
//!
//! The identity payload is a newline-delimited `key=value` blob produced by
//! the messaging platform's web-app handshake. Two things are derived from
//! it and nothing else is ever trusted:
//!
//! - the claimed **username**, re-parsed from the embedded `user=` JSON
//!   object and validated against the strict handle pattern - callers never
//!   get to assert a username themselves
//! - the **validation string** the detached Ed25519 signature covers:
//!   `"{botId}:WebAppData"` on the first line, then one `key=value` line per
//!   field (excluding `signature` and `hash`), sorted by key
//!
//! The legacy bot-token HMAC check over the same blob is also supported for
//! the ingestion path ([`ValidationPayload::validate_bot_token_hash`]).

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::ledger::types::Username;

type HmacSha256 = Hmac<Sha256>;

/// Payload fields excluded from every signed representation.
const SIGNATURE_FIELD: &str = "signature";
const HASH_FIELD: &str = "hash";

/// Key prefix of the HMAC secret in the bot-token scheme.
const BOT_TOKEN_HMAC_KEY: &[u8] = b"WebAppData";

/// Errors raised while parsing or checking a validation payload.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("malformed payload line: {0:?}")]
    MalformedLine(String),

    #[error("payload is missing the {0:?} field")]
    MissingField(&'static str),

    #[error("embedded user record is not valid JSON: {0}")]
    MalformedUser(String),

    #[error("invalid username in payload: {0}")]
    InvalidHandle(String),

    #[error("payload hash does not match bot token")]
    HashMismatch,
}

/// Embedded `user=` JSON record. Only the fields this service reads.
#[derive(Debug, Deserialize)]
struct UserField {
    #[allow(dead_code)]
    id: i64,
    #[serde(default)]
    username: Option<String>,
}

/// Parsed, field-addressable validation payload.
///
/// Fields are held sorted so the validation string falls out of iteration
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationPayload {
    fields: BTreeMap<String, String>,
}

impl ValidationPayload {
    /// Parse raw payload bytes into fields.
    ///
    /// Values may themselves contain `=` (base64 signatures do), so each
    /// line splits on the first separator only. Empty lines are ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self, PayloadError> {
        let text = std::str::from_utf8(bytes).map_err(|_| PayloadError::NotUtf8)?;

        let mut fields = BTreeMap::new();
        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| PayloadError::MalformedLine(line.to_string()))?;
            if key.is_empty() {
                return Err(PayloadError::MalformedLine(line.to_string()));
            }
            fields.insert(key.to_string(), value.to_string());
        }

        Ok(Self { fields })
    }

    /// Raw field access.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Extract and validate the username from the embedded `user=` record.
    ///
    /// This is the only way a username ever enters the system from a
    /// payload; caller-supplied strings are compared against it, never used
    /// in its place.
    pub fn username(&self) -> Result<Username, PayloadError> {
        let raw = self.get("user").ok_or(PayloadError::MissingField("user"))?;
        let user: UserField =
            serde_json::from_str(raw).map_err(|e| PayloadError::MalformedUser(e.to_string()))?;
        let handle = user
            .username
            .ok_or(PayloadError::MissingField("username"))?;
        Username::parse(&handle).map_err(PayloadError::InvalidHandle)
    }

    /// Build the validation string the third-party Ed25519 signature covers.
    pub fn check_string(&self, bot_id: i64) -> String {
        let mut lines = Vec::with_capacity(self.fields.len() + 1);
        lines.push(format!("{bot_id}:WebAppData"));
        for (key, value) in &self.fields {
            if key == SIGNATURE_FIELD || key == HASH_FIELD {
                continue;
            }
            lines.push(format!("{key}={value}"));
        }
        lines.join("\n")
    }

    /// Check the legacy `hash` field against a bot token.
    ///
    /// Secret is `HMAC-SHA256(key = "WebAppData", msg = bot_token)`; the
    /// expected hash is the hex HMAC of the sorted `key=value` lines
    /// (excluding `hash`) under that secret.
    pub fn validate_bot_token_hash(&self, bot_token: &str) -> Result<(), PayloadError> {
        let presented = self.get(HASH_FIELD).ok_or(PayloadError::MissingField("hash"))?;

        let mut secret =
            HmacSha256::new_from_slice(BOT_TOKEN_HMAC_KEY).expect("hmac accepts any key length");
        secret.update(bot_token.as_bytes());
        let secret = secret.finalize().into_bytes();

        let lines: Vec<String> = self
            .fields
            .iter()
            .filter(|(key, _)| key.as_str() != HASH_FIELD)
            .map(|(key, value)| format!("{key}={value}"))
            .collect();

        let mut mac = HmacSha256::new_from_slice(&secret).expect("hmac accepts any key length");
        mac.update(lines.join("\n").as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        ring::constant_time::verify_slices_are_equal(expected.as_bytes(), presented.as_bytes())
            .map_err(|_| PayloadError::HashMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> Vec<u8> {
        [
            "auth_date=1721900000",
            "query_id=AAF3Xk1RAAAAAHdeTVEr5FDe",
            r#"user={"id":123456789,"first_name":"Dig","username":"dig13371337","language_code":"en"}"#,
            "signature=c2lnbmF0dXJlLWJ5dGVz",
            "hash=deadbeef",
        ]
        .join("\n")
        .into_bytes()
    }

    #[test]
    fn extracts_username_from_user_field() {
        let payload = ValidationPayload::parse(&sample_payload()).unwrap();
        assert_eq!(payload.username().unwrap().as_str(), "dig13371337");
    }

    #[test]
    fn values_may_contain_equals_signs() {
        let payload = ValidationPayload::parse(b"signature=abc=def==\nauth_date=1").unwrap();
        assert_eq!(payload.get("signature"), Some("abc=def=="));
    }

    #[test]
    fn check_string_is_sorted_and_excludes_signature_fields() {
        let payload = ValidationPayload::parse(&sample_payload()).unwrap();
        let check = payload.check_string(7_654_321);

        let mut lines = check.lines();
        assert_eq!(lines.next(), Some("7654321:WebAppData"));

        let rest: Vec<&str> = lines.collect();
        let mut sorted = rest.clone();
        sorted.sort_unstable();
        assert_eq!(rest, sorted, "field lines must be key-sorted");

        assert!(!check.contains("signature="));
        assert!(!check.contains("hash="));
        assert!(check.contains("auth_date=1721900000"));
        assert!(check.contains("user={"));
    }

    #[test]
    fn missing_user_field_is_reported() {
        let payload = ValidationPayload::parse(b"auth_date=1").unwrap();
        assert!(matches!(
            payload.username(),
            Err(PayloadError::MissingField("user"))
        ));
    }

    #[test]
    fn user_without_username_is_reported() {
        let payload =
            ValidationPayload::parse(br#"user={"id":1,"first_name":"NoHandle"}"#).unwrap();
        assert!(matches!(
            payload.username(),
            Err(PayloadError::MissingField("username"))
        ));
    }

    #[test]
    fn invalid_handle_is_rejected() {
        let payload = ValidationPayload::parse(br#"user={"id":1,"username":"ab"}"#).unwrap();
        assert!(matches!(
            payload.username(),
            Err(PayloadError::InvalidHandle(_))
        ));
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(ValidationPayload::parse(b"no-separator-here").is_err());
        assert!(ValidationPayload::parse(b"=valuewithoutkey").is_err());
        assert!(ValidationPayload::parse(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn bot_token_hash_roundtrip() {
        // Build a payload whose hash field is computed the way the platform
        // computes it, then check both acceptance and rejection.
        let bot_token = "110201543:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw";
        let base = "auth_date=1721900000\nquery_id=AAA\nuser={\"id\":1,\"username\":\"validuser\"}";

        let mut secret = HmacSha256::new_from_slice(BOT_TOKEN_HMAC_KEY).unwrap();
        secret.update(bot_token.as_bytes());
        let secret = secret.finalize().into_bytes();
        let mut mac = HmacSha256::new_from_slice(&secret).unwrap();
        mac.update(base.as_bytes());
        let hash = hex::encode(mac.finalize().into_bytes());

        let blob = format!("{base}\nhash={hash}");
        let payload = ValidationPayload::parse(blob.as_bytes()).unwrap();
        assert!(payload.validate_bot_token_hash(bot_token).is_ok());
        assert!(matches!(
            payload.validate_bot_token_hash("wrong:token"),
            Err(PayloadError::HashMismatch)
        ));
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! # Ledger Error Taxonomy
//!
//! Two layers:
//!
//! - [`VenueError`] - failures as the execution venues report them, one
//!   variant per observable failure code. Transient-vs-fatal classification
//!   lives here, in exactly one place ([`VenueError::is_transient`]).
//! - [`LedgerError`] - what ledger client callers see. Client-side
//!   validation fails fast as `Validation`; venue failures are classified
//!   once at the boundary and either retried (transient) or wrapped.

use super::types::{Address, VenueKind};

/// Numeric program error code the venue reports for a malformed or
/// mismatched username. The relay matches this code (and its hex form) in
/// serialized failure text.
pub const INVALID_USERNAME_CODE: u32 = 6015;

/// Failure codes reported by an execution venue.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VenueError {
    #[error("account {0} not found")]
    AccountNotFound(Address),

    #[error("account already exists")]
    AccountExists,

    #[error("insufficient deposit balance")]
    InsufficientDeposit,

    #[error("insufficient native balance")]
    InsufficientNativeBalance,

    #[error("session is not verified")]
    NotVerified,

    #[error("record {record} is not writable on the {venue} venue")]
    NotResident { record: Address, venue: VenueKind },

    #[error("record is already delegated")]
    AlreadyDelegated,

    #[error("record is not delegated")]
    NotDelegated,

    #[error("missing required signature")]
    MissingSignature,

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("verifying key is not on the allow-list")]
    UnknownVerifyingKey,

    /// Venue-side rate limiting. Transient.
    #[error("rate limited by venue")]
    RateLimited,

    /// Account clone into the ephemeral venue still in flight. Transient.
    #[error("account clone in progress")]
    CloneInProgress,

    /// Submission referenced an expired blockhash. Transient.
    #[error("blockhash expired")]
    BlockhashExpired,

    /// Instruction not executable on the venue it was sent to (e.g. vault
    /// custody moves on the ephemeral venue).
    #[error("instruction unsupported on this venue: {0}")]
    Unsupported(String),

    /// Transport-level failure talking to the venue. Transient.
    #[error("venue rpc failure: {0}")]
    Rpc(String),

    /// Program-level failure with a numeric code, e.g. the invalid-username
    /// rejection (`custom program error: 0x177f`).
    #[error("custom program error: {code:#06x} ({code}): {message}")]
    Program { code: u32, message: String },
}

impl VenueError {
    /// Whether a retry with the same inputs can plausibly succeed.
    ///
    /// This is the single classification point for the whole crate; retry
    /// policies default to it rather than matching error text at call sites.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VenueError::RateLimited
                | VenueError::CloneInProgress
                | VenueError::BlockhashExpired
                | VenueError::Rpc(_)
        )
    }

    /// Convenience constructor for the invalid-username program failure.
    pub fn invalid_username(message: impl Into<String>) -> Self {
        VenueError::Program {
            code: INVALID_USERNAME_CODE,
            message: message.into(),
        }
    }
}

/// Errors surfaced to ledger client callers.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Rejected client-side before any venue call; never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Claim attempted against an unverified or mismatched session.
    #[error("session is not verified")]
    NotVerified,

    /// Venue-reported balance shortfall.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Transfer attempted while the two records reside on different venues.
    #[error("records {src} and {destination} are split across venues")]
    SplitResidency {
        src: Address,
        destination: Address,
    },

    /// A transient venue failure survived every retry attempt.
    #[error("venue still failing after {attempts} attempts: {source}")]
    TransientInfra {
        attempts: u32,
        #[source]
        source: VenueError,
    },

    /// Materialization or commit-back polling exhausted its bound. Ledger
    /// state may be ambiguous between venues; requires operator attention.
    #[error("delegation did not settle for {record} after {iterations} polls")]
    DelegationTimeout { record: Address, iterations: u32 },

    /// Polling was cancelled before completion.
    #[error("operation cancelled while waiting on {record}")]
    Cancelled { record: Address },

    /// Any other venue failure, surfaced opaquely.
    #[error("venue rejected the instruction: {0}")]
    UnknownProgram(#[source] VenueError),
}

impl LedgerError {
    /// Wrap a venue failure that was not (or no longer) retryable.
    pub fn from_venue(err: VenueError) -> Self {
        match err {
            VenueError::InsufficientDeposit => {
                LedgerError::InsufficientFunds("deposit balance too low".to_string())
            }
            VenueError::InsufficientNativeBalance => {
                LedgerError::InsufficientFunds("native balance too low".to_string())
            }
            VenueError::NotVerified => LedgerError::NotVerified,
            other => LedgerError::UnknownProgram(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(VenueError::RateLimited.is_transient());
        assert!(VenueError::CloneInProgress.is_transient());
        assert!(VenueError::BlockhashExpired.is_transient());
        assert!(VenueError::Rpc("connection reset".into()).is_transient());

        assert!(!VenueError::AccountExists.is_transient());
        assert!(!VenueError::InsufficientDeposit.is_transient());
        assert!(!VenueError::NotVerified.is_transient());
        assert!(!VenueError::invalid_username("bad handle").is_transient());
    }

    #[test]
    fn invalid_username_renders_code_and_hex() {
        let err = VenueError::invalid_username("handle too short");
        let text = err.to_string();
        assert!(text.contains("6015"), "missing decimal code: {text}");
        assert!(text.contains("0x177f"), "missing hex code: {text}");
    }

    #[test]
    fn venue_errors_map_to_caller_taxonomy() {
        assert!(matches!(
            LedgerError::from_venue(VenueError::InsufficientDeposit),
            LedgerError::InsufficientFunds(_)
        ));
        assert!(matches!(
            LedgerError::from_venue(VenueError::NotVerified),
            LedgerError::NotVerified
        ));
        assert!(matches!(
            LedgerError::from_venue(VenueError::AccountExists),
            LedgerError::UnknownProgram(_)
        ));
    }
}

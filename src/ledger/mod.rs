// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! Deposit ledger core.
//!
//! This module provides:
//! - Deterministic record/vault address derivation
//! - The deposit ledger client (balance moves, transfers, claims)
//! - The delegation lifecycle manager (base <-> ephemeral migration)
//! - The venue boundary (trait + in-process reference + JSON-RPC adapter)

pub mod address;
pub mod client;
pub mod delegation;
pub mod error;
pub mod memory;
pub mod poll;
pub mod retry;
pub mod rpc;
pub mod types;
pub mod venue;

pub use client::DepositLedgerClient;
pub use delegation::DelegationManager;
pub use error::{LedgerError, VenueError};
pub use poll::{PollOutcome, PollPolicy};
pub use retry::RetryPolicy;
pub use types::*;
pub use venue::Venue;

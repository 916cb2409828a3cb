// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! Tipvault - Custodial Deposit Vault Service
//!
//! This crate provides a balance-tracking ledger client for a custodial
//! token vault with dual-venue execution (durable base venue + delegated
//! ephemeral venue), Telegram-verified handle-addressed claims, and a
//! fee-sponsoring gasless claim relay served over HTTP.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `ledger` - deposit ledger client, delegation lifecycle, venue boundary
//! - `session` - identity payload parsing and the store/verify gate
//! - `relay` - gasless claim orchestration
//! - `signer` - signing capability interface and adapters
//! - `cache` - shared read-side cache service

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod relay;
pub mod session;
pub mod signer;
pub mod state;

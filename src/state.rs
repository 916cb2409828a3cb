// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

use std::sync::Arc;

use crate::cache::CacheService;
use crate::ledger::types::Address;
use crate::ledger::DepositLedgerClient;
use crate::relay::GaslessRelay;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<GaslessRelay>,
    pub client: Arc<DepositLedgerClient>,
    /// Read-side cache of record balances, keyed by record address.
    pub balances: Arc<CacheService<Address, u64>>,
}

impl AppState {
    pub fn new(
        relay: Arc<GaslessRelay>,
        client: Arc<DepositLedgerClient>,
        balances: Arc<CacheService<Address, u64>>,
    ) -> Self {
        Self {
            relay,
            client,
            balances,
        }
    }
}

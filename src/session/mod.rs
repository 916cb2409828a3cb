// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! Session verification: payload parsing and the store/verify gate.

pub mod gate;
pub mod payload;

pub use gate::{SessionError, SessionGate, VerifyingKeySet};
pub use payload::{PayloadError, ValidationPayload};

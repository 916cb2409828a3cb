// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! # Runtime Configuration Constants
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `VENUE_MODE` | Venue backing (`memory` or `rpc`) | `memory` |
//! | `BASE_RPC_URL` | Base venue node endpoint | Required in `rpc` mode |
//! | `EPHEMERAL_RPC_URL` | Ephemeral venue node endpoint | Required in `rpc` mode |
//! | `BOT_ID` | Bot identifier bound into session validation strings | `0` |
//! | `CLAIM_ASSET` | Asset gasless claims are denominated in | `USDT` |
//! | `MIN_RESERVE` | Reserve floor for recipient holdings (smallest unit) | `50000` |
//! | `RELAY_KEY_PATH` | PKCS#8 PEM file with the relay fee-payer key | Generated per process |
//! | `REMOTE_SIGNER_URL` | HTTP signing service (overrides `RELAY_KEY_PATH`) | Unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

/// Server bind address.
pub const HOST_ENV: &str = "HOST";

/// Server bind port.
pub const PORT_ENV: &str = "PORT";

/// Venue backing: `memory` runs the in-process reference venue pair (local
/// development, integration tests); `rpc` dials external venue nodes.
pub const VENUE_MODE_ENV: &str = "VENUE_MODE";

/// Base venue JSON-RPC endpoint (`rpc` mode).
pub const BASE_RPC_URL_ENV: &str = "BASE_RPC_URL";

/// Ephemeral venue JSON-RPC endpoint (`rpc` mode). Dialed lazily on the
/// first operation that needs the delegated venue.
pub const EPHEMERAL_RPC_URL_ENV: &str = "EPHEMERAL_RPC_URL";

/// Bot identifier. First line of every session validation string is
/// `"{bot_id}:WebAppData"`, so this must match the bot the payloads were
/// issued for.
pub const BOT_ID_ENV: &str = "BOT_ID";

/// Asset identifier the gasless claim endpoint operates on.
pub const CLAIM_ASSET_ENV: &str = "CLAIM_ASSET";

/// Reserve floor: after a gasless claim the recipient's external holding is
/// topped up to at least this many units from the relay's own funds.
pub const MIN_RESERVE_ENV: &str = "MIN_RESERVE";

/// Path to the relay fee-payer key (PKCS#8 PEM). When unset (and no remote
/// signer is configured) an ephemeral keypair is generated at startup,
/// which is only useful in `memory` mode.
pub const RELAY_KEY_PATH_ENV: &str = "RELAY_KEY_PATH";

/// Base URL of an HTTP signing service holding the relay key.
pub const REMOTE_SIGNER_URL_ENV: &str = "REMOTE_SIGNER_URL";

/// Logging format (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default port when `PORT` is unset or unparsable.
pub const DEFAULT_PORT: u16 = 8080;

/// Default claim asset.
pub const DEFAULT_CLAIM_ASSET: &str = "USDT";

/// Default reserve floor.
pub const DEFAULT_MIN_RESERVE: u64 = 50_000;

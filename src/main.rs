// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use tipvault_server::api::router;
use tipvault_server::cache::CacheService;
use tipvault_server::config::{
    BASE_RPC_URL_ENV, BOT_ID_ENV, CLAIM_ASSET_ENV, DEFAULT_CLAIM_ASSET, DEFAULT_MIN_RESERVE,
    DEFAULT_PORT, EPHEMERAL_RPC_URL_ENV, HOST_ENV, LOG_FORMAT_ENV, MIN_RESERVE_ENV, PORT_ENV,
    RELAY_KEY_PATH_ENV, REMOTE_SIGNER_URL_ENV, VENUE_MODE_ENV,
};
use tipvault_server::ledger::memory::{MemoryVenue, MemoryVenueConfig};
use tipvault_server::ledger::rpc::RpcVenue;
use tipvault_server::ledger::{
    AssetId, DepositLedgerClient, RetryPolicy, Venue, VenueKind,
};
use tipvault_server::relay::GaslessRelay;
use tipvault_server::session::{SessionGate, VerifyingKeySet};
use tipvault_server::signer::{KeypairSigner, RemoteSigner, SealedKeySigner, Signer};
use tipvault_server::state::AppState;

/// Native units the memory-mode faucet grants the relay at startup.
const MEMORY_MODE_RELAY_FUNDS: u64 = 1_000_000_000;

#[tokio::main]
async fn main() {
    init_tracing();

    let bot_id: i64 = env::var(BOT_ID_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let claim_asset = AssetId::new(
        env::var(CLAIM_ASSET_ENV).unwrap_or_else(|_| DEFAULT_CLAIM_ASSET.to_string()),
    );
    let min_reserve: u64 = env::var(MIN_RESERVE_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MIN_RESERVE);
    let keys = VerifyingKeySet::platform_defaults();

    let signer = build_signer();

    // Venue wiring: in-process reference pair, or external nodes over RPC
    // with the ephemeral connection dialed lazily.
    let venue_mode = env::var(VENUE_MODE_ENV).unwrap_or_else(|_| "memory".to_string());
    let client = match venue_mode.as_str() {
        "rpc" => {
            let base_url =
                env::var(BASE_RPC_URL_ENV).expect("BASE_RPC_URL is required in rpc mode");
            let ephemeral_url =
                env::var(EPHEMERAL_RPC_URL_ENV).expect("EPHEMERAL_RPC_URL is required in rpc mode");
            let base: Arc<dyn Venue> = Arc::new(
                RpcVenue::new(VenueKind::Base, &base_url).expect("invalid BASE_RPC_URL"),
            );
            Arc::new(DepositLedgerClient::new(
                base,
                Box::new(move || {
                    let url = ephemeral_url.clone();
                    Box::pin(async move {
                        RpcVenue::new(VenueKind::Ephemeral, &url)
                            .map(|venue| Arc::new(venue) as Arc<dyn Venue>)
                    })
                }),
                RetryPolicy::default(),
            ))
        }
        _ => {
            let (base, ephemeral) = MemoryVenue::pair(MemoryVenueConfig {
                bot_id,
                verifying_keys: keys.to_vec(),
                ..MemoryVenueConfig::default()
            });
            // Fund the relay so reserve top-ups work out of the box.
            let relay_identity = signer
                .public_identity()
                .await
                .expect("relay signer must expose its identity at startup");
            base.credit_native(&relay_identity, MEMORY_MODE_RELAY_FUNDS);
            Arc::new(DepositLedgerClient::with_connected(
                base as Arc<dyn Venue>,
                ephemeral as Arc<dyn Venue>,
                RetryPolicy::default(),
            ))
        }
    };

    let gate = Arc::new(SessionGate::new(
        Arc::clone(client.base()),
        keys,
        bot_id,
    ));
    let relay = Arc::new(GaslessRelay::new(
        Arc::clone(&client),
        gate,
        signer,
        claim_asset,
        min_reserve,
    ));
    let balances = Arc::new(CacheService::new(1024, Duration::from_secs(5)));
    let app = router(AppState::new(relay, client, balances));

    // Parse bind address
    let host = env::var(HOST_ENV).unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var(PORT_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .expect("Failed to parse bind address");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server address");
    tracing::info!(%addr, mode = %venue_mode, "Tipvault server listening (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("HTTP server failed");
}

/// Pick the relay signer: remote service, sealed key file, or an ephemeral
/// generated keypair (memory mode only).
fn build_signer() -> Arc<dyn Signer> {
    if let Ok(url) = env::var(REMOTE_SIGNER_URL_ENV) {
        return Arc::new(RemoteSigner::new(&url).expect("invalid REMOTE_SIGNER_URL"));
    }
    if let Ok(path) = env::var(RELAY_KEY_PATH_ENV) {
        return Arc::new(SealedKeySigner::new(path));
    }
    tracing::warn!("no relay key configured, generating an ephemeral keypair");
    Arc::new(KeypairSigner::generate().expect("keypair generation failed"))
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    let format = env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| "pretty".to_string());
    if format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        DepositBalanceResponse, GaslessClaimRequest, GaslessClaimResponse,
        UsernameDepositBalanceResponse,
    },
    state::AppState,
};

pub mod deposits;
pub mod gasless;
pub mod health;

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/api/gasless/claim", post(gasless::gasless_claim))
        .route("/v1/deposits/{owner}/{asset}", get(deposits::get_deposit))
        .route(
            "/v1/usernames/{username}/{asset}",
            get(deposits::get_username_deposit),
        )
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        gasless::gasless_claim,
        deposits::get_deposit,
        deposits::get_username_deposit,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            GaslessClaimRequest,
            GaslessClaimResponse,
            DepositBalanceResponse,
            UsernameDepositBalanceResponse
        )
    ),
    tags(
        (name = "Gasless", description = "Fee-sponsored claim relay"),
        (name = "Deposits", description = "Deposit record reads"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! Read-only deposit record endpoints.
//!
//! Hot lookups go through the shared balance cache; the gasless claim
//! handler invalidates entries it touches.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::ApiError,
    ledger::address::{deposit_address, username_deposit_address},
    ledger::types::{AssetId, Identity, Username},
    models::{DepositBalanceResponse, UsernameDepositBalanceResponse},
    state::AppState,
};

/// Get a per-owner deposit record balance.
#[utoipa::path(
    get,
    path = "/v1/deposits/{owner}/{asset}",
    tag = "Deposits",
    params(
        ("owner" = String, Path, description = "Owner identity (hex)"),
        ("asset" = String, Path, description = "Asset identifier")
    ),
    responses(
        (status = 200, description = "Record balance", body = DepositBalanceResponse),
        (status = 400, description = "Malformed owner identity"),
        (status = 404, description = "No record for this owner and asset")
    )
)]
pub async fn get_deposit(
    State(state): State<AppState>,
    Path((owner, asset)): Path<(String, String)>,
) -> Result<Json<DepositBalanceResponse>, ApiError> {
    let owner = Identity::parse(&owner)
        .map_err(|e| ApiError::bad_request(format!("invalid owner identity: {e}")))?;
    let asset = AssetId::new(asset);
    let address = deposit_address(&owner, &asset);

    if let Some(amount) = state.balances.get(&address) {
        return Ok(Json(DepositBalanceResponse {
            owner,
            asset: asset.as_str().to_string(),
            amount,
            address,
        }));
    }

    let record = state
        .client
        .deposit(&owner, &asset)
        .await?
        .ok_or_else(|| ApiError::not_found("deposit record not found"))?;
    state.balances.set(address, record.amount);

    Ok(Json(DepositBalanceResponse {
        owner: record.owner,
        asset: record.asset.as_str().to_string(),
        amount: record.amount,
        address: record.address,
    }))
}

/// Get a username-addressed deposit record balance.
#[utoipa::path(
    get,
    path = "/v1/usernames/{username}/{asset}",
    tag = "Deposits",
    params(
        ("username" = String, Path, description = "Handle the record is addressed to"),
        ("asset" = String, Path, description = "Asset identifier")
    ),
    responses(
        (status = 200, description = "Record balance", body = UsernameDepositBalanceResponse),
        (status = 400, description = "Malformed username"),
        (status = 404, description = "No record for this username and asset")
    )
)]
pub async fn get_username_deposit(
    State(state): State<AppState>,
    Path((username, asset)): Path<(String, String)>,
) -> Result<Json<UsernameDepositBalanceResponse>, ApiError> {
    let username = Username::parse(&username)
        .map_err(|e| ApiError::bad_request(format!("invalid username: {e}")))?;
    let asset = AssetId::new(asset);
    let address = username_deposit_address(&username, &asset);

    if let Some(amount) = state.balances.get(&address) {
        return Ok(Json(UsernameDepositBalanceResponse {
            username: username.as_str().to_string(),
            asset: asset.as_str().to_string(),
            amount,
            address,
        }));
    }

    let record = state
        .client
        .username_deposit(&username, &asset)
        .await?
        .ok_or_else(|| ApiError::not_found("username deposit record not found"))?;
    state.balances.set(address, record.amount);

    Ok(Json(UsernameDepositBalanceResponse {
        username: record.username.as_str().to_string(),
        asset: record.asset.as_str().to_string(),
        amount: record.amount,
        address: record.address,
    }))
}

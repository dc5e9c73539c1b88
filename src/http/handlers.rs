//! Request handlers for the ledger endpoints.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::error::Result;
use crate::store::{Account, Direction, Transfer, User};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub user_id: i64,
    pub balance: f64,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransferRequest {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: f64,
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<CreateUserRequest>,
) -> Result<Json<User>> {
    let user = state.service.create_user(&body.name).await?;
    Ok(Json(user))
}

pub async fn create_account(
    State(state): State<AppState>,
    Json(body): Json<CreateAccountRequest>,
) -> Result<Json<Account>> {
    let account = state
        .service
        .create_account(body.user_id, body.balance)
        .await?;
    Ok(Json(account))
}

pub async fn create_transfer(
    State(state): State<AppState>,
    Json(body): Json<CreateTransferRequest>,
) -> Result<Json<Transfer>> {
    let transfer = state
        .service
        .create_transfer(body.from_account_id, body.to_account_id, body.amount)
        .await?;
    Ok(Json(transfer))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<User>> {
    let user = state.service.get_user(user_id).await?;
    Ok(Json(user))
}

pub async fn get_accounts(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<Account>>> {
    let accounts = state.service.get_accounts(user_id).await?;
    Ok(Json(accounts))
}

pub async fn get_incoming_transfers(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<Transfer>>> {
    let transfers = state
        .service
        .get_transfers(user_id, Direction::Incoming)
        .await?;
    Ok(Json(transfers))
}

pub async fn get_outgoing_transfers(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<Transfer>>> {
    let transfers = state
        .service
        .get_transfers(user_id, Direction::Outgoing)
        .await?;
    Ok(Json(transfers))
}

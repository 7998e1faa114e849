//! User endpoints.
//!
//! - POST /api/user - Create or update a user keyed by wallet
//! - GET /api/user?wallet_address= - Look a user up
//! - POST /api/user/tickets - Dashboard: user, owned tickets, purchase history

use super::ApiJson;
use crate::error::AppError;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use ticketmint_core::models::{NewUser, PurchaseRecord, TicketWithEvent, User};
use ticketmint_core::types::{LoginMethod, WalletAddress};
use ticketmint_core::validation::ValidationError;

/// Upsert payload.
#[derive(Debug, Deserialize)]
pub struct UpsertUserRequest {
    /// Wallet address (required)
    #[serde(default, alias = "walletAddress")]
    pub wallet_address: Option<String>,
    /// Email
    #[serde(default)]
    pub email: Option<String>,
    /// Phone
    #[serde(default)]
    pub phone: Option<String>,
    /// Login method; defaults to `metamask`
    #[serde(default, alias = "loginMethod")]
    pub login_method: Option<LoginMethod>,
    /// Display name
    #[serde(default, alias = "displayName")]
    pub display_name: Option<String>,
}

/// Lookup query.
#[derive(Debug, Deserialize)]
pub struct UserQuery {
    /// Wallet address
    pub wallet_address: Option<String>,
}

/// Response carrying one user.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    /// Always `true`
    pub success: bool,
    /// The user
    pub user: User,
}

/// Dashboard request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTicketsRequest {
    /// Wallet address
    #[serde(default)]
    pub wallet_address: Option<String>,
}

/// Dashboard response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTicketsResponse {
    /// Always `true`
    pub success: bool,
    /// The user, created on first visit
    pub user: User,
    /// Owned tickets with their events, newest first
    pub tickets: Vec<TicketWithEvent>,
    /// Purchases, newest first
    pub purchase_history: Vec<PurchaseRecord>,
}

fn required_wallet(raw: Option<&str>) -> Result<WalletAddress, AppError> {
    let raw = raw.filter(|s| !s.trim().is_empty());
    let raw = raw.ok_or_else(|| AppError::bad_request("wallet_address is required"))?;
    Ok(WalletAddress::parse(raw)?)
}

/// Create or update a user.
///
/// # Errors
///
/// 400 when the wallet address is missing or malformed.
pub async fn upsert_user(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<UpsertUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let wallet = required_wallet(request.wallet_address.as_deref())?;
    let user = state
        .ledger
        .upsert_user(NewUser {
            wallet_address: wallet,
            email: request.email,
            phone: request.phone,
            login_method: request.login_method.unwrap_or(LoginMethod::Metamask),
            display_name: request.display_name,
        })
        .await?;
    tracing::info!(user_id = %user.id, wallet = %user.wallet_address, "User upserted");
    Ok(Json(UserResponse {
        success: true,
        user,
    }))
}

/// Look a user up by wallet.
///
/// # Errors
///
/// 400 without a well-formed `wallet_address`, 404 when no user matches.
pub async fn get_user(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<UserResponse>, AppError> {
    let wallet = required_wallet(query.wallet_address.as_deref())?;
    let user = state
        .ledger
        .find_user_by_wallet(&wallet)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(UserResponse {
        success: true,
        user,
    }))
}

/// Dashboard data for a wallet, creating the user on first visit.
///
/// # Errors
///
/// 400 without a well-formed `walletAddress`.
pub async fn user_tickets(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<UserTicketsRequest>,
) -> Result<Json<UserTicketsResponse>, AppError> {
    let raw = request
        .wallet_address
        .filter(|s| !s.trim().is_empty())
        .ok_or(ValidationError::MissingFields)?;
    let wallet = WalletAddress::parse(&raw)?;

    let user = match state.ledger.find_user_by_wallet(&wallet).await? {
        Some(user) => user,
        None => {
            tracing::info!(%wallet, "Creating user on first dashboard visit");
            state
                .ledger
                .upsert_user(NewUser::for_wallet(wallet, LoginMethod::Metamask))
                .await?
        },
    };

    let tickets = state.ledger.tickets_for_owner(user.id).await?;
    let purchase_history = state.ledger.purchases_for_user(user.id).await?;
    tracing::debug!(user_id = %user.id, tickets = tickets.len(), "Dashboard loaded");

    Ok(Json(UserTicketsResponse {
        success: true,
        user,
        tickets,
        purchase_history,
    }))
}

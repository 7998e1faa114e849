//! Venue entry passes.
//!
//! Passes are issued to the ticket owner only and recorded server-side, so the
//! door can check a presented session id once, within its five-minute window.
//!
//! - POST /api/tickets/:id/entry-pass - Issue a pass
//! - POST /api/entry/verify - Consume a pass at the door

use super::{ApiJson, path_id};
use crate::error::AppError;
use crate::metrics;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use ticketmint_core::entry_pass::{EntryPass, new_session_id};
use ticketmint_core::ledger::EntryCheck;
use ticketmint_core::types::{TicketId, WalletAddress};
use ticketmint_core::validation::ValidationError;

/// Issue request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuePassRequest {
    /// Wallet presenting the ticket
    #[serde(default)]
    pub wallet_address: Option<String>,
}

/// Issued pass.
#[derive(Debug, Serialize)]
pub struct PassResponse {
    /// Always `true`
    pub success: bool,
    /// QR payload
    pub pass: EntryPass,
}

/// Door check request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Session id read from the QR code
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Door check result: `{ success, outcome, pass? }`.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    /// Whether the holder may enter
    pub success: bool,
    /// Outcome, with the consumed pass when accepted
    #[serde(flatten)]
    pub check: EntryCheck,
}

/// Issue an entry pass for a ticket.
///
/// # Errors
///
/// - 400 for a missing or malformed wallet
/// - 403 unless the wallet owns the ticket
/// - 404 for an unknown ticket
/// - 409 once the ticket has been admitted
///
/// A new pass voids any earlier unused pass for the same ticket.
pub async fn issue_entry_pass(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    ApiJson(request): ApiJson<IssuePassRequest>,
) -> Result<(StatusCode, Json<PassResponse>), AppError> {
    let ticket_id: TicketId = path_id(&ticket_id, "Ticket")?;
    let raw = request
        .wallet_address
        .filter(|s| !s.trim().is_empty())
        .ok_or(ValidationError::MissingFields)?;
    let wallet = WalletAddress::parse(&raw)?;

    let ticket = state
        .ledger
        .get_ticket(ticket_id)
        .await?
        .ok_or_else(|| AppError::not_found("Ticket not found"))?;
    let owner = state.ledger.find_user_by_wallet(&wallet).await?;
    if owner.is_none_or(|user| user.id != ticket.owner_id) {
        return Err(AppError::forbidden("Only the ticket owner can request an entry pass"));
    }

    let event_name = state
        .ledger
        .get_event(ticket.event_id)
        .await?
        .map_or_else(|| "Event".to_string(), |event| event.name);

    let now = state.clock.now();
    let session_id = new_session_id(now, &mut rand::thread_rng());
    let pass = EntryPass::issue(ticket.id, ticket.token_id, event_name, wallet, session_id, now);
    state.ledger.record_entry_pass(&pass).await?;

    metrics::record_entry_pass_issued();
    tracing::info!(ticket_id = %ticket.id, session_id = %pass.session_id, "Entry pass issued");
    Ok((StatusCode::CREATED, Json(PassResponse { success: true, pass })))
}

/// Consume a pass at the door.
///
/// Accepted passes answer 200. Otherwise the body carries `success: false`
/// and the outcome: 409 when the ticket was already admitted, 403 for a pass
/// superseded by a newer one or held by a wallet that no longer owns the
/// ticket, 410 after expiry and 404 for an unknown session.
///
/// # Errors
///
/// 400 without a session id.
pub async fn verify_entry_pass(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<VerifyRequest>,
) -> Result<(StatusCode, Json<VerifyResponse>), AppError> {
    let session_id = request
        .session_id
        .filter(|s| !s.trim().is_empty())
        .ok_or(ValidationError::MissingFields)?;

    let check = state
        .ledger
        .consume_entry_pass(&session_id, state.clock.now())
        .await?;
    metrics::record_entry_verification(check.label());
    tracing::info!(%session_id, outcome = check.label(), "Entry pass checked");

    let status = match check {
        EntryCheck::Accepted { .. } => StatusCode::OK,
        EntryCheck::AlreadyUsed => StatusCode::CONFLICT,
        EntryCheck::Revoked => StatusCode::FORBIDDEN,
        EntryCheck::Expired => StatusCode::GONE,
        EntryCheck::Unknown => StatusCode::NOT_FOUND,
    };
    Ok((
        status,
        Json(VerifyResponse {
            success: status == StatusCode::OK,
            check,
        }),
    ))
}

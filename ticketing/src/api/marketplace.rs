//! Resale marketplace endpoints.
//!
//! The marketplace contract holds the authoritative listing; these endpoints
//! keep the ledger's view of it. Listing creation repeats the checks the
//! client performs before signing, so the ledger never records a listing the
//! storefront would have refused.
//!
//! - POST /api/marketplace/list - Record a confirmed on-chain listing
//! - GET /api/marketplace/listings/:event_id - Active listings, newest first
//! - POST /api/marketplace/mark-sold - Settle a confirmed resale
//! - POST /api/marketplace/cancel - Cancel the active listing for a token

use super::{ApiJson, path_id};
use crate::error::AppError;
use crate::metrics;
use crate::server::state::AppState;
use alloy_primitives::Address;
use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use ticketmint_core::ledger::SettleOutcome;
use ticketmint_core::models::{Listing, NewListing, ResaleSettlement, best_known_price};
use ticketmint_core::types::{EthAmount, EventId, TicketId, TokenId, TxHash, UserId};
use ticketmint_core::validation::{ValidationError, check_listing_price};

/// Listing payload, as sent after the `list` transaction confirmed.
#[derive(Debug, Default, Deserialize)]
pub struct ListRequest {
    /// Event
    pub event_id: Option<EventId>,
    /// Ticket row
    pub ticket_id: Option<TicketId>,
    /// Token contract
    pub nft_address: Option<Address>,
    /// Token
    pub token_id: Option<TokenId>,
    /// Seller
    pub seller_id: Option<UserId>,
    /// Asking price
    pub price_eth: Option<EthAmount>,
    /// Listing transaction
    pub tx_hash: Option<TxHash>,
}

/// Settlement payload, as sent after the `buy` transaction confirmed.
#[derive(Debug, Default, Deserialize)]
pub struct MarkSoldRequest {
    /// Token contract
    pub nft_address: Option<Address>,
    /// Token
    pub token_id: Option<TokenId>,
    /// New owner
    pub buyer_id: Option<UserId>,
    /// Buy transaction
    pub tx_hash: Option<TxHash>,
    /// Ticket row
    pub ticket_id: Option<TicketId>,
    /// Price paid
    pub new_price_eth: Option<EthAmount>,
}

/// Cancellation payload.
#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    /// Token contract
    pub nft_address: Option<Address>,
    /// Token
    pub token_id: Option<TokenId>,
}

/// Response carrying one listing.
#[derive(Debug, Serialize)]
pub struct ListingResponse {
    /// Always `true`
    pub success: bool,
    /// The recorded listing
    pub listing: Listing,
}

/// Response for an event's listings.
#[derive(Debug, Serialize)]
pub struct ListingsResponse {
    /// Always `true`
    pub success: bool,
    /// Active listings, newest first
    pub listings: Vec<Listing>,
}

/// Bare acknowledgement.
#[derive(Debug, Serialize)]
pub struct Ack {
    /// Always `true`
    pub success: bool,
}

/// Record a listing.
///
/// # Errors
///
/// - 400 for missing fields, a non-positive price, a price above twice the
///   ticket's best-known price, a token or contract that does not match the ticket
/// - 403 when the seller does not own the ticket
/// - 404 for an unknown ticket
/// - 409 when the token already has an active listing
pub async fn create_listing(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ListRequest>,
) -> Result<Json<ListingResponse>, AppError> {
    let (Some(event_id), Some(ticket_id), Some(nft_address), Some(token_id), Some(seller_id), Some(price_eth)) = (
        request.event_id,
        request.ticket_id,
        request.nft_address,
        request.token_id,
        request.seller_id,
        request.price_eth,
    ) else {
        return Err(ValidationError::MissingFields.into());
    };
    if price_eth.is_zero() {
        return Err(ValidationError::NonPositivePrice.into());
    }
    if state
        .config
        .chain
        .token_contract
        .is_some_and(|configured| configured != nft_address)
    {
        return Err(AppError::bad_request("Unknown token contract"));
    }

    let ticket = state
        .ledger
        .get_ticket(ticket_id)
        .await?
        .ok_or_else(|| AppError::not_found("Ticket not found"))?;
    if ticket.token_id != token_id || ticket.event_id != event_id {
        return Err(AppError::bad_request("Token does not match ticket"));
    }
    if ticket.owner_id != seller_id {
        return Err(AppError::forbidden("Only the ticket owner can list it"));
    }

    let event = state.ledger.get_event(event_id).await?;
    check_listing_price(price_eth, best_known_price(&ticket, event.as_ref()))?;

    let listing = state
        .ledger
        .create_listing(NewListing {
            event_id,
            ticket_id,
            nft_address,
            token_id,
            seller_id,
            price_eth,
            tx_hash: request.tx_hash,
        })
        .await?;

    metrics::record_listing("active");
    tracing::info!(
        listing_id = %listing.id,
        token_id = %token_id,
        price_eth = %price_eth,
        "Listing recorded"
    );
    Ok(Json(ListingResponse {
        success: true,
        listing,
    }))
}

/// Active listings for an event.
///
/// # Errors
///
/// 404 for a malformed event id.
pub async fn event_listings(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<ListingsResponse>, AppError> {
    let event_id: EventId = path_id(&event_id, "Event")?;
    let listings = state.ledger.active_listings_for_event(event_id).await?;
    Ok(Json(ListingsResponse {
        success: true,
        listings,
    }))
}

/// Settle a confirmed resale: the listing flips to sold and the ticket moves
/// to the buyer, together or not at all. The ticket's last price becomes the
/// listed price.
///
/// # Errors
///
/// - 400 for missing fields
/// - 404 for an unknown buyer
/// - 409 when no active listing matched, or the active listing is for another
///   ticket or at another price; nothing is written
pub async fn mark_sold(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<MarkSoldRequest>,
) -> Result<Json<Ack>, AppError> {
    let (Some(nft_address), Some(token_id), Some(buyer_id), Some(tx_hash), Some(ticket_id), Some(new_price_eth)) = (
        request.nft_address,
        request.token_id,
        request.buyer_id,
        request.tx_hash,
        request.ticket_id,
        request.new_price_eth,
    ) else {
        return Err(ValidationError::MissingFields.into());
    };

    if state.ledger.get_user(buyer_id).await?.is_none() {
        return Err(AppError::not_found("Buyer not found"));
    }

    let outcome = state
        .ledger
        .settle_resale(ResaleSettlement {
            nft_address,
            token_id,
            buyer_id,
            tx_hash,
            ticket_id,
            new_price_eth,
        })
        .await?;

    match outcome {
        SettleOutcome::Settled => {
            metrics::record_listing("sold");
            tracing::info!(%token_id, %buyer_id, %tx_hash, "Resale settled");
            Ok(Json(Ack { success: true }))
        },
        SettleOutcome::NotActive => {
            tracing::warn!(%token_id, %tx_hash, "Settlement for a listing that is not active");
            Err(AppError::conflict("Listing is not active"))
        },
    }
}

/// Cancel the active listing for a token.
///
/// # Errors
///
/// 400 for missing fields, 409 when no active listing matched.
pub async fn cancel_listing(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CancelRequest>,
) -> Result<Json<Ack>, AppError> {
    let (Some(nft_address), Some(token_id)) = (request.nft_address, request.token_id) else {
        return Err(ValidationError::MissingFields.into());
    };

    if !state.ledger.cancel_listing(nft_address, token_id).await? {
        return Err(AppError::conflict("No active listing for this token"));
    }
    metrics::record_listing("cancelled");
    tracing::info!(%token_id, "Listing cancelled");
    Ok(Json(Ack { success: true }))
}

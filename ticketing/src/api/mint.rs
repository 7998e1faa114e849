//! POST /api/mint-ticket - gas-free minting through the relayer.

use super::{ApiJson, IdempotencyKey};
use crate::error::AppError;
use crate::relayer::{MintRequest, MintResponse};
use crate::server::state::AppState;
use axum::{Json, extract::State};

/// Mint tickets for a buyer.
///
/// The deduplication key may come in the body (`idempotencyKey`) or the
/// `Idempotency-Key` header; the body wins when both are present.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/mint-ticket \
///   -H "Content-Type: application/json" \
///   -H "Idempotency-Key: 6f1c2d0e-checkout-0001" \
///   -d '{"userAddress":"0x1234...","paymentMethod":"crypto","eventId":"<uuid>","quantity":2}'
/// ```
///
/// # Errors
///
/// See [`crate::relayer::RelayerError`] for the mapping to statuses.
pub async fn mint_ticket(
    State(state): State<AppState>,
    IdempotencyKey(header_key): IdempotencyKey,
    ApiJson(mut request): ApiJson<MintRequest>,
) -> Result<Json<MintResponse>, AppError> {
    if request.idempotency_key.is_none() {
        request.idempotency_key = header_key;
    }
    let response = state.relayer.mint(request).await?;
    Ok(Json(response))
}

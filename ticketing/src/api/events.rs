//! Event catalogue endpoints.
//!
//! - GET /api/events - All events, earliest first
//! - POST /api/events - Create an event
//! - GET /api/events/:id - One event

use super::{ApiJson, path_id};
use crate::error::AppError;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use ticketmint_core::models::{Event, NewEvent};
use ticketmint_core::types::EventId;
use ticketmint_core::validation::ValidationError;

/// Response for listing events.
#[derive(Debug, Serialize)]
pub struct EventsResponse {
    /// Always `true`
    pub success: bool,
    /// Events, earliest date first
    pub events: Vec<Event>,
}

/// Response carrying one event.
#[derive(Debug, Serialize)]
pub struct EventResponse {
    /// Always `true`
    pub success: bool,
    /// The event
    pub event: Event,
}

/// List all events.
///
/// # Example
///
/// ```bash
/// curl http://localhost:8080/api/events
/// ```
///
/// # Errors
///
/// 500 when the ledger is unavailable.
pub async fn list_events(State(state): State<AppState>) -> Result<Json<EventsResponse>, AppError> {
    let events = state.ledger.list_events().await?;
    tracing::debug!(count = events.len(), "Events listed");
    Ok(Json(EventsResponse {
        success: true,
        events,
    }))
}

/// Get one event.
///
/// # Errors
///
/// 404 "Event not found" for unknown or malformed ids.
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EventResponse>, AppError> {
    let id: EventId = path_id(&id, "Event")?;
    let event = state
        .ledger
        .get_event(id)
        .await?
        .ok_or_else(|| AppError::not_found("Event not found"))?;
    Ok(Json(EventResponse {
        success: true,
        event,
    }))
}

/// Create an event with nothing sold.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events \
///   -H "Content-Type: application/json" \
///   -d '{
///     "name": "Web3 Music Festival",
///     "date": "2025-09-01",
///     "location": "Berlin",
///     "price_usd": 50,
///     "price_eth": 0.015,
///     "total_tickets": 500
///   }'
/// ```
///
/// # Errors
///
/// 400 when the name or location is blank or capacity is zero.
pub async fn create_event(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<NewEvent>,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    if request.name.trim().is_empty() || request.location.trim().is_empty() {
        return Err(ValidationError::MissingFields.into());
    }
    if request.total_tickets == 0 {
        return Err(AppError::bad_request("Event must have at least one ticket"));
    }

    let event = state.ledger.create_event(request).await?;
    tracing::info!(event_id = %event.id, name = %event.name, "Event created");

    Ok((
        StatusCode::CREATED,
        Json(EventResponse {
            success: true,
            event,
        }),
    ))
}

//! Router configuration.

use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::api::{assistant, entry, events, marketplace, mint, status, users};
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// Health checks are served both at the root, for probes, and under `/api`
/// next to everything else.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Catalogue
        .route("/events", get(events::list_events).post(events::create_event))
        .route("/events/:id", get(events::get_event))
        // Primary sale
        .route("/mint-ticket", post(mint::mint_ticket))
        // Users
        .route("/user", get(users::get_user).post(users::upsert_user))
        .route("/user/tickets", post(users::user_tickets))
        // Resale
        .route("/marketplace/list", post(marketplace::create_listing))
        .route("/marketplace/listings/:event_id", get(marketplace::event_listings))
        .route("/marketplace/mark-sold", post(marketplace::mark_sold))
        .route("/marketplace/cancel", post(marketplace::cancel_listing))
        // Assistant
        .route("/assistant/intent", post(assistant::interpret_intent))
        // Venue entry
        .route("/tickets/:id/entry-pass", post(entry::issue_entry_pass))
        .route("/entry/verify", post(entry::verify_entry_pass))
        // Operations
        .route("/config", get(status::client_config))
        .route("/relayer/status", get(status::relayer_status))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

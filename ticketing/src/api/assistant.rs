//! POST /api/assistant/intent - natural-language query to storefront intent.

use super::ApiJson;
use crate::assistant::{self, Intent};
use crate::error::AppError;
use crate::server::state::AppState;
use axum::{Json, extract::State};
use serde::Serialize;
use serde_json::Value;

/// Interpreted query.
#[derive(Debug, Serialize)]
pub struct IntentResponse {
    /// Always `true`
    pub success: bool,
    /// What the user asked for
    pub intent: Intent,
}

/// Interpret a free-text query against the event catalogue.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/assistant/intent \
///   -H "Content-Type: application/json" \
///   -d '{"query":"buy 2 tickets for the music festival"}'
/// ```
///
/// # Errors
///
/// 400 "Missing query" unless `query` is a non-empty string; 500 "Failed to
/// interpret query" when the catalogue or the model is unavailable.
pub async fn interpret_intent(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Value>,
) -> Result<Json<IntentResponse>, AppError> {
    let query = body
        .get("query")
        .and_then(Value::as_str)
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("Missing query"))?;

    let failed = |source: anyhow::Error| AppError::internal("Failed to interpret query").with_source(source);

    let events = state
        .ledger
        .list_events()
        .await
        .map_err(|e| failed(e.into()))?;
    let intent = assistant::interpret(state.assistant.as_ref(), query, &events)
        .await
        .map_err(|e| failed(e.into()))?;

    Ok(Json(IntentResponse {
        success: true,
        intent,
    }))
}

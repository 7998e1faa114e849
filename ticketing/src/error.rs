//! Error types for HTTP handlers.
//!
//! Every failure leaves the API as the storefront's JSON envelope,
//! `{ "success": false, "error": <message>, "code": <CODE> }`.

use crate::relayer::RelayerError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;
use ticketmint_core::chain::ChainError;
use ticketmint_core::ledger::LedgerError;
use ticketmint_core::validation::ValidationError;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Data>, AppError> {
///     let event = state.ledger.get_event(id).await?
///         .ok_or_else(|| AppError::not_found("Event not found"))?;
///     Ok(Json(event))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: String,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 400 Bad Request
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into(), "BAD_REQUEST".to_string())
    }

    /// 403 Forbidden
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message.into(), "FORBIDDEN".to_string())
    }

    /// 404 Not Found
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message.into(), "NOT_FOUND".to_string())
    }

    /// 409 Conflict
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message.into(), "CONFLICT".to_string())
    }

    /// 422 Unprocessable Entity
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            message.into(),
            "VALIDATION_ERROR".to_string(),
        )
    }

    /// 408 Request Timeout
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::REQUEST_TIMEOUT, message.into(), "TIMEOUT".to_string())
    }

    /// 500 Internal Server Error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
    }

    /// 503 Service Unavailable
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE".to_string(),
        )
    }

    /// 500 for a chain failure, with known node messages made readable.
    #[must_use]
    pub fn chain(message: &str) -> Self {
        Self::internal(humanize_chain_error(message))
    }

    /// HTTP status
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// User-facing message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Machine-readable code
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

/// Rewrites well-known node and wallet messages; anything else passes through.
#[must_use]
pub fn humanize_chain_error(message: &str) -> String {
    let lower = message.to_lowercase();
    if lower.contains("insufficient funds") {
        "Relayer has insufficient funds for gas fees".to_string()
    } else if lower.contains("user rejected") {
        "Transaction was rejected".to_string()
    } else if lower.contains("network") {
        "Network connection error".to_string()
    } else {
        message.to_string()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Internal server error"
                );
            }
        }

        let body = ErrorResponse {
            success: false,
            error: self.message,
            code: self.code,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(what) => Self::not_found(format!("{what} not found")),
            LedgerError::Conflict(message) => Self::conflict(message),
            LedgerError::Storage(_) => {
                Self::internal("Database error").with_source(anyhow::Error::new(err))
            },
        }
    }
}

impl From<ChainError> for AppError {
    fn from(err: ChainError) -> Self {
        Self::chain(&err.to_string()).with_source(anyhow::Error::new(err))
    }
}

impl From<RelayerError> for AppError {
    fn from(err: RelayerError) -> Self {
        match err {
            RelayerError::Validation(e) => e.into(),
            RelayerError::InvalidIdempotencyKey => Self::bad_request(err.to_string()),
            RelayerError::EventNotFound => Self::not_found(err.to_string()),
            RelayerError::InFlight | RelayerError::SoldOut => Self::conflict(err.to_string()),
            RelayerError::KeyReused => Self::validation(err.to_string()),
            RelayerError::Chain(e) => e.into(),
            RelayerError::Ledger(e) => e.into(),
            RelayerError::NotConfigured
            | RelayerError::InsufficientBalance { .. }
            | RelayerError::GasEstimation(_)
            | RelayerError::TokenNotEmitted(_)
            | RelayerError::Unrecorded { .. } => Self::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Invalid user address");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid user address");
    }

    #[test]
    fn test_not_found() {
        let err = AppError::not_found("Event not found");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn known_chain_messages_are_humanized() {
        assert_eq!(
            humanize_chain_error("insufficient funds for gas * price + value"),
            "Relayer has insufficient funds for gas fees"
        );
        assert_eq!(
            humanize_chain_error("MetaMask Tx Signature: User rejected the request"),
            "Transaction was rejected"
        );
        assert_eq!(humanize_chain_error("network timeout"), "Network connection error");
        assert_eq!(humanize_chain_error("execution reverted"), "execution reverted");
    }

    #[test]
    fn ledger_errors_map_to_statuses() {
        assert_eq!(
            AppError::from(LedgerError::Conflict("dup".to_string())).status(),
            StatusCode::CONFLICT
        );
        let storage = AppError::from(LedgerError::Storage("pool timed out".to_string()));
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(storage.message(), "Database error");
    }

    #[test]
    fn relayer_errors_keep_their_messages() {
        let err = AppError::from(RelayerError::GasEstimation("execution reverted".to_string()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "Unable to estimate gas cost: execution reverted");

        let err = AppError::from(RelayerError::SoldOut);
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err = AppError::from(RelayerError::Validation(ValidationError::InvalidAddress));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Invalid user address");

        let err = AppError::from(RelayerError::KeyReused);
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let err = AppError::from(RelayerError::Unrecorded { minted: 2 });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message().starts_with("2 minted token(s) could not be recorded"));
    }

    #[tokio::test]
    async fn response_uses_envelope() {
        let response = AppError::conflict("Event is sold out").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Event is sold out");
        assert_eq!(body["code"], "CONFLICT");
    }
}

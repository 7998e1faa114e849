//! Storefront backend as seen by the client flows.

use crate::relayer::{MintRequest, MintResponse};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ticketmint_core::entry_pass::EntryPass;
use ticketmint_core::models::{Listing, NewListing, ResaleSettlement};
use ticketmint_core::types::{TicketId, WalletAddress};

/// Backend call failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The backend answered with an error envelope
    #[error("{message}")]
    Api {
        /// HTTP status
        status: u16,
        /// `error` field of the envelope
        message: String,
    },

    /// The backend could not be reached
    #[error("Network connection error: {0}")]
    Transport(String),

    /// The backend answered with something unexpected
    #[error("Unexpected response: {0}")]
    Decode(String),
}

/// Endpoints the client flows call.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// POST /api/mint-ticket
    async fn mint_ticket(&self, request: &MintRequest) -> Result<MintResponse, ClientError>;

    /// POST /api/marketplace/list
    async fn record_listing(&self, listing: &NewListing) -> Result<Listing, ClientError>;

    /// POST /api/marketplace/mark-sold
    async fn mark_sold(&self, settlement: &ResaleSettlement) -> Result<(), ClientError>;

    /// POST /api/tickets/:id/entry-pass
    async fn issue_entry_pass(&self, ticket: TicketId, wallet: &WalletAddress) -> Result<EntryPass, ClientError>;
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<String>,
}

#[derive(Deserialize)]
struct ListingEnvelope {
    listing: Listing,
}

#[derive(Deserialize)]
struct PassEnvelope {
    pass: EntryPass,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PassRequest<'a> {
    wallet_address: &'a WalletAddress,
}

/// [`BackendApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Backend rooted at `base_url`, e.g. `http://localhost:8080/api`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post<B, T>(&self, path: &str, body: &B, idempotency_key: Option<&str>) -> Result<T, ClientError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.client.post(format!("{}{path}", self.base_url)).json(body);
        if let Some(key) = idempotency_key {
            request = request.header(crate::api::IDEMPOTENCY_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        if status.is_success() {
            serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
        } else {
            let message = serde_json::from_slice::<ErrorEnvelope>(&bytes)
                .ok()
                .and_then(|envelope| envelope.error)
                .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
            Err(ClientError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn mint_ticket(&self, request: &MintRequest) -> Result<MintResponse, ClientError> {
        self.post("/mint-ticket", request, request.idempotency_key.as_deref())
            .await
    }

    async fn record_listing(&self, listing: &NewListing) -> Result<Listing, ClientError> {
        let envelope: ListingEnvelope = self.post("/marketplace/list", listing, None).await?;
        Ok(envelope.listing)
    }

    async fn mark_sold(&self, settlement: &ResaleSettlement) -> Result<(), ClientError> {
        let _: serde_json::Value = self.post("/marketplace/mark-sold", settlement, None).await?;
        Ok(())
    }

    async fn issue_entry_pass(&self, ticket: TicketId, wallet: &WalletAddress) -> Result<EntryPass, ClientError> {
        let envelope: PassEnvelope = self
            .post(
                &format!("/tickets/{ticket}/entry-pass"),
                &PassRequest {
                    wallet_address: wallet,
                },
                None,
            )
            .await?;
        Ok(envelope.pass)
    }
}

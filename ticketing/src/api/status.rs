//! Public client configuration and relayer status.

use crate::error::AppError;
use crate::relayer::RelayerStatus;
use crate::server::state::AppState;
use axum::{Json, extract::State};
use serde::Serialize;
use ticketmint_core::chain::ContractAddresses;
use ticketmint_core::types::WalletAddress;

/// What a browser client needs to talk to the chain.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfigResponse {
    /// Always `true`
    pub success: bool,
    /// Chain the contracts live on
    pub chain_id: u64,
    /// Token and marketplace contracts
    pub contracts: ContractAddresses,
    /// Gas-paying account
    pub relayer_address: Option<WalletAddress>,
    /// Custodial wallet key, safe to publish
    pub custodial_wallet_publishable_key: Option<String>,
}

/// Relayer account status.
#[derive(Debug, Serialize)]
pub struct RelayerStatusResponse {
    /// Always `true`
    pub success: bool,
    /// Balance and capacity
    #[serde(flatten)]
    pub status: RelayerStatus,
}

/// GET /api/config
pub async fn client_config(State(state): State<AppState>) -> Json<ClientConfigResponse> {
    Json(ClientConfigResponse {
        success: true,
        chain_id: state.config.chain.chain_id,
        contracts: *state.relayer.contracts(),
        relayer_address: state.chain.account(),
        custodial_wallet_publishable_key: state.config.wallet.custodial_publishable_key.clone(),
    })
}

/// GET /api/relayer/status
///
/// # Errors
///
/// 500 when the relayer has no account or the node is unreachable.
pub async fn relayer_status(State(state): State<AppState>) -> Result<Json<RelayerStatusResponse>, AppError> {
    let status = state.relayer.status().await?;
    if status.low_balance {
        tracing::warn!(balance_eth = %status.balance_eth, "Relayer balance is low");
    }
    Ok(Json(RelayerStatusResponse {
        success: true,
        status,
    }))
}

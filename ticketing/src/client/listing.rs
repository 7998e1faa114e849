//! Resale listing flow, signed by the ticket holder.
//!
//! Checks run before any chain call, in order: wallet connected, contracts
//! configured, positive price, price cap. Then the marketplace is approved as
//! operator (skipped when it already is), the `list` call is confirmed and the
//! listing is recorded. A listing that is live on-chain but could not be
//! recorded ends in [`ListingPhase::ListedOnChainOnly`] rather than failure.

use super::api::BackendApi;
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;
use std::time::Duration;
use ticketmint_core::abi;
use ticketmint_core::async_effect;
use ticketmint_core::chain::{ChainError, ChainGateway, ContractAddresses, send_and_confirm};
use ticketmint_core::effect::Effect;
use ticketmint_core::models::{Event, Listing, NewListing, Ticket, best_known_price};
use ticketmint_core::reducer::Reducer;
use ticketmint_core::types::{EthAmount, TxHash, UserId, WalletAddress};
use ticketmint_core::validation::{ValidationError, check_listing_price};

/// Shown when no wallet is connected.
pub const CONNECT_WALLET_MESSAGE: &str = "Please connect your wallet";

/// Shown when either contract address is missing.
pub const MISSING_CONFIG_MESSAGE: &str = "Marketplace or NFT address not configured.";

/// Where the listing is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ListingPhase {
    /// Nothing submitted
    #[default]
    Idle,
    /// Checking or granting operator approval
    Approving,
    /// Waiting for the `list` transaction
    Listing,
    /// Recording the confirmed listing
    Recording,
    /// Live on-chain and recorded
    Listed,
    /// Live on-chain but absent from the store
    ListedOnChainOnly,
    /// Refused or reverted
    Failed,
}

/// What the holder wants to list.
#[derive(Clone, Debug, PartialEq)]
pub struct ListingRequest {
    /// Ticket to list
    pub ticket: Ticket,
    /// Its event, for the price fallback
    pub event: Option<Event>,
    /// Seller's user row; without it the listing cannot be recorded
    pub seller: Option<UserId>,
    /// Asking price as typed, in ETH
    pub price: String,
}

/// Listing state.
#[derive(Clone, Debug, Default)]
pub struct ListingState {
    /// Current phase
    pub phase: ListingPhase,
    /// Request in progress
    pub request: Option<ListingRequest>,
    /// Parsed asking price
    pub price: Option<EthAmount>,
    /// Confirmed `list` transaction
    pub tx_hash: Option<TxHash>,
    /// Recorded listing
    pub listing: Option<Listing>,
    /// Soft failure after the chain accepted the listing
    pub warning: Option<String>,
    /// Hard failure
    pub error: Option<String>,
}

/// Listing actions.
#[derive(Clone, Debug, PartialEq)]
pub enum ListingAction {
    /// Holder pressed "list"
    Submit(ListingRequest),
    /// Marketplace may transfer the holder's tokens
    ApprovalReady,
    /// `list` mined
    ListConfirmed {
        /// Listing transaction
        tx_hash: TxHash,
    },
    /// Backend recorded the listing
    Recorded {
        /// Stored listing
        listing: Box<Listing>,
    },
    /// Backend refused or was unreachable
    RecordFailed {
        /// Backend message
        message: String,
    },
    /// A transaction failed or reverted
    ChainFailed {
        /// Chain message
        message: String,
    },
    /// Back to idle
    Reset,
}

/// Listing dependencies.
#[derive(Clone)]
pub struct ListingEnvironment {
    /// Holder's wallet; `None` until connected
    pub wallet: Option<Arc<dyn ChainGateway>>,
    /// Storefront backend
    pub backend: Arc<dyn BackendApi>,
    /// Deployed contracts
    pub contracts: ContractAddresses,
    /// How long to wait for each transaction
    pub confirmation_timeout: Duration,
}

/// Listing reducer.
#[derive(Clone, Copy, Debug, Default)]
pub struct ListingReducer;

impl ListingReducer {
    fn check(request: &ListingRequest, env: &ListingEnvironment) -> Result<EthAmount, String> {
        if env.wallet.as_ref().and_then(|w| w.account()).is_none() {
            return Err(CONNECT_WALLET_MESSAGE.to_string());
        }
        if env.contracts.both().is_none() {
            return Err(MISSING_CONFIG_MESSAGE.to_string());
        }
        let price = EthAmount::from_eth_str(request.price.trim())
            .ok()
            .filter(|price| !price.is_zero())
            .ok_or_else(|| ValidationError::NonPositivePrice.to_string())?;
        check_listing_price(price, best_known_price(&request.ticket, request.event.as_ref()))
            .map_err(|e| e.to_string())?;
        Ok(price)
    }

    fn fail(state: &mut ListingState, message: String) -> SmallVec<[Effect<ListingAction>; 4]> {
        tracing::warn!(%message, "Listing failed");
        state.phase = ListingPhase::Failed;
        state.error = Some(message);
        smallvec![Effect::None]
    }
}

async fn ensure_approval(
    wallet: Arc<dyn ChainGateway>,
    contracts: ContractAddresses,
    owner: WalletAddress,
    timeout: Duration,
) -> Result<(), ChainError> {
    let (token, marketplace) = contracts
        .both()
        .ok_or(ChainError::NotConfigured("Marketplace"))?;
    let raw = wallet
        .call(&token.is_approved_for_all(&owner, marketplace.address))
        .await?;
    if abi::decode_bool(&raw, 0).unwrap_or(false) {
        return Ok(());
    }
    tracing::info!(%owner, "Approving marketplace");
    send_and_confirm(
        wallet.as_ref(),
        &token.set_approval_for_all(marketplace.address, true),
        None,
        timeout,
    )
    .await?;
    Ok(())
}

impl Reducer for ListingReducer {
    type State = ListingState;
    type Action = ListingAction;
    type Environment = ListingEnvironment;

    fn reduce(
        &self,
        state: &mut ListingState,
        action: ListingAction,
        env: &ListingEnvironment,
    ) -> SmallVec<[Effect<ListingAction>; 4]> {
        match action {
            ListingAction::Submit(request) => {
                if !matches!(state.phase, ListingPhase::Idle | ListingPhase::Failed) {
                    return smallvec![Effect::None];
                }
                *state = ListingState::default();
                let price = match Self::check(&request, env) {
                    Ok(price) => price,
                    Err(message) => return Self::fail(state, message),
                };
                let (Some(wallet), Some(owner)) = (env.wallet.clone(), env.wallet.as_ref().and_then(|w| w.account())) else {
                    return Self::fail(state, CONNECT_WALLET_MESSAGE.to_string());
                };

                state.phase = ListingPhase::Approving;
                state.price = Some(price);
                state.request = Some(request);

                let contracts = env.contracts;
                let timeout = env.confirmation_timeout;
                smallvec![async_effect! {
                    match ensure_approval(wallet, contracts, owner, timeout).await {
                        Ok(()) => Some(ListingAction::ApprovalReady),
                        Err(e) => Some(ListingAction::ChainFailed { message: e.to_string() }),
                    }
                }]
            },

            ListingAction::ApprovalReady => {
                if state.phase != ListingPhase::Approving {
                    return smallvec![Effect::None];
                }
                let (Some(request), Some(price), Some(wallet), Some((token, marketplace))) = (
                    state.request.as_ref(),
                    state.price,
                    env.wallet.clone(),
                    env.contracts.both(),
                ) else {
                    return Self::fail(state, MISSING_CONFIG_MESSAGE.to_string());
                };
                state.phase = ListingPhase::Listing;

                let call = marketplace.list(token.address, request.ticket.token_id, price);
                let timeout = env.confirmation_timeout;
                smallvec![async_effect! {
                    match send_and_confirm(wallet.as_ref(), &call, None, timeout).await {
                        Ok(receipt) => Some(ListingAction::ListConfirmed { tx_hash: receipt.transaction_hash }),
                        Err(e) => Some(ListingAction::ChainFailed { message: e.to_string() }),
                    }
                }]
            },

            ListingAction::ListConfirmed { tx_hash } => {
                if state.phase != ListingPhase::Listing {
                    return smallvec![Effect::None];
                }
                state.tx_hash = Some(tx_hash);
                tracing::info!(%tx_hash, "Listing confirmed on-chain");

                let (Some(request), Some(price), Some(nft_address)) =
                    (state.request.as_ref(), state.price, env.contracts.token)
                else {
                    return smallvec![Effect::None];
                };
                let Some(seller_id) = request.seller else {
                    state.phase = ListingPhase::ListedOnChainOnly;
                    state.warning = Some("Your NFT is listed on the blockchain but not in our database.".to_string());
                    return smallvec![Effect::None];
                };
                state.phase = ListingPhase::Recording;

                let listing = NewListing {
                    event_id: request.ticket.event_id,
                    ticket_id: request.ticket.id,
                    nft_address,
                    token_id: request.ticket.token_id,
                    seller_id,
                    price_eth: price,
                    tx_hash: Some(tx_hash),
                };
                let backend = Arc::clone(&env.backend);
                smallvec![async_effect! {
                    match backend.record_listing(&listing).await {
                        Ok(listing) => Some(ListingAction::Recorded { listing: Box::new(listing) }),
                        Err(e) => Some(ListingAction::RecordFailed { message: e.to_string() }),
                    }
                }]
            },

            ListingAction::Recorded { listing } => {
                if state.phase == ListingPhase::Recording {
                    state.phase = ListingPhase::Listed;
                    state.listing = Some(*listing);
                }
                smallvec![Effect::None]
            },

            ListingAction::RecordFailed { message } => {
                if state.phase == ListingPhase::Recording {
                    tracing::warn!(%message, "Listing live on-chain but not recorded");
                    state.phase = ListingPhase::ListedOnChainOnly;
                    state.warning = Some(format!("DB record failed, but your listing is live: {message}"));
                }
                smallvec![Effect::None]
            },

            ListingAction::ChainFailed { message } => {
                if matches!(state.phase, ListingPhase::Approving | ListingPhase::Listing) {
                    return Self::fail(state, message);
                }
                smallvec![Effect::None]
            },

            ListingAction::Reset => {
                *state = ListingState::default();
                smallvec![Effect::None]
            },
        }
    }
}

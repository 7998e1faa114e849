//! Buying a listed ticket with the buyer's own wallet.
//!
//! The `buy` call carries the asking price as value. Once it is mined the
//! backend is told to settle the listing. The chain is authoritative, so a
//! settlement failure leaves the purchase in [`ResalePhase::SettlementFailed`]
//! instead of [`ResalePhase::Failed`].

use super::api::BackendApi;
use super::listing::CONNECT_WALLET_MESSAGE;
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;
use std::time::Duration;
use ticketmint_core::async_effect;
use ticketmint_core::chain::{ChainGateway, ContractAddresses, send_and_confirm};
use ticketmint_core::effect::Effect;
use ticketmint_core::models::{Listing, ResaleSettlement};
use ticketmint_core::reducer::Reducer;
use ticketmint_core::types::{ListingStatus, TxHash, UserId};

/// Where the purchase is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResalePhase {
    /// Nothing submitted
    #[default]
    Idle,
    /// Waiting for the `buy` transaction
    Buying,
    /// Telling the backend about the sale
    Settling,
    /// Bought and recorded
    Completed,
    /// Bought on-chain, not recorded
    SettlementFailed,
    /// Refused or reverted
    Failed,
}

/// Resale state.
#[derive(Clone, Debug, Default)]
pub struct ResaleState {
    /// Current phase
    pub phase: ResalePhase,
    /// Listing being bought
    pub listing: Option<Listing>,
    /// Buyer's user row
    pub buyer_id: Option<UserId>,
    /// Confirmed `buy` transaction
    pub tx_hash: Option<TxHash>,
    /// Message for the buyer
    pub error: Option<String>,
}

/// Resale actions.
#[derive(Clone, Debug, PartialEq)]
pub enum ResaleAction {
    /// Buyer pressed "buy"
    Buy {
        /// Listing to buy
        listing: Box<Listing>,
        /// Buyer's user row
        buyer_id: UserId,
    },
    /// `buy` mined
    Confirmed {
        /// Purchase transaction
        tx_hash: TxHash,
    },
    /// Backend settled the listing
    Settled,
    /// Backend refused or was unreachable
    SettlementFailed {
        /// Backend message
        message: String,
    },
    /// Transaction failed or reverted
    ChainFailed {
        /// Chain message
        message: String,
    },
    /// Back to idle
    Reset,
}

/// Resale dependencies.
#[derive(Clone)]
pub struct ResaleEnvironment {
    /// Buyer's wallet
    pub wallet: Option<Arc<dyn ChainGateway>>,
    /// Storefront backend
    pub backend: Arc<dyn BackendApi>,
    /// Deployed contracts
    pub contracts: ContractAddresses,
    /// How long to wait for the transaction
    pub confirmation_timeout: Duration,
}

/// Resale reducer.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResaleReducer;

impl ResaleReducer {
    fn fail(state: &mut ResaleState, message: String) -> SmallVec<[Effect<ResaleAction>; 4]> {
        tracing::warn!(%message, "Resale purchase failed");
        state.phase = ResalePhase::Failed;
        state.error = Some(message);
        smallvec![Effect::None]
    }
}

impl Reducer for ResaleReducer {
    type State = ResaleState;
    type Action = ResaleAction;
    type Environment = ResaleEnvironment;

    fn reduce(
        &self,
        state: &mut ResaleState,
        action: ResaleAction,
        env: &ResaleEnvironment,
    ) -> SmallVec<[Effect<ResaleAction>; 4]> {
        match action {
            ResaleAction::Buy { listing, buyer_id } => {
                if matches!(state.phase, ResalePhase::Buying | ResalePhase::Settling) {
                    return smallvec![Effect::None];
                }
                *state = ResaleState::default();

                let Some(wallet) = env.wallet.clone().filter(|w| w.account().is_some()) else {
                    return Self::fail(state, CONNECT_WALLET_MESSAGE.to_string());
                };
                let Some(marketplace) = env.contracts.both().map(|(_, marketplace)| marketplace) else {
                    return Self::fail(state, super::listing::MISSING_CONFIG_MESSAGE.to_string());
                };
                if listing.status != ListingStatus::Active {
                    return Self::fail(state, "Listing is not active".to_string());
                }

                let call = marketplace.buy(listing.nft_address, listing.token_id, listing.price_eth);
                tracing::info!(token_id = %listing.token_id, price = %listing.price_eth, "Buying listed ticket");
                state.phase = ResalePhase::Buying;
                state.listing = Some(*listing);
                state.buyer_id = Some(buyer_id);

                let timeout = env.confirmation_timeout;
                smallvec![async_effect! {
                    match send_and_confirm(wallet.as_ref(), &call, None, timeout).await {
                        Ok(receipt) => Some(ResaleAction::Confirmed { tx_hash: receipt.transaction_hash }),
                        Err(e) => Some(ResaleAction::ChainFailed { message: e.to_string() }),
                    }
                }]
            },

            ResaleAction::Confirmed { tx_hash } => {
                if state.phase != ResalePhase::Buying {
                    return smallvec![Effect::None];
                }
                state.tx_hash = Some(tx_hash);
                let (Some(listing), Some(buyer_id)) = (state.listing.as_ref(), state.buyer_id) else {
                    return smallvec![Effect::None];
                };
                state.phase = ResalePhase::Settling;

                let settlement = ResaleSettlement {
                    nft_address: listing.nft_address,
                    token_id: listing.token_id,
                    buyer_id,
                    tx_hash,
                    ticket_id: listing.ticket_id,
                    new_price_eth: listing.price_eth,
                };
                let backend = Arc::clone(&env.backend);
                smallvec![async_effect! {
                    match backend.mark_sold(&settlement).await {
                        Ok(()) => Some(ResaleAction::Settled),
                        Err(e) => Some(ResaleAction::SettlementFailed { message: e.to_string() }),
                    }
                }]
            },

            ResaleAction::Settled => {
                if state.phase == ResalePhase::Settling {
                    state.phase = ResalePhase::Completed;
                }
                smallvec![Effect::None]
            },

            ResaleAction::SettlementFailed { message } => {
                if state.phase == ResalePhase::Settling {
                    tracing::warn!(%message, tx_hash = ?state.tx_hash, "Bought on-chain but settlement failed");
                    state.phase = ResalePhase::SettlementFailed;
                    state.error = Some(format!("Purchase confirmed on-chain, but recording it failed: {message}"));
                }
                smallvec![Effect::None]
            },

            ResaleAction::ChainFailed { message } => {
                if state.phase == ResalePhase::Buying {
                    return Self::fail(state, message);
                }
                smallvec![Effect::None]
            },

            ResaleAction::Reset => {
                *state = ResaleState::default();
                smallvec![Effect::None]
            },
        }
    }
}

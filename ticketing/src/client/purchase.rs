//! Checkout state machine.
//!
//! `Idle → Processing → Minting → Completed`, or `Failed` from either busy
//! phase. Processing stands in for payment authorization with a fixed delay;
//! a 30 second timeout races the whole attempt.
//!
//! Each attempt carries a generation number. Timers and backend results from
//! an earlier attempt arrive with an old number and are dropped, so a retry is
//! never completed or failed by its predecessor. The idempotency key survives
//! retries and is replaced only after a purchase completes, which lets the
//! relayer recognise a retried purchase whose first mint is still running.

use super::api::BackendApi;
use crate::relayer::{MintRequest, MintResponse};
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;
use ticketmint_core::effect::Effect;
use ticketmint_core::environment::{Clock, IdGenerator};
use ticketmint_core::models::Event;
use ticketmint_core::pricing::{AltPaymentPayload, PURCHASE_TIMEOUT, PurchaseSummary, authorization_delay};
use ticketmint_core::reducer::Reducer;
use ticketmint_core::types::{AltPaymentProvider, PaymentMethod, WalletAddress};
use ticketmint_core::validation::{CardDetails, ValidationError, validate_quantity};
use ticketmint_core::{call_effect, delay};

/// Shown when the attempt outlives [`PURCHASE_TIMEOUT`].
pub const TIMEOUT_MESSAGE: &str = "Transaction timed out. Please try again.";

/// Where the checkout is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PurchasePhase {
    /// Choosing method and quantity
    #[default]
    Idle,
    /// Simulated payment authorization
    Processing,
    /// Waiting for the relayer
    Minting,
    /// Tickets recorded
    Completed,
    /// Attempt failed or timed out
    Failed,
}

/// What the buyer asked for.
#[derive(Clone, Debug, PartialEq)]
pub struct PurchaseRequest {
    /// Event being bought
    pub event: Event,
    /// Buyer's wallet
    pub wallet: WalletAddress,
    /// Checkout method
    pub method: PaymentMethod,
    /// Tickets
    pub quantity: u32,
    /// Card form, required for [`PaymentMethod::Fiat`]
    pub card: Option<CardDetails>,
    /// QR provider, required for [`PaymentMethod::AltQr`]
    pub alt_provider: Option<AltPaymentProvider>,
}

impl PurchaseRequest {
    /// Whether `other` would mint the same tickets, so a retry may reuse the key
    #[must_use]
    pub fn same_order(&self, other: &Self) -> bool {
        self.event.id == other.event.id
            && self.wallet == other.wallet
            && self.method == other.method
            && self.quantity == other.quantity
    }
}

/// Checkout state.
#[derive(Clone, Debug, Default)]
pub struct PurchaseState {
    /// Current phase
    pub phase: PurchasePhase,
    /// Generation of the current attempt
    pub attempt: u64,
    /// Key shared by every attempt of one purchase
    pub idempotency_key: Option<String>,
    /// Request being processed
    pub request: Option<PurchaseRequest>,
    /// Totals for the request
    pub summary: Option<PurchaseSummary>,
    /// QR payload for alternative payments
    pub alt_payment: Option<AltPaymentPayload>,
    /// Relayer answer once completed
    pub receipt: Option<MintResponse>,
    /// Message for the buyer
    pub error: Option<String>,
}

impl PurchaseState {
    /// Whether an attempt is running
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self.phase, PurchasePhase::Processing | PurchasePhase::Minting)
    }
}

/// Checkout actions.
#[derive(Clone, Debug, PartialEq)]
pub enum PurchaseAction {
    /// Buyer pressed "buy"
    Start(PurchaseRequest),
    /// Authorization delay elapsed
    PaymentAuthorized {
        /// Attempt the timer belongs to
        attempt: u64,
    },
    /// Relayer minted
    MintSucceeded {
        /// Attempt the call belongs to
        attempt: u64,
        /// Relayer answer
        response: Box<MintResponse>,
    },
    /// Relayer refused or was unreachable
    MintFailed {
        /// Attempt the call belongs to
        attempt: u64,
        /// Message for the buyer
        message: String,
    },
    /// [`PURCHASE_TIMEOUT`] elapsed
    TimedOut {
        /// Attempt the timer belongs to
        attempt: u64,
    },
    /// Buyer pressed "try again"
    Retry,
}

/// Checkout dependencies.
#[derive(Clone)]
pub struct PurchaseEnvironment {
    /// Storefront backend
    pub backend: Arc<dyn BackendApi>,
    /// Source of idempotency keys
    pub ids: Arc<dyn IdGenerator>,
    /// Used to check card expiry
    pub clock: Arc<dyn Clock>,
}

/// Checkout reducer.
#[derive(Clone, Copy, Debug, Default)]
pub struct PurchaseReducer;

impl PurchaseReducer {
    fn validate(request: &PurchaseRequest, env: &PurchaseEnvironment) -> Result<PurchaseSummary, ValidationError> {
        validate_quantity(request.quantity)?;
        match request.method {
            PaymentMethod::Fiat => request
                .card
                .as_ref()
                .ok_or(ValidationError::InvalidCardNumber)?
                .validate(env.clock.now().date_naive())?,
            PaymentMethod::AltQr => {
                let provider = request.alt_provider.ok_or(ValidationError::MissingFields)?;
                if !provider.is_available() {
                    return Err(ValidationError::UnknownValue {
                        kind: "AltPaymentProvider",
                        value: provider.to_string(),
                    });
                }
            },
            PaymentMethod::Crypto => {},
        }
        PurchaseSummary::compute(request.event.price_usd, request.event.price_eth, request.quantity)
            .ok_or_else(|| ValidationError::InvalidAmount("total overflows".to_string()))
    }
}

impl Reducer for PurchaseReducer {
    type State = PurchaseState;
    type Action = PurchaseAction;
    type Environment = PurchaseEnvironment;

    fn reduce(
        &self,
        state: &mut PurchaseState,
        action: PurchaseAction,
        env: &PurchaseEnvironment,
    ) -> SmallVec<[Effect<PurchaseAction>; 4]> {
        match action {
            PurchaseAction::Start(request) => {
                if !matches!(state.phase, PurchasePhase::Idle | PurchasePhase::Completed) {
                    return smallvec![Effect::None];
                }
                let summary = match Self::validate(&request, env) {
                    Ok(summary) => summary,
                    Err(e) => {
                        state.phase = PurchasePhase::Idle;
                        state.error = Some(e.to_string());
                        return smallvec![Effect::None];
                    },
                };

                state.attempt += 1;
                state.phase = PurchasePhase::Processing;
                state.error = None;
                state.receipt = None;
                state.summary = Some(summary);
                state.alt_payment = request.alt_provider.filter(|_| request.method == PaymentMethod::AltQr).map(|provider| {
                    AltPaymentPayload::new(
                        provider,
                        &summary,
                        request.event.id,
                        request.event.name.clone(),
                        request.wallet,
                        env.clock.now(),
                    )
                });
                if state
                    .request
                    .as_ref()
                    .is_some_and(|previous| !previous.same_order(&request))
                {
                    state.idempotency_key = None;
                }
                let key = state
                    .idempotency_key
                    .get_or_insert_with(|| env.ids.next_id().to_string());
                tracing::info!(attempt = state.attempt, method = %request.method, key = %key, "Purchase started");

                let attempt = state.attempt;
                let method = request.method;
                state.request = Some(request);
                smallvec![
                    delay! {
                        duration: authorization_delay(method),
                        action: PurchaseAction::PaymentAuthorized { attempt }
                    },
                    delay! {
                        duration: PURCHASE_TIMEOUT,
                        action: PurchaseAction::TimedOut { attempt }
                    },
                ]
            },

            PurchaseAction::PaymentAuthorized { attempt } => {
                if attempt != state.attempt || state.phase != PurchasePhase::Processing {
                    return smallvec![Effect::None];
                }
                let Some(request) = state.request.as_ref() else {
                    return smallvec![Effect::None];
                };
                state.phase = PurchasePhase::Minting;

                let mint = MintRequest {
                    user_address: Some(request.wallet.to_string()),
                    payment_method: Some(request.method),
                    event_id: Some(request.event.id.to_string()),
                    quantity: Some(request.quantity),
                    idempotency_key: state.idempotency_key.clone(),
                };
                let backend = Arc::clone(&env.backend);
                smallvec![call_effect! {
                    call: backend.mint_ticket(&mint),
                    on_success: |response| Some(PurchaseAction::MintSucceeded {
                        attempt,
                        response: Box::new(response),
                    }),
                    on_error: |error| Some(PurchaseAction::MintFailed {
                        attempt,
                        message: error.to_string(),
                    })
                }]
            },

            PurchaseAction::MintSucceeded { attempt, response } => {
                if attempt != state.attempt || state.phase != PurchasePhase::Minting {
                    return smallvec![Effect::None];
                }
                tracing::info!(tx_hash = %response.transaction_hash, tickets = response.tickets.len(), "Purchase completed");
                state.phase = PurchasePhase::Completed;
                state.error = response.warning.clone();
                state.receipt = Some(*response);
                state.idempotency_key = None;
                smallvec![Effect::None]
            },

            PurchaseAction::MintFailed { attempt, message } => {
                if attempt != state.attempt || !state.is_busy() {
                    return smallvec![Effect::None];
                }
                tracing::warn!(attempt, %message, "Purchase failed");
                state.phase = PurchasePhase::Failed;
                state.error = Some(message);
                smallvec![Effect::None]
            },

            PurchaseAction::TimedOut { attempt } => {
                if attempt != state.attempt || !state.is_busy() {
                    return smallvec![Effect::None];
                }
                tracing::warn!(attempt, "Purchase timed out");
                state.phase = PurchasePhase::Failed;
                state.error = Some(TIMEOUT_MESSAGE.to_string());
                smallvec![Effect::None]
            },

            PurchaseAction::Retry => {
                if state.phase == PurchasePhase::Failed {
                    state.phase = PurchasePhase::Idle;
                    state.error = None;
                }
                smallvec![Effect::None]
            },
        }
    }
}

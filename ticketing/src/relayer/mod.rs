//! Gas relayer.
//!
//! Mints tickets from a funded server account so buyers never pay gas. One
//! request may mint several tokens; each is its own confirmed transaction, all
//! under one capacity reservation and one idempotency key.
//!
//! # Flow
//!
//! 1. Relayer configured, address valid, quantity in range, event exists
//! 2. Idempotency key claimed for this request's fingerprint (a finished
//!    request is replayed, a running one is refused, a different body is
//!    rejected, and a claim older than the configured TTL is taken over)
//! 3. Capacity reserved atomically, user upserted, pending purchase opened
//! 4. Relayer balance checked against the configured floor
//! 5. Per unit: estimate, submit with a gas buffer, confirm, record the ticket,
//!    then tell the marketplace the base price (best effort)
//! 6. Purchase closed and the response stored under the key
//!
//! Submissions from the shared account go through one async mutex so nonces
//! are never raced.

use crate::config::Config;
use crate::metrics;
use alloy_primitives::keccak256;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use ticketmint_core::chain::{
    ChainError, ChainGateway, ContractAddresses, MarketplaceContract, TokenContract, TxReceipt,
    send_and_confirm,
};
use ticketmint_core::ledger::{LedgerError, LedgerStore, MintClaim};
use ticketmint_core::models::{Event, NewPurchase, NewTicket, NewUser, Ticket, User};
use ticketmint_core::pricing::PurchaseSummary;
use ticketmint_core::types::{
    EthAmount, EventId, PaymentMethod, PurchaseId, PurchaseStatus, TicketId, TokenId, TxHash,
    WalletAddress,
};
use ticketmint_core::validation::{ValidationError, validate_quantity};
use tokio::sync::Mutex;

/// Gas assumed per mint when estimating how many mints the balance covers.
pub const STATUS_GAS_PER_MINT: u128 = 100_000;

/// Balance below which the relayer reports itself as running low (0.01 ETH).
pub const LOW_BALANCE_WEI: u128 = 10_000_000_000_000_000;

/// Accepted idempotency key lengths.
pub const IDEMPOTENCY_KEY_LENGTH: std::ops::RangeInclusive<usize> = 16..=128;

/// Relayer failures. Display strings are returned to callers.
#[derive(Debug, Error)]
pub enum RelayerError {
    /// No sending account or token contract configured
    #[error("Relayer not configured")]
    NotConfigured,

    /// Malformed request field
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Unknown event
    #[error("Event not found")]
    EventNotFound,

    /// Key outside the accepted length
    #[error("Idempotency key must be between 16 and 128 characters")]
    InvalidIdempotencyKey,

    /// Another request holds the same key
    #[error("A mint with this idempotency key is already in progress")]
    InFlight,

    /// The key was first used with a different request body
    #[error("Idempotency key was already used for a different request")]
    KeyReused,

    /// Tokens reached the chain but their tickets were not recorded. The key
    /// keeps this outcome so a retry cannot mint again.
    #[error("{minted} minted token(s) could not be recorded; contact support with this idempotency key")]
    Unrecorded {
        /// Tokens confirmed on chain
        minted: u32,
    },

    /// Not enough capacity left for the requested quantity
    #[error("Event is sold out")]
    SoldOut,

    /// Relayer balance below the configured floor
    #[error("Insufficient relayer balance for gas fees")]
    InsufficientBalance {
        /// Balance at the time of the check
        balance: EthAmount,
    },

    /// Node refused to estimate the mint
    #[error("Unable to estimate gas cost: {0}")]
    GasEstimation(String),

    /// Confirmed mint without a `Transfer` from the zero address
    #[error("Mint transaction {0} did not emit a token")]
    TokenNotEmitted(TxHash),

    /// Node or signer failure
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Record store failure
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Mint request as posted by the purchase flow.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
    /// Recipient wallet
    #[serde(default)]
    pub user_address: Option<String>,
    /// Checkout method; defaults to crypto
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    /// Event
    #[serde(default)]
    pub event_id: Option<String>,
    /// Tickets to mint; defaults to one
    #[serde(default)]
    pub quantity: Option<u32>,
    /// Deduplication key, also accepted as the `Idempotency-Key` header
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Successful (possibly partial) mint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintResponse {
    /// Always `true`
    pub success: bool,
    /// First mint transaction
    pub transaction_hash: TxHash,
    /// First minted token
    pub token_id: TokenId,
    /// First ticket row
    pub ticket: Ticket,
    /// Recipient
    pub user: User,
    /// Every ticket recorded by this request
    pub tickets: Vec<Ticket>,
    /// Gas actually paid, in ETH
    pub estimated_gas_cost: String,
    /// Relayer balance after minting, in ETH
    pub relayer_balance: String,
    /// Set when fewer tokens were minted than requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Operator view of the relayer account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerStatus {
    /// Sending account
    pub address: WalletAddress,
    /// Balance in ETH
    pub balance_eth: String,
    /// Current gas price in gwei
    pub gas_price_gwei: String,
    /// Cost of one mint at [`STATUS_GAS_PER_MINT`] gas
    pub cost_per_mint_eth: String,
    /// Mints the balance still covers
    pub estimated_mints_remaining: u128,
    /// Balance under [`LOW_BALANCE_WEI`]
    pub low_balance: bool,
    /// Configured contracts
    pub contracts: ContractAddresses,
}

/// Relayer tuning.
#[derive(Clone, Debug)]
pub struct RelayerSettings {
    /// Token and marketplace contracts
    pub contracts: ContractAddresses,
    /// Balance floor below which minting is refused
    pub min_balance: EthAmount,
    /// Gas added on top of each estimate
    pub gas_buffer: u64,
    /// How long to wait for a mint to be mined
    pub confirmation_timeout: Duration,
    /// Token metadata location
    pub metadata_uri: String,
    /// Age after which an unfinished idempotency claim may be taken over
    pub claim_ttl: Duration,
}

impl RelayerSettings {
    /// Settings from the loaded configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            contracts: config.chain.contracts(),
            min_balance: config.relayer.min_balance,
            gas_buffer: config.relayer.gas_buffer,
            confirmation_timeout: config.relayer.confirmation_timeout(),
            metadata_uri: config.relayer.metadata_uri.clone(),
            claim_ttl: config.relayer.claim_ttl(),
        }
    }
}

/// Everything validated before the key is claimed.
struct Admitted {
    relayer: WalletAddress,
    token: TokenContract,
    wallet: WalletAddress,
    method: PaymentMethod,
    quantity: u32,
    event: Event,
}

impl Admitted {
    fn fingerprint(&self) -> String {
        request_fingerprint(&self.wallet, self.event.id, self.quantity, self.method)
    }
}

/// Identifies the request body an idempotency key is bound to: the same
/// recipient, event, quantity and method always hash to the same value.
#[must_use]
pub fn request_fingerprint(
    wallet: &WalletAddress,
    event: EventId,
    quantity: u32,
    method: PaymentMethod,
) -> String {
    let body = format!("{wallet}|{event}|{quantity}|{method}");
    keccak256(body.as_bytes()).to_string()
}

/// Turns a stored outcome back into the original result.
fn replay(stored: serde_json::Value) -> Result<MintResponse, RelayerError> {
    if stored.get("success").and_then(serde_json::Value::as_bool) == Some(false) {
        let minted = stored
            .get("unrecorded")
            .and_then(serde_json::Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or_default();
        return Err(RelayerError::Unrecorded { minted });
    }
    serde_json::from_value(stored).map_err(|e| {
        RelayerError::Ledger(LedgerError::Storage(format!("Stored mint response unreadable: {e}")))
    })
}

/// Tokens minted for one request, successful or not.
#[derive(Default)]
struct MintProgress {
    tickets: Vec<Ticket>,
    minted_on_chain: u32,
    gas_paid: u128,
    failure: Option<RelayerError>,
}

/// The gas relayer.
#[derive(Clone)]
pub struct RelayerService {
    chain: Arc<dyn ChainGateway>,
    ledger: Arc<dyn LedgerStore>,
    settings: RelayerSettings,
    send_lock: Arc<Mutex<()>>,
}

impl RelayerService {
    /// Creates a relayer sending from `chain`'s account.
    #[must_use]
    pub fn new(chain: Arc<dyn ChainGateway>, ledger: Arc<dyn LedgerStore>, settings: RelayerSettings) -> Self {
        Self {
            chain,
            ledger,
            settings,
            send_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Configured contracts
    #[must_use]
    pub const fn contracts(&self) -> &ContractAddresses {
        &self.settings.contracts
    }

    /// Mints the requested tickets.
    ///
    /// A request carrying a key that already finished returns the stored
    /// response without touching the chain.
    ///
    /// # Errors
    ///
    /// See [`RelayerError`]. Once at least one token is minted the request
    /// succeeds with a `warning` instead of failing.
    #[tracing::instrument(
        skip(self, request),
        fields(event_id = tracing::field::Empty, wallet = tracing::field::Empty, quantity = tracing::field::Empty)
    )]
    pub async fn mint(&self, request: MintRequest) -> Result<MintResponse, RelayerError> {
        let started = Instant::now();
        let admitted = self.admit(&request).await?;

        let span = tracing::Span::current();
        span.record("event_id", tracing::field::display(admitted.event.id));
        span.record("wallet", tracing::field::display(admitted.wallet));
        span.record("quantity", admitted.quantity);

        let key = request.idempotency_key.as_deref();
        if let Some(key) = key {
            let claim = self
                .ledger
                .begin_mint_request(key, &admitted.fingerprint(), self.settings.claim_ttl)
                .await?;
            match claim {
                MintClaim::Claimed => {},
                MintClaim::InFlight => return Err(RelayerError::InFlight),
                MintClaim::Mismatch => {
                    tracing::warn!("Idempotency key reused with a different request");
                    return Err(RelayerError::KeyReused);
                },
                MintClaim::Completed(stored) => {
                    tracing::info!("Replaying stored mint response");
                    metrics::record_mint("replayed", 0, started.elapsed().as_secs_f64());
                    return replay(stored);
                },
            }
        }

        let result = self.mint_claimed(&admitted).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(response) => {
                let status = if response.warning.is_some() { "partial" } else { "success" };
                metrics::record_mint(status, response.tickets.len(), elapsed);
                if let Some(key) = key {
                    let stored = serde_json::to_value(&response).map_err(|e| {
                        RelayerError::Ledger(LedgerError::Storage(format!("Failed to encode mint response: {e}")))
                    });
                    match stored {
                        Ok(value) => {
                            if let Err(e) = self.ledger.complete_mint_request(key, value).await {
                                tracing::warn!(error = %e, "Failed to store mint response");
                            }
                        },
                        Err(e) => tracing::warn!(error = %e, "Failed to store mint response"),
                    }
                }
                Ok(response)
            },
            Err((error, minted_on_chain)) => {
                metrics::record_mint("failed", 0, elapsed);
                if let Some(key) = key {
                    if minted_on_chain == 0 {
                        if let Err(e) = self.ledger.abandon_mint_request(key).await {
                            tracing::warn!(error = %e, "Failed to release idempotency key");
                        }
                    } else {
                        tracing::error!(
                            minted_on_chain,
                            error = %error,
                            "Tokens minted without ticket rows; closing the key so a retry cannot mint again"
                        );
                        let outcome = serde_json::json!({ "success": false, "unrecorded": minted_on_chain });
                        if let Err(e) = self.ledger.complete_mint_request(key, outcome).await {
                            tracing::warn!(error = %e, "Failed to store mint outcome");
                        }
                        return Err(RelayerError::Unrecorded {
                            minted: minted_on_chain,
                        });
                    }
                }
                Err(error)
            },
        }
    }

    async fn admit(&self, request: &MintRequest) -> Result<Admitted, RelayerError> {
        let relayer = self.chain.account().ok_or(RelayerError::NotConfigured)?;
        let token = self
            .settings
            .contracts
            .token
            .map(TokenContract::new)
            .ok_or(RelayerError::NotConfigured)?;

        let wallet = request
            .user_address
            .as_deref()
            .ok_or(ValidationError::InvalidAddress)
            .and_then(WalletAddress::parse)?;
        let quantity = validate_quantity(request.quantity.unwrap_or(1))?;
        let method = request.payment_method.unwrap_or(PaymentMethod::Crypto);

        if let Some(key) = &request.idempotency_key {
            if !IDEMPOTENCY_KEY_LENGTH.contains(&key.len()) {
                return Err(RelayerError::InvalidIdempotencyKey);
            }
        }

        let event_id: EventId = request
            .event_id
            .as_deref()
            .and_then(|id| id.parse().ok())
            .ok_or(RelayerError::EventNotFound)?;
        let event = self
            .ledger
            .get_event(event_id)
            .await?
            .ok_or(RelayerError::EventNotFound)?;

        Ok(Admitted {
            relayer,
            token,
            wallet,
            method,
            quantity,
            event,
        })
    }

    /// Runs the mint once the key is held. The error side carries how many
    /// tokens reached the chain so the caller knows whether the key may be released.
    async fn mint_claimed(&self, admitted: &Admitted) -> Result<MintResponse, (RelayerError, u32)> {
        let event = &admitted.event;
        let quantity = admitted.quantity;

        match self.ledger.reserve_capacity(event.id, quantity).await {
            Ok(true) => {},
            Ok(false) => return Err((RelayerError::SoldOut, 0)),
            Err(e) => return Err((e.into(), 0)),
        }

        let prepared = self.prepare(admitted).await;
        let (user, purchase) = match prepared {
            Ok(prepared) => prepared,
            Err((error, purchase)) => {
                self.release(event.id, quantity).await;
                if let Some(purchase) = purchase {
                    self.close_purchase(purchase, PurchaseStatus::Failed, None, None).await;
                }
                return Err((error, 0));
            },
        };

        let progress = self.mint_units(admitted, &user).await;

        let unminted = quantity.saturating_sub(progress.minted_on_chain);
        if unminted > 0 {
            self.release(event.id, unminted).await;
        }

        let Some(first) = progress.tickets.first().cloned() else {
            self.close_purchase(purchase, PurchaseStatus::Failed, None, None).await;
            let error = progress
                .failure
                .unwrap_or_else(|| ChainError::Decode("no tokens minted".to_string()).into());
            return Err((error, progress.minted_on_chain));
        };

        self.close_purchase(purchase, PurchaseStatus::Completed, Some(first.id), Some(progress.gas_paid))
            .await;

        let balance_after = match self.chain.balance(&admitted.relayer).await {
            Ok(balance) => {
                metrics::record_relayer_balance(balance.as_wei());
                balance.to_eth_string()
            },
            Err(e) => {
                tracing::warn!(error = %e, "Could not read relayer balance after minting");
                String::new()
            },
        };

        let warning = progress.failure.map(|e| {
            format!(
                "Minted {} of {quantity} tickets: {e}",
                progress.tickets.len()
            )
        });
        if let Some(warning) = &warning {
            tracing::warn!(%warning, "Partial mint");
        }

        tracing::info!(
            token_id = %first.token_id,
            tx_hash = %first.transaction_hash,
            minted = progress.tickets.len(),
            "Tickets minted"
        );

        Ok(MintResponse {
            success: true,
            transaction_hash: first.transaction_hash,
            token_id: first.token_id,
            ticket: first,
            user,
            tickets: progress.tickets,
            estimated_gas_cost: EthAmount::from_wei(progress.gas_paid).to_eth_string(),
            relayer_balance: balance_after,
            warning,
        })
    }

    /// User upsert, pending purchase and balance floor.
    async fn prepare(&self, admitted: &Admitted) -> Result<(User, PurchaseId), (RelayerError, Option<PurchaseId>)> {
        let user = self
            .ledger
            .upsert_user(NewUser::for_wallet(admitted.wallet, admitted.method.implied_login_method()))
            .await
            .map_err(|e| (e.into(), None))?;

        let amount_usd = PurchaseSummary::compute(admitted.event.price_usd, admitted.event.price_eth, admitted.quantity)
            .map(|summary| summary.subtotal_usd);
        let purchase = self
            .ledger
            .create_purchase(NewPurchase {
                user_id: user.id,
                event_id: admitted.event.id,
                payment_method: admitted.method,
                quantity: admitted.quantity,
                amount_usd,
            })
            .await
            .map_err(|e| (e.into(), None))?
            .id;

        let balance = self
            .chain
            .balance(&admitted.relayer)
            .await
            .map_err(|e| (e.into(), Some(purchase)))?;
        metrics::record_relayer_balance(balance.as_wei());
        if balance < self.settings.min_balance {
            tracing::warn!(
                balance = %balance.to_eth_string(),
                floor = %self.settings.min_balance.to_eth_string(),
                "Relayer balance below floor"
            );
            return Err((RelayerError::InsufficientBalance { balance }, Some(purchase)));
        }

        Ok((user, purchase))
    }

    async fn mint_units(&self, admitted: &Admitted, user: &User) -> MintProgress {
        let mut progress = MintProgress::default();
        let marketplace = self.settings.contracts.marketplace.map(MarketplaceContract::new);

        for unit in 0..admitted.quantity {
            let receipt = {
                let _guard = self.send_lock.lock().await;
                match self.mint_one(admitted).await {
                    Ok(receipt) => receipt,
                    Err(e) => {
                        tracing::warn!(unit, error = %e, "Mint failed");
                        progress.failure = Some(e);
                        break;
                    },
                }
            };
            progress.minted_on_chain += 1;
            progress.gas_paid = progress.gas_paid.saturating_add(receipt.gas_cost().as_wei());

            let Some(token_id) = receipt.minted_token_ids(admitted.token.address).first().copied() else {
                progress.failure = Some(RelayerError::TokenNotEmitted(receipt.transaction_hash));
                break;
            };

            let ticket = self
                .ledger
                .insert_ticket(NewTicket {
                    event_id: admitted.event.id,
                    owner_id: user.id,
                    token_id,
                    transaction_hash: receipt.transaction_hash,
                    purchase_price_usd: Some(admitted.event.price_usd),
                    purchase_price_eth: Some(admitted.event.price_eth),
                    payment_method: admitted.method.ticket_label().to_string(),
                    metadata_uri: Some(self.settings.metadata_uri.clone()),
                })
                .await;
            match ticket {
                Ok(ticket) => progress.tickets.push(ticket),
                Err(e) => {
                    tracing::error!(
                        token_id = %token_id,
                        tx_hash = %receipt.transaction_hash,
                        error = %e,
                        "Minted token could not be recorded"
                    );
                    progress.failure = Some(e.into());
                    break;
                },
            }

            if let Some(marketplace) = marketplace {
                self.set_base_price(marketplace, admitted, token_id).await;
            }
        }
        progress
    }

    async fn mint_one(&self, admitted: &Admitted) -> Result<TxReceipt, RelayerError> {
        let call = admitted.token.mint(&admitted.wallet, &self.settings.metadata_uri);
        let estimate = self
            .chain
            .estimate_gas(&call)
            .await
            .map_err(|e| RelayerError::GasEstimation(e.to_string()))?;
        let gas_limit = estimate.saturating_add(self.settings.gas_buffer);
        tracing::debug!(estimate, gas_limit, "Submitting mint");
        Ok(send_and_confirm(self.chain.as_ref(), &call, Some(gas_limit), self.settings.confirmation_timeout).await?)
    }

    /// Base price for the marketplace's resale cap. Failure leaves the ticket
    /// to the backfill job.
    async fn set_base_price(&self, marketplace: MarketplaceContract, admitted: &Admitted, token_id: TokenId) {
        let price = admitted.event.price_eth;
        if price.is_zero() {
            return;
        }
        let call = marketplace.set_initial_price(admitted.token.address, token_id, price);
        let _guard = self.send_lock.lock().await;
        match send_and_confirm(self.chain.as_ref(), &call, None, self.settings.confirmation_timeout).await {
            Ok(_) => tracing::debug!(token_id = %token_id, "Base price set"),
            Err(e) => tracing::warn!(token_id = %token_id, error = %e, "Failed to set base price"),
        }
    }

    async fn release(&self, event: EventId, quantity: u32) {
        if let Err(e) = self.ledger.release_capacity(event, quantity).await {
            tracing::error!(event_id = %event, quantity, error = %e, "Failed to release capacity");
        }
    }

    async fn close_purchase(
        &self,
        purchase: PurchaseId,
        status: PurchaseStatus,
        ticket: Option<TicketId>,
        gas_paid: Option<u128>,
    ) {
        if let Err(e) = self.ledger.update_purchase(purchase, status, ticket, gas_paid).await {
            tracing::warn!(purchase_id = %purchase, error = %e, "Failed to update purchase record");
        }
    }

    /// Balance, gas price and how many mints the balance still covers.
    ///
    /// # Errors
    ///
    /// [`RelayerError::NotConfigured`] without an account, chain errors otherwise.
    pub async fn status(&self) -> Result<RelayerStatus, RelayerError> {
        let address = self.chain.account().ok_or(RelayerError::NotConfigured)?;
        let balance = self.chain.balance(&address).await?;
        let gas_price = self.chain.gas_price().await?;
        metrics::record_relayer_balance(balance.as_wei());

        let cost_per_mint = gas_price.saturating_mul(STATUS_GAS_PER_MINT);
        let estimated_mints_remaining = balance.as_wei().checked_div(cost_per_mint).unwrap_or(0);

        Ok(RelayerStatus {
            address,
            balance_eth: balance.to_eth_string(),
            gas_price_gwei: format_gwei(gas_price),
            cost_per_mint_eth: EthAmount::from_wei(cost_per_mint).to_eth_string(),
            estimated_mints_remaining,
            low_balance: balance.as_wei() < LOW_BALANCE_WEI,
            contracts: self.settings.contracts,
        })
    }
}

fn format_gwei(wei: u128) -> String {
    const GWEI: u128 = 1_000_000_000;
    let whole = wei / GWEI;
    let fraction = wei % GWEI;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{fraction:09}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

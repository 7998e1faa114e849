//! Chain and ledger reconciliation.
//!
//! Two maintenance jobs, both safe to re-run:
//!
//! - [`Reconciler::backfill_base_prices`] tells the marketplace the base price
//!   of every ticket it does not know yet, so the resale cap holds on-chain
//!   for tickets minted while that notification failed.
//! - [`Reconciler::drift_report`] compares the token contract's mints with the
//!   ticket rows.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use ticketmint_core::abi;
use ticketmint_core::chain::{ChainError, ChainGateway, ContractAddresses, send_and_confirm};
use ticketmint_core::ledger::{LedgerError, LedgerStore};
use ticketmint_core::models::{Event, Ticket};
use ticketmint_core::types::{EthAmount, EventId, TokenId};

/// Reconciliation failures that stop a job.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Token or marketplace address missing
    #[error("Marketplace or NFT address not configured")]
    NotConfigured,

    /// Record store failure
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Node failure
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Outcome of a base-price backfill.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Prices written
    pub updated: usize,
    /// Tickets the marketplace already knew, or with no price to write
    pub skipped: usize,
    /// Reads or writes that failed
    pub failed: usize,
}

/// Differences between on-chain mints and ticket rows.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    /// Tokens minted by the contract
    pub minted_on_chain: usize,
    /// Ticket rows
    pub recorded: usize,
    /// Minted with no ticket row
    pub unrecorded: Vec<TokenId>,
    /// Ticket rows whose token was never minted
    pub phantom: Vec<TokenId>,
}

impl DriftReport {
    /// Whether chain and ledger agree
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.unrecorded.is_empty() && self.phantom.is_empty()
    }
}

/// Runs reconciliation jobs from the relayer account.
#[derive(Clone)]
pub struct Reconciler {
    chain: Arc<dyn ChainGateway>,
    ledger: Arc<dyn LedgerStore>,
    contracts: ContractAddresses,
    confirmation_timeout: Duration,
    from_block: u64,
}

impl Reconciler {
    /// Creates a reconciler over the given gateway and ledger.
    #[must_use]
    pub fn new(
        chain: Arc<dyn ChainGateway>,
        ledger: Arc<dyn LedgerStore>,
        contracts: ContractAddresses,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            chain,
            ledger,
            contracts,
            confirmation_timeout,
            from_block: 0,
        }
    }

    /// First block scanned for mints
    #[must_use]
    pub const fn with_from_block(mut self, block: u64) -> Self {
        self.from_block = block;
        self
    }

    /// Writes the base price of every ticket the marketplace reports as zero.
    ///
    /// The ticket's own purchase price is used, else its event's price.
    /// Individual failures are counted, not returned.
    ///
    /// # Errors
    ///
    /// Fails when the contracts are not configured or tickets cannot be listed.
    pub async fn backfill_base_prices(&self) -> Result<BackfillReport, ReconcileError> {
        let (token, marketplace) = self.contracts.both().ok_or(ReconcileError::NotConfigured)?;
        let tickets = self.ledger.list_tickets().await?;
        tracing::info!(tickets = tickets.len(), "Backfilling marketplace base prices");

        let mut events: HashMap<EventId, Option<Event>> = HashMap::new();
        let mut report = BackfillReport::default();

        for ticket in tickets {
            let known = match self
                .chain
                .call(&marketplace.last_price_paid(token.address, ticket.token_id))
                .await
            {
                Ok(raw) => abi::decode_uint(&raw, 0).unwrap_or_default(),
                Err(e) => {
                    tracing::warn!(token_id = %ticket.token_id, error = %e, "Failed to read base price");
                    report.failed += 1;
                    continue;
                },
            };
            if !known.is_zero() {
                report.skipped += 1;
                continue;
            }

            let Some(price) = self.base_price(&ticket, &mut events).await else {
                tracing::debug!(token_id = %ticket.token_id, "No price to backfill");
                report.skipped += 1;
                continue;
            };

            let call = marketplace.set_initial_price(token.address, ticket.token_id, price);
            match send_and_confirm(self.chain.as_ref(), &call, None, self.confirmation_timeout).await {
                Ok(receipt) => {
                    tracing::info!(token_id = %ticket.token_id, %price, tx_hash = %receipt.transaction_hash, "Base price set");
                    report.updated += 1;
                },
                Err(e) => {
                    tracing::warn!(token_id = %ticket.token_id, error = %e, "Failed to set base price");
                    report.failed += 1;
                },
            }
        }

        tracing::info!(
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failed,
            "Base price backfill finished"
        );
        Ok(report)
    }

    async fn base_price(&self, ticket: &Ticket, events: &mut HashMap<EventId, Option<Event>>) -> Option<EthAmount> {
        if let Some(price) = ticket.purchase_price_eth.filter(|price| !price.is_zero()) {
            return Some(price);
        }
        if !events.contains_key(&ticket.event_id) {
            let event = self.ledger.get_event(ticket.event_id).await.unwrap_or_else(|e| {
                tracing::warn!(event_id = %ticket.event_id, error = %e, "Failed to load event");
                None
            });
            events.insert(ticket.event_id, event);
        }
        events
            .get(&ticket.event_id)
            .and_then(Option::as_ref)
            .map(|event| event.price_eth)
            .filter(|price| !price.is_zero())
    }

    /// Compares mints of the token contract with ticket rows.
    ///
    /// # Errors
    ///
    /// Fails when the token contract is not configured, logs cannot be read,
    /// or tickets cannot be listed.
    pub async fn drift_report(&self) -> Result<DriftReport, ReconcileError> {
        let token = self.contracts.token.ok_or(ReconcileError::NotConfigured)?;
        let minted: BTreeSet<TokenId> = self
            .chain
            .transfer_logs(token, self.from_block)
            .await?
            .into_iter()
            .filter(|log| log.is_mint())
            .map(|log| log.token_id)
            .collect();
        let recorded: BTreeSet<TokenId> = self
            .ledger
            .list_tickets()
            .await?
            .into_iter()
            .map(|ticket| ticket.token_id)
            .collect();

        let report = DriftReport {
            minted_on_chain: minted.len(),
            recorded: recorded.len(),
            unrecorded: minted.difference(&recorded).copied().collect(),
            phantom: recorded.difference(&minted).copied().collect(),
        };
        if report.is_clean() {
            tracing::info!(tokens = report.minted_on_chain, "Chain and ledger agree");
        } else {
            tracing::warn!(
                unrecorded = report.unrecorded.len(),
                phantom = report.phantom.len(),
                "Chain and ledger disagree"
            );
        }
        Ok(report)
    }
}

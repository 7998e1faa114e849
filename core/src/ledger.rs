//! Ledger record store seam.
//!
//! The relational store is the system of record for everything that is not
//! on-chain. Every write that must be atomic with another is a single trait
//! method, so implementations can wrap it in one database transaction.

use crate::entry_pass::EntryPass;
use crate::models::{
    Event, Listing, NewEvent, NewListing, NewPurchase, NewTicket, NewUser, PurchaseRecord,
    ResaleSettlement, Ticket, TicketWithEvent, User,
};
use crate::types::{
    EventId, PurchaseId, PurchaseStatus, TicketId, TokenId, UserId, WalletAddress,
};
use alloy_primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Ledger failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Referenced row does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Uniqueness or state guard violated
    #[error("{0}")]
    Conflict(String),

    /// Backend failure
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// State of an idempotency key when a mint request claims it.
#[derive(Debug, Clone, PartialEq)]
pub enum MintClaim {
    /// Key unseen; the caller now owns it
    Claimed,
    /// Another request holds the key and has not finished
    InFlight,
    /// A previous request finished; its response is replayed
    Completed(Value),
    /// The key belongs to a request with a different body
    Mismatch,
}

/// Outcome of presenting an entry pass at the door.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntryCheck {
    /// First use within the validity window
    Accepted {
        /// The consumed pass
        pass: EntryPass,
    },
    /// Presented after expiry
    Expired,
    /// This pass or another for the same ticket was already admitted
    AlreadyUsed,
    /// Superseded by a newer pass, or the ticket changed hands
    Revoked,
    /// Never issued
    Unknown,
}

impl EntryCheck {
    /// Metric / log label
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::Expired => "expired",
            Self::AlreadyUsed => "already_used",
            Self::Revoked => "revoked",
            Self::Unknown => "unknown",
        }
    }
}

/// Outcome of settling a resale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Listing flipped to sold and the ticket changed hands
    Settled,
    /// No active listing matched; nothing was written
    NotActive,
}

/// Record store operations.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Connectivity check
    async fn ping(&self) -> LedgerResult<()>;

    // ---- users ----

    /// Inserts or updates the user keyed by wallet address
    async fn upsert_user(&self, user: NewUser) -> LedgerResult<User>;

    /// Looks a user up by wallet address
    async fn find_user_by_wallet(&self, wallet: &WalletAddress) -> LedgerResult<Option<User>>;

    /// Looks a user up by id
    async fn get_user(&self, id: UserId) -> LedgerResult<Option<User>>;

    // ---- events ----

    /// All events, earliest date first
    async fn list_events(&self) -> LedgerResult<Vec<Event>>;

    /// One event
    async fn get_event(&self, id: EventId) -> LedgerResult<Option<Event>>;

    /// Creates an event with zero tickets sold
    async fn create_event(&self, event: NewEvent) -> LedgerResult<Event>;

    /// Atomically adds `quantity` to `sold_tickets` unless that would exceed
    /// capacity. Returns `false` when the event cannot fit the request.
    async fn reserve_capacity(&self, event: EventId, quantity: u32) -> LedgerResult<bool>;

    /// Returns previously reserved capacity
    async fn release_capacity(&self, event: EventId, quantity: u32) -> LedgerResult<()>;

    // ---- tickets ----

    /// Inserts a minted ticket; token ids are unique
    async fn insert_ticket(&self, ticket: NewTicket) -> LedgerResult<Ticket>;

    /// One ticket
    async fn get_ticket(&self, id: TicketId) -> LedgerResult<Option<Ticket>>;

    /// Ticket by token id
    async fn find_ticket_by_token(&self, token: TokenId) -> LedgerResult<Option<Ticket>>;

    /// Tickets owned by a user, newest first, with their events
    async fn tickets_for_owner(&self, owner: UserId) -> LedgerResult<Vec<TicketWithEvent>>;

    /// Every ticket, by token id
    async fn list_tickets(&self) -> LedgerResult<Vec<Ticket>>;

    // ---- purchase history ----

    /// Opens a pending purchase record
    async fn create_purchase(&self, purchase: NewPurchase) -> LedgerResult<PurchaseRecord>;

    /// Settles a purchase record
    async fn update_purchase(
        &self,
        id: PurchaseId,
        status: PurchaseStatus,
        ticket: Option<TicketId>,
        gas_cost_wei: Option<u128>,
    ) -> LedgerResult<()>;

    /// A user's purchases, newest first
    async fn purchases_for_user(&self, user: UserId) -> LedgerResult<Vec<PurchaseRecord>>;

    // ---- marketplace ----

    /// Opens a listing. Fails with [`LedgerError::Conflict`] when the token
    /// already has an active listing.
    async fn create_listing(&self, listing: NewListing) -> LedgerResult<Listing>;

    /// Active listings for an event, newest first
    async fn active_listings_for_event(&self, event: EventId) -> LedgerResult<Vec<Listing>>;

    /// Active listing for a token, if any
    async fn active_listing_for_token(&self, nft: Address, token: TokenId) -> LedgerResult<Option<Listing>>;

    /// Cancels the active listing for a token. Returns whether one matched.
    async fn cancel_listing(&self, nft: Address, token: TokenId) -> LedgerResult<bool>;

    /// In one transaction: locks the active listing for the token, checks it
    /// lists `settlement.ticket_id` at `settlement.new_price_eth`, flips it to
    /// sold and moves the ticket to the buyer at the listed price. A listing
    /// that does not match fails with [`LedgerError::Conflict`].
    async fn settle_resale(&self, settlement: ResaleSettlement) -> LedgerResult<SettleOutcome>;

    // ---- idempotency ----

    /// Claims a mint idempotency key for the request identified by
    /// `fingerprint`. An unfinished claim older than `stale_after` is taken
    /// over by a request with the same fingerprint.
    async fn begin_mint_request(
        &self,
        key: &str,
        fingerprint: &str,
        stale_after: Duration,
    ) -> LedgerResult<MintClaim>;

    /// Stores the response for a claimed key
    async fn complete_mint_request(&self, key: &str, response: Value) -> LedgerResult<()>;

    /// Releases a claimed key so the request may be retried
    async fn abandon_mint_request(&self, key: &str) -> LedgerResult<()>;

    // ---- entry passes ----

    /// Records an issued pass and voids the ticket's earlier unconsumed
    /// passes. Fails with [`LedgerError::Conflict`] once the ticket has been
    /// admitted.
    async fn record_entry_pass(&self, pass: &EntryPass) -> LedgerResult<()>;

    /// Consumes a pass by session id. At most one pass per ticket is ever
    /// accepted, and only while its holder still owns the ticket.
    async fn consume_entry_pass(&self, session_id: &str, now: DateTime<Utc>) -> LedgerResult<EntryCheck>;
}

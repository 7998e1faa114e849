//! In-memory ledger for fast, deterministic tests.
//!
//! Every trait method takes one write lock, which gives the same atomicity the
//! Postgres implementation gets from transactions and conditional updates.

#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

use alloy_primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use ticketmint_core::entry_pass::EntryPass;
use ticketmint_core::ledger::{
    EntryCheck, LedgerError, LedgerResult, LedgerStore, MintClaim, SettleOutcome,
};
use ticketmint_core::models::{
    Event, Listing, NewEvent, NewListing, NewPurchase, NewTicket, NewUser, PurchaseRecord,
    ResaleSettlement, Ticket, TicketWithEvent, User,
};
use ticketmint_core::types::{
    EthAmount, EventId, ListingId, ListingStatus, PurchaseId, PurchaseStatus, TicketId, TokenId,
    UserId, WalletAddress,
};

#[derive(Debug, Default)]
struct LedgerData {
    users: Vec<User>,
    events: Vec<Event>,
    tickets: Vec<Ticket>,
    purchases: Vec<PurchaseRecord>,
    listings: Vec<Listing>,
    mint_requests: HashMap<String, MintRequestRow>,
    passes: HashMap<String, PassRow>,
}

#[derive(Debug)]
struct MintRequestRow {
    fingerprint: String,
    claimed_at: DateTime<Utc>,
    response: Option<Value>,
}

#[derive(Debug)]
struct PassRow {
    pass: EntryPass,
    consumed: bool,
    voided: bool,
}

/// HashMap-backed [`LedgerStore`].
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    data: RwLock<LedgerData>,
    unavailable: AtomicBool,
}

impl InMemoryLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation fail with a storage error until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Inserts an event directly
    pub fn seed_event(&self, event: NewEvent) -> Event {
        let event = build_event(event);
        self.data.write().unwrap().events.push(event.clone());
        event
    }

    /// Number of ticket rows
    #[must_use]
    pub fn ticket_count(&self) -> usize {
        self.data.read().unwrap().tickets.len()
    }

    /// All ticket rows
    #[must_use]
    pub fn tickets(&self) -> Vec<Ticket> {
        self.data.read().unwrap().tickets.clone()
    }

    /// All purchase records
    #[must_use]
    pub fn purchases(&self) -> Vec<PurchaseRecord> {
        self.data.read().unwrap().purchases.clone()
    }

    /// All listings regardless of status
    #[must_use]
    pub fn listings(&self) -> Vec<Listing> {
        self.data.read().unwrap().listings.clone()
    }

    /// Current state of an event
    #[must_use]
    pub fn event(&self, id: EventId) -> Option<Event> {
        self.data.read().unwrap().events.iter().find(|e| e.id == id).cloned()
    }

    fn check_available(&self) -> LedgerResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(LedgerError::Storage("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

fn build_event(event: NewEvent) -> Event {
    let now = Utc::now();
    Event {
        id: EventId::new(),
        name: event.name,
        description: event.description,
        date: event.date,
        time: event.time,
        location: event.location,
        category: event.category,
        price_usd: event.price_usd,
        price_eth: event.price_eth,
        image_url: event.image_url,
        total_tickets: event.total_tickets,
        sold_tickets: 0,
        created_by: event.created_by,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn ping(&self) -> LedgerResult<()> {
        self.check_available()
    }

    async fn upsert_user(&self, user: NewUser) -> LedgerResult<User> {
        self.check_available()?;
        let mut data = self.data.write().unwrap();
        let now = Utc::now();
        let display_name = user.resolved_display_name();

        if let Some(existing) = data
            .users
            .iter_mut()
            .find(|u| u.wallet_address == user.wallet_address)
        {
            existing.email = user.email.or(existing.email.take());
            existing.phone = user.phone.or(existing.phone.take());
            existing.login_method = user.login_method;
            if user.display_name.is_some() || existing.display_name.is_none() {
                existing.display_name = Some(display_name);
            }
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let created = User {
            id: UserId::new(),
            wallet_address: user.wallet_address,
            email: user.email,
            phone: user.phone,
            login_method: user.login_method,
            display_name: Some(display_name),
            created_at: now,
            updated_at: now,
        };
        data.users.push(created.clone());
        Ok(created)
    }

    async fn find_user_by_wallet(&self, wallet: &WalletAddress) -> LedgerResult<Option<User>> {
        self.check_available()?;
        let data = self.data.read().unwrap();
        Ok(data.users.iter().find(|u| &u.wallet_address == wallet).cloned())
    }

    async fn get_user(&self, id: UserId) -> LedgerResult<Option<User>> {
        self.check_available()?;
        Ok(self.data.read().unwrap().users.iter().find(|u| u.id == id).cloned())
    }

    async fn list_events(&self) -> LedgerResult<Vec<Event>> {
        self.check_available()?;
        let mut events = self.data.read().unwrap().events.clone();
        events.sort_by_key(|e| e.date);
        Ok(events)
    }

    async fn get_event(&self, id: EventId) -> LedgerResult<Option<Event>> {
        self.check_available()?;
        Ok(self.event(id))
    }

    async fn create_event(&self, event: NewEvent) -> LedgerResult<Event> {
        self.check_available()?;
        Ok(self.seed_event(event))
    }

    async fn reserve_capacity(&self, event: EventId, quantity: u32) -> LedgerResult<bool> {
        self.check_available()?;
        let mut data = self.data.write().unwrap();
        let row = data
            .events
            .iter_mut()
            .find(|e| e.id == event)
            .ok_or_else(|| LedgerError::NotFound("Event".to_string()))?;
        match row.sold_tickets.checked_add(quantity) {
            Some(sold) if sold <= row.total_tickets => {
                row.sold_tickets = sold;
                row.updated_at = Utc::now();
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn release_capacity(&self, event: EventId, quantity: u32) -> LedgerResult<()> {
        self.check_available()?;
        let mut data = self.data.write().unwrap();
        if let Some(row) = data.events.iter_mut().find(|e| e.id == event) {
            row.sold_tickets = row.sold_tickets.saturating_sub(quantity);
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_ticket(&self, ticket: NewTicket) -> LedgerResult<Ticket> {
        self.check_available()?;
        let mut data = self.data.write().unwrap();
        if data.tickets.iter().any(|t| t.token_id == ticket.token_id) {
            return Err(LedgerError::Conflict(format!(
                "Ticket for token {} already exists",
                ticket.token_id
            )));
        }
        let row = Ticket {
            id: TicketId::new(),
            event_id: ticket.event_id,
            owner_id: ticket.owner_id,
            token_id: ticket.token_id,
            transaction_hash: ticket.transaction_hash,
            purchase_price_usd: ticket.purchase_price_usd,
            purchase_price_eth: ticket.purchase_price_eth,
            last_purchase_price_eth: None,
            payment_method: ticket.payment_method,
            metadata_uri: ticket.metadata_uri,
            purchased_at: Utc::now(),
        };
        data.tickets.push(row.clone());
        Ok(row)
    }

    async fn get_ticket(&self, id: TicketId) -> LedgerResult<Option<Ticket>> {
        self.check_available()?;
        Ok(self.data.read().unwrap().tickets.iter().find(|t| t.id == id).cloned())
    }

    async fn find_ticket_by_token(&self, token: TokenId) -> LedgerResult<Option<Ticket>> {
        self.check_available()?;
        Ok(self
            .data
            .read()
            .unwrap()
            .tickets
            .iter()
            .find(|t| t.token_id == token)
            .cloned())
    }

    async fn tickets_for_owner(&self, owner: UserId) -> LedgerResult<Vec<TicketWithEvent>> {
        self.check_available()?;
        let data = self.data.read().unwrap();
        let mut owned: Vec<TicketWithEvent> = data
            .tickets
            .iter()
            .filter(|t| t.owner_id == owner)
            .map(|t| TicketWithEvent {
                ticket: t.clone(),
                event: data.events.iter().find(|e| e.id == t.event_id).cloned(),
            })
            .collect();
        owned.sort_by(|a, b| b.ticket.purchased_at.cmp(&a.ticket.purchased_at));
        Ok(owned)
    }

    async fn list_tickets(&self) -> LedgerResult<Vec<Ticket>> {
        self.check_available()?;
        let mut tickets = self.data.read().unwrap().tickets.clone();
        tickets.sort_by_key(|t| t.token_id);
        Ok(tickets)
    }

    async fn create_purchase(&self, purchase: NewPurchase) -> LedgerResult<PurchaseRecord> {
        self.check_available()?;
        let record = PurchaseRecord {
            id: PurchaseId::new(),
            user_id: purchase.user_id,
            event_id: purchase.event_id,
            ticket_id: None,
            payment_method: purchase.payment_method,
            quantity: purchase.quantity,
            amount_usd: purchase.amount_usd,
            gas_cost_eth: None,
            status: PurchaseStatus::Pending,
            created_at: Utc::now(),
        };
        self.data.write().unwrap().purchases.push(record.clone());
        Ok(record)
    }

    async fn update_purchase(
        &self,
        id: PurchaseId,
        status: PurchaseStatus,
        ticket: Option<TicketId>,
        gas_cost_wei: Option<u128>,
    ) -> LedgerResult<()> {
        self.check_available()?;
        let mut data = self.data.write().unwrap();
        let record = data
            .purchases
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| LedgerError::NotFound("Purchase".to_string()))?;
        record.status = status;
        if ticket.is_some() {
            record.ticket_id = ticket;
        }
        if let Some(wei) = gas_cost_wei {
            record.gas_cost_eth = Some(EthAmount::from_wei(wei));
        }
        Ok(())
    }

    async fn purchases_for_user(&self, user: UserId) -> LedgerResult<Vec<PurchaseRecord>> {
        self.check_available()?;
        let mut records: Vec<PurchaseRecord> = self
            .data
            .read()
            .unwrap()
            .purchases
            .iter()
            .filter(|p| p.user_id == user)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn create_listing(&self, listing: NewListing) -> LedgerResult<Listing> {
        self.check_available()?;
        let mut data = self.data.write().unwrap();
        let duplicate = data.listings.iter().any(|l| {
            l.status == ListingStatus::Active
                && l.nft_address == listing.nft_address
                && l.token_id == listing.token_id
        });
        if duplicate {
            return Err(LedgerError::Conflict(
                "Ticket already has an active listing".to_string(),
            ));
        }
        let now = Utc::now();
        let row = Listing {
            id: ListingId::new(),
            event_id: listing.event_id,
            ticket_id: listing.ticket_id,
            nft_address: listing.nft_address,
            token_id: listing.token_id,
            seller_id: listing.seller_id,
            price_eth: listing.price_eth,
            status: ListingStatus::Active,
            tx_hash: listing.tx_hash,
            created_at: now,
            updated_at: now,
        };
        data.listings.push(row.clone());
        Ok(row)
    }

    async fn active_listings_for_event(&self, event: EventId) -> LedgerResult<Vec<Listing>> {
        self.check_available()?;
        let mut active: Vec<Listing> = self
            .data
            .read()
            .unwrap()
            .listings
            .iter()
            .filter(|l| l.event_id == event && l.status == ListingStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }

    async fn active_listing_for_token(&self, nft: Address, token: TokenId) -> LedgerResult<Option<Listing>> {
        self.check_available()?;
        Ok(self
            .data
            .read()
            .unwrap()
            .listings
            .iter()
            .find(|l| l.nft_address == nft && l.token_id == token && l.status == ListingStatus::Active)
            .cloned())
    }

    async fn cancel_listing(&self, nft: Address, token: TokenId) -> LedgerResult<bool> {
        self.check_available()?;
        let mut data = self.data.write().unwrap();
        match data
            .listings
            .iter_mut()
            .find(|l| l.nft_address == nft && l.token_id == token && l.status == ListingStatus::Active)
        {
            Some(listing) => {
                listing.status = ListingStatus::Cancelled;
                listing.updated_at = Utc::now();
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn settle_resale(&self, settlement: ResaleSettlement) -> LedgerResult<SettleOutcome> {
        self.check_available()?;
        let mut data = self.data.write().unwrap();
        let now = Utc::now();

        let Some(index) = data.listings.iter().position(|l| {
            l.nft_address == settlement.nft_address
                && l.token_id == settlement.token_id
                && l.status == ListingStatus::Active
        }) else {
            return Ok(SettleOutcome::NotActive);
        };
        settlement.check_against(&data.listings[index])?;
        let (ticket_id, price) = (data.listings[index].ticket_id, data.listings[index].price_eth);

        let Some(ticket) = data.tickets.iter_mut().find(|t| t.id == ticket_id) else {
            return Err(LedgerError::NotFound("Ticket".to_string()));
        };
        ticket.owner_id = settlement.buyer_id;
        ticket.last_purchase_price_eth = Some(price);

        let listing = &mut data.listings[index];
        listing.status = ListingStatus::Sold;
        listing.tx_hash = Some(settlement.tx_hash);
        listing.updated_at = now;
        Ok(SettleOutcome::Settled)
    }

    async fn begin_mint_request(
        &self,
        key: &str,
        fingerprint: &str,
        stale_after: Duration,
    ) -> LedgerResult<MintClaim> {
        self.check_available()?;
        let mut data = self.data.write().unwrap();
        let now = Utc::now();
        let Some(row) = data.mint_requests.get_mut(key) else {
            data.mint_requests.insert(
                key.to_string(),
                MintRequestRow {
                    fingerprint: fingerprint.to_string(),
                    claimed_at: now,
                    response: None,
                },
            );
            return Ok(MintClaim::Claimed);
        };

        if row.fingerprint != fingerprint {
            return Ok(MintClaim::Mismatch);
        }
        if let Some(response) = &row.response {
            return Ok(MintClaim::Completed(response.clone()));
        }
        let stale = chrono::Duration::from_std(stale_after)
            .is_ok_and(|ttl| row.claimed_at + ttl <= now);
        if stale {
            row.claimed_at = now;
            return Ok(MintClaim::Claimed);
        }
        Ok(MintClaim::InFlight)
    }

    async fn complete_mint_request(&self, key: &str, response: Value) -> LedgerResult<()> {
        self.check_available()?;
        if let Some(row) = self.data.write().unwrap().mint_requests.get_mut(key) {
            row.response = Some(response);
        }
        Ok(())
    }

    async fn abandon_mint_request(&self, key: &str) -> LedgerResult<()> {
        self.check_available()?;
        let mut data = self.data.write().unwrap();
        if data.mint_requests.get(key).is_some_and(|row| row.response.is_none()) {
            data.mint_requests.remove(key);
        }
        Ok(())
    }

    async fn record_entry_pass(&self, pass: &EntryPass) -> LedgerResult<()> {
        self.check_available()?;
        let mut data = self.data.write().unwrap();
        if !data.tickets.iter().any(|t| t.id == pass.ticket_id) {
            return Err(LedgerError::NotFound("Ticket".to_string()));
        }
        if data.passes.contains_key(&pass.session_id) {
            return Err(LedgerError::Conflict("Entry pass session already exists".to_string()));
        }
        if data
            .passes
            .values()
            .any(|row| row.pass.ticket_id == pass.ticket_id && row.consumed)
        {
            return Err(LedgerError::Conflict("Ticket has already been used for entry".to_string()));
        }
        for row in data.passes.values_mut() {
            if row.pass.ticket_id == pass.ticket_id && !row.consumed {
                row.voided = true;
            }
        }
        data.passes.insert(
            pass.session_id.clone(),
            PassRow {
                pass: pass.clone(),
                consumed: false,
                voided: false,
            },
        );
        Ok(())
    }

    async fn consume_entry_pass(&self, session_id: &str, now: DateTime<Utc>) -> LedgerResult<EntryCheck> {
        self.check_available()?;
        let mut data = self.data.write().unwrap();
        let Some(row) = data.passes.get(session_id) else {
            return Ok(EntryCheck::Unknown);
        };
        if row.consumed {
            return Ok(EntryCheck::AlreadyUsed);
        }
        if row.voided {
            return Ok(EntryCheck::Revoked);
        }
        if row.pass.is_expired(now) {
            return Ok(EntryCheck::Expired);
        }
        let pass = row.pass.clone();

        let owner = data
            .tickets
            .iter()
            .find(|t| t.id == pass.ticket_id)
            .and_then(|t| data.users.iter().find(|u| u.id == t.owner_id))
            .map(|u| u.wallet_address);
        if owner != Some(pass.owner_address) {
            return Ok(EntryCheck::Revoked);
        }
        if data
            .passes
            .values()
            .any(|row| row.pass.ticket_id == pass.ticket_id && row.consumed)
        {
            return Ok(EntryCheck::AlreadyUsed);
        }

        if let Some(row) = data.passes.get_mut(session_id) {
            row.consumed = true;
        }
        Ok(EntryCheck::Accepted { pass })
    }
}

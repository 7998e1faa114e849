//! Persisted records.
//!
//! JSON field names follow the storefront's existing snake_case wire format.

use crate::ledger::LedgerError;
use crate::types::{
    EthAmount, EventId, ListingId, ListingStatus, LoginMethod, PaymentMethod, PurchaseId,
    PurchaseStatus, TicketId, TokenId, TxHash, UsdAmount, UserId, WalletAddress,
};
use alloy_primitives::Address;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A wallet-identified participant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Row id
    pub id: UserId,
    /// Unique, lower-cased
    pub wallet_address: WalletAddress,
    /// Email for custodial logins
    pub email: Option<String>,
    /// Phone for custodial logins
    pub phone: Option<String>,
    /// How the user authenticated most recently
    pub login_method: LoginMethod,
    /// Name shown in the dashboard
    pub display_name: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last upsert
    pub updated_at: DateTime<Utc>,
}

/// Upsert payload for a user, keyed by wallet address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    /// Key
    pub wallet_address: WalletAddress,
    /// Email
    pub email: Option<String>,
    /// Phone
    pub phone: Option<String>,
    /// Login method
    pub login_method: LoginMethod,
    /// Explicit display name
    pub display_name: Option<String>,
}

impl NewUser {
    /// Minimal user created on first contact
    #[must_use]
    pub const fn for_wallet(wallet_address: WalletAddress, login_method: LoginMethod) -> Self {
        Self {
            wallet_address,
            email: None,
            phone: None,
            login_method,
            display_name: None,
        }
    }

    /// Explicit name, else email, else the shortened wallet address
    #[must_use]
    pub fn resolved_display_name(&self) -> String {
        self.display_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| self.wallet_address.short())
    }
}

/// A ticketed happening.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Row id
    pub id: EventId,
    /// Title
    pub name: String,
    /// Long description
    pub description: Option<String>,
    /// Calendar date
    pub date: NaiveDate,
    /// Free-form start time, e.g. `19:30`
    pub time: Option<String>,
    /// Venue
    pub location: String,
    /// Category label
    pub category: Option<String>,
    /// Fiat price per ticket
    pub price_usd: UsdAmount,
    /// Native-currency price per ticket
    pub price_eth: EthAmount,
    /// Cover image
    pub image_url: Option<String>,
    /// Capacity
    pub total_tickets: u32,
    /// Minted so far
    pub sold_tickets: u32,
    /// Creator
    pub created_by: Option<UserId>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Tickets still available
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.total_tickets.saturating_sub(self.sold_tickets)
    }
}

/// Administrative create-event payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Title
    pub name: String,
    /// Long description
    #[serde(default)]
    pub description: Option<String>,
    /// Calendar date
    pub date: NaiveDate,
    /// Start time
    #[serde(default)]
    pub time: Option<String>,
    /// Venue
    pub location: String,
    /// Category label
    #[serde(default)]
    pub category: Option<String>,
    /// Fiat price
    pub price_usd: UsdAmount,
    /// Native-currency price
    pub price_eth: EthAmount,
    /// Cover image
    #[serde(default)]
    pub image_url: Option<String>,
    /// Capacity
    pub total_tickets: u32,
    /// Creator
    #[serde(default)]
    pub created_by: Option<UserId>,
}

/// One minted token owned by a user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Row id
    pub id: TicketId,
    /// Event the ticket admits to
    pub event_id: EventId,
    /// Current owner
    pub owner_id: UserId,
    /// Contract-assigned id
    pub token_id: TokenId,
    /// Mint transaction
    pub transaction_hash: TxHash,
    /// Fiat price paid at mint
    pub purchase_price_usd: Option<UsdAmount>,
    /// Native price paid at mint
    pub purchase_price_eth: Option<EthAmount>,
    /// Price paid at the most recent resale
    pub last_purchase_price_eth: Option<EthAmount>,
    /// `crypto` or `fiat`
    pub payment_method: String,
    /// Token metadata location
    pub metadata_uri: Option<String>,
    /// Mint time
    pub purchased_at: DateTime<Utc>,
}

/// Insert payload for a ticket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewTicket {
    /// Event
    pub event_id: EventId,
    /// Owner
    pub owner_id: UserId,
    /// Token
    pub token_id: TokenId,
    /// Mint transaction
    pub transaction_hash: TxHash,
    /// Fiat price
    pub purchase_price_usd: Option<UsdAmount>,
    /// Native price
    pub purchase_price_eth: Option<EthAmount>,
    /// `crypto` or `fiat`
    pub payment_method: String,
    /// Metadata location
    pub metadata_uri: Option<String>,
}

/// Ticket joined with its event, as shown in the dashboard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TicketWithEvent {
    /// Ticket row
    #[serde(flatten)]
    pub ticket: Ticket,
    /// Joined event
    pub event: Option<Event>,
}

/// Best-known price of a ticket: last resale price, else purchase price,
/// else the event's price, else zero. First present value wins.
#[must_use]
pub fn best_known_price(ticket: &Ticket, event: Option<&Event>) -> EthAmount {
    ticket
        .last_purchase_price_eth
        .or(ticket.purchase_price_eth)
        .or_else(|| event.map(|e| e.price_eth))
        .unwrap_or(EthAmount::ZERO)
}

/// An active or settled resale offer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Row id
    pub id: ListingId,
    /// Event
    pub event_id: EventId,
    /// Ticket row
    pub ticket_id: TicketId,
    /// Token contract
    pub nft_address: Address,
    /// Token
    pub token_id: TokenId,
    /// Seller
    pub seller_id: UserId,
    /// Asking price
    pub price_eth: EthAmount,
    /// Lifecycle state
    pub status: ListingStatus,
    /// Listing transaction, replaced by the sale transaction once sold
    pub tx_hash: Option<TxHash>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewListing {
    /// Event
    pub event_id: EventId,
    /// Ticket row
    pub ticket_id: TicketId,
    /// Token contract
    pub nft_address: Address,
    /// Token
    pub token_id: TokenId,
    /// Seller
    pub seller_id: UserId,
    /// Asking price
    pub price_eth: EthAmount,
    /// Listing transaction
    pub tx_hash: Option<TxHash>,
}

/// Settlement of a confirmed resale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResaleSettlement {
    /// Token contract
    pub nft_address: Address,
    /// Token
    pub token_id: TokenId,
    /// New owner
    pub buyer_id: UserId,
    /// Buy transaction
    pub tx_hash: TxHash,
    /// Ticket row changing hands
    pub ticket_id: TicketId,
    /// Price paid
    pub new_price_eth: EthAmount,
}

impl ResaleSettlement {
    /// Checks that `listing` is the one this settlement pays for.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Conflict`] when the listing is for another ticket or at
    /// another price.
    pub fn check_against(&self, listing: &Listing) -> Result<(), LedgerError> {
        if listing.ticket_id != self.ticket_id {
            return Err(LedgerError::Conflict(
                "Listing is for a different ticket".to_string(),
            ));
        }
        if listing.price_eth != self.new_price_eth {
            return Err(LedgerError::Conflict(format!(
                "Sale price {} ETH does not match the listed {} ETH",
                self.new_price_eth.to_eth_string(),
                listing.price_eth.to_eth_string()
            )));
        }
        Ok(())
    }
}

/// Audit row for a purchase attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    /// Row id
    pub id: PurchaseId,
    /// Buyer
    pub user_id: UserId,
    /// Event
    pub event_id: EventId,
    /// First ticket minted for this purchase
    pub ticket_id: Option<TicketId>,
    /// Method chosen at checkout
    pub payment_method: PaymentMethod,
    /// Tickets requested
    pub quantity: u32,
    /// Fiat total
    pub amount_usd: Option<UsdAmount>,
    /// Gas spent by the relayer
    pub gas_cost_eth: Option<EthAmount>,
    /// Lifecycle state
    pub status: PurchaseStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a purchase record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewPurchase {
    /// Buyer
    pub user_id: UserId,
    /// Event
    pub event_id: EventId,
    /// Method
    pub payment_method: PaymentMethod,
    /// Tickets requested
    pub quantity: u32,
    /// Fiat total
    pub amount_usd: Option<UsdAmount>,
}

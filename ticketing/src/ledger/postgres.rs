//! `PostgreSQL` ledger.
//!
//! Native amounts are stored as `NUMERIC(78, 0)` wei and cross the wire as
//! decimal text (`$n::NUMERIC` on the way in, `col::TEXT` on the way out), so
//! no precision is lost between `u128` and the database. Fiat amounts are
//! `BIGINT` cents.
//!
//! # Example
//!
//! ```no_run
//! use ticketmint::ledger::PostgresLedger;
//! use sqlx::PgPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = PgPool::connect("postgres://localhost/ticketmint").await?;
//! let ledger = PostgresLedger::new(pool);
//! ledger.migrate().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::DatabaseConfig;
use alloy_primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use std::time::Duration;
use ticketmint_core::entry_pass::EntryPass;
use ticketmint_core::ledger::{
    EntryCheck, LedgerError, LedgerResult, LedgerStore, MintClaim, SettleOutcome,
};
use ticketmint_core::models::{
    Event, Listing, NewEvent, NewListing, NewPurchase, NewTicket, NewUser, PurchaseRecord,
    ResaleSettlement, Ticket, TicketWithEvent, User,
};
use ticketmint_core::types::{
    EthAmount, EventId, ListingId, ListingStatus, LoginMethod, PaymentMethod, PurchaseId,
    PurchaseStatus, TicketId, TokenId, TxHash, UsdAmount, UserId, WalletAddress,
};
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, wallet_address, email, phone, login_method, display_name, created_at, updated_at";

const EVENT_COLUMNS: &str = "id, name, description, date, time, location, category, \
     price_usd_cents, price_eth::TEXT AS price_eth, image_url, total_tickets, sold_tickets, \
     created_by, created_at, updated_at";

const TICKET_COLUMNS: &str = "id, event_id, owner_id, token_id, transaction_hash, \
     purchase_price_usd_cents, purchase_price_eth::TEXT AS purchase_price_eth, \
     last_purchase_price_eth::TEXT AS last_purchase_price_eth, payment_method, metadata_uri, \
     purchased_at";

const PURCHASE_COLUMNS: &str = "id, user_id, event_id, ticket_id, payment_method, quantity, \
     amount_usd_cents, gas_cost_eth::TEXT AS gas_cost_eth, status, created_at";

const LISTING_COLUMNS: &str = "id, event_id, ticket_id, nft_address, token_id, seller_id, \
     price_eth::TEXT AS price_eth, status, tx_hash, created_at, updated_at";

/// `PostgreSQL` [`LedgerStore`].
#[derive(Clone, Debug)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool sized from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the database cannot be reached.
    pub async fn connect(config: &DatabaseConfig) -> LedgerResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .connect(&config.url)
            .await
            .map_err(|e| LedgerError::Storage(format!("Failed to connect to database: {e}")))?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns error if migrations fail.
    pub async fn migrate(&self) -> LedgerResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn events_by_ids(&self, ids: &[Uuid]) -> LedgerResult<Vec<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ANY($1)");
        sqlx::query_as::<_, EventRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage("load events", &e))?
            .into_iter()
            .map(Event::try_from)
            .collect()
    }
}

fn storage(action: &str, e: &sqlx::Error) -> LedgerError {
    LedgerError::Storage(format!("Failed to {action}: {e}"))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn corrupt(what: &str, detail: impl std::fmt::Display) -> LedgerError {
    LedgerError::Storage(format!("Corrupt {what} row: {detail}"))
}

// ============================================================================
// Column conversions
// ============================================================================

fn wei_text(amount: EthAmount) -> String {
    amount.as_wei().to_string()
}

fn parse_wei(raw: &str) -> LedgerResult<EthAmount> {
    raw.parse::<u128>()
        .map(EthAmount::from_wei)
        .map_err(|e| corrupt("amount", format!("{raw}: {e}")))
}

fn parse_optional_wei(raw: Option<&str>) -> LedgerResult<Option<EthAmount>> {
    raw.map(parse_wei).transpose()
}

fn address_text(address: &Address) -> String {
    address.to_string().to_lowercase()
}

fn token_param(token: TokenId) -> LedgerResult<i64> {
    i64::try_from(token.value()).map_err(|_| LedgerError::Conflict(format!("Token id {token} is out of range")))
}

fn count_param(count: u32) -> LedgerResult<i32> {
    i32::try_from(count).map_err(|_| LedgerError::Conflict(format!("Count {count} is out of range")))
}

fn parse_count(what: &str, raw: i32) -> LedgerResult<u32> {
    u32::try_from(raw).map_err(|e| corrupt(what, e))
}

fn parse_token(raw: i64) -> LedgerResult<TokenId> {
    u64::try_from(raw).map(TokenId::new).map_err(|e| corrupt("token", e))
}

// ============================================================================
// Rows
// ============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    wallet_address: String,
    email: Option<String>,
    phone: Option<String>,
    login_method: String,
    display_name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = LedgerError;

    fn try_from(row: UserRow) -> LedgerResult<Self> {
        Ok(Self {
            id: UserId::from_uuid(row.id),
            wallet_address: WalletAddress::parse(&row.wallet_address).map_err(|e| corrupt("user", e))?,
            email: row.email,
            phone: row.phone,
            login_method: LoginMethod::parse(&row.login_method).map_err(|e| corrupt("user", e))?,
            display_name: row.display_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    date: NaiveDate,
    time: Option<String>,
    location: String,
    category: Option<String>,
    price_usd_cents: i64,
    price_eth: String,
    image_url: Option<String>,
    total_tickets: i32,
    sold_tickets: i32,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = LedgerError;

    fn try_from(row: EventRow) -> LedgerResult<Self> {
        Ok(Self {
            id: EventId::from_uuid(row.id),
            name: row.name,
            description: row.description,
            date: row.date,
            time: row.time,
            location: row.location,
            category: row.category,
            price_usd: UsdAmount::from_cents(row.price_usd_cents),
            price_eth: parse_wei(&row.price_eth)?,
            image_url: row.image_url,
            total_tickets: parse_count("event", row.total_tickets)?,
            sold_tickets: parse_count("event", row.sold_tickets)?,
            created_by: row.created_by.map(UserId::from_uuid),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    event_id: Uuid,
    owner_id: Uuid,
    token_id: i64,
    transaction_hash: String,
    purchase_price_usd_cents: Option<i64>,
    purchase_price_eth: Option<String>,
    last_purchase_price_eth: Option<String>,
    payment_method: String,
    metadata_uri: Option<String>,
    purchased_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = LedgerError;

    fn try_from(row: TicketRow) -> LedgerResult<Self> {
        Ok(Self {
            id: TicketId::from_uuid(row.id),
            event_id: EventId::from_uuid(row.event_id),
            owner_id: UserId::from_uuid(row.owner_id),
            token_id: parse_token(row.token_id)?,
            transaction_hash: row
                .transaction_hash
                .parse::<TxHash>()
                .map_err(|e| corrupt("ticket", e))?,
            purchase_price_usd: row.purchase_price_usd_cents.map(UsdAmount::from_cents),
            purchase_price_eth: parse_optional_wei(row.purchase_price_eth.as_deref())?,
            last_purchase_price_eth: parse_optional_wei(row.last_purchase_price_eth.as_deref())?,
            payment_method: row.payment_method,
            metadata_uri: row.metadata_uri,
            purchased_at: row.purchased_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PurchaseRow {
    id: Uuid,
    user_id: Uuid,
    event_id: Uuid,
    ticket_id: Option<Uuid>,
    payment_method: String,
    quantity: i32,
    amount_usd_cents: Option<i64>,
    gas_cost_eth: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<PurchaseRow> for PurchaseRecord {
    type Error = LedgerError;

    fn try_from(row: PurchaseRow) -> LedgerResult<Self> {
        Ok(Self {
            id: PurchaseId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            event_id: EventId::from_uuid(row.event_id),
            ticket_id: row.ticket_id.map(TicketId::from_uuid),
            payment_method: PaymentMethod::parse(&row.payment_method)
                .map_err(|e| corrupt("purchase", e))?,
            quantity: parse_count("purchase", row.quantity)?,
            amount_usd: row.amount_usd_cents.map(UsdAmount::from_cents),
            gas_cost_eth: parse_optional_wei(row.gas_cost_eth.as_deref())?,
            status: PurchaseStatus::parse(&row.status).map_err(|e| corrupt("purchase", e))?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ListingRow {
    id: Uuid,
    event_id: Uuid,
    ticket_id: Uuid,
    nft_address: String,
    token_id: i64,
    seller_id: Uuid,
    price_eth: String,
    status: String,
    tx_hash: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ListingRow> for Listing {
    type Error = LedgerError;

    fn try_from(row: ListingRow) -> LedgerResult<Self> {
        Ok(Self {
            id: ListingId::from_uuid(row.id),
            event_id: EventId::from_uuid(row.event_id),
            ticket_id: TicketId::from_uuid(row.ticket_id),
            nft_address: row.nft_address.parse().map_err(|e| corrupt("listing", e))?,
            token_id: parse_token(row.token_id)?,
            seller_id: UserId::from_uuid(row.seller_id),
            price_eth: parse_wei(&row.price_eth)?,
            status: ListingStatus::parse(&row.status).map_err(|e| corrupt("listing", e))?,
            tx_hash: row
                .tx_hash
                .as_deref()
                .map(str::parse::<TxHash>)
                .transpose()
                .map_err(|e| corrupt("listing", e))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EntryPassRow {
    payload: Json<EntryPass>,
    consumed_at: Option<DateTime<Utc>>,
    voided_at: Option<DateTime<Utc>>,
}

// ============================================================================
// LedgerStore
// ============================================================================

#[async_trait]
impl LedgerStore for PostgresLedger {
    async fn ping(&self) -> LedgerResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| storage("reach database", &e))?;
        Ok(())
    }

    async fn upsert_user(&self, user: NewUser) -> LedgerResult<User> {
        let display_name = user.resolved_display_name();
        let sql = format!(
            r"
            INSERT INTO users (id, wallet_address, email, phone, login_method, display_name)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (wallet_address) DO UPDATE SET
                email = COALESCE(EXCLUDED.email, users.email),
                phone = COALESCE(EXCLUDED.phone, users.phone),
                login_method = EXCLUDED.login_method,
                display_name = CASE
                    WHEN $7 OR users.display_name IS NULL THEN EXCLUDED.display_name
                    ELSE users.display_name
                END,
                updated_at = NOW()
            RETURNING {USER_COLUMNS}
            "
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(user.wallet_address.to_string())
            .bind(user.email)
            .bind(user.phone)
            .bind(user.login_method.as_str())
            .bind(display_name)
            .bind(user.display_name.is_some())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage("upsert user", &e))?
            .try_into()
    }

    async fn find_user_by_wallet(&self, wallet: &WalletAddress) -> LedgerResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE wallet_address = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(wallet.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage("get user", &e))?
            .map(User::try_from)
            .transpose()
    }

    async fn get_user(&self, id: UserId) -> LedgerResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage("get user", &e))?
            .map(User::try_from)
            .transpose()
    }

    async fn list_events(&self) -> LedgerResult<Vec<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY date ASC");
        sqlx::query_as::<_, EventRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage("list events", &e))?
            .into_iter()
            .map(Event::try_from)
            .collect()
    }

    async fn get_event(&self, id: EventId) -> LedgerResult<Option<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        sqlx::query_as::<_, EventRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage("get event", &e))?
            .map(Event::try_from)
            .transpose()
    }

    async fn create_event(&self, event: NewEvent) -> LedgerResult<Event> {
        let sql = format!(
            r"
            INSERT INTO events
                (id, name, description, date, time, location, category,
                 price_usd_cents, price_eth, image_url, total_tickets, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9::NUMERIC, $10, $11, $12)
            RETURNING {EVENT_COLUMNS}
            "
        );
        sqlx::query_as::<_, EventRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(event.name)
            .bind(event.description)
            .bind(event.date)
            .bind(event.time)
            .bind(event.location)
            .bind(event.category)
            .bind(event.price_usd.cents())
            .bind(wei_text(event.price_eth))
            .bind(event.image_url)
            .bind(count_param(event.total_tickets)?)
            .bind(event.created_by.map(|id| *id.as_uuid()))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage("create event", &e))?
            .try_into()
    }

    async fn reserve_capacity(&self, event: EventId, quantity: u32) -> LedgerResult<bool> {
        let Ok(quantity) = i32::try_from(quantity) else {
            return Ok(false);
        };

        let reserved = sqlx::query(
            r"
            UPDATE events
            SET sold_tickets = sold_tickets + $2, updated_at = NOW()
            WHERE id = $1 AND sold_tickets + $2 <= total_tickets
            ",
        )
        .bind(*event.as_uuid())
        .bind(quantity)
        .execute(&self.pool)
        .await
        .map_err(|e| storage("reserve capacity", &e))?
        .rows_affected()
            == 1;

        if reserved {
            return Ok(true);
        }

        let exists = sqlx::query("SELECT 1 FROM events WHERE id = $1")
            .bind(*event.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage("get event", &e))?
            .is_some();
        if exists {
            Ok(false)
        } else {
            Err(LedgerError::NotFound("Event".to_string()))
        }
    }

    async fn release_capacity(&self, event: EventId, quantity: u32) -> LedgerResult<()> {
        sqlx::query(
            r"
            UPDATE events
            SET sold_tickets = GREATEST(sold_tickets - $2, 0), updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(*event.as_uuid())
        .bind(count_param(quantity)?)
        .execute(&self.pool)
        .await
        .map_err(|e| storage("release capacity", &e))?;
        Ok(())
    }

    async fn insert_ticket(&self, ticket: NewTicket) -> LedgerResult<Ticket> {
        let token = ticket.token_id;
        let sql = format!(
            r"
            INSERT INTO tickets
                (id, event_id, owner_id, token_id, transaction_hash, purchase_price_usd_cents,
                 purchase_price_eth, payment_method, metadata_uri)
            VALUES ($1, $2, $3, $4, $5, $6, $7::NUMERIC, $8, $9)
            RETURNING {TICKET_COLUMNS}
            "
        );
        sqlx::query_as::<_, TicketRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(*ticket.event_id.as_uuid())
            .bind(*ticket.owner_id.as_uuid())
            .bind(token_param(token)?)
            .bind(ticket.transaction_hash.to_string())
            .bind(ticket.purchase_price_usd.map(|usd| usd.cents()))
            .bind(ticket.purchase_price_eth.map(wei_text))
            .bind(ticket.payment_method)
            .bind(ticket.metadata_uri)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    return LedgerError::Conflict(format!("Ticket for token {token} already exists"));
                }
                storage("insert ticket", &e)
            })?
            .try_into()
    }

    async fn get_ticket(&self, id: TicketId) -> LedgerResult<Option<Ticket>> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1");
        sqlx::query_as::<_, TicketRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage("get ticket", &e))?
            .map(Ticket::try_from)
            .transpose()
    }

    async fn find_ticket_by_token(&self, token: TokenId) -> LedgerResult<Option<Ticket>> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE token_id = $1");
        sqlx::query_as::<_, TicketRow>(&sql)
            .bind(token_param(token)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage("get ticket", &e))?
            .map(Ticket::try_from)
            .transpose()
    }

    async fn tickets_for_owner(&self, owner: UserId) -> LedgerResult<Vec<TicketWithEvent>> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE owner_id = $1 ORDER BY purchased_at DESC"
        );
        let tickets: Vec<Ticket> = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(*owner.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage("list tickets", &e))?
            .into_iter()
            .map(Ticket::try_from)
            .collect::<LedgerResult<_>>()?;

        let mut event_ids: Vec<Uuid> = tickets.iter().map(|t| *t.event_id.as_uuid()).collect();
        event_ids.sort_unstable();
        event_ids.dedup();
        let events = self.events_by_ids(&event_ids).await?;

        Ok(tickets
            .into_iter()
            .map(|ticket| {
                let event = events.iter().find(|e| e.id == ticket.event_id).cloned();
                TicketWithEvent { ticket, event }
            })
            .collect())
    }

    async fn list_tickets(&self) -> LedgerResult<Vec<Ticket>> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets ORDER BY token_id ASC");
        sqlx::query_as::<_, TicketRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage("list tickets", &e))?
            .into_iter()
            .map(Ticket::try_from)
            .collect()
    }

    async fn create_purchase(&self, purchase: NewPurchase) -> LedgerResult<PurchaseRecord> {
        let sql = format!(
            r"
            INSERT INTO purchase_history
                (id, user_id, event_id, payment_method, quantity, amount_usd_cents, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            RETURNING {PURCHASE_COLUMNS}
            "
        );
        sqlx::query_as::<_, PurchaseRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(*purchase.user_id.as_uuid())
            .bind(*purchase.event_id.as_uuid())
            .bind(purchase.payment_method.as_str())
            .bind(count_param(purchase.quantity)?)
            .bind(purchase.amount_usd.map(|usd| usd.cents()))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage("create purchase", &e))?
            .try_into()
    }

    async fn update_purchase(
        &self,
        id: PurchaseId,
        status: PurchaseStatus,
        ticket: Option<TicketId>,
        gas_cost_wei: Option<u128>,
    ) -> LedgerResult<()> {
        let updated = sqlx::query(
            r"
            UPDATE purchase_history
            SET status = $2,
                ticket_id = COALESCE($3, ticket_id),
                gas_cost_eth = COALESCE($4::NUMERIC, gas_cost_eth)
            WHERE id = $1
            ",
        )
        .bind(*id.as_uuid())
        .bind(status.as_str())
        .bind(ticket.map(|t| *t.as_uuid()))
        .bind(gas_cost_wei.map(|wei| wei.to_string()))
        .execute(&self.pool)
        .await
        .map_err(|e| storage("update purchase", &e))?;

        if updated.rows_affected() == 0 {
            return Err(LedgerError::NotFound("Purchase".to_string()));
        }
        Ok(())
    }

    async fn purchases_for_user(&self, user: UserId) -> LedgerResult<Vec<PurchaseRecord>> {
        let sql = format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchase_history WHERE user_id = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, PurchaseRow>(&sql)
            .bind(*user.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage("list purchases", &e))?
            .into_iter()
            .map(PurchaseRecord::try_from)
            .collect()
    }

    async fn create_listing(&self, listing: NewListing) -> LedgerResult<Listing> {
        let sql = format!(
            r"
            INSERT INTO marketplace_listings
                (id, event_id, ticket_id, nft_address, token_id, seller_id, price_eth, status, tx_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7::NUMERIC, 'active', $8)
            RETURNING {LISTING_COLUMNS}
            "
        );
        sqlx::query_as::<_, ListingRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(*listing.event_id.as_uuid())
            .bind(*listing.ticket_id.as_uuid())
            .bind(address_text(&listing.nft_address))
            .bind(token_param(listing.token_id)?)
            .bind(*listing.seller_id.as_uuid())
            .bind(wei_text(listing.price_eth))
            .bind(listing.tx_hash.map(|tx| tx.to_string()))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    return LedgerError::Conflict("Ticket already has an active listing".to_string());
                }
                storage("create listing", &e)
            })?
            .try_into()
    }

    async fn active_listings_for_event(&self, event: EventId) -> LedgerResult<Vec<Listing>> {
        let sql = format!(
            r"
            SELECT {LISTING_COLUMNS} FROM marketplace_listings
            WHERE event_id = $1 AND status = 'active'
            ORDER BY created_at DESC
            "
        );
        sqlx::query_as::<_, ListingRow>(&sql)
            .bind(*event.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage("list listings", &e))?
            .into_iter()
            .map(Listing::try_from)
            .collect()
    }

    async fn active_listing_for_token(&self, nft: Address, token: TokenId) -> LedgerResult<Option<Listing>> {
        let sql = format!(
            r"
            SELECT {LISTING_COLUMNS} FROM marketplace_listings
            WHERE nft_address = $1 AND token_id = $2 AND status = 'active'
            "
        );
        sqlx::query_as::<_, ListingRow>(&sql)
            .bind(address_text(&nft))
            .bind(token_param(token)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage("get listing", &e))?
            .map(Listing::try_from)
            .transpose()
    }

    async fn cancel_listing(&self, nft: Address, token: TokenId) -> LedgerResult<bool> {
        let result = sqlx::query(
            r"
            UPDATE marketplace_listings
            SET status = 'cancelled', updated_at = NOW()
            WHERE nft_address = $1 AND token_id = $2 AND status = 'active'
            ",
        )
        .bind(address_text(&nft))
        .bind(token_param(token)?)
        .execute(&self.pool)
        .await
        .map_err(|e| storage("cancel listing", &e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn settle_resale(&self, settlement: ResaleSettlement) -> LedgerResult<SettleOutcome> {
        // Early returns drop `tx`, which rolls it back.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage("start transaction", &e))?;

        let sql = format!(
            r"
            SELECT {LISTING_COLUMNS} FROM marketplace_listings
            WHERE nft_address = $1 AND token_id = $2 AND status = 'active'
            FOR UPDATE
            "
        );
        let row = sqlx::query_as::<_, ListingRow>(&sql)
            .bind(address_text(&settlement.nft_address))
            .bind(token_param(settlement.token_id)?)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| storage("lock listing", &e))?;
        let Some(row) = row else {
            return Ok(SettleOutcome::NotActive);
        };
        let listing = Listing::try_from(row)?;
        settlement.check_against(&listing)?;

        sqlx::query(
            r"
            UPDATE marketplace_listings
            SET status = 'sold', tx_hash = $2, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(*listing.id.as_uuid())
        .bind(settlement.tx_hash.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| storage("mark listing sold", &e))?;

        let moved = sqlx::query(
            r"
            UPDATE tickets
            SET owner_id = $2, last_purchase_price_eth = $3::NUMERIC
            WHERE id = $1
            ",
        )
        .bind(*listing.ticket_id.as_uuid())
        .bind(*settlement.buyer_id.as_uuid())
        .bind(wei_text(listing.price_eth))
        .execute(&mut *tx)
        .await
        .map_err(|e| storage("transfer ticket", &e))?
        .rows_affected();
        if moved == 0 {
            return Err(LedgerError::NotFound("Ticket".to_string()));
        }

        tx.commit()
            .await
            .map_err(|e| storage("commit transaction", &e))?;
        Ok(SettleOutcome::Settled)
    }

    async fn begin_mint_request(
        &self,
        key: &str,
        fingerprint: &str,
        stale_after: Duration,
    ) -> LedgerResult<MintClaim> {
        let claimed = sqlx::query(
            r"
            INSERT INTO mint_requests (idempotency_key, request_fingerprint)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(key)
        .bind(fingerprint)
        .execute(&self.pool)
        .await
        .map_err(|e| storage("claim idempotency key", &e))?
        .rows_affected()
            == 1;
        if claimed {
            return Ok(MintClaim::Claimed);
        }

        let taken_over = sqlx::query(
            r"
            UPDATE mint_requests
            SET claimed_at = NOW()
            WHERE idempotency_key = $1
              AND request_fingerprint = $2
              AND response IS NULL
              AND claimed_at < NOW() - make_interval(secs => $3)
            ",
        )
        .bind(key)
        .bind(fingerprint)
        .bind(stale_after.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(|e| storage("take over idempotency key", &e))?
        .rows_affected()
            == 1;
        if taken_over {
            return Ok(MintClaim::Claimed);
        }

        let row: Option<(Option<Json<Value>>, Option<String>)> = sqlx::query_as(
            "SELECT response, request_fingerprint FROM mint_requests WHERE idempotency_key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("read idempotency key", &e))?;

        // A vanished row means the holder abandoned it between our statements.
        Ok(match row {
            Some((_, Some(stored))) if stored != fingerprint => MintClaim::Mismatch,
            Some((Some(Json(response)), _)) => MintClaim::Completed(response),
            Some((None, _)) | None => MintClaim::InFlight,
        })
    }

    async fn complete_mint_request(&self, key: &str, response: Value) -> LedgerResult<()> {
        sqlx::query(
            r"
            UPDATE mint_requests
            SET response = $2, completed_at = NOW()
            WHERE idempotency_key = $1
            ",
        )
        .bind(key)
        .bind(Json(response))
        .execute(&self.pool)
        .await
        .map_err(|e| storage("store mint response", &e))?;
        Ok(())
    }

    async fn abandon_mint_request(&self, key: &str) -> LedgerResult<()> {
        sqlx::query("DELETE FROM mint_requests WHERE idempotency_key = $1 AND response IS NULL")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| storage("release idempotency key", &e))?;
        Ok(())
    }

    async fn record_entry_pass(&self, pass: &EntryPass) -> LedgerResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage("start transaction", &e))?;

        // Serializes issuing and admitting for one ticket.
        let ticket = sqlx::query("SELECT id FROM tickets WHERE id = $1 FOR UPDATE")
            .bind(*pass.ticket_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| storage("lock ticket", &e))?;
        if ticket.is_none() {
            return Err(LedgerError::NotFound("Ticket".to_string()));
        }

        let admitted: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM entry_passes WHERE ticket_id = $1 AND consumed_at IS NOT NULL)",
        )
        .bind(*pass.ticket_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage("check admissions", &e))?;
        if admitted {
            return Err(LedgerError::Conflict("Ticket has already been used for entry".to_string()));
        }

        sqlx::query(
            r"
            UPDATE entry_passes SET voided_at = NOW()
            WHERE ticket_id = $1 AND consumed_at IS NULL AND voided_at IS NULL
            ",
        )
        .bind(*pass.ticket_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| storage("void earlier entry passes", &e))?;

        sqlx::query(
            r"
            INSERT INTO entry_passes (session_id, ticket_id, payload, expires_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(&pass.session_id)
        .bind(*pass.ticket_id.as_uuid())
        .bind(Json(pass))
        .bind(pass.expires_at_time())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return LedgerError::Conflict("Entry pass session already exists".to_string());
            }
            storage("record entry pass", &e)
        })?;

        tx.commit()
            .await
            .map_err(|e| storage("commit transaction", &e))?;
        Ok(())
    }

    async fn consume_entry_pass(&self, session_id: &str, now: DateTime<Utc>) -> LedgerResult<EntryCheck> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage("start transaction", &e))?;

        let ticket_id: Option<Uuid> =
            sqlx::query_scalar("SELECT ticket_id FROM entry_passes WHERE session_id = $1")
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| storage("find entry pass", &e))?;
        let Some(ticket_id) = ticket_id else {
            return Ok(EntryCheck::Unknown);
        };

        // Ticket before pass, the same order record_entry_pass locks in.
        let owner: Option<String> = sqlx::query_scalar(
            r"
            SELECT u.wallet_address FROM tickets t
            JOIN users u ON u.id = t.owner_id
            WHERE t.id = $1
            FOR UPDATE OF t
            ",
        )
        .bind(ticket_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| storage("lock ticket", &e))?;

        let row = sqlx::query_as::<_, EntryPassRow>(
            r"
            SELECT payload, consumed_at, voided_at FROM entry_passes
            WHERE session_id = $1
            FOR UPDATE
            ",
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage("load entry pass", &e))?;

        if row.consumed_at.is_some() {
            return Ok(EntryCheck::AlreadyUsed);
        }
        if row.voided_at.is_some() {
            return Ok(EntryCheck::Revoked);
        }
        let Json(pass) = row.payload;
        if pass.is_expired(now) {
            return Ok(EntryCheck::Expired);
        }

        let owner = owner
            .as_deref()
            .map(WalletAddress::parse)
            .transpose()
            .map_err(|e| corrupt("user", e))?;
        if owner != Some(pass.owner_address) {
            return Ok(EntryCheck::Revoked);
        }

        let admitted: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM entry_passes WHERE ticket_id = $1 AND consumed_at IS NOT NULL)",
        )
        .bind(ticket_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage("check admissions", &e))?;
        if admitted {
            return Ok(EntryCheck::AlreadyUsed);
        }

        let consumed = sqlx::query("UPDATE entry_passes SET consumed_at = $2 WHERE session_id = $1")
            .bind(session_id)
            .bind(now)
            .execute(&mut *tx)
            .await;
        match consumed {
            Ok(_) => {},
            Err(e) if is_unique_violation(&e) => return Ok(EntryCheck::AlreadyUsed),
            Err(e) => return Err(storage("consume entry pass", &e)),
        }
        tx.commit()
            .await
            .map_err(|e| storage("commit transaction", &e))?;

        Ok(EntryCheck::Accepted { pass })
    }
}

//! TicketMint storefront backend.
//!
//! Tickets are ERC-721 tokens minted by a gas relayer so buyers never pay
//! gas, resold on a marketplace contract with a 2x price cap, and admitted at
//! the door with short-lived single-use entry passes.
//!
//! # Architecture
//!
//! ```text
//!   client flows (reducers on a Store)
//!      │ purchase          │ listing / resale (user's wallet)
//!      ▼                   ▼
//! ┌──────────┐        ┌───────────┐
//! │ HTTP API │        │   Chain   │
//! └──────────┘        └───────────┘
//!      │   relayer ───────▲
//!      ▼
//! ┌──────────────┐
//! │ LedgerStore  │  users, events, tickets, purchases,
//! │  (Postgres)  │  listings, mint requests, entry passes
//! └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`relayer`]: minting on behalf of buyers
//! - [`api`] and [`server`]: the HTTP surface
//! - [`client`]: purchase, listing, resale and entry pass flows
//! - [`assistant`]: natural-language shopping intents
//! - [`reconcile`]: chain and ledger maintenance jobs
//! - [`ledger`] and [`chain`]: production adapters

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod assistant;
pub mod chain;
pub mod client;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod reconcile;
pub mod relayer;
pub mod server;

pub use config::Config;
pub use error::AppError;

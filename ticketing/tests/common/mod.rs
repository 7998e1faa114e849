//! Shared fixtures for the integration tests.

#![allow(dead_code)] // Not every test binary uses every helper
#![allow(clippy::unwrap_used, clippy::expect_used)]

use alloy_primitives::Address;
use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use chrono::NaiveDate;
use http::{Request, StatusCode};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use ticketmint::Config;
use ticketmint::assistant::{AssistantError, IntentModel};
use ticketmint::server::{AppState, build_router};
use ticketmint_core::ledger::LedgerStore;
use ticketmint_core::models::{Event, NewEvent};
use ticketmint_core::types::{EthAmount, UsdAmount, WalletAddress};
use ticketmint_testing::{InMemoryLedger, MockChain, test_clock};
use tower::ServiceExt;

pub const TOKEN: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub const MARKETPLACE: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
pub const RELAYER: &str = "0x1111111111111111111111111111111111111111";
pub const BUYER: &str = "0x2222222222222222222222222222222222222222";
pub const SECOND_BUYER: &str = "0x3333333333333333333333333333333333333333";

pub fn token_address() -> Address {
    TOKEN.parse().unwrap()
}

pub fn marketplace_address() -> Address {
    MARKETPLACE.parse().unwrap()
}

pub fn relayer() -> WalletAddress {
    WalletAddress::parse(RELAYER).unwrap()
}

pub fn wallet(raw: &str) -> WalletAddress {
    WalletAddress::parse(raw).unwrap()
}

/// Configuration with both contracts and the relayer account set
pub fn config() -> Config {
    Config::from_lookup(|name| match name {
        "TOKEN_CONTRACT_ADDRESS" => Some(TOKEN.to_string()),
        "MARKETPLACE_CONTRACT_ADDRESS" => Some(MARKETPLACE.to_string()),
        "RELAYER_ADDRESS" => Some(RELAYER.to_string()),
        "CHAIN_ID" => Some("31337".to_string()),
        _ => None,
    })
    .unwrap()
}

pub fn new_event(total_tickets: u32) -> NewEvent {
    NewEvent {
        name: "Launch Night".to_string(),
        description: Some("Opening show".to_string()),
        date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        time: Some("19:30".to_string()),
        location: "Berlin".to_string(),
        category: Some("music".to_string()),
        price_usd: UsdAmount::from_cents(2_500),
        price_eth: EthAmount::from_eth_str("0.01").unwrap(),
        image_url: None,
        total_tickets,
        created_by: None,
    }
}

/// Model that answers every query with the same text.
#[derive(Debug, Default)]
pub struct CannedModel {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl CannedModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl IntentModel for CannedModel {
    async fn complete(&self, _system: &str, user: &str) -> Result<String, AssistantError> {
        self.prompts.lock().unwrap().push(user.to_string());
        self.reply.clone().ok_or(AssistantError::RequestFailed("connection refused".to_string()))
    }
}

/// Router over in-memory adapters with one seeded event.
pub struct TestApp {
    pub router: Router,
    pub ledger: Arc<InMemoryLedger>,
    pub chain: Arc<MockChain>,
    pub model: Arc<CannedModel>,
    pub event: Event,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(MockChain::new(relayer(), token_address()), CannedModel::default())
    }

    pub fn with(chain: MockChain, model: CannedModel) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let event = ledger.seed_event(new_event(100));
        let chain = Arc::new(chain);
        let model = Arc::new(model);
        let state = AppState::new(
            config(),
            Arc::clone(&ledger) as Arc<dyn LedgerStore>,
            Arc::clone(&chain) as Arc<dyn ticketmint_core::chain::ChainGateway>,
            Arc::clone(&model) as Arc<dyn IntentModel>,
            Arc::new(test_clock()),
        );
        Self {
            router: build_router(state),
            ledger,
            chain,
            model,
            event,
        }
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        self.post_with_headers(uri, body, &[]).await
    }

    pub async fn post_with_headers(&self, uri: &str, body: &Value, headers: &[(&str, &str)]) -> (StatusCode, Value) {
        let mut builder = Request::post(uri).header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.request(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    /// Mints `quantity` tickets for `buyer` through the API
    pub async fn mint(&self, buyer: &str, quantity: u32) -> Value {
        let (status, body) = self
            .post(
                "/api/mint-ticket",
                &serde_json::json!({
                    "userAddress": buyer,
                    "paymentMethod": "crypto",
                    "eventId": self.event.id.to_string(),
                    "quantity": quantity,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body
    }
}

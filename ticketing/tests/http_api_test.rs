//! HTTP API integration tests.
//!
//! Every request goes through the full router (extractors, error envelope,
//! layers) over the in-memory ledger and mock chain.

#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(clippy::too_many_lines)]

mod common;

use common::{BUYER, CannedModel, MARKETPLACE, RELAYER, SECOND_BUYER, TOKEN, TestApp, relayer, token_address};
use http::StatusCode;
use serde_json::json;
use ticketmint_core::ledger::LedgerStore;
use ticketmint_core::types::TicketId;
use ticketmint_testing::MockChain;

/// Mints one ticket for `buyer` and returns `(ticket_id, token_id, seller_id)`.
async fn minted(app: &TestApp, buyer: &str) -> (String, u64, String) {
    let body = app.mint(buyer, 1).await;
    (
        body["ticket"]["id"].as_str().unwrap().to_string(),
        body["tokenId"].as_u64().unwrap(),
        body["user"]["id"].as_str().unwrap().to_string(),
    )
}

async fn user_id(app: &TestApp, address: &str) -> String {
    let (status, body) = app.post("/api/user", &json!({ "walletAddress": address })).await;
    assert_eq!(status, StatusCode::OK);
    body["user"]["id"].as_str().unwrap().to_string()
}

async fn list(app: &TestApp, ticket_id: &str, token_id: u64, seller_id: &str, price: &str) {
    let (status, body) = app
        .post(
            "/api/marketplace/list",
            &json!({
                "event_id": app.event.id.to_string(),
                "ticket_id": ticket_id,
                "nft_address": TOKEN,
                "token_id": token_id,
                "seller_id": seller_id,
                "price_eth": price,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

/// Requests an entry pass and returns its session id.
async fn issue_pass(app: &TestApp, ticket_id: &str, wallet: &str) -> String {
    let (status, body) = app
        .post(&format!("/api/tickets/{ticket_id}/entry-pass"), &json!({ "walletAddress": wallet }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["pass"]["sessionId"].as_str().unwrap().to_string()
}

async fn verify(app: &TestApp, session: &str) -> (StatusCode, serde_json::Value) {
    app.post("/api/entry/verify", &json!({ "sessionId": session })).await
}

// ---------- Health ----------

#[tokio::test]
async fn health_is_served_at_root_and_under_api() {
    let app = TestApp::new();
    for uri in ["/health", "/api/health"] {
        let (status, body) = app.get(uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}

#[tokio::test]
async fn readiness_follows_the_ledger() {
    let app = TestApp::new();
    let (status, body) = app.get("/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], true);

    app.ledger.set_unavailable(true);
    let (status, _) = app.get("/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// ---------- Events ----------

#[tokio::test]
async fn events_are_listed_and_fetched() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/events").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["events"].as_array().unwrap().len(), 1);

    let (status, body) = app.get(&format!("/api/events/{}", app.event.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event"]["name"], "Launch Night");
}

#[tokio::test]
async fn unknown_or_malformed_event_is_not_found() {
    let app = TestApp::new();
    let (status, body) = app.get(&format!("/api/events/{}", uuid::Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Event not found");

    let (status, _) = app.get("/api/events/not-a-uuid").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn events_can_be_created() {
    let app = TestApp::new();
    let payload = json!({
        "name": "Late Show",
        "date": "2025-07-01",
        "location": "Lisbon",
        "price_usd": 40.0,
        "price_eth": 0.02,
        "total_tickets": 50,
    });
    let (status, body) = app.post("/api/events", &payload).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["event"]["sold_tickets"], 0);

    let mut blank = payload.clone();
    blank["name"] = json!("  ");
    let (status, body) = app.post("/api/events", &blank).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing fields");
}

#[tokio::test]
async fn created_event_reads_back_unchanged() {
    let app = TestApp::new();
    let creator = user_id(&app, SECOND_BUYER).await;
    let payload = json!({
        "name": "Harbour Sessions",
        "description": "Open-air set",
        "date": "2025-08-15",
        "time": "21:00",
        "location": "Porto",
        "category": "music",
        "price_usd": 42.5,
        "price_eth": "0.012345678901234567",
        "image_url": "https://example.com/harbour.png",
        "total_tickets": 250,
        "created_by": creator,
    });
    let (status, created) = app.post("/api/events", &payload).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["event"]["id"].as_str().unwrap();

    let (status, fetched) = app.get(&format!("/api/events/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    let event = &fetched["event"];
    assert_eq!(event, &created["event"]);
    for field in [
        "name",
        "description",
        "date",
        "time",
        "location",
        "category",
        "price_usd",
        "price_eth",
        "image_url",
        "total_tickets",
        "created_by",
    ] {
        assert_eq!(event[field], payload[field], "{field}");
    }
    assert_eq!(event["sold_tickets"], 0);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = TestApp::new();
    let request = http::Request::post("/api/events")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let (status, body) = app.request(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

// ---------- Minting ----------

#[tokio::test]
async fn mint_records_tickets_and_capacity() {
    let app = TestApp::new();
    let body = app.mint(BUYER, 2).await;

    assert_eq!(body["success"], true);
    assert_eq!(body["tickets"].as_array().unwrap().len(), 2);
    assert_eq!(body["user"]["wallet_address"], BUYER);
    assert!(body.get("warning").is_none());

    assert_eq!(app.ledger.ticket_count(), 2);
    assert_eq!(app.ledger.event(app.event.id).unwrap().sold_tickets, 2);
    assert_eq!(
        app.chain.sent_functions(),
        vec!["mintNFT", "setInitialPrice", "mintNFT", "setInitialPrice"]
    );
    assert!(app.chain.gas_limits()[0].is_some());
}

#[tokio::test]
async fn mint_validates_request() {
    let app = TestApp::new();
    let event_id = app.event.id.to_string();

    let (status, body) = app
        .post("/api/mint-ticket", &json!({ "userAddress": "nope", "eventId": event_id }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid user address");

    let (status, body) = app
        .post(
            "/api/mint-ticket",
            &json!({ "userAddress": BUYER, "eventId": event_id, "quantity": 11 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Quantity must be between 1 and 10");

    let (status, body) = app
        .post(
            "/api/mint-ticket",
            &json!({ "userAddress": BUYER, "eventId": uuid::Uuid::new_v4().to_string() }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Event not found");
    assert_eq!(app.ledger.ticket_count(), 0);
}

#[tokio::test]
async fn sold_out_event_is_refused() {
    let app = TestApp::new();
    let small = app.ledger.seed_event(common::new_event(1));
    let request = |quantity: u32| {
        json!({
            "userAddress": BUYER,
            "eventId": small.id.to_string(),
            "quantity": quantity,
        })
    };

    let (status, body) = app.post("/api/mint-ticket", &request(2)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Event is sold out");

    let (status, _) = app.post("/api/mint-ticket", &request(1)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.post("/api/mint-ticket", &request(1)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.ledger.event(small.id).unwrap().sold_tickets, 1);
}

#[tokio::test]
async fn repeated_key_replays_the_first_mint() {
    let app = TestApp::new();
    let key = "checkout-0001-0000-abcd";
    let request = json!({
        "userAddress": BUYER,
        "eventId": app.event.id.to_string(),
    });

    let (status, first) = app
        .post_with_headers("/api/mint-ticket", &request, &[("Idempotency-Key", key)])
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, second) = app
        .post_with_headers("/api/mint-ticket", &request, &[("Idempotency-Key", key)])
        .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(first["transactionHash"], second["transactionHash"]);
    assert_eq!(app.ledger.ticket_count(), 1);
    assert_eq!(app.ledger.event(app.event.id).unwrap().sold_tickets, 1);
}

#[tokio::test]
async fn key_reused_for_a_different_order_is_unprocessable() {
    let app = TestApp::new();
    let key = "checkout-0010-0000-abcd";
    let order = |quantity: u32| {
        json!({
            "userAddress": BUYER,
            "eventId": app.event.id.to_string(),
            "quantity": quantity,
        })
    };

    let (status, _) = app
        .post_with_headers("/api/mint-ticket", &order(1), &[("Idempotency-Key", key)])
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app
        .post_with_headers("/api/mint-ticket", &order(2), &[("Idempotency-Key", key)])
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Idempotency key was already used for a different request");
    assert_eq!(app.ledger.ticket_count(), 1);
}

#[tokio::test]
async fn short_idempotency_key_is_refused() {
    let app = TestApp::new();
    let (status, body) = app
        .post(
            "/api/mint-ticket",
            &json!({
                "userAddress": BUYER,
                "eventId": app.event.id.to_string(),
                "idempotencyKey": "short",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Idempotency key must be between 16 and 128 characters");
}

#[tokio::test]
async fn failed_mint_releases_capacity() {
    let app = TestApp::with(
        MockChain::new(relayer(), token_address()).reverting("mintNFT"),
        CannedModel::default(),
    );
    let (status, body) = app
        .post(
            "/api/mint-ticket",
            &json!({ "userAddress": BUYER, "eventId": app.event.id.to_string() }),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(app.ledger.event(app.event.id).unwrap().sold_tickets, 0);
    assert_eq!(app.ledger.ticket_count(), 0);
}

// ---------- Users ----------

#[tokio::test]
async fn users_are_upserted_and_looked_up() {
    let app = TestApp::new();
    let (status, body) = app.post("/api/user", &json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "wallet_address is required");

    let (status, body) = app.get(&format!("/api/user?wallet_address={SECOND_BUYER}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");

    let (status, body) = app
        .post(
            "/api/user",
            &json!({ "wallet_address": SECOND_BUYER, "email": "ada@example.com", "login_method": "magic_email" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["login_method"], "magic_email");
    assert_eq!(body["user"]["display_name"], "ada@example.com");

    let (status, body) = app.get(&format!("/api/user?wallet_address={SECOND_BUYER}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "ada@example.com");
}

#[tokio::test]
async fn dashboard_lists_owned_tickets_and_history() {
    let app = TestApp::new();
    app.mint(BUYER, 2).await;

    let (status, body) = app.post("/api/user/tickets", &json!({ "walletAddress": BUYER })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tickets"].as_array().unwrap().len(), 2);
    assert_eq!(body["purchaseHistory"].as_array().unwrap().len(), 1);

    // Unknown wallets get an empty dashboard
    let (status, body) = app
        .post("/api/user/tickets", &json!({ "walletAddress": SECOND_BUYER }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["tickets"].as_array().unwrap().is_empty());
}

// ---------- Marketplace ----------

#[tokio::test]
async fn listing_is_capped_at_twice_the_purchase_price() {
    let app = TestApp::new();
    let (ticket_id, token_id, seller_id) = minted(&app, BUYER).await;
    let listing = |price: f64| {
        json!({
            "event_id": app.event.id.to_string(),
            "ticket_id": ticket_id,
            "nft_address": TOKEN,
            "token_id": token_id,
            "seller_id": seller_id,
            "price_eth": price,
        })
    };

    let (status, body) = app.post("/api/marketplace/list", &listing(0.03)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Price cannot exceed 0.02 ETH (2x the last purchase price)");

    let (status, body) = app.post("/api/marketplace/list", &listing(0.0)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please enter a valid price");

    let (status, body) = app.post("/api/marketplace/list", &listing(0.02)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["listing"]["status"], "active");

    let (status, _) = app.post("/api/marketplace/list", &listing(0.015)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .get(&format!("/api/marketplace/listings/{}", app.event.id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["listings"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn only_the_owner_can_list() {
    let app = TestApp::new();
    let (ticket_id, token_id, _) = minted(&app, BUYER).await;
    let stranger = user_id(&app, SECOND_BUYER).await;

    let (status, body) = app
        .post(
            "/api/marketplace/list",
            &json!({
                "event_id": app.event.id.to_string(),
                "ticket_id": ticket_id,
                "nft_address": TOKEN,
                "token_id": token_id,
                "seller_id": stranger,
                "price_eth": 0.01,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Only the ticket owner can list it");

    let (status, body) = app
        .post(
            "/api/marketplace/list",
            &json!({ "event_id": app.event.id.to_string(), "nft_address": MARKETPLACE }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing fields");
}

#[tokio::test]
async fn resale_settles_once() {
    let app = TestApp::new();
    let (ticket_id, token_id, seller_id) = minted(&app, BUYER).await;
    let buyer_id = user_id(&app, SECOND_BUYER).await;

    let (status, _) = app
        .post(
            "/api/marketplace/list",
            &json!({
                "event_id": app.event.id.to_string(),
                "ticket_id": ticket_id,
                "nft_address": TOKEN,
                "token_id": token_id,
                "seller_id": seller_id,
                "price_eth": 0.015,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let settlement = json!({
        "nft_address": TOKEN,
        "token_id": token_id,
        "buyer_id": buyer_id,
        "tx_hash": format!("0x{}", "ab".repeat(32)),
        "ticket_id": ticket_id,
        "new_price_eth": 0.015,
    });
    let (status, body) = app.post("/api/marketplace/mark-sold", &settlement).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let ticket = app
        .ledger
        .get_ticket(ticket_id.parse::<TicketId>().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ticket.owner_id.to_string(), buyer_id);
    assert_eq!(ticket.last_purchase_price_eth.unwrap().to_eth_string(), "0.015");

    let (status, body) = app.post("/api/marketplace/mark-sold", &settlement).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Listing is not active");

    let (_, body) = app
        .get(&format!("/api/marketplace/listings/{}", app.event.id))
        .await;
    assert!(body["listings"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn settlement_must_match_the_listing() {
    let app = TestApp::new();
    let (listed_id, token_id, seller_id) = minted(&app, BUYER).await;
    let (bystander_id, _, _) = minted(&app, BUYER).await;
    let buyer_id = user_id(&app, SECOND_BUYER).await;
    list(&app, &listed_id, token_id, &seller_id, "0.015").await;

    let settlement = |ticket_id: &str, price: &str| {
        json!({
            "nft_address": TOKEN,
            "token_id": token_id,
            "buyer_id": buyer_id,
            "tx_hash": format!("0x{}", "cd".repeat(32)),
            "ticket_id": ticket_id,
            "new_price_eth": price,
        })
    };

    let (status, body) = app
        .post("/api/marketplace/mark-sold", &settlement(&bystander_id, "0.015"))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Listing is for a different ticket");
    let bystander = app
        .ledger
        .get_ticket(bystander_id.parse::<TicketId>().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bystander.owner_id.to_string(), seller_id);
    assert!(bystander.last_purchase_price_eth.is_none());

    let (status, body) = app
        .post("/api/marketplace/mark-sold", &settlement(&listed_id, "0.0001"))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Sale price 0.0001 ETH does not match the listed 0.015 ETH");

    let (_, body) = app
        .get(&format!("/api/marketplace/listings/{}", app.event.id))
        .await;
    assert_eq!(body["listings"][0]["status"], "active");
    assert_eq!(body["listings"][0]["price_eth"], "0.015");

    let (status, _) = app
        .post("/api/marketplace/mark-sold", &settlement(&listed_id, "0.015"))
        .await;
    assert_eq!(status, StatusCode::OK);
    let sold = app
        .ledger
        .get_ticket(listed_id.parse::<TicketId>().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sold.owner_id.to_string(), buyer_id);
    assert_eq!(sold.last_purchase_price_eth.unwrap().to_eth_string(), "0.015");
}

#[tokio::test]
async fn cancel_requires_an_active_listing() {
    let app = TestApp::new();
    let (status, body) = app
        .post("/api/marketplace/cancel", &json!({ "nft_address": TOKEN, "token_id": 99 }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "No active listing for this token");
}

// ---------- Entry passes ----------

#[tokio::test]
async fn entry_pass_is_single_use() {
    let app = TestApp::new();
    let (ticket_id, token_id, _) = minted(&app, BUYER).await;

    let (status, body) = app
        .post(
            &format!("/api/tickets/{ticket_id}/entry-pass"),
            &json!({ "walletAddress": SECOND_BUYER }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Only the ticket owner can request an entry pass");

    let (status, body) = app
        .post(&format!("/api/tickets/{ticket_id}/entry-pass"), &json!({ "walletAddress": BUYER }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let pass = &body["pass"];
    assert_eq!(pass["type"], "EVENT_ENTRY_QR");
    assert_eq!(pass["tokenId"], token_id);
    assert_eq!(pass["eventName"], "Launch Night");
    assert_eq!(
        pass["expiresAt"].as_i64().unwrap() - pass["generatedAt"].as_i64().unwrap(),
        300_000
    );
    let session = pass["sessionId"].as_str().unwrap().to_string();
    assert!(session.starts_with("qr_"));

    let (status, body) = app.post("/api/entry/verify", &json!({ "sessionId": session })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "accepted");
    assert_eq!(body["pass"]["ownerAddress"], BUYER);

    let (status, body) = app.post("/api/entry/verify", &json!({ "sessionId": session })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["outcome"], "already_used");
    assert_eq!(body["success"], false);

    let (status, body) = app.post("/api/entry/verify", &json!({ "sessionId": "qr_0_forged" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["outcome"], "unknown");
}

#[tokio::test]
async fn a_ticket_is_admitted_once_whatever_the_pass() {
    let app = TestApp::new();
    let (ticket_id, _, _) = minted(&app, BUYER).await;

    let superseded = issue_pass(&app, &ticket_id, BUYER).await;
    let current = issue_pass(&app, &ticket_id, BUYER).await;

    let (status, body) = verify(&app, &superseded).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["outcome"], "revoked");

    let (status, _) = verify(&app, &current).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(&format!("/api/tickets/{ticket_id}/entry-pass"), &json!({ "walletAddress": BUYER }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Ticket has already been used for entry");

    let (status, body) = verify(&app, &superseded).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["outcome"], "revoked");
}

#[tokio::test]
async fn resale_revokes_the_sellers_pass() {
    let app = TestApp::new();
    let (ticket_id, token_id, seller_id) = minted(&app, BUYER).await;
    let buyer_id = user_id(&app, SECOND_BUYER).await;
    let sellers_pass = issue_pass(&app, &ticket_id, BUYER).await;

    list(&app, &ticket_id, token_id, &seller_id, "0.015").await;
    let (status, _) = app
        .post(
            "/api/marketplace/mark-sold",
            &json!({
                "nft_address": TOKEN,
                "token_id": token_id,
                "buyer_id": buyer_id,
                "tx_hash": format!("0x{}", "ef".repeat(32)),
                "ticket_id": ticket_id,
                "new_price_eth": "0.015",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = verify(&app, &sellers_pass).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["outcome"], "revoked");

    let buyers_pass = issue_pass(&app, &ticket_id, SECOND_BUYER).await;
    let (status, body) = verify(&app, &buyers_pass).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pass"]["ownerAddress"], SECOND_BUYER);
}

// ---------- Assistant ----------

#[tokio::test]
async fn assistant_returns_parsed_intent() {
    let app = TestApp::with(
        MockChain::new(relayer(), token_address()),
        CannedModel::replying(r#"{"type":"buy","eventId":"e-1","quantity":2}"#),
    );
    let (status, body) = app
        .post("/api/assistant/intent", &json!({ "query": "two tickets for launch night" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["intent"], json!({ "type": "buy", "eventId": "e-1", "quantity": 2 }));

    let prompts = app.model.prompts();
    assert!(prompts[0].starts_with("User query: two tickets for launch night"));
    assert!(prompts[0].contains("Launch Night"));
}

#[tokio::test]
async fn assistant_falls_back_to_search() {
    let app = TestApp::with(
        MockChain::new(relayer(), token_address()),
        CannedModel::replying(r#"{"type":"navigate","href":"/admin"}"#),
    );
    let (status, body) = app.post("/api/assistant/intent", &json!({ "query": "admin panel" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["intent"], json!({ "type": "search", "query": "admin panel" }));
}

#[tokio::test]
async fn assistant_errors() {
    let app = TestApp::new();
    let (status, body) = app.post("/api/assistant/intent", &json!({ "query": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing query");

    let (status, body) = app.post("/api/assistant/intent", &json!({ "query": "jazz" })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to interpret query");
}

// ---------- Operations ----------

#[tokio::test]
async fn client_config_exposes_public_settings() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chainId"], 31337);
    assert_eq!(body["relayerAddress"], RELAYER);
    assert!(body["contracts"]["token"].as_str().unwrap().eq_ignore_ascii_case(TOKEN));
}

#[tokio::test]
async fn relayer_status_reports_balance() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/relayer/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balanceEth"], "1");
    assert_eq!(body["gasPriceGwei"], "20");
    assert_eq!(body["lowBalance"], false);
    assert_eq!(body["address"], RELAYER);
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let app = TestApp::new();
    let request = http::Request::get("/health").body(axum::body::Body::empty()).unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), request).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

//! Assistant tests against a mock messages API.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use serde_json::{Value, json};
use ticketmint::assistant::{self, AssistantError, Intent, IntentModel, LlmIntentClient, SYSTEM_PROMPT};
use ticketmint_core::ledger::LedgerStore;
use ticketmint_testing::InMemoryLedger;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> LlmIntentClient {
    LlmIntentClient::new(
        "test-key".to_string(),
        server.uri(),
        "claude-3-5-haiku-latest".to_string(),
    )
}

fn text_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "msg_1",
        "type": "message",
        "role": "assistant",
        "content": [{ "type": "text", "text": text }],
        "stop_reason": "end_turn",
    }))
}

#[tokio::test]
async fn request_carries_key_model_and_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(text_reply(r#"{"type":"search","query":"jazz"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client(&server).complete(SYSTEM_PROMPT, "User query: jazz").await.unwrap();
    assert_eq!(reply, r#"{"type":"search","query":"jazz"}"#);

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["model"], "claude-3-5-haiku-latest");
    assert_eq!(body["system"], SYSTEM_PROMPT);
    assert_eq!(body["max_tokens"], 200);
    assert_eq!(body["temperature"], 0.0);
    assert_eq!(body["messages"], json!([{ "role": "user", "content": "User query: jazz" }]));
}

#[tokio::test]
async fn catalogue_is_sent_as_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(text_reply("```json\n{\"type\":\"buy\",\"eventId\":null,\"quantity\":2}\n```"))
        .mount(&server)
        .await;

    let ledger = InMemoryLedger::new();
    let event = ledger.seed_event(common::new_event(100));
    let events = ledger.list_events().await.unwrap();

    let intent = assistant::interpret(&client(&server), "two for launch night", &events)
        .await
        .unwrap();
    assert_eq!(
        intent,
        Intent::Buy {
            event_id: None,
            quantity: Some(2)
        }
    );

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let content = body["messages"][0]["content"].as_str().unwrap();
    assert!(content.starts_with("User query: two for launch night\nKnown events: "));
    assert!(content.contains(&event.id.to_string()));
    assert!(content.contains("Berlin"));
}

#[tokio::test]
async fn empty_reply_becomes_a_search() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "content": [] })))
        .mount(&server)
        .await;

    let intent = assistant::interpret(&client(&server), "late night shows", &[]).await.unwrap();
    assert_eq!(
        intent,
        Intent::Search {
            query: "late night shows".to_string()
        }
    );
}

#[tokio::test]
async fn http_failures_map_to_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let client = client(&server);
    assert!(matches!(
        client.complete(SYSTEM_PROMPT, "q").await,
        Err(AssistantError::Unauthorized)
    ));
    assert!(matches!(
        client.complete(SYSTEM_PROMPT, "q").await,
        Err(AssistantError::RateLimited)
    ));
    let err = client.complete(SYSTEM_PROMPT, "q").await.unwrap_err();
    assert_eq!(err.to_string(), "API error (status 529): overloaded");
}

#[tokio::test]
async fn unreachable_api_is_a_request_failure() {
    let client = LlmIntentClient::new("test-key".to_string(), "http://127.0.0.1:1".to_string(), "m".to_string());
    let err = client.complete(SYSTEM_PROMPT, "q").await.unwrap_err();
    assert!(matches!(err, AssistantError::RequestFailed(_)));
}

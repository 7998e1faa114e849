//! JSON-RPC gateway tests against a mock node.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use alloy_primitives::{Address, B256, U256};
use common::{BUYER, relayer, token_address, wallet};
use serde_json::{Value, json};
use std::time::Duration;
use ticketmint::chain::JsonRpcChain;
use ticketmint_core::abi;
use ticketmint_core::chain::{ChainError, ChainGateway, TokenContract};
use ticketmint_core::types::{TokenId, TxHash};
use ticketmint_runtime::retry::RetryPolicy;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

fn rpc_result(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
}

fn rpc_error(message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "error": { "code": -32000, "message": message },
    }))
}

fn rpc_method(name: &str) -> MockBuilder {
    Mock::given(method("POST")).and(body_partial_json(json!({ "method": name })))
}

fn gateway(server: &MockServer) -> JsonRpcChain {
    JsonRpcChain::new(server.uri(), Some(relayer()))
        .with_retry_policy(RetryPolicy::default().with_initial_delay(Duration::from_millis(5)))
        .with_poll_interval(Duration::from_millis(10))
}

fn tx_hash() -> String {
    format!("0x{}", "cd".repeat(32))
}

fn mint_receipt() -> Value {
    json!({
        "transactionHash": tx_hash(),
        "blockNumber": "0x2a",
        "status": "0x1",
        "gasUsed": "0x249f0",
        "effectiveGasPrice": "0x3b9aca00",
        "logs": [{
            "address": token_address(),
            "topics": [
                abi::transfer_topic(),
                Address::ZERO.into_word(),
                wallet(BUYER).as_address().into_word(),
                B256::from(U256::from(5)),
            ],
            "data": "0x",
            "blockNumber": "0x2a",
            "transactionHash": tx_hash(),
        }],
    })
}

async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

#[tokio::test]
async fn balance_is_read_in_wei() {
    let server = MockServer::start().await;
    rpc_method("eth_getBalance")
        .respond_with(rpc_result(json!("0xde0b6b3a7640000")))
        .mount(&server)
        .await;

    let balance = gateway(&server).balance(&relayer()).await.unwrap();
    assert_eq!(balance.to_eth_string(), "1");

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies[0]["jsonrpc"], "2.0");
    assert_eq!(bodies[0]["params"], json!([relayer().to_string(), "latest"]));
}

#[tokio::test]
async fn node_errors_are_kept_verbatim() {
    let server = MockServer::start().await;
    rpc_method("eth_gasPrice")
        .respond_with(rpc_error("header not found"))
        .expect(1)
        .mount(&server)
        .await;

    let err = gateway(&server).gas_price().await.unwrap_err();
    assert!(matches!(err, ChainError::Rpc(ref message) if message == "header not found"));
}

#[tokio::test]
async fn transient_read_failures_are_retried() {
    let server = MockServer::start().await;
    rpc_method("eth_gasPrice")
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    rpc_method("eth_gasPrice")
        .respond_with(rpc_result(json!("0x4a817c800")))
        .mount(&server)
        .await;

    assert_eq!(gateway(&server).gas_price().await.unwrap(), 20_000_000_000);
    assert_eq!(request_bodies(&server).await.len(), 3);
}

#[tokio::test]
async fn submissions_are_never_retried() {
    let server = MockServer::start().await;
    rpc_method("eth_sendTransaction")
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let call = TokenContract::new(token_address()).mint(&wallet(BUYER), "ipfs://ticket");
    let err = gateway(&server).send_transaction(&call, Some(160_000)).await.unwrap_err();
    assert_eq!(err.to_string(), "network error: HTTP 503 Service Unavailable");
}

#[tokio::test]
async fn submissions_go_to_the_signer() {
    let node = MockServer::start().await;
    let signer = MockServer::start().await;
    rpc_method("eth_sendTransaction")
        .respond_with(rpc_result(json!(tx_hash())))
        .expect(1)
        .mount(&signer)
        .await;

    let chain = gateway(&node).with_signer_url(signer.uri());
    let call = TokenContract::new(token_address()).mint(&wallet(BUYER), "ipfs://ticket");
    let tx = chain.send_transaction(&call, Some(160_000)).await.unwrap();
    assert_eq!(tx.to_string(), tx_hash());

    let bodies = request_bodies(&signer).await;
    let sent = &bodies[0]["params"][0];
    assert_eq!(sent["from"], relayer().to_string());
    assert_eq!(sent["gas"], "0x27100");
    assert_eq!(sent["value"], "0x0");
    assert!(request_bodies(&node).await.is_empty());
}

#[tokio::test]
async fn sending_without_an_account_fails_locally() {
    let server = MockServer::start().await;
    let chain = JsonRpcChain::new(server.uri(), None);
    let call = TokenContract::new(token_address()).mint(&wallet(BUYER), "ipfs://ticket");

    let err = chain.send_transaction(&call, None).await.unwrap_err();
    assert!(matches!(err, ChainError::NotConfigured(_)));
    assert!(request_bodies(&server).await.is_empty());
}

#[tokio::test]
async fn receipts_are_polled_until_mined() {
    let server = MockServer::start().await;
    rpc_method("eth_getTransactionReceipt")
        .respond_with(rpc_result(Value::Null))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    rpc_method("eth_getTransactionReceipt")
        .respond_with(rpc_result(mint_receipt()))
        .mount(&server)
        .await;

    let tx: TxHash = tx_hash().parse().unwrap();
    let receipt = gateway(&server).wait_for_receipt(&tx, Duration::from_secs(5)).await.unwrap();

    assert!(receipt.success);
    assert_eq!(receipt.block_number, 42);
    assert_eq!(receipt.gas_used, 150_000);
    assert_eq!(receipt.effective_gas_price, 1_000_000_000);
    assert_eq!(receipt.minted_token_ids(token_address()), vec![TokenId::new(5)]);
}

#[tokio::test]
async fn unmined_transactions_time_out() {
    let server = MockServer::start().await;
    rpc_method("eth_getTransactionReceipt")
        .respond_with(rpc_result(Value::Null))
        .mount(&server)
        .await;

    let tx: TxHash = tx_hash().parse().unwrap();
    let err = gateway(&server)
        .wait_for_receipt(&tx, Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::ConfirmationTimeout(hash) if hash == tx));
}

#[tokio::test]
async fn view_calls_return_raw_bytes() {
    let server = MockServer::start().await;
    rpc_method("eth_call")
        .respond_with(rpc_result(json!(format!("0x{:064x}", 1))))
        .mount(&server)
        .await;

    let call = TokenContract::new(token_address()).is_approved_for_all(&wallet(BUYER), Address::repeat_byte(0xbb));
    let raw = gateway(&server).call(&call).await.unwrap();
    assert_eq!(raw.len(), 32);
    assert_eq!(abi::decode_bool(&raw, 0), Some(true));
}

#[tokio::test]
async fn transfer_logs_are_decoded() {
    let server = MockServer::start().await;
    rpc_method("eth_getLogs")
        .respond_with(rpc_result(mint_receipt()["logs"].clone()))
        .mount(&server)
        .await;

    let logs = gateway(&server).transfer_logs(token_address(), 16).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].is_mint());
    assert_eq!(logs[0].to, *wallet(BUYER).as_address());
    assert_eq!(logs[0].token_id, TokenId::new(5));

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies[0]["params"][0]["fromBlock"], "0x10");
}

//! JSON-RPC 2.0 chain gateway over `reqwest`.
//!
//! Reads go to the configured node and are retried on transport failures.
//! Transactions are submitted with `eth_sendTransaction` to a signing endpoint
//! that holds the account key (a signer proxy or an unlocked node account), so
//! no private key is ever loaded into this process. Submissions are never
//! retried automatically.

use alloy_primitives::{Address, B256, U256, hex};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use ticketmint_core::abi;
use ticketmint_core::chain::{
    ChainError, ChainGateway, ChainResult, ContractCall, LogEntry, TransferLog, TxReceipt,
};
use ticketmint_core::types::{EthAmount, TxHash, WalletAddress};
use ticketmint_runtime::retry::{RetryPolicy, retry_when};

/// Failure of a single JSON-RPC exchange.
#[derive(Debug, Clone)]
enum RpcFailure {
    /// Connection, timeout or 5xx; worth retrying
    Transport(String),
    /// The node answered with an error object or an unusable body
    Node(String),
}

impl fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "network error: {message}"),
            Self::Node(message) => f.write_str(message),
        }
    }
}

impl From<RpcFailure> for ChainError {
    fn from(failure: RpcFailure) -> Self {
        Self::Rpc(failure.to_string())
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: TxHash,
    block_number: String,
    status: Option<String>,
    gas_used: String,
    effective_gas_price: Option<String>,
    #[serde(default)]
    logs: Vec<RawLog>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLog {
    address: Address,
    topics: Vec<B256>,
    #[serde(default)]
    data: String,
    block_number: Option<String>,
    transaction_hash: Option<TxHash>,
}

/// [`ChainGateway`] backed by a JSON-RPC node.
#[derive(Debug)]
pub struct JsonRpcChain {
    client: reqwest::Client,
    rpc_url: String,
    signer_url: Option<String>,
    account: Option<WalletAddress>,
    retry: RetryPolicy,
    poll_interval: Duration,
    next_id: AtomicU64,
}

impl JsonRpcChain {
    /// Gateway reading from `rpc_url` and sending as `account`.
    #[must_use]
    pub fn new(rpc_url: impl Into<String>, account: Option<WalletAddress>) -> Self {
        Self {
            client: reqwest::Client::new(),
            rpc_url: rpc_url.into(),
            signer_url: None,
            account,
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_secs(1),
            next_id: AtomicU64::new(1),
        }
    }

    /// The relayer's gateway as configured.
    #[must_use]
    pub fn from_config(config: &crate::Config) -> Self {
        let mut chain = Self::new(config.chain.rpc_url.clone(), config.relayer.address)
            .with_poll_interval(config.relayer.poll_interval());
        chain.signer_url.clone_from(&config.relayer.signer_url);
        chain
    }

    /// Sends transactions to a separate signing endpoint.
    #[must_use]
    pub fn with_signer_url(mut self, url: impl Into<String>) -> Self {
        self.signer_url = Some(url.into());
        self
    }

    /// Overrides the retry policy for reads.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Overrides the receipt polling interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn exchange(&self, url: &str, method: &str, params: &Value) -> Result<Value, RpcFailure> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({ "jsonrpc": "2.0", "method": method, "params": params, "id": id });

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RpcFailure::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(RpcFailure::Transport(format!("HTTP {status}")));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| RpcFailure::Node(format!("Invalid JSON-RPC response: {e}")))?;

        match body.error {
            Some(error) => Err(RpcFailure::Node(error.message)),
            None => Ok(body.result),
        }
    }

    async fn read<T: DeserializeOwned>(&self, method: &str, params: Value) -> ChainResult<T> {
        let result = retry_when(
            &self.retry,
            method,
            || self.exchange(&self.rpc_url, method, &params),
            |failure| matches!(failure, RpcFailure::Transport(_)),
        )
        .await?;
        serde_json::from_value(result).map_err(|e| ChainError::Decode(format!("{method}: {e}")))
    }

    fn transaction_object(&self, call: &ContractCall, gas_limit: Option<u64>) -> Value {
        let mut tx = json!({
            "to": call.to,
            "data": hex::encode_prefixed(&call.data),
            "value": quantity(call.value),
        });
        if let Some(account) = self.account {
            tx["from"] = json!(account.to_string());
        }
        if let Some(gas) = gas_limit {
            tx["gas"] = json!(format!("{gas:#x}"));
        }
        tx
    }
}

fn quantity(value: U256) -> String {
    format!("{value:#x}")
}

fn parse_quantity(raw: &str) -> ChainResult<U256> {
    U256::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| ChainError::Decode(format!("bad quantity {raw}: {e}")))
}

fn parse_u64(raw: &str) -> ChainResult<u64> {
    u64::try_from(parse_quantity(raw)?).map_err(|_| ChainError::Decode(format!("{raw} exceeds u64")))
}

fn parse_u128(raw: &str) -> ChainResult<u128> {
    u128::try_from(parse_quantity(raw)?).map_err(|_| ChainError::Decode(format!("{raw} exceeds u128")))
}

fn parse_bytes(raw: &str) -> ChainResult<Vec<u8>> {
    hex::decode(raw).map_err(|e| ChainError::Decode(format!("bad hex data: {e}")))
}

impl RawLog {
    fn into_entry(self) -> ChainResult<LogEntry> {
        Ok(LogEntry {
            address: self.address,
            topics: self.topics,
            data: if self.data.is_empty() { Vec::new() } else { parse_bytes(&self.data)? },
            block_number: self.block_number.as_deref().map(parse_u64).transpose()?,
            transaction_hash: self.transaction_hash,
        })
    }
}

impl RawReceipt {
    fn into_receipt(self) -> ChainResult<TxReceipt> {
        Ok(TxReceipt {
            transaction_hash: self.transaction_hash,
            block_number: parse_u64(&self.block_number)?,
            success: self.status.as_deref().is_none_or(|status| status == "0x1"),
            gas_used: parse_u64(&self.gas_used)?,
            effective_gas_price: self
                .effective_gas_price
                .as_deref()
                .map(parse_u128)
                .transpose()?
                .unwrap_or(0),
            logs: self
                .logs
                .into_iter()
                .map(RawLog::into_entry)
                .collect::<ChainResult<_>>()?,
        })
    }
}

#[async_trait]
impl ChainGateway for JsonRpcChain {
    fn account(&self) -> Option<WalletAddress> {
        self.account
    }

    async fn balance(&self, address: &WalletAddress) -> ChainResult<EthAmount> {
        let raw: String = self
            .read("eth_getBalance", json!([address.to_string(), "latest"]))
            .await?;
        EthAmount::from_u256(parse_quantity(&raw)?)
            .ok_or_else(|| ChainError::Decode(format!("balance {raw} out of range")))
    }

    async fn gas_price(&self) -> ChainResult<u128> {
        let raw: String = self.read("eth_gasPrice", json!([])).await?;
        parse_u128(&raw)
    }

    async fn estimate_gas(&self, call: &ContractCall) -> ChainResult<u64> {
        let raw: String = self
            .read("eth_estimateGas", json!([self.transaction_object(call, None)]))
            .await?;
        parse_u64(&raw)
    }

    #[tracing::instrument(skip(self, call), fields(function = call.function, to = %call.to))]
    async fn send_transaction(&self, call: &ContractCall, gas_limit: Option<u64>) -> ChainResult<TxHash> {
        if self.account.is_none() {
            return Err(ChainError::NotConfigured("Relayer account"));
        }
        let url = self.signer_url.as_deref().unwrap_or(&self.rpc_url);
        let params = json!([self.transaction_object(call, gas_limit)]);

        let result = self.exchange(url, "eth_sendTransaction", &params).await?;
        let tx: TxHash = serde_json::from_value(result)
            .map_err(|e| ChainError::Decode(format!("eth_sendTransaction: {e}")))?;

        tracing::info!(tx_hash = %tx, "Transaction submitted");
        Ok(tx)
    }

    async fn wait_for_receipt(&self, tx: &TxHash, timeout: Duration) -> ChainResult<TxReceipt> {
        let poll = async {
            loop {
                let receipt: Option<RawReceipt> = self
                    .read("eth_getTransactionReceipt", json!([tx.to_string()]))
                    .await?;
                if let Some(receipt) = receipt {
                    return receipt.into_receipt();
                }
                tracing::debug!(tx_hash = %tx, "Transaction pending");
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| ChainError::ConfirmationTimeout(*tx))?
    }

    async fn call(&self, call: &ContractCall) -> ChainResult<Vec<u8>> {
        let raw: String = self
            .read("eth_call", json!([self.transaction_object(call, None), "latest"]))
            .await?;
        parse_bytes(&raw)
    }

    async fn transfer_logs(&self, contract: Address, from_block: u64) -> ChainResult<Vec<TransferLog>> {
        let filter = json!({
            "address": contract,
            "fromBlock": format!("{from_block:#x}"),
            "toBlock": "latest",
            "topics": [abi::transfer_topic()],
        });
        let raw: Vec<RawLog> = self.read("eth_getLogs", json!([filter])).await?;
        let mut transfers = Vec::with_capacity(raw.len());
        for log in raw {
            if let Some(transfer) = log.into_entry()?.as_transfer() {
                transfers.push(transfer);
            }
        }
        Ok(transfers)
    }
}

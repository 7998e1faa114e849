//! Scriptable in-memory chain.
//!
//! Simulates the token and marketplace contracts closely enough for the relayer,
//! the client flows and reconciliation: mints emit `Transfer` logs with
//! increasing token ids, approvals and base prices are remembered, and failures
//! can be injected per stage.

#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use ticketmint_core::abi;
use ticketmint_core::chain::{
    ChainError, ChainGateway, ChainResult, ContractCall, LogEntry, TransferLog, TxReceipt,
};
use ticketmint_core::types::{EthAmount, TokenId, TxHash, WalletAddress};

/// 1 ETH, the default balance of every account.
const DEFAULT_BALANCE_WEI: u128 = 1_000_000_000_000_000_000;

#[derive(Debug)]
struct ChainState {
    balances: HashMap<Address, u128>,
    gas_price: u128,
    gas_estimate: u64,
    next_token_id: u64,
    next_tx: u64,
    block: u64,
    sent: Vec<(ContractCall, Option<u64>)>,
    receipts: HashMap<TxHash, TxReceipt>,
    send_error: Option<String>,
    sends_before_failure: usize,
    estimate_error: Option<String>,
    reverting: Option<&'static str>,
    unconfirmed: bool,
    approvals: HashSet<(Address, Address)>,
    last_prices: HashMap<U256, U256>,
    mints: Vec<TransferLog>,
}

/// In-memory [`ChainGateway`] for one sending account.
#[derive(Debug)]
pub struct MockChain {
    account: Option<WalletAddress>,
    token_contract: Address,
    state: Mutex<ChainState>,
}

fn word_at(data: &[u8], index: usize) -> U256 {
    abi::decode_uint(data.get(4..).unwrap_or_default(), index).unwrap_or_default()
}

fn address_at(data: &[u8], index: usize) -> Address {
    Address::from_word(B256::from(word_at(data, index)))
}

impl MockChain {
    /// A chain where `account` sends transactions and `token_contract` mints tickets
    #[must_use]
    pub fn new(account: WalletAddress, token_contract: Address) -> Self {
        Self {
            account: Some(account),
            token_contract,
            state: Mutex::new(ChainState {
                balances: HashMap::new(),
                gas_price: 20_000_000_000,
                gas_estimate: 150_000,
                next_token_id: 1,
                next_tx: 1,
                block: 100,
                sent: Vec::new(),
                receipts: HashMap::new(),
                send_error: None,
                sends_before_failure: 0,
                estimate_error: None,
                reverting: None,
                unconfirmed: false,
                approvals: HashSet::new(),
                last_prices: HashMap::new(),
                mints: Vec::new(),
            }),
        }
    }

    /// Same chain with no connected account
    #[must_use]
    pub fn without_account(mut self) -> Self {
        self.account = None;
        self
    }

    /// Sets the balance of the sending account
    #[must_use]
    pub fn with_balance(self, balance: EthAmount) -> Self {
        if let Some(account) = self.account {
            self.set_balance(&account, balance);
        }
        self
    }

    /// Sets the gas price
    #[must_use]
    pub fn with_gas_price(self, wei: u128) -> Self {
        self.state.lock().unwrap().gas_price = wei;
        self
    }

    /// Sets the value returned by gas estimation
    #[must_use]
    pub fn with_gas_estimate(self, gas: u64) -> Self {
        self.state.lock().unwrap().gas_estimate = gas;
        self
    }

    /// First token id the token contract will assign
    #[must_use]
    pub fn with_next_token_id(self, id: u64) -> Self {
        self.state.lock().unwrap().next_token_id = id;
        self
    }

    /// Gas estimation fails with `message`
    #[must_use]
    pub fn failing_estimates(self, message: &str) -> Self {
        self.state.lock().unwrap().estimate_error = Some(message.to_string());
        self
    }

    /// Every submission after the first `successful` ones fails with `message`
    #[must_use]
    pub fn failing_sends_after(self, successful: usize, message: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.send_error = Some(message.to_string());
            state.sends_before_failure = successful;
        }
        self
    }

    /// Transactions calling `function` are mined but revert
    #[must_use]
    pub fn reverting(self, function: &'static str) -> Self {
        self.state.lock().unwrap().reverting = Some(function);
        self
    }

    /// Transactions are accepted but never mined
    #[must_use]
    pub fn never_confirming(self) -> Self {
        self.state.lock().unwrap().unconfirmed = true;
        self
    }

    /// Sets the balance of any address
    pub fn set_balance(&self, address: &WalletAddress, balance: EthAmount) {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert(*address.as_address(), balance.as_wei());
    }

    /// Records a marketplace approval as if `owner` had granted it earlier
    pub fn approve(&self, owner: &WalletAddress, operator: Address) {
        self.state
            .lock()
            .unwrap()
            .approvals
            .insert((*owner.as_address(), operator));
    }

    /// Mints a token on-chain without going through the relayer
    pub fn mint_out_of_band(&self, to: Address) -> TokenId {
        let mut state = self.state.lock().unwrap();
        let token_id = TokenId::new(state.next_token_id);
        state.next_token_id += 1;
        state.mints.push(TransferLog {
            from: Address::ZERO,
            to,
            token_id,
            transaction_hash: None,
        });
        token_id
    }

    /// Every submitted call, in order
    #[must_use]
    pub fn sent_calls(&self) -> Vec<ContractCall> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    /// Names of every submitted function, in order
    #[must_use]
    pub fn sent_functions(&self) -> Vec<&'static str> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|(call, _)| call.function)
            .collect()
    }

    /// Gas limits attached to submissions
    #[must_use]
    pub fn gas_limits(&self) -> Vec<Option<u64>> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|(_, gas)| *gas)
            .collect()
    }

    /// Base price recorded by the marketplace for a token
    #[must_use]
    pub fn recorded_price(&self, token_id: TokenId) -> Option<EthAmount> {
        self.state
            .lock()
            .unwrap()
            .last_prices
            .get(&token_id.as_u256())
            .and_then(|price| EthAmount::from_u256(*price))
    }

    fn apply(&self, state: &mut ChainState, call: &ContractCall) -> Vec<LogEntry> {
        let mut logs = Vec::new();
        match call.function {
            "mintNFT" if call.to == self.token_contract => {
                let to = address_at(&call.data, 0);
                let token_id = TokenId::new(state.next_token_id);
                state.next_token_id += 1;
                logs.push(LogEntry {
                    address: self.token_contract,
                    topics: vec![
                        abi::transfer_topic(),
                        Address::ZERO.into_word(),
                        to.into_word(),
                        B256::from(token_id.as_u256()),
                    ],
                    data: Vec::new(),
                    block_number: Some(state.block),
                    transaction_hash: None,
                });
            },
            "setApprovalForAll" => {
                if let Some(owner) = self.account {
                    let operator = address_at(&call.data, 0);
                    if word_at(&call.data, 1).is_zero() {
                        state.approvals.remove(&(*owner.as_address(), operator));
                    } else {
                        state.approvals.insert((*owner.as_address(), operator));
                    }
                }
            },
            "setInitialPrice" => {
                let token = word_at(&call.data, 1);
                let price = word_at(&call.data, 2);
                state.last_prices.insert(token, price);
            },
            "buy" => {
                let token = word_at(&call.data, 1);
                state.last_prices.insert(token, call.value);
            },
            _ => {},
        }
        logs
    }
}

#[async_trait]
impl ChainGateway for MockChain {
    fn account(&self) -> Option<WalletAddress> {
        self.account
    }

    async fn balance(&self, address: &WalletAddress) -> ChainResult<EthAmount> {
        let state = self.state.lock().unwrap();
        Ok(EthAmount::from_wei(
            state
                .balances
                .get(address.as_address())
                .copied()
                .unwrap_or(DEFAULT_BALANCE_WEI),
        ))
    }

    async fn gas_price(&self) -> ChainResult<u128> {
        Ok(self.state.lock().unwrap().gas_price)
    }

    async fn estimate_gas(&self, _call: &ContractCall) -> ChainResult<u64> {
        let state = self.state.lock().unwrap();
        match &state.estimate_error {
            Some(message) => Err(ChainError::Rpc(message.clone())),
            None => Ok(state.gas_estimate),
        }
    }

    async fn send_transaction(&self, call: &ContractCall, gas_limit: Option<u64>) -> ChainResult<TxHash> {
        if self.account.is_none() {
            return Err(ChainError::NotConfigured("Sending account"));
        }
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.send_error {
            if state.sent.len() >= state.sends_before_failure {
                return Err(ChainError::Rpc(message.clone()));
            }
        }

        state.sent.push((call.clone(), gas_limit));
        let tx = TxHash::new(B256::from(U256::from(state.next_tx)));
        state.next_tx += 1;
        state.block += 1;

        let success = state.reverting != Some(call.function);
        let mut logs = if success { self.apply(&mut state, call) } else { Vec::new() };
        for log in &mut logs {
            log.transaction_hash = Some(tx);
            if let Some(transfer) = log.as_transfer() {
                state.mints.push(transfer);
            }
        }

        if !state.unconfirmed {
            let receipt = TxReceipt {
                transaction_hash: tx,
                block_number: state.block,
                success,
                gas_used: state.gas_estimate,
                effective_gas_price: state.gas_price,
                logs,
            };
            state.receipts.insert(tx, receipt);
        }
        Ok(tx)
    }

    async fn wait_for_receipt(&self, tx: &TxHash, _timeout: Duration) -> ChainResult<TxReceipt> {
        self.state
            .lock()
            .unwrap()
            .receipts
            .get(tx)
            .cloned()
            .ok_or(ChainError::ConfirmationTimeout(*tx))
    }

    async fn call(&self, call: &ContractCall) -> ChainResult<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let word = match call.function {
            "isApprovedForAll" => {
                let owner = address_at(&call.data, 0);
                let operator = address_at(&call.data, 1);
                U256::from(u8::from(state.approvals.contains(&(owner, operator))))
            },
            "lastPricePaidWei" => state
                .last_prices
                .get(&word_at(&call.data, 1))
                .copied()
                .unwrap_or_default(),
            _ => U256::ZERO,
        };
        Ok(word.to_be_bytes::<32>().to_vec())
    }

    async fn transfer_logs(&self, contract: Address, _from_block: u64) -> ChainResult<Vec<TransferLog>> {
        if contract != self.token_contract {
            return Ok(Vec::new());
        }
        Ok(self.state.lock().unwrap().mints.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketmint_core::chain::{TokenContract, send_and_confirm};

    fn relayer() -> WalletAddress {
        WalletAddress::new(Address::repeat_byte(0x11))
    }

    #[tokio::test]
    async fn mint_emits_transfer_with_sequential_ids() {
        let token = TokenContract::new(Address::repeat_byte(0xaa));
        let chain = MockChain::new(relayer(), token.address).with_next_token_id(41);
        let buyer = WalletAddress::new(Address::repeat_byte(0x22));

        let receipt = send_and_confirm(&chain, &token.mint(&buyer, "ipfs://t"), Some(1), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(receipt.minted_token_ids(token.address), vec![TokenId::new(41)]);

        let logs = chain.transfer_logs(token.address, 0).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].to, *buyer.as_address());
    }

    #[tokio::test]
    async fn approval_is_remembered() {
        let token = TokenContract::new(Address::repeat_byte(0xaa));
        let operator = Address::repeat_byte(0xbb);
        let chain = MockChain::new(relayer(), token.address);

        let before = chain.call(&token.is_approved_for_all(&relayer(), operator)).await.unwrap();
        assert_eq!(abi::decode_bool(&before, 0), Some(false));

        send_and_confirm(&chain, &token.set_approval_for_all(operator, true), None, Duration::ZERO)
            .await
            .unwrap();
        let after = chain.call(&token.is_approved_for_all(&relayer(), operator)).await.unwrap();
        assert_eq!(abi::decode_bool(&after, 0), Some(true));
    }

    #[tokio::test]
    async fn injected_send_failure_applies_after_threshold() {
        let token = TokenContract::new(Address::repeat_byte(0xaa));
        let chain = MockChain::new(relayer(), token.address).failing_sends_after(1, "nonce too low");

        assert!(chain.send_transaction(&token.mint(&relayer(), "u"), None).await.is_ok());
        let second = chain.send_transaction(&token.mint(&relayer(), "u"), None).await;
        assert_eq!(second, Err(ChainError::Rpc("nonce too low".to_string())));
    }
}

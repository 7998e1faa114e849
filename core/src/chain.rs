//! Chain access seam.
//!
//! The token and marketplace contracts are opaque services with a fixed method
//! surface. [`ChainGateway`] is everything the application needs from a node on
//! behalf of one sending account: the relayer's funded account on the server,
//! or the user's own wallet in the client flows.

use crate::abi::{self, Token};
use crate::types::{EthAmount, TokenId, TxHash, WalletAddress};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a chain gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The node or signer returned an error, message kept verbatim
    #[error("{0}")]
    Rpc(String),

    /// Transaction was mined but reverted
    #[error("Transaction {0} reverted")]
    Reverted(TxHash),

    /// Transaction was not mined within the confirmation window
    #[error("Transaction {0} was not confirmed in time")]
    ConfirmationTimeout(TxHash),

    /// A response could not be decoded
    #[error("Could not decode chain response: {0}")]
    Decode(String),

    /// A contract address or account is missing from configuration
    #[error("{0} not configured")]
    NotConfigured(&'static str),
}

/// Result alias for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Deployed contract addresses. Either may be absent in a misconfigured deployment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAddresses {
    /// Ticket token contract
    pub token: Option<Address>,
    /// Resale marketplace contract
    pub marketplace: Option<Address>,
}

impl ContractAddresses {
    /// Both addresses, if configured
    #[must_use]
    pub fn both(&self) -> Option<(TokenContract, MarketplaceContract)> {
        Some((
            TokenContract::new(self.token?),
            MarketplaceContract::new(self.marketplace?),
        ))
    }
}

/// A prepared contract call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractCall {
    /// Contract
    pub to: Address,
    /// Selector and encoded arguments
    pub data: Vec<u8>,
    /// Native value attached (payable calls)
    pub value: U256,
    /// Function name, for logs
    pub function: &'static str,
}

impl ContractCall {
    fn new(to: Address, function: &'static str, signature: &str, args: &[Token]) -> Self {
        Self {
            to,
            data: abi::encode_call(signature, args),
            value: U256::ZERO,
            function,
        }
    }

    #[must_use]
    fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// Ticket token contract surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenContract {
    /// Deployed address
    pub address: Address,
}

impl TokenContract {
    /// Wraps a deployed address
    #[must_use]
    pub const fn new(address: Address) -> Self {
        Self { address }
    }

    /// `mintNFT(address to, string uri)`
    #[must_use]
    pub fn mint(&self, to: &WalletAddress, metadata_uri: &str) -> ContractCall {
        ContractCall::new(
            self.address,
            "mintNFT",
            "mintNFT(address,string)",
            &[Token::Address(*to.as_address()), Token::String(metadata_uri.to_string())],
        )
    }

    /// `isApprovedForAll(address owner, address operator)`
    #[must_use]
    pub fn is_approved_for_all(&self, owner: &WalletAddress, operator: Address) -> ContractCall {
        ContractCall::new(
            self.address,
            "isApprovedForAll",
            "isApprovedForAll(address,address)",
            &[Token::Address(*owner.as_address()), Token::Address(operator)],
        )
    }

    /// `setApprovalForAll(address operator, bool approved)`
    #[must_use]
    pub fn set_approval_for_all(&self, operator: Address, approved: bool) -> ContractCall {
        ContractCall::new(
            self.address,
            "setApprovalForAll",
            "setApprovalForAll(address,bool)",
            &[Token::Address(operator), Token::Bool(approved)],
        )
    }
}

/// Resale marketplace contract surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarketplaceContract {
    /// Deployed address
    pub address: Address,
}

impl MarketplaceContract {
    /// Wraps a deployed address
    #[must_use]
    pub const fn new(address: Address) -> Self {
        Self { address }
    }

    /// `list(address nft, uint256 tokenId, uint256 priceWei)`
    #[must_use]
    pub fn list(&self, nft: Address, token_id: TokenId, price: EthAmount) -> ContractCall {
        ContractCall::new(
            self.address,
            "list",
            "list(address,uint256,uint256)",
            &[Token::Address(nft), Token::Uint(token_id.as_u256()), Token::Uint(price.as_u256())],
        )
    }

    /// `buy(address nft, uint256 tokenId)`, paying `price`
    #[must_use]
    pub fn buy(&self, nft: Address, token_id: TokenId, price: EthAmount) -> ContractCall {
        ContractCall::new(
            self.address,
            "buy",
            "buy(address,uint256)",
            &[Token::Address(nft), Token::Uint(token_id.as_u256())],
        )
        .with_value(price.as_u256())
    }

    /// `cancel(address nft, uint256 tokenId)`
    #[must_use]
    pub fn cancel(&self, nft: Address, token_id: TokenId) -> ContractCall {
        ContractCall::new(
            self.address,
            "cancel",
            "cancel(address,uint256)",
            &[Token::Address(nft), Token::Uint(token_id.as_u256())],
        )
    }

    /// `setInitialPrice(address nft, uint256 tokenId, uint256 priceWei)`
    #[must_use]
    pub fn set_initial_price(&self, nft: Address, token_id: TokenId, price: EthAmount) -> ContractCall {
        ContractCall::new(
            self.address,
            "setInitialPrice",
            "setInitialPrice(address,uint256,uint256)",
            &[Token::Address(nft), Token::Uint(token_id.as_u256()), Token::Uint(price.as_u256())],
        )
    }

    /// `lastPricePaidWei(address nft, uint256 tokenId)` view
    #[must_use]
    pub fn last_price_paid(&self, nft: Address, token_id: TokenId) -> ContractCall {
        ContractCall::new(
            self.address,
            "lastPricePaidWei",
            "lastPricePaidWei(address,uint256)",
            &[Token::Address(nft), Token::Uint(token_id.as_u256())],
        )
    }
}

/// A log entry emitted by a mined transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Emitting contract
    pub address: Address,
    /// Indexed topics, event signature first
    pub topics: Vec<B256>,
    /// Non-indexed data
    #[serde(default)]
    pub data: Vec<u8>,
    /// Block the log was mined in
    #[serde(default)]
    pub block_number: Option<u64>,
    /// Transaction that emitted the log
    #[serde(default)]
    pub transaction_hash: Option<TxHash>,
}

/// A decoded ERC-721 `Transfer` log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferLog {
    /// Previous owner, zero for mints
    pub from: Address,
    /// New owner
    pub to: Address,
    /// Token
    pub token_id: TokenId,
    /// Emitting transaction
    pub transaction_hash: Option<TxHash>,
}

impl LogEntry {
    /// Decodes this log as an ERC-721 transfer (three indexed arguments).
    #[must_use]
    pub fn as_transfer(&self) -> Option<TransferLog> {
        if self.topics.len() != 4 || self.topics[0] != abi::transfer_topic() {
            return None;
        }
        Some(TransferLog {
            from: abi::topic_address(&self.topics[1]),
            to: abi::topic_address(&self.topics[2]),
            token_id: TokenId::from_u256(U256::from_be_bytes(self.topics[3].0))?,
            transaction_hash: self.transaction_hash,
        })
    }
}

impl TransferLog {
    /// Whether the transfer created the token
    #[must_use]
    pub fn is_mint(&self) -> bool {
        self.from == Address::ZERO
    }
}

/// Receipt of a mined transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    /// Transaction
    pub transaction_hash: TxHash,
    /// Inclusion block
    pub block_number: u64,
    /// `true` when execution succeeded
    pub success: bool,
    /// Gas consumed
    pub gas_used: u64,
    /// Effective gas price paid, in wei
    pub effective_gas_price: u128,
    /// Emitted logs
    pub logs: Vec<LogEntry>,
}

impl TxReceipt {
    /// Ids of tokens minted by `contract` in this transaction, in log order
    #[must_use]
    pub fn minted_token_ids(&self, contract: Address) -> Vec<TokenId> {
        self.logs
            .iter()
            .filter(|log| log.address == contract)
            .filter_map(LogEntry::as_transfer)
            .filter(TransferLog::is_mint)
            .map(|transfer| transfer.token_id)
            .collect()
    }

    /// Gas cost actually paid
    #[must_use]
    pub fn gas_cost(&self) -> EthAmount {
        EthAmount::from_wei(u128::from(self.gas_used).saturating_mul(self.effective_gas_price))
    }
}

/// Chain operations on behalf of a single sending account.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// The account transactions are sent from, if one is connected
    fn account(&self) -> Option<WalletAddress>;

    /// Native balance of `address`
    async fn balance(&self, address: &WalletAddress) -> ChainResult<EthAmount>;

    /// Current gas price in wei
    async fn gas_price(&self) -> ChainResult<u128>;

    /// Gas estimate for sending `call` from [`ChainGateway::account`]
    async fn estimate_gas(&self, call: &ContractCall) -> ChainResult<u64>;

    /// Submits `call` with an explicit gas limit and returns its hash
    async fn send_transaction(&self, call: &ContractCall, gas_limit: Option<u64>) -> ChainResult<TxHash>;

    /// Waits until `tx` is mined. Reverted transactions are returned with `success = false`.
    async fn wait_for_receipt(&self, tx: &TxHash, timeout: Duration) -> ChainResult<TxReceipt>;

    /// Read-only call returning raw output
    async fn call(&self, call: &ContractCall) -> ChainResult<Vec<u8>>;

    /// `Transfer` logs emitted by `contract` from `from_block` onward
    async fn transfer_logs(&self, contract: Address, from_block: u64) -> ChainResult<Vec<TransferLog>>;
}

/// Send, wait and require success.
///
/// # Errors
///
/// Propagates gateway errors and maps a reverted receipt to [`ChainError::Reverted`].
pub async fn send_and_confirm(
    chain: &dyn ChainGateway,
    call: &ContractCall,
    gas_limit: Option<u64>,
    timeout: Duration,
) -> ChainResult<TxReceipt> {
    let tx = chain.send_transaction(call, gas_limit).await?;
    let receipt = chain.wait_for_receipt(&tx, timeout).await?;
    if receipt.success {
        Ok(receipt)
    } else {
        Err(ChainError::Reverted(tx))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn transfer_log(contract: Address, from: Address, token: u64) -> LogEntry {
        LogEntry {
            address: contract,
            topics: vec![
                abi::transfer_topic(),
                from.into_word(),
                Address::repeat_byte(0x22).into_word(),
                B256::from(U256::from(token)),
            ],
            data: Vec::new(),
            block_number: Some(1),
            transaction_hash: None,
        }
    }

    #[test]
    fn minted_token_ids_only_counts_mints_from_the_token_contract() {
        let token = Address::repeat_byte(0xaa);
        let receipt = TxReceipt {
            transaction_hash: TxHash::new(B256::repeat_byte(1)),
            block_number: 10,
            success: true,
            gas_used: 100_000,
            effective_gas_price: 20_000_000_000,
            logs: vec![
                transfer_log(token, Address::ZERO, 5),
                transfer_log(token, Address::repeat_byte(0x33), 6),
                transfer_log(Address::repeat_byte(0xbb), Address::ZERO, 7),
            ],
        };
        assert_eq!(receipt.minted_token_ids(token), vec![TokenId::new(5)]);
        assert_eq!(receipt.gas_cost().to_eth_string(), "0.002");
    }

    #[test]
    fn buy_attaches_price_as_value() {
        let market = MarketplaceContract::new(Address::repeat_byte(0x01));
        let price = EthAmount::from_eth_str("0.5").unwrap();
        let call = market.buy(Address::repeat_byte(0x02), TokenId::new(3), price);
        assert_eq!(call.value, price.as_u256());
        assert_eq!(call.data[..4], abi::selector("buy(address,uint256)"));
        assert_eq!(call.data.len(), 4 + 64);
    }

    #[test]
    fn contracts_require_both_addresses() {
        let partial = ContractAddresses {
            token: Some(Address::repeat_byte(1)),
            marketplace: None,
        };
        assert!(partial.both().is_none());
    }
}

//! Minimal contract ABI encoding for the token and marketplace surfaces.
//!
//! Only the argument kinds those contracts use are supported: addresses,
//! unsigned 256-bit integers, booleans and a single kind of dynamic value,
//! strings.

use alloy_primitives::{Address, B256, U256, keccak256};

/// Argument to a contract function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    /// `address`
    Address(Address),
    /// `uint256`
    Uint(U256),
    /// `bool`
    Bool(bool),
    /// `string`
    String(String),
}

/// First four bytes of the keccak hash of a canonical signature.
#[must_use]
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Topic hash of an event signature.
#[must_use]
pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

/// ERC-721 `Transfer(address,address,uint256)` topic.
#[must_use]
pub fn transfer_topic() -> B256 {
    event_topic("Transfer(address,address,uint256)")
}

fn uint_word(value: U256) -> [u8; 32] {
    value.to_be_bytes::<32>()
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(32) * 32
}

/// Encodes the arguments as the ABI head/tail layout, without a selector.
#[must_use]
pub fn encode_args(args: &[Token]) -> Vec<u8> {
    let head_size = args.len() * 32;
    let mut head = Vec::with_capacity(head_size);
    let mut tail = Vec::new();

    for arg in args {
        match arg {
            Token::Address(address) => head.extend_from_slice(address.into_word().as_slice()),
            Token::Uint(value) => head.extend_from_slice(&uint_word(*value)),
            Token::Bool(flag) => head.extend_from_slice(&uint_word(U256::from(u8::from(*flag)))),
            Token::String(text) => {
                let offset = head_size + tail.len();
                head.extend_from_slice(&uint_word(U256::from(offset)));
                let bytes = text.as_bytes();
                tail.extend_from_slice(&uint_word(U256::from(bytes.len())));
                let start = tail.len();
                tail.extend_from_slice(bytes);
                tail.resize(start + padded_len(bytes.len()), 0);
            },
        }
    }

    head.extend_from_slice(&tail);
    head
}

/// Encodes a full call: selector followed by arguments.
#[must_use]
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&encode_args(args));
    data
}

/// Reads the `index`-th 32-byte word as an unsigned integer.
#[must_use]
pub fn decode_uint(data: &[u8], index: usize) -> Option<U256> {
    let start = index.checked_mul(32)?;
    let word = data.get(start..start + 32)?;
    Some(U256::from_be_slice(word))
}

/// Reads the `index`-th word as a boolean.
#[must_use]
pub fn decode_bool(data: &[u8], index: usize) -> Option<bool> {
    decode_uint(data, index).map(|value| !value.is_zero())
}

/// Interprets a 32-byte topic as a left-padded address.
#[must_use]
pub fn topic_address(topic: &B256) -> Address {
    Address::from_word(*topic)
}

//! Identifiers, addresses and money types.
//!
//! Amounts are integers in their smallest unit (wei, cents) and only become
//! decimals at the JSON boundary. ETH goes out as an exact decimal string
//! (`"0.05"`) since wei does not fit an `f64`; USD goes out as a plain number
//! (`49.99`). Both accept either form on the way in.

use crate::validation::ValidationError;
use alloy_primitives::utils::{format_ether, parse_ether};
use alloy_primitives::{Address, B256, U256, hex};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a user
    UserId
);
uuid_id!(
    /// Unique identifier for an event
    EventId
);
uuid_id!(
    /// Unique identifier for a ticket row
    TicketId
);
uuid_id!(
    /// Unique identifier for a marketplace listing
    ListingId
);
uuid_id!(
    /// Unique identifier for a purchase history row
    PurchaseId
);

// ============================================================================
// Chain values
// ============================================================================

/// A wallet address, always rendered lower-cased.
///
/// Users are keyed by this value, so two spellings of the same address
/// (checksummed or not) must collapse to one record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WalletAddress(Address);

impl WalletAddress {
    /// Wraps a raw address
    #[must_use]
    pub const fn new(address: Address) -> Self {
        Self(address)
    }

    /// Parses a `0x`-prefixed, 40 hex digit address. Checksum casing is not required.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidAddress`] for anything else.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or(ValidationError::InvalidAddress)?;
        if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::InvalidAddress);
        }
        Address::from_str(digits)
            .map(Self)
            .map_err(|_| ValidationError::InvalidAddress)
    }

    /// The underlying address
    #[must_use]
    pub const fn as_address(&self) -> &Address {
        &self.0
    }

    /// First eight characters followed by an ellipsis, used as a default display name
    #[must_use]
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}...", &full[..8])
    }

    /// Whether this is the zero address
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == Address::ZERO
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_prefixed(self.0.as_slice()))
    }
}

impl FromStr for WalletAddress {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Address> for WalletAddress {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl Serialize for WalletAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for WalletAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(de::Error::custom)
    }
}

/// Token id assigned by the minting contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(u64);

impl TokenId {
    /// Creates a token id
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric value
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// As a 256-bit ABI word value
    #[must_use]
    pub fn as_u256(&self) -> U256 {
        U256::from(self.0)
    }

    /// Narrows a 256-bit word, failing when it does not fit
    #[must_use]
    pub fn from_u256(value: U256) -> Option<Self> {
        u64::try_from(value).ok().map(Self)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction hash, rendered as lower-case `0x`-prefixed hex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TxHash(B256);

impl TxHash {
    /// Wraps a raw hash
    #[must_use]
    pub const fn new(hash: B256) -> Self {
        Self(hash)
    }

    /// The raw hash
    #[must_use]
    pub const fn as_b256(&self) -> &B256 {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_prefixed(self.0.as_slice()))
    }
}

impl FromStr for TxHash {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .trim()
            .strip_prefix("0x")
            .ok_or(ValidationError::InvalidTransactionHash)?;
        if digits.len() != 64 {
            return Err(ValidationError::InvalidTransactionHash);
        }
        B256::from_str(digits)
            .map(Self)
            .map_err(|_| ValidationError::InvalidTransactionHash)
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

// ============================================================================
// Money
// ============================================================================

/// Accepts either a JSON number or a numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

/// An amount of the chain's native currency, held in wei.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EthAmount(u128);

impl EthAmount {
    /// Zero ETH
    pub const ZERO: Self = Self(0);

    /// Creates an amount from wei
    #[must_use]
    pub const fn from_wei(wei: u128) -> Self {
        Self(wei)
    }

    /// Amount in wei
    #[must_use]
    pub const fn as_wei(&self) -> u128 {
        self.0
    }

    /// Amount as a 256-bit word for contract calls
    #[must_use]
    pub fn as_u256(&self) -> U256 {
        U256::from(self.0)
    }

    /// Narrows a 256-bit value
    #[must_use]
    pub fn from_u256(value: U256) -> Option<Self> {
        u128::try_from(value).ok().map(Self)
    }

    /// Parses a decimal ETH string such as `"0.05"`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidAmount`] for negative, malformed or
    /// over-precise (more than 18 decimals) input.
    pub fn from_eth_str(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.starts_with('-') {
            return Err(ValidationError::InvalidAmount(input.to_string()));
        }
        let wei = parse_ether(trimmed).map_err(|_| ValidationError::InvalidAmount(input.to_string()))?;
        Self::from_u256(wei).ok_or_else(|| ValidationError::InvalidAmount(input.to_string()))
    }

    /// Converts a floating-point ETH value.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidAmount`] for negative or non-finite input.
    pub fn from_eth_f64(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() || value < 0.0 {
            return Err(ValidationError::InvalidAmount(value.to_string()));
        }
        Self::from_eth_str(&value.to_string())
    }

    /// Decimal ETH string with trailing zeros removed (`"0.05"`, `"1"`)
    #[must_use]
    pub fn to_eth_string(&self) -> String {
        let formatted = format_ether(self.as_u256());
        if formatted.contains('.') {
            formatted
                .trim_end_matches('0')
                .trim_end_matches('.')
                .to_string()
        } else {
            formatted
        }
    }

    /// Whether the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked multiplication by a whole number
    #[must_use]
    pub fn checked_mul(&self, factor: u128) -> Option<Self> {
        self.0.checked_mul(factor).map(Self)
    }

    /// Checked addition
    #[must_use]
    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }
}

impl fmt::Display for EthAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ETH", self.to_eth_string())
    }
}

impl Serialize for EthAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_eth_string())
    }
}

impl<'de> Deserialize<'de> for EthAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match NumberOrText::deserialize(deserializer)? {
            NumberOrText::Number(value) => Self::from_eth_f64(value).map_err(de::Error::custom),
            NumberOrText::Text(text) => Self::from_eth_str(&text).map_err(de::Error::custom),
        }
    }
}

/// A US dollar amount in cents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UsdAmount(i64);

impl UsdAmount {
    /// Creates an amount from cents
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Amount in cents
    #[must_use]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Converts a dollar value, rounding to the nearest cent.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidAmount`] for negative or non-finite input.
    #[allow(clippy::cast_possible_truncation)] // rounded and range-checked above
    pub fn from_dollars(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() || value < 0.0 || value > 1e15 {
            return Err(ValidationError::InvalidAmount(value.to_string()));
        }
        Ok(Self((value * 100.0).round() as i64))
    }

    /// Dollar value, for JSON output
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // cents stay far below 2^52
    pub fn dollars(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Checked multiplication by a whole number
    #[must_use]
    pub fn checked_mul(&self, factor: i64) -> Option<Self> {
        self.0.checked_mul(factor).map(Self)
    }

    /// Checked addition
    #[must_use]
    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }
}

impl fmt::Display for UsdAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for UsdAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.dollars())
    }
}

impl<'de> Deserialize<'de> for UsdAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = match NumberOrText::deserialize(deserializer)? {
            NumberOrText::Number(value) => value,
            NumberOrText::Text(text) => text.trim().parse().map_err(de::Error::custom)?,
        };
        Self::from_dollars(value).map_err(de::Error::custom)
    }
}

// ============================================================================
// Enumerations
// ============================================================================

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Database / wire representation
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            /// Parses the database representation.
            ///
            /// # Errors
            ///
            /// Returns [`ValidationError::UnknownValue`] for unknown strings.
            pub fn parse(s: &str) -> Result<Self, ValidationError> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ValidationError::UnknownValue {
                        kind: stringify!($name),
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    /// How a user authenticated
    LoginMethod {
        /// Self-custodied browser extension wallet
        Metamask => "metamask",
        /// Custodial wallet via email
        MagicEmail => "magic_email",
        /// Custodial wallet via phone
        MagicPhone => "magic_phone",
        /// Custodial wallet via social login
        MagicSocial => "magic_social",
    }
);

string_enum!(
    /// Status of a marketplace listing; only `Active` can change
    ListingStatus {
        /// Open for purchase
        Active => "active",
        /// Bought by another user
        Sold => "sold",
        /// Withdrawn by the seller
        Cancelled => "cancelled",
    }
);

string_enum!(
    /// Status of a purchase attempt
    PurchaseStatus {
        /// Started, not yet settled
        Pending => "pending",
        /// Ticket minted and recorded
        Completed => "completed",
        /// Failed before completion
        Failed => "failed",
    }
);

string_enum!(
    /// QR-based alternative payment providers
    AltPaymentProvider {
        /// Alipay
        Alipay => "alipay",
        /// WeChat Pay
        Wechat => "wechat",
        /// Apple Pay (listed but not available)
        ApplePay => "apple_pay",
    }
);

impl AltPaymentProvider {
    /// Whether the provider can currently be selected
    #[must_use]
    pub const fn is_available(&self) -> bool {
        !matches!(self, Self::ApplePay)
    }
}

/// Payment method chosen at checkout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Paid from the user's wallet
    Crypto,
    /// Simulated card payment
    #[serde(alias = "card")]
    Fiat,
    /// Simulated QR alternative payment
    #[serde(alias = "other")]
    AltQr,
}

impl PaymentMethod {
    /// Representation stored on ticket rows: alternative payments settle as fiat
    #[must_use]
    pub const fn ticket_label(&self) -> &'static str {
        match self {
            Self::Crypto => "crypto",
            Self::Fiat | Self::AltQr => "fiat",
        }
    }

    /// Representation stored on purchase history rows
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Crypto => "crypto",
            Self::Fiat => "fiat",
            Self::AltQr => "alt_qr",
        }
    }

    /// Parses a stored or wire representation.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownValue`] for unknown strings.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "crypto" => Ok(Self::Crypto),
            "fiat" | "card" => Ok(Self::Fiat),
            "alt_qr" | "other" => Ok(Self::AltQr),
            _ => Err(ValidationError::UnknownValue {
                kind: "PaymentMethod",
                value: s.to_string(),
            }),
        }
    }

    /// Login method recorded for a user created through a purchase
    #[must_use]
    pub const fn implied_login_method(&self) -> LoginMethod {
        match self {
            Self::Crypto => LoginMethod::Metamask,
            Self::Fiat | Self::AltQr => LoginMethod::MagicEmail,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn wallet_address_is_lower_cased() {
        let address = WalletAddress::parse("0xAbCdEf0123456789aBcDeF0123456789ABCDEF01").unwrap();
        assert_eq!(address.to_string(), "0xabcdef0123456789abcdef0123456789abcdef01");
        assert_eq!(address.short(), "0xabcdef...");
    }

    #[test]
    fn wallet_address_rejects_malformed_input() {
        assert!(WalletAddress::parse("abcdef0123456789abcdef0123456789abcdef01").is_err());
        assert!(WalletAddress::parse("0x1234").is_err());
        assert!(WalletAddress::parse("0xZZcdef0123456789abcdef0123456789abcdef01").is_err());
        assert!(WalletAddress::parse("").is_err());
    }

    #[test]
    fn eth_amount_parses_and_formats_decimals() {
        let amount = EthAmount::from_eth_str("0.05").unwrap();
        assert_eq!(amount.as_wei(), 50_000_000_000_000_000);
        assert_eq!(amount.to_eth_string(), "0.05");
        assert_eq!(EthAmount::from_eth_str("2").unwrap().to_eth_string(), "2");
        assert!(EthAmount::from_eth_str("-1").is_err());
        assert!(EthAmount::from_eth_str("abc").is_err());
    }

    #[test]
    fn eth_amount_json_accepts_numbers_and_strings() {
        let from_number: EthAmount = serde_json::from_str("0.1").unwrap();
        let from_text: EthAmount = serde_json::from_str("\"0.1\"").unwrap();
        assert_eq!(from_number, from_text);
        assert_eq!(serde_json::to_string(&from_number).unwrap(), "\"0.1\"");
    }

    #[test]
    fn eth_amount_json_keeps_every_wei() {
        let cap = EthAmount::from_wei(123_456_789_012_345_678);
        let wire = serde_json::to_string(&cap).unwrap();
        assert_eq!(wire, "\"0.123456789012345678\"");
        let back: EthAmount = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, cap);
    }

    #[test]
    fn usd_amount_rounds_to_cents() {
        let amount: UsdAmount = serde_json::from_str("49.99").unwrap();
        assert_eq!(amount.cents(), 4999);
        assert_eq!(amount.to_string(), "$49.99");
    }

    #[test]
    fn payment_method_accepts_legacy_aliases() {
        let card: PaymentMethod = serde_json::from_str("\"card\"").unwrap();
        let other: PaymentMethod = serde_json::from_str("\"other\"").unwrap();
        assert_eq!(card, PaymentMethod::Fiat);
        assert_eq!(other, PaymentMethod::AltQr);
        assert_eq!(other.ticket_label(), "fiat");
        assert_eq!(PaymentMethod::Crypto.implied_login_method(), LoginMethod::Metamask);
    }

    #[test]
    fn listing_status_parses_database_strings() {
        assert_eq!(ListingStatus::parse("sold").unwrap(), ListingStatus::Sold);
        assert!(ListingStatus::parse("pending").is_err());
    }

    #[test]
    fn tx_hash_requires_full_length() {
        let hash: TxHash = "0xAB00000000000000000000000000000000000000000000000000000000000001"
            .parse()
            .unwrap();
        assert!(hash.to_string().starts_with("0xab"));
        assert!("0x1234".parse::<TxHash>().is_err());
    }

    proptest! {
        #[test]
        fn any_address_normalises_to_one_form(bytes in proptest::array::uniform20(any::<u8>())) {
            let address = Address::from(bytes);
            let upper = format!("0x{}", hex::encode(address.as_slice()).to_uppercase());
            let lower = format!("0x{}", hex::encode(address.as_slice()));
            let a = WalletAddress::parse(&upper).unwrap();
            let b = WalletAddress::parse(&lower).unwrap();
            prop_assert_eq!(a, b);
            prop_assert_eq!(a.to_string(), lower);
        }

        #[test]
        fn wei_survives_eth_string_round_trip(wei in 0u128..10u128.pow(24)) {
            let amount = EthAmount::from_wei(wei);
            prop_assert_eq!(EthAmount::from_eth_str(&amount.to_eth_string()).unwrap(), amount);
        }
    }
}

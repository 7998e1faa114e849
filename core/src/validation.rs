//! Input validation shared by the client flows and the HTTP API.

use crate::types::EthAmount;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest number of tickets a single purchase may request.
pub const MAX_QUANTITY: u32 = 10;

/// Validation failures. Display strings are shown to users verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Malformed wallet address
    #[error("Invalid user address")]
    InvalidAddress,

    /// Malformed transaction hash
    #[error("Invalid transaction hash")]
    InvalidTransactionHash,

    /// Malformed or negative amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Unknown enumeration value
    #[error("Unknown {kind}: {value}")]
    UnknownValue {
        /// Enumeration name
        kind: &'static str,
        /// Offending input
        value: String,
    },

    /// One or more required request fields are absent
    #[error("Missing fields")]
    MissingFields,

    /// Quantity outside `1..=10`
    #[error("Quantity must be between 1 and {MAX_QUANTITY}")]
    InvalidQuantity,

    /// Card number fails length or Luhn check
    #[error("Invalid card number")]
    InvalidCardNumber,

    /// Expiry malformed or in the past
    #[error("Invalid or expired card expiry date")]
    InvalidExpiry,

    /// Security code malformed
    #[error("Invalid security code")]
    InvalidCvc,

    /// Cardholder name too short
    #[error("Please enter the name on the card")]
    InvalidCardholder,

    /// Listing price is zero or not a number
    #[error("Please enter a valid price")]
    NonPositivePrice,

    /// Listing price above twice the ticket's best-known price
    #[error("Price cannot exceed {cap} (2x the last purchase price)")]
    PriceAboveCap {
        /// Highest accepted price
        cap: EthAmount,
    },
}

/// Luhn checksum over a string of ASCII digits.
#[must_use]
pub fn luhn_valid(digits: &str) -> bool {
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(index, byte)| {
            let digit = u32::from(byte - b'0');
            if index % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                digit
            }
        })
        .sum();
    sum % 10 == 0
}

/// Strips spaces and dashes, then requires 13–19 digits passing Luhn.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidCardNumber`].
pub fn validate_card_number(input: &str) -> Result<String, ValidationError> {
    let digits: String = input.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
    if !(13..=19).contains(&digits.len()) || !luhn_valid(&digits) {
        return Err(ValidationError::InvalidCardNumber);
    }
    Ok(digits)
}

/// `MM/YY`, month 1–12, not before the month containing `today`.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidExpiry`].
pub fn validate_expiry(input: &str, today: NaiveDate) -> Result<(u32, i32), ValidationError> {
    let (month, year) = input
        .trim()
        .split_once('/')
        .ok_or(ValidationError::InvalidExpiry)?;
    if month.len() != 2 || year.len() != 2 {
        return Err(ValidationError::InvalidExpiry);
    }
    let month: u32 = month.parse().map_err(|_| ValidationError::InvalidExpiry)?;
    let year: i32 = year.parse().map_err(|_| ValidationError::InvalidExpiry)?;
    if !(1..=12).contains(&month) {
        return Err(ValidationError::InvalidExpiry);
    }
    let year = 2000 + year;
    if (year, month) < (today.year(), today.month()) {
        return Err(ValidationError::InvalidExpiry);
    }
    Ok((month, year))
}

/// Three or four digits.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidCvc`].
pub fn validate_cvc(input: &str) -> Result<(), ValidationError> {
    let trimmed = input.trim();
    if (3..=4).contains(&trimmed.len()) && trimmed.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidCvc)
    }
}

/// At least two characters after trimming.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidCardholder`].
pub fn validate_cardholder(input: &str) -> Result<(), ValidationError> {
    if input.trim().chars().count() >= 2 {
        Ok(())
    } else {
        Err(ValidationError::InvalidCardholder)
    }
}

/// Card form fields as entered in the simulated card checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDetails {
    /// Card number, spaces allowed
    pub number: String,
    /// `MM/YY`
    pub expiry: String,
    /// Security code
    pub cvc: String,
    /// Name on card
    pub name: String,
}

impl CardDetails {
    /// Validates every field, reporting the first failure in form order.
    ///
    /// # Errors
    ///
    /// Returns the first failing field's [`ValidationError`].
    pub fn validate(&self, today: NaiveDate) -> Result<(), ValidationError> {
        validate_card_number(&self.number)?;
        validate_expiry(&self.expiry, today)?;
        validate_cvc(&self.cvc)?;
        validate_cardholder(&self.name)
    }
}

/// Purchase quantity must be within `1..=10`.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidQuantity`].
pub const fn validate_quantity(quantity: u32) -> Result<u32, ValidationError> {
    if quantity >= 1 && quantity <= MAX_QUANTITY {
        Ok(quantity)
    } else {
        Err(ValidationError::InvalidQuantity)
    }
}

/// Resale price ceiling: twice the base price. A zero base means no ceiling.
///
/// # Errors
///
/// [`ValidationError::NonPositivePrice`] for a zero price and
/// [`ValidationError::PriceAboveCap`] above `2 × base`.
pub fn check_listing_price(price: EthAmount, base: EthAmount) -> Result<(), ValidationError> {
    if price.is_zero() {
        return Err(ValidationError::NonPositivePrice);
    }
    if base.is_zero() {
        return Ok(());
    }
    let cap = base.checked_mul(2).unwrap_or(EthAmount::from_wei(u128::MAX));
    if price > cap {
        return Err(ValidationError::PriceAboveCap { cap });
    }
    Ok(())
}

/// Fails with "Missing fields" when any value is absent or blank.
///
/// # Errors
///
/// Returns [`ValidationError::MissingFields`].
pub fn require_fields(fields: &[Option<&str>]) -> Result<(), ValidationError> {
    if fields
        .iter()
        .all(|field| field.is_some_and(|value| !value.trim().is_empty()))
    {
        Ok(())
    } else {
        Err(ValidationError::MissingFields)
    }
}

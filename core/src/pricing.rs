//! Purchase totals and simulated payment timings.

use crate::types::{AltPaymentProvider, EthAmount, EventId, PaymentMethod, UsdAmount, WalletAddress};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Flat service fee in cents added to fiat totals.
pub const SERVICE_FEE_USD_CENTS: i64 = 600;

/// Flat service fee in wei added to crypto totals (0.002 ETH).
pub const SERVICE_FEE_WEI: u128 = 2_000_000_000_000_000;

/// Wall-clock limit for a purchase from authorization to recorded ticket.
pub const PURCHASE_TIMEOUT: Duration = Duration::from_secs(30);

/// Simulated authorization delay per payment method.
#[must_use]
pub const fn authorization_delay(method: PaymentMethod) -> Duration {
    match method {
        PaymentMethod::Fiat => Duration::from_secs(2),
        PaymentMethod::Crypto | PaymentMethod::AltQr => Duration::from_secs(1),
    }
}

/// Checkout totals for a quantity of tickets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseSummary {
    /// Tickets
    pub quantity: u32,
    /// Fiat subtotal
    pub subtotal_usd: UsdAmount,
    /// Fiat total including fee
    pub total_usd: UsdAmount,
    /// Native subtotal
    pub subtotal_eth: EthAmount,
    /// Native total including fee
    pub total_eth: EthAmount,
}

impl PurchaseSummary {
    /// Computes totals. Returns `None` on arithmetic overflow.
    #[must_use]
    pub fn compute(price_usd: UsdAmount, price_eth: EthAmount, quantity: u32) -> Option<Self> {
        let subtotal_usd = price_usd.checked_mul(i64::from(quantity))?;
        let subtotal_eth = price_eth.checked_mul(u128::from(quantity))?;
        Some(Self {
            quantity,
            subtotal_usd,
            total_usd: subtotal_usd.checked_add(UsdAmount::from_cents(SERVICE_FEE_USD_CENTS))?,
            subtotal_eth,
            total_eth: subtotal_eth.checked_add(EthAmount::from_wei(SERVICE_FEE_WEI))?,
        })
    }
}

/// Payload encoded into the QR code shown for alternative payments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AltPaymentPayload {
    /// Always `PAYMENT_QR`
    #[serde(rename = "type")]
    pub kind: String,
    /// Provider
    pub method: AltPaymentProvider,
    /// Total in dollars, fee included
    pub amount_usd: UsdAmount,
    /// Event
    pub event_id: EventId,
    /// Event title
    pub event_name: String,
    /// Receiving wallet
    pub to_wallet: WalletAddress,
    /// Creation time in epoch milliseconds
    pub ts: i64,
}

impl AltPaymentPayload {
    /// Builds the QR payload for `quantity` tickets.
    #[must_use]
    pub fn new(
        method: AltPaymentProvider,
        summary: &PurchaseSummary,
        event_id: EventId,
        event_name: impl Into<String>,
        to_wallet: WalletAddress,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: "PAYMENT_QR".to_string(),
            method,
            amount_usd: summary.total_usd,
            event_id,
            event_name: event_name.into(),
            to_wallet,
            ts: now.timestamp_millis(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn totals_include_flat_fee() {
        let summary = PurchaseSummary::compute(
            UsdAmount::from_cents(5000),
            EthAmount::from_eth_str("0.02").unwrap(),
            3,
        )
        .unwrap();
        assert_eq!(summary.total_usd.cents(), 15_600);
        assert_eq!(summary.total_eth.to_eth_string(), "0.062");
    }

    #[test]
    fn card_authorizes_slower_than_crypto() {
        assert_eq!(authorization_delay(PaymentMethod::Fiat), Duration::from_secs(2));
        assert_eq!(authorization_delay(PaymentMethod::Crypto), Duration::from_secs(1));
    }

    #[test]
    fn alt_payment_payload_shape() {
        let summary = PurchaseSummary::compute(UsdAmount::from_cents(1000), EthAmount::ZERO, 2).unwrap();
        let payload = AltPaymentPayload::new(
            AltPaymentProvider::Alipay,
            &summary,
            EventId::new(),
            "DeFi Developer Conference",
            WalletAddress::parse("0x1234567890123456789012345678901234567890").unwrap(),
            Utc::now(),
        );
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "PAYMENT_QR");
        assert_eq!(json["method"], "alipay");
        assert_eq!(json["amount_usd"], 26.0);
    }
}

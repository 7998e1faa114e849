//! Venue entry passes.
//!
//! A pass is a short-lived JSON payload rendered as a QR code. The server issues
//! it, records its session id, and consumes it exactly once at the door; the
//! holder's device only displays it and counts down.

use crate::types::{TicketId, TokenId, WalletAddress};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Validity window of a pass, in seconds.
pub const ENTRY_PASS_TTL_SECS: i64 = 300;

/// Remaining seconds at or below which a pass is shown as expiring soon.
pub const EXPIRING_SOON_SECS: i64 = 60;

/// Payload type marker.
pub const ENTRY_PASS_TYPE: &str = "EVENT_ENTRY_QR";

const SESSION_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// QR payload for venue entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPass {
    /// Ticket row
    pub ticket_id: TicketId,
    /// Token
    pub token_id: TokenId,
    /// Event title
    pub event_name: String,
    /// Holder, lower-cased
    pub owner_address: WalletAddress,
    /// Single-use session id
    pub session_id: String,
    /// Issue time, epoch milliseconds
    pub generated_at: i64,
    /// Expiry, epoch milliseconds
    pub expires_at: i64,
    /// Always [`ENTRY_PASS_TYPE`]
    #[serde(rename = "type")]
    pub kind: String,
}

impl EntryPass {
    /// Issues a pass valid for [`ENTRY_PASS_TTL_SECS`] from `now`.
    #[must_use]
    pub fn issue(
        ticket_id: TicketId,
        token_id: TokenId,
        event_name: impl Into<String>,
        owner_address: WalletAddress,
        session_id: String,
        now: DateTime<Utc>,
    ) -> Self {
        let generated_at = now.timestamp_millis();
        Self {
            ticket_id,
            token_id,
            event_name: event_name.into(),
            owner_address,
            session_id,
            generated_at,
            expires_at: generated_at + ENTRY_PASS_TTL_SECS * 1000,
            kind: ENTRY_PASS_TYPE.to_string(),
        }
    }

    /// Expiry as a timestamp
    #[must_use]
    pub fn expires_at_time(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.expires_at).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Whole seconds left, never negative
    #[must_use]
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        let left = self.expires_at_time() - now;
        left.num_seconds().max(0)
    }

    /// Whether the pass can no longer be used
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at_time()
    }

    /// Whether the countdown should warn the holder
    #[must_use]
    pub fn expiring_soon(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && self.remaining_secs(now) <= EXPIRING_SOON_SECS
    }

    /// Validity window length
    #[must_use]
    pub fn ttl() -> Duration {
        Duration::seconds(ENTRY_PASS_TTL_SECS)
    }
}

/// `qr_<epoch ms>_<11 random base-36 chars>`
#[must_use]
pub fn new_session_id<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> String {
    let suffix: String = (0..11)
        .map(|_| char::from(SESSION_ALPHABET[rng.gen_range(0..SESSION_ALPHABET.len())]))
        .collect();
    format!("qr_{}_{suffix}", now.timestamp_millis())
}

/// `MM:SS` countdown label
#[must_use]
pub fn format_countdown(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

//! # TicketMint Testing
//!
//! Testing utilities for TicketMint.
//!
//! This crate provides:
//! - Deterministic environment pieces (clock, id generator)
//! - An in-memory [`InMemoryLedger`] implementing the ledger seam
//! - A scriptable [`MockChain`] implementing the chain seam
//! - The [`ReducerTest`] fluent API and effect assertions
//!
//! ## Example
//!
//! ```ignore
//! use ticketmint_testing::{InMemoryLedger, MockChain, test_clock};
//!
//! #[tokio::test]
//! async fn mint_records_ticket() {
//!     let ledger = Arc::new(InMemoryLedger::new());
//!     let chain = Arc::new(MockChain::new(relayer, token_contract));
//!     let relayer = RelayerService::new(chain, ledger.clone(), settings);
//!
//!     let response = relayer.mint(request).await?;
//!     assert_eq!(ledger.ticket_count(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use ticketmint_core::environment::{Clock, IdGenerator};

mod chain_mock;
mod ledger_mock;


pub use chain_mock::MockChain;
pub use ledger_mock::InMemoryLedger;
pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, Utc};
    use std::sync::atomic::{AtomicU64, Ordering};
    use uuid::Uuid;

    /// Fixed clock for deterministic tests
    ///
    /// # Example
    ///
    /// ```
    /// use ticketmint_testing::mocks::FixedClock;
    /// use ticketmint_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which cannot happen.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Predictable identifiers: `00000000-0000-0000-0000-000000000001`, `...02`, ...
    #[derive(Debug, Default)]
    pub struct SequentialIds {
        next: AtomicU64,
    }

    impl SequentialIds {
        /// Starts at 1
        #[must_use]
        pub const fn new() -> Self {
            Self {
                next: AtomicU64::new(0),
            }
        }
    }

    impl IdGenerator for SequentialIds {
        fn next_id(&self) -> Uuid {
            let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
            Uuid::from_u128(u128::from(n))
        }
    }
}

pub use mocks::{FixedClock, SequentialIds, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_never_moves() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn sequential_ids_count_up() {
        let ids = SequentialIds::new();
        assert_eq!(ids.next_id().as_u128(), 1);
        assert_eq!(ids.next_id().as_u128(), 2);
    }
}

//! # TicketMint Core
//!
//! Core traits and types for the TicketMint ticketing platform.
//!
//! Tickets are minted as non-fungible tokens by a gas-paying relayer, stored in a
//! relational ledger and resold through a marketplace contract that caps resale
//! prices. This crate holds everything that is independent of I/O:
//!
//! - **Reducer / Effect**: the pure state-machine abstraction the client flows are built on
//! - **Domain types**: identifiers, wallet addresses, token ids, ETH and USD amounts
//! - **Validation**: card checks (Luhn), quantities, listing price cap
//! - **Entry passes**: short-lived QR payloads for venue entry
//! - **Seams**: the [`chain::ChainGateway`] and [`ledger::LedgerStore`] traits that
//!   the application implements against a real node and database
//!
//! ## Example
//!
//! ```ignore
//! use ticketmint_core::*;
//!
//! impl Reducer for PurchaseReducer {
//!     type State = PurchaseState;
//!     type Action = PurchaseAction;
//!     type Environment = PurchaseEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut PurchaseState,
//!         action: PurchaseAction,
//!         env: &PurchaseEnvironment,
//!     ) -> SmallVec<[Effect<PurchaseAction>; 4]> {
//!         smallvec![Effect::None]
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Declarative macros for effect construction
pub mod effect_macros;

/// Identifiers, addresses and money types
pub mod types;

/// Persisted records: users, events, tickets, listings, purchases
pub mod models;

/// Input validation shared by the client flows and the HTTP API
pub mod validation;

/// Purchase totals, service fees and simulated payment timings
pub mod pricing;

/// Venue entry passes
pub mod entry_pass;

/// Contract call encoding
pub mod abi;

/// Chain access seam
pub mod chain;

/// Ledger record store seam
pub mod ledger;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for ListingReducer {
    ///     type State = ListingState;
    ///     type Action = ListingAction;
    ///     type Environment = ListingEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut ListingState,
    ///         action: ListingAction,
    ///         env: &ListingEnvironment,
    ///     ) -> SmallVec<[Effect<ListingAction>; 4]> {
    ///         match action {
    ///             ListingAction::Submit { .. } => smallvec![Effect::None],
    ///             _ => smallvec![Effect::None],
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution) and are composable.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Delayed action (timeouts, countdown ticks, simulated authorization)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// The delayed action, if this is a `Delay` effect
        #[must_use]
        pub fn delayed_action(&self) -> Option<(&Duration, &Action)> {
            match self {
                Effect::Delay { duration, action } => Some((duration, action.as_ref())),
                _ => None,
            }
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Source of unique identifiers (idempotency keys, entry-pass sessions).
    pub trait IdGenerator: Send + Sync {
        /// Next identifier
        fn next_id(&self) -> Uuid;
    }

    /// Random v4 identifiers.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct RandomIds;

    impl IdGenerator for RandomIds {
        fn next_id(&self) -> Uuid {
            Uuid::new_v4()
        }
    }
}

//! Venue entry pass display.
//!
//! Passes are issued by the backend and only counted down here. Each issued
//! pass gets a new generation; ticks carry the generation they were scheduled
//! for so a refresh silently retires the old countdown.

use super::api::BackendApi;
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;
use std::time::Duration;
use ticketmint_core::effect::Effect;
use ticketmint_core::entry_pass::{EntryPass, format_countdown};
use ticketmint_core::environment::Clock;
use ticketmint_core::reducer::Reducer;
use ticketmint_core::types::{TicketId, WalletAddress};
use ticketmint_core::{call_effect, delay};

const TICK: Duration = Duration::from_secs(1);

/// Entry pass state.
#[derive(Clone, Debug, Default)]
pub struct EntryPassState {
    /// Ticket the pass is for
    pub ticket_id: Option<TicketId>,
    /// Holder requesting it
    pub wallet: Option<WalletAddress>,
    /// Pass on screen; cleared when it expires
    pub pass: Option<EntryPass>,
    /// Generation of the pass on screen
    pub generation: u64,
    /// Seconds left
    pub remaining_secs: u32,
    /// `MM:SS` label
    pub countdown: String,
    /// Whether to warn the holder
    pub expiring_soon: bool,
    /// The last pass ran out
    pub expired: bool,
    /// A request is in flight
    pub loading: bool,
    /// Message for the holder
    pub error: Option<String>,
}

/// Entry pass actions.
#[derive(Clone, Debug, PartialEq)]
pub enum EntryPassAction {
    /// Show a pass for a ticket
    Request {
        /// Ticket
        ticket_id: TicketId,
        /// Holder
        wallet: WalletAddress,
    },
    /// Issue a new session for the same ticket
    Refresh,
    /// Backend issued a pass
    Issued {
        /// Request generation
        generation: u64,
        /// The pass
        pass: Box<EntryPass>,
    },
    /// Backend refused
    IssueFailed {
        /// Request generation
        generation: u64,
        /// Backend message
        message: String,
    },
    /// One second elapsed
    Tick {
        /// Generation the timer belongs to
        generation: u64,
    },
    /// Hide the pass
    Close,
}

/// Entry pass dependencies.
#[derive(Clone)]
pub struct EntryPassEnvironment {
    /// Storefront backend
    pub backend: Arc<dyn BackendApi>,
    /// Source of "now" for the countdown
    pub clock: Arc<dyn Clock>,
}

/// Entry pass reducer.
#[derive(Clone, Copy, Debug, Default)]
pub struct EntryPassReducer;

impl EntryPassReducer {
    fn request(state: &mut EntryPassState, env: &EntryPassEnvironment) -> SmallVec<[Effect<EntryPassAction>; 4]> {
        let (Some(ticket_id), Some(wallet)) = (state.ticket_id, state.wallet) else {
            return smallvec![Effect::None];
        };
        state.generation += 1;
        state.pass = None;
        state.loading = true;
        state.expired = false;
        state.error = None;

        let generation = state.generation;
        let backend = Arc::clone(&env.backend);
        smallvec![call_effect! {
            call: backend.issue_entry_pass(ticket_id, &wallet),
            on_success: |pass| Some(EntryPassAction::Issued { generation, pass: Box::new(pass) }),
            on_error: |error| Some(EntryPassAction::IssueFailed { generation, message: error.to_string() })
        }]
    }

    /// Recomputes the countdown. Returns `false` once the pass has run out.
    fn refresh_countdown(state: &mut EntryPassState, env: &EntryPassEnvironment) -> bool {
        let Some(pass) = state.pass.as_ref() else {
            return false;
        };
        let now = env.clock.now();
        let remaining = u32::try_from(pass.remaining_secs(now)).unwrap_or(u32::MAX);
        state.remaining_secs = remaining;
        state.countdown = format_countdown(remaining);
        state.expiring_soon = pass.expiring_soon(now);

        if remaining == 0 || pass.is_expired(now) {
            tracing::debug!(session_id = %pass.session_id, "Entry pass expired");
            state.pass = None;
            state.expired = true;
            state.expiring_soon = false;
            return false;
        }
        true
    }
}

impl Reducer for EntryPassReducer {
    type State = EntryPassState;
    type Action = EntryPassAction;
    type Environment = EntryPassEnvironment;

    fn reduce(
        &self,
        state: &mut EntryPassState,
        action: EntryPassAction,
        env: &EntryPassEnvironment,
    ) -> SmallVec<[Effect<EntryPassAction>; 4]> {
        match action {
            EntryPassAction::Request { ticket_id, wallet } => {
                state.ticket_id = Some(ticket_id);
                state.wallet = Some(wallet);
                Self::request(state, env)
            },

            EntryPassAction::Refresh => Self::request(state, env),

            EntryPassAction::Issued { generation, pass } => {
                if generation != state.generation {
                    return smallvec![Effect::None];
                }
                state.loading = false;
                state.pass = Some(*pass);
                if !Self::refresh_countdown(state, env) {
                    return smallvec![Effect::None];
                }
                smallvec![delay! {
                    duration: TICK,
                    action: EntryPassAction::Tick { generation }
                }]
            },

            EntryPassAction::IssueFailed { generation, message } => {
                if generation == state.generation {
                    tracing::warn!(%message, "Entry pass request failed");
                    state.loading = false;
                    state.error = Some(message);
                }
                smallvec![Effect::None]
            },

            EntryPassAction::Tick { generation } => {
                if generation != state.generation || !Self::refresh_countdown(state, env) {
                    return smallvec![Effect::None];
                }
                smallvec![delay! {
                    duration: TICK,
                    action: EntryPassAction::Tick { generation }
                }]
            },

            EntryPassAction::Close => {
                // Retire any pending tick
                state.generation += 1;
                state.pass = None;
                state.loading = false;
                smallvec![Effect::None]
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::client::test_support::{RecordingBackend, wallet};
    use chrono::{DateTime, Utc};
    use ticketmint_core::types::TokenId;
    use ticketmint_runtime::Store;
    use ticketmint_testing::{FixedClock, ReducerTest, assertions, test_clock};

    fn env_at(now: DateTime<Utc>) -> EntryPassEnvironment {
        EntryPassEnvironment {
            backend: Arc::new(RecordingBackend::default()),
            clock: Arc::new(FixedClock::new(now)),
        }
    }

    fn pass(session: &str) -> EntryPass {
        EntryPass::issue(
            TicketId::new(),
            TokenId::new(7),
            "Launch Night",
            wallet(),
            session.to_string(),
            test_clock().now(),
        )
    }

    fn showing(generation: u64) -> EntryPassState {
        EntryPassState {
            ticket_id: Some(TicketId::new()),
            wallet: Some(wallet()),
            pass: Some(pass("qr_1")),
            generation,
            ..EntryPassState::default()
        }
    }

    #[test]
    fn request_asks_the_backend() {
        ReducerTest::new(EntryPassReducer)
            .with_env(env_at(test_clock().now()))
            .given_state(EntryPassState::default())
            .when_action(EntryPassAction::Request {
                ticket_id: TicketId::new(),
                wallet: wallet(),
            })
            .then_state(|state| {
                assert!(state.loading);
                assert_eq!(state.generation, 1);
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn issued_pass_starts_the_countdown() {
        let mut state = EntryPassState {
            generation: 1,
            loading: true,
            ..EntryPassState::default()
        };
        let effects = EntryPassReducer.reduce(
            &mut state,
            EntryPassAction::Issued {
                generation: 1,
                pass: Box::new(pass("qr_1")),
            },
            &env_at(test_clock().now()),
        );

        assert_eq!(state.countdown, "05:00");
        assert!(!state.loading);
        assertions::assert_has_delay_effect(&effects, TICK, &EntryPassAction::Tick { generation: 1 });
    }

    #[test]
    fn countdown_warns_in_the_last_minute() {
        let now = test_clock().now() + chrono::Duration::seconds(250);
        ReducerTest::new(EntryPassReducer)
            .with_env(env_at(now))
            .given_state(showing(1))
            .when_action(EntryPassAction::Tick { generation: 1 })
            .then_state(|state| {
                assert_eq!(state.countdown, "00:50");
                assert!(state.expiring_soon);
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn pass_is_cleared_at_zero() {
        let now = test_clock().now() + chrono::Duration::seconds(300);
        ReducerTest::new(EntryPassReducer)
            .with_env(env_at(now))
            .given_state(showing(1))
            .when_action(EntryPassAction::Tick { generation: 1 })
            .then_state(|state| {
                assert!(state.pass.is_none());
                assert!(state.expired);
                assert_eq!(state.countdown, "00:00");
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn stale_tick_is_ignored() {
        ReducerTest::new(EntryPassReducer)
            .with_env(env_at(test_clock().now()))
            .given_state(showing(2))
            .when_action(EntryPassAction::Tick { generation: 1 })
            .then_state(|state| assert!(state.countdown.is_empty()))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn refresh_starts_a_new_generation() {
        ReducerTest::new(EntryPassReducer)
            .with_env(env_at(test_clock().now()))
            .given_state(showing(1))
            .when_action(EntryPassAction::Refresh)
            .then_state(|state| {
                assert_eq!(state.generation, 2);
                assert!(state.pass.is_none());
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn close_retires_the_countdown() {
        let mut state = showing(1);
        let env = env_at(test_clock().now());
        EntryPassReducer.reduce(&mut state, EntryPassAction::Close, &env);
        let effects = EntryPassReducer.reduce(&mut state, EntryPassAction::Tick { generation: 1 }, &env);
        assertions::assert_no_effects(&effects);
        assert!(state.pass.is_none());
    }

    #[tokio::test]
    async fn pass_comes_from_the_backend() {
        let backend = Arc::new(RecordingBackend::default());
        let env = EntryPassEnvironment {
            backend: Arc::clone(&backend) as Arc<dyn BackendApi>,
            clock: Arc::new(test_clock()),
        };
        let store = Store::new(EntryPassState::default(), EntryPassReducer, env);
        let ticket_id = TicketId::new();

        store
            .send_and_wait_for(
                EntryPassAction::Request {
                    ticket_id,
                    wallet: wallet(),
                },
                |action| matches!(action, EntryPassAction::Issued { .. }),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(backend.passes(), vec![ticket_id]);
        let (session, countdown) = store
            .state(|s| (s.pass.as_ref().map(|p| p.session_id.clone()), s.countdown.clone()))
            .await;
        assert_eq!(session.as_deref(), Some("qr_test_1"));
        assert_eq!(countdown, "05:00");
    }
}

//! Application state for the HTTP server.

use crate::assistant::IntentModel;
use crate::config::Config;
use crate::relayer::{RelayerService, RelayerSettings};
use std::sync::Arc;
use ticketmint_core::chain::ChainGateway;
use ticketmint_core::environment::Clock;
use ticketmint_core::ledger::LedgerStore;

/// Application state shared across all HTTP handlers.
///
/// Cloned per request; every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// System of record
    pub ledger: Arc<dyn LedgerStore>,

    /// Node access for the relayer's account
    pub chain: Arc<dyn ChainGateway>,

    /// Gas relayer
    pub relayer: RelayerService,

    /// Language model behind the assistant
    pub assistant: Arc<dyn IntentModel>,

    /// Time source for entry passes
    pub clock: Arc<dyn Clock>,

    /// Loaded configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the relayer from `config` over the given ledger and chain.
    #[must_use]
    pub fn new(
        config: Config,
        ledger: Arc<dyn LedgerStore>,
        chain: Arc<dyn ChainGateway>,
        assistant: Arc<dyn IntentModel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let relayer = RelayerService::new(
            Arc::clone(&chain),
            Arc::clone(&ledger),
            RelayerSettings::from_config(&config),
        );
        Self {
            ledger,
            chain,
            relayer,
            assistant,
            clock,
            config: Arc::new(config),
        }
    }
}

//! Business metrics for the storefront.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `relayer_mints_total{status}` - Mint requests by outcome (success, partial, failed, replayed)
//! - `relayer_tokens_minted_total` - Tokens minted by the relayer
//! - `marketplace_listings_total{status}` - Listing transitions (active, sold, cancelled)
//! - `entry_pass_verifications_total{outcome}` - Door checks by outcome
//! - `entry_passes_issued_total` - Passes issued
//! - `assistant_intents_total{intent}` - Interpreted assistant queries
//!
//! ## Gauges
//! - `relayer_balance_wei` - Last observed relayer balance
//!
//! ## Histograms
//! - `relayer_mint_duration_seconds` - Time from request to recorded tickets

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all metric descriptions.
///
/// Call once at startup, before any metrics are recorded.
pub fn register_metrics() {
    describe_counter!(
        "relayer_mints_total",
        "Mint requests handled by the relayer by outcome (success, partial, failed, replayed)"
    );
    describe_counter!(
        "relayer_tokens_minted_total",
        "Tokens minted and recorded by the relayer"
    );
    describe_histogram!(
        "relayer_mint_duration_seconds",
        "Time taken from mint request to recorded tickets"
    );
    describe_gauge!(
        "relayer_balance_wei",
        "Relayer account balance at the last check, in wei"
    );

    describe_counter!(
        "marketplace_listings_total",
        "Marketplace listing transitions by resulting status"
    );

    describe_counter!(
        "entry_passes_issued_total",
        "Venue entry passes issued"
    );
    describe_counter!(
        "entry_pass_verifications_total",
        "Entry pass checks at the door by outcome"
    );

    describe_counter!(
        "assistant_intents_total",
        "Assistant queries by interpreted intent"
    );

    tracing::info!("Business metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record the outcome of a mint request.
///
/// # Arguments
///
/// * `status` - `success`, `partial`, `failed` or `replayed`
/// * `minted` - Tokens minted by this request
/// * `duration_secs` - Wall time of the request
pub fn record_mint(status: &'static str, minted: usize, duration_secs: f64) {
    metrics::counter!("relayer_mints_total", "status" => status).increment(1);
    metrics::counter!("relayer_tokens_minted_total").increment(minted as u64);
    metrics::histogram!("relayer_mint_duration_seconds").record(duration_secs);
    tracing::debug!(status, minted, duration_secs, "Recorded mint metric");
}

/// Record the relayer balance.
#[allow(clippy::cast_precision_loss)] // gauge resolution is sufficient
pub fn record_relayer_balance(wei: u128) {
    metrics::gauge!("relayer_balance_wei").set(wei as f64);
}

/// Record a listing transition.
pub fn record_listing(status: &'static str) {
    metrics::counter!("marketplace_listings_total", "status" => status).increment(1);
    tracing::debug!(status, "Recorded listing metric");
}

/// Record an issued entry pass.
pub fn record_entry_pass_issued() {
    metrics::counter!("entry_passes_issued_total").increment(1);
}

/// Record a door check.
pub fn record_entry_verification(outcome: &'static str) {
    metrics::counter!("entry_pass_verifications_total", "outcome" => outcome).increment(1);
    tracing::debug!(outcome, "Recorded entry verification metric");
}

/// Record an interpreted assistant query.
pub fn record_intent(intent: &'static str) {
    metrics::counter!("assistant_intents_total", "intent" => intent).increment(1);
}

//! Chain and ledger reconciliation.
//!
//! Backfills marketplace base prices for tickets the marketplace does not
//! know, then reports tokens minted on-chain without a ticket row.
//!
//! # Usage
//!
//! ```bash
//! RECONCILE_FROM_BLOCK=5000000 cargo run --bin reconcile
//! ```
//!
//! Exits non-zero when a write failed or the chain and ledger disagree.

use std::process::ExitCode;
use std::sync::Arc;
use ticketmint::Config;
use ticketmint::chain::JsonRpcChain;
use ticketmint::ledger::PostgresLedger;
use ticketmint::reconcile::Reconciler;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ticketmint=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let from_block = std::env::var("RECONCILE_FROM_BLOCK")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    let ledger = PostgresLedger::connect(&config.database).await?;
    let reconciler = Reconciler::new(
        Arc::new(JsonRpcChain::from_config(&config)),
        Arc::new(ledger),
        config.chain.contracts(),
        config.relayer.confirmation_timeout(),
    )
    .with_from_block(from_block);

    let backfill = reconciler.backfill_base_prices().await?;
    info!(
        updated = backfill.updated,
        skipped = backfill.skipped,
        failed = backfill.failed,
        "Base prices"
    );

    let drift = reconciler.drift_report().await?;
    info!(
        minted_on_chain = drift.minted_on_chain,
        recorded = drift.recorded,
        "Mint drift"
    );
    for token_id in &drift.unrecorded {
        info!(%token_id, "Minted on-chain without a ticket row");
    }
    for token_id in &drift.phantom {
        info!(%token_id, "Ticket row without an on-chain mint");
    }
    println!("{}", serde_json::to_string_pretty(&serde_json::json!({
        "backfill": backfill,
        "drift": drift,
    }))?);

    if backfill.failed > 0 || !drift.is_clean() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

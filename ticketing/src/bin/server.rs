//! TicketMint HTTP server.
//!
//! This binary:
//! - Loads configuration from the environment (and `.env`)
//! - Exposes Prometheus metrics on a separate listener
//! - Connects to `PostgreSQL` and runs migrations
//! - Connects the relayer to the chain node
//! - Serves the storefront API until Ctrl+C or SIGTERM
//!
//! # Usage
//!
//! ```bash
//! docker compose up -d postgres
//! cargo run --bin server
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use ticketmint::assistant::{DisabledModel, IntentModel, LlmIntentClient};
use ticketmint::chain::JsonRpcChain;
use ticketmint::ledger::PostgresLedger;
use ticketmint::server::{AppState, build_router};
use ticketmint::{Config, metrics};
use ticketmint_core::environment::SystemClock;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ticketmint=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting TicketMint server");

    let config = Config::from_env()?;
    info!(
        rpc_url = %config.chain.rpc_url,
        chain_id = config.chain.chain_id,
        relayer = ?config.relayer.address,
        "Configuration loaded"
    );

    let metrics_addr: SocketAddr = config.metrics_address().parse()?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()?;
    metrics::register_metrics();
    info!(address = %metrics_addr, "Prometheus metrics exporter started");

    let ledger = PostgresLedger::connect(&config.database).await?;
    ledger.migrate().await?;
    info!("Database ready");

    let chain = JsonRpcChain::from_config(&config);
    let assistant: Arc<dyn IntentModel> = match LlmIntentClient::from_config(&config.assistant) {
        Some(client) => Arc::new(client),
        None => {
            info!("LLM_API_KEY not set, assistant disabled");
            Arc::new(DisabledModel)
        },
    };

    let addr = config.bind_address();
    let drain_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let state = AppState::new(
        config,
        Arc::new(ledger),
        Arc::new(chain),
        assistant,
        Arc::new(SystemClock),
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Server listening");

    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = signalled_tx.send(());
    });

    // In-flight requests get `SHUTDOWN_TIMEOUT` seconds to drain
    tokio::select! {
        result = server => result?,
        () = async {
            if signalled_rx.await.is_ok() {
                tokio::time::sleep(drain_timeout).await;
            } else {
                std::future::pending::<()>().await;
            }
        } => {
            tracing::warn!(timeout_secs = drain_timeout.as_secs(), "Shutdown timed out with requests in flight");
        },
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

//! Chain rotation scheduler — entry point.
//!
//! Loads the owned chain from the directory service, starts the
//! RotationScheduler tick loop as a background task, and exposes an Axum
//! REST API for the presentation layer: the published view, the rotation
//! journal, and the contribution/membership/loan commands.

mod api;
mod config;
mod db;
mod directory;
mod errors;
mod events;
mod rpc;
mod scheduler;
mod wallet;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rotation_engine::{Clock, SystemClock};

use config::Config;
use directory::{ChainDirectory, HttpDirectory};
use scheduler::RotationScheduler;
use wallet::{HttpWallet, WalletLedger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite journal and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // HTTP client shared by both collaborator clients.
    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let directory: Arc<dyn ChainDirectory> =
        Arc::new(HttpDirectory::new(client.clone(), config.directory_url.clone()));
    let wallet: Arc<dyn WalletLedger> =
        Arc::new(HttpWallet::new(client, config.ledger_url.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // The directory is the source of record; the scheduler's snapshot is a
    // cache seeded here and refreshed on explicit command.
    let chain = directory
        .get_chain(&config.chain_id)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    info!(
        "Loaded chain {} — {} members, {} loans",
        chain.id,
        chain.members.len(),
        chain.loans.len()
    );

    // ─── Background scheduler ─────────────────────────────
    let cancel = CancellationToken::new();
    let (rotation, handle) = RotationScheduler::new(
        chain,
        clock,
        directory.clone(),
        wallet,
        pool.clone(),
        Duration::from_secs(config.tick_interval_secs),
        cancel.clone(),
    );
    let scheduler_task = tokio::spawn(rotation.run());

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState {
        handle,
        pool,
        directory,
        chain_id: config.chain_id.clone(),
        invite_origin: config.invite_origin.clone(),
    });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/chains", get(api::get_all_chains).post(api::create_chain))
        .route("/chain", get(api::get_view))
        .route("/chain/events", get(api::get_events))
        .route("/chain/invite", get(api::get_invite))
        .route("/chain/join", post(api::join))
        .route("/chain/contributions", post(api::contribute))
        .route("/chain/refresh", post(api::refresh))
        .route("/chain/members/:id/loans", get(api::get_member_loans))
        .route("/chain/members/:id/leave", post(api::leave))
        .route("/chain/loans", post(api::request_loan))
        .route("/chain/loans/:id/approve", post(api::approve_loan))
        .route("/chain/loans/:id/repay", post(api::repay_loan))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    // The tick loop stops between (never inside) ticks.
    cancel.cancel();
    let _ = scheduler_task.await;

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
    cancel.cancel();
}

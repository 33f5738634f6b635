//! Registry service — entry point.
//!
//! Loads configuration, opens the SQLite store (running migrations),
//! optionally provisions the bootstrap admin and serves the REST API.

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use registry::api::{self, ApiState};
use registry::config::Config;
use registry::db;
use registry::ledger::LedgerClient;
use registry::pagination::PageLimits;
use registry::users;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    let pool = db::init_pool(&config.database_url).await?;

    if let (Some(email), Some(token)) = (
        config.bootstrap_admin_email.as_deref(),
        config.bootstrap_admin_token.as_deref(),
    ) {
        users::bootstrap_admin(&pool, email, token).await?;
    }

    let ledger = LedgerClient::from_config(&config)?;
    match config.ledger_rpc_url.as_deref() {
        Some(url) => info!("Reading token supply from ledger at {url}"),
        None => info!("No LEDGER_RPC_URL set; admin supply uses local distribution totals"),
    }

    let state = Arc::new(ApiState {
        pool,
        ledger,
        share_policy: config.share_policy,
        page_limits: PageLimits {
            default_size: config.default_page_size,
            max_size: config.max_page_size,
        },
    });

    let app = api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

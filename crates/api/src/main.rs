//! Collateral allocation API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use collateral_common::config::{AppConfig, LedgerBackend};
use collateral_gateway::HttpGateway;
use collateral_ledger::{Ledger, LedgerStore, MemoryStore, RedisStore};

use collateral_api::routes::create_router;
use collateral_api::state::AppState;

const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "collateral_api=debug,collateral_engine=debug,collateral_gateway=info,tower_http=debug",
            )
        }))
        .init();

    tracing::info!("Starting collateral allocation API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Open the ledger store
    let store: Arc<dyn LedgerStore> = match config.ledger_backend {
        LedgerBackend::Redis => {
            let store = RedisStore::connect(&config.redis_url).await?;
            tracing::info!("Redis ledger connected");
            Arc::new(store)
        }
        LedgerBackend::Memory => {
            tracing::warn!("Using in-memory ledger, state is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    let ledger = Ledger::new(store);

    // Remote collaborators share one HTTP client
    let gateway = Arc::new(HttpGateway::from_config(&config)?);
    tracing::info!(
        ruleset_api = %config.ruleset_api_url,
        fx_api = %config.fx_api_url,
        "HTTP gateway configured"
    );

    // Build application state
    let port = config.api_port;
    let state = AppState::new(
        ledger,
        gateway.clone(),
        gateway.clone(),
        gateway,
        config,
    );

    // Build router
    let app = create_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

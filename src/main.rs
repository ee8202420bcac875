//! Bookledger Server
//!
//! REST surface over the lending ledger.

use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookledger_server::{
    api,
    config::{AppConfig, StoreBackend},
    repository::{MemoryStore, PgStore, SharedStore},
    services::{clock::SystemClock, sweeper},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("bookledger_server={},tower_http=debug", config.logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Bookledger Server v{}", env!("CARGO_PKG_VERSION"));

    let store: SharedStore = match config.store.backend {
        StoreBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .connect(&config.database.url)
                .await?;
            tracing::info!("Connected to database");

            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Database migrations completed");

            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory ledger store; state is lost on restart");
            match config.store.seed_path.as_deref() {
                Some(path) => Arc::new(MemoryStore::from_seed_file(path)?),
                None => Arc::new(MemoryStore::new()),
            }
        }
    };

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let sweep_interval = config.lending.sweep_interval_secs;

    let state = AppState::new(config, store, Arc::new(SystemClock));
    let _sweeper = sweeper::spawn(state.services.ledger.clone(), sweep_interval);

    let app = api::router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

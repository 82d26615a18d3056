//! Tickstream - Realtime Stock Price Distribution Server
//! Mission: Walk a fixed symbol allowlist once per second and stream the
//! snapshot to every connected client

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tickstream_backend::{
    api::{create_router, AppState},
    auth::{AuthState, JwtHandler, UserStore},
    market::{
        retention_sweep_polling, tick_polling, HistoryLedger, MarketState, PriceStore,
        UniformDelta,
    },
    models::{Config, WsServerEvent, SUPPORTED_SYMBOLS},
    realtime::SessionRegistry,
    storage::MarketDb,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    info!("🚀 Tickstream starting ({} symbols)", SUPPORTED_SYMBOLS.len());

    let db = Arc::new(MarketDb::new(&config.database_path)?);
    let user_store = Arc::new(UserStore::new(&config.database_path)?);
    let jwt_handler = Arc::new(JwtHandler::new(config.jwt_secret.clone()));

    // Tick fan-out channel; every websocket task holds a receiver.
    let (price_tx, _price_rx) = broadcast::channel::<WsServerEvent>(256);

    let market = MarketState {
        store: Arc::new(PriceStore::new(config.price_floor)),
        ledger: Arc::new(HistoryLedger::new()),
        db,
        deltas: Arc::new(UniformDelta),
        price_tx,
    };
    market.seed_prices();

    let state = AppState {
        market: market.clone(),
        registry: Arc::new(SessionRegistry::new()),
        auth: AuthState::new(user_store, jwt_handler),
    };

    // Periodic drivers: the fast price tick and the slow retention sweep.
    tokio::spawn(tick_polling(market.clone(), config.tick_interval_ms));
    tokio::spawn(retention_sweep_polling(
        market,
        config.retention_sweep_secs,
        config.history_retention_hours,
    ));

    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("🎯 API server listening on {}", addr);
    info!("Waiting for WebSocket connections...");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

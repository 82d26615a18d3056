//! API Routes
//! Mission: Serve snapshots and history, and keep persisted subscriptions in
//! step with the live topic router

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Extension, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::{
    auth::{api as auth_api, auth_middleware, models::Claims, AuthState},
    market::{history::QUERY_LIMIT_CAP, MarketState},
    models::{is_supported_symbol, HistorySample, PriceState, SymbolSpec, SUPPORTED_SYMBOLS},
    realtime::{websocket_handler, SessionRegistry},
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub market: MarketState,
    pub registry: Arc<SessionRegistry>,
    pub auth: AuthState,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let auth_router = Router::new()
        .route("/api/auth/signup", post(auth_api::signup))
        .route("/api/auth/signin", post(auth_api::signin))
        .with_state(state.auth.clone());

    let protected_routes = Router::new()
        .route("/api/subscriptions/:symbol", post(subscribe_symbol))
        .route("/api/subscriptions/:symbol", delete(unsubscribe_symbol))
        .route("/api/user/subscriptions", get(get_user_subscriptions))
        .route_layer(middleware::from_fn_with_state(
            state.auth.jwt_handler.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    // The websocket endpoint is public: sessions authenticate in-band.
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/symbols", get(get_symbols))
        .route("/api/prices", get(get_prices))
        .route("/api/history/:symbol", get(get_history))
        .route("/ws", get(websocket_handler))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(auth_router)
        .layer(tower_http::cors::CorsLayer::permissive())
}

// ===== Route Handlers =====

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "storage": if state.market.db.is_reachable() { "connected" } else { "unreachable" },
        "connections": state.registry.connection_count(),
        "supported_symbols": SUPPORTED_SYMBOLS.iter().map(|s| s.symbol).collect::<Vec<_>>(),
    }))
}

/// GET /api/symbols - the allowlist with display metadata
async fn get_symbols() -> Json<SymbolsResponse> {
    Json(SymbolsResponse {
        symbols: SUPPORTED_SYMBOLS.to_vec(),
    })
}

/// GET /api/prices - current snapshot of every symbol
async fn get_prices(State(state): State<AppState>) -> Json<PricesResponse> {
    Json(PricesResponse {
        prices: state.market.store.snapshot(),
        timestamp: Utc::now().timestamp_millis(),
    })
}

/// GET /api/history/{symbol}?range=day|month|year
async fn get_history(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    if !is_supported_symbol(&symbol) {
        return Err(ApiError::UnsupportedSymbol(symbol));
    }

    let range = params.range.unwrap_or_else(|| "day".to_string());
    let lookback_ms = range_to_lookback_ms(&range)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown range '{}'", range)))?;

    let since = Utc::now().timestamp_millis() - lookback_ms;
    let samples = state.market.history(&symbol, since, QUERY_LIMIT_CAP);

    Ok(Json(HistoryResponse {
        symbol,
        range,
        samples,
    }))
}

/// POST /api/subscriptions/{symbol}
///
/// Persists the symbol on the caller's account, then mirrors the join into
/// the topic router for each of the caller's live connections. A persistence
/// failure is logged and swallowed; the live mirror still happens.
async fn subscribe_symbol(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(symbol): Path<String>,
) -> Result<Json<SubscriptionsResponse>, ApiError> {
    if !is_supported_symbol(&symbol) {
        return Err(ApiError::UnsupportedSymbol(symbol));
    }

    let subscribed_symbols = match state.auth.user_store.add_subscription(&claims.sub, &symbol) {
        Ok(symbols) => symbols,
        Err(e) => {
            warn!("⚠️  Failed to persist subscription for {}: {}", claims.sub, e);
            vec![symbol.clone()]
        }
    };

    for connection_id in state.registry.connections_for_user(&claims.sub) {
        state.registry.subscribe(connection_id, &symbol);
    }

    Ok(Json(SubscriptionsResponse {
        message: "Subscribed".to_string(),
        subscribed_symbols,
    }))
}

/// DELETE /api/subscriptions/{symbol}
async fn unsubscribe_symbol(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(symbol): Path<String>,
) -> Result<Json<SubscriptionsResponse>, ApiError> {
    if !is_supported_symbol(&symbol) {
        return Err(ApiError::UnsupportedSymbol(symbol));
    }

    let subscribed_symbols = match state
        .auth
        .user_store
        .remove_subscription(&claims.sub, &symbol)
    {
        Ok(symbols) => symbols,
        Err(e) => {
            warn!("⚠️  Failed to remove subscription for {}: {}", claims.sub, e);
            Vec::new()
        }
    };

    for connection_id in state.registry.connections_for_user(&claims.sub) {
        state.registry.unsubscribe(connection_id, &symbol);
    }

    Ok(Json(SubscriptionsResponse {
        message: "Unsubscribed".to_string(),
        subscribed_symbols,
    }))
}

/// GET /api/user/subscriptions
async fn get_user_subscriptions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state
        .auth
        .user_store
        .get_user_by_id(&claims.sub)?
        .ok_or(ApiError::Unauthorized)?;

    Ok(Json(json!({ "subscribed_symbols": user.subscribed_symbols })))
}

/// Map a range keyword to its lookback window in millis.
fn range_to_lookback_ms(range: &str) -> Option<i64> {
    const DAY_MS: i64 = 24 * 3_600_000;
    match range {
        "day" => Some(DAY_MS),
        "month" => Some(30 * DAY_MS),
        "year" => Some(365 * DAY_MS),
        _ => None,
    }
}

// ===== Request/Response Types =====

#[derive(Deserialize)]
struct HistoryQuery {
    range: Option<String>,
}

#[derive(Serialize)]
pub struct SymbolsResponse {
    pub symbols: Vec<SymbolSpec>,
}

#[derive(Serialize)]
pub struct PricesResponse {
    pub prices: std::collections::HashMap<String, PriceState>,
    pub timestamp: i64,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub symbol: String,
    pub range: String,
    pub samples: Vec<HistorySample>,
}

#[derive(Serialize)]
pub struct SubscriptionsResponse {
    pub message: String,
    pub subscribed_symbols: Vec<String>,
}

// ===== Error Handling =====

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    UnsupportedSymbol(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::UnsupportedSymbol(symbol) => (
                StatusCode::BAD_REQUEST,
                format!("Symbol '{}' is not supported", symbol),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_app_state;
    use crate::market::run_tick;

    #[test]
    fn test_range_lookback_mapping() {
        assert_eq!(range_to_lookback_ms("day"), Some(86_400_000));
        assert_eq!(range_to_lookback_ms("month"), Some(30 * 86_400_000));
        assert_eq!(range_to_lookback_ms("year"), Some(365 * 86_400_000));
        assert_eq!(range_to_lookback_ms("week"), None);
        assert_eq!(range_to_lookback_ms(""), None);
    }

    #[tokio::test]
    async fn test_history_rejects_unsupported_symbol() {
        let (_dir, state) = test_app_state();
        let result = get_history(
            State(state),
            Path("DOGE".to_string()),
            Query(HistoryQuery { range: None }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::UnsupportedSymbol(_))));
    }

    #[tokio::test]
    async fn test_history_rejects_unknown_range() {
        let (_dir, state) = test_app_state();
        let result = get_history(
            State(state),
            Path("GOOG".to_string()),
            Query(HistoryQuery {
                range: Some("decade".to_string()),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_history_returns_recent_samples() {
        let (_dir, state) = test_app_state();
        run_tick(&state.market, Utc::now().timestamp_millis());

        let result = get_history(
            State(state),
            Path("GOOG".to_string()),
            Query(HistoryQuery { range: None }),
        )
        .await
        .unwrap();
        assert_eq!(result.0.symbol, "GOOG");
        assert_eq!(result.0.range, "day");
        assert_eq!(result.0.samples.len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_persists_and_mirrors_to_live_connections() {
        let (_dir, state) = test_app_state();
        let user = state
            .auth
            .user_store
            .create_user("a@example.com", "pw", "A")
            .unwrap();
        let user_id = user.id.to_string();
        let conn = state.registry.on_connect();
        state.registry.authenticate(conn, &user_id);

        let claims = Claims {
            sub: user_id.clone(),
            email: user.email.clone(),
            exp: usize::MAX,
        };
        let result = subscribe_symbol(
            State(state.clone()),
            Extension(claims.clone()),
            Path("GOOG".to_string()),
        )
        .await
        .unwrap();

        assert_eq!(result.0.subscribed_symbols, vec!["GOOG"]);
        assert_eq!(state.registry.topic_members("GOOG"), vec![conn]);
        // Persisted on the account as well.
        let stored = state.auth.user_store.get_user_by_id(&user_id).unwrap().unwrap();
        assert_eq!(stored.subscribed_symbols, vec!["GOOG"]);

        let result = unsubscribe_symbol(
            State(state.clone()),
            Extension(claims),
            Path("GOOG".to_string()),
        )
        .await
        .unwrap();
        assert!(result.0.subscribed_symbols.is_empty());
        assert!(state.registry.topic_members("GOOG").is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_unsupported_symbol_is_client_error() {
        let (_dir, state) = test_app_state();
        let claims = Claims {
            sub: "nobody".to_string(),
            email: "n@example.com".to_string(),
            exp: usize::MAX,
        };
        let result =
            subscribe_symbol(State(state), Extension(claims), Path("DOGE".to_string())).await;
        assert!(matches!(result, Err(ApiError::UnsupportedSymbol(_))));
    }
}

//! Authentication API Endpoints
//! Mission: Provide signup and signin endpoints issuing 7-day JWTs

use crate::auth::{
    jwt::JwtHandler,
    models::{AuthResponse, SigninRequest, SignupRequest, UserResponse},
    user_store::UserStore,
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub user_store: Arc<UserStore>,
    pub jwt_handler: Arc<JwtHandler>,
}

impl AuthState {
    pub fn new(user_store: Arc<UserStore>, jwt_handler: Arc<JwtHandler>) -> Self {
        Self {
            user_store,
            jwt_handler,
        }
    }
}

/// POST /api/auth/signup
pub async fn signup(
    State(state): State<AuthState>,
    Json(req): Json<SignupRequest>,
) -> impl IntoResponse {
    if req.email.trim().is_empty() || req.password.is_empty() || req.name.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "All fields required" })),
        )
            .into_response();
    }

    let user = match state
        .user_store
        .create_user(req.email.trim(), &req.password, req.name.trim())
    {
        Ok(user) => user,
        Err(e) => {
            warn!("Signup rejected for {}: {}", req.email, e);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    match state.jwt_handler.generate_token(&user) {
        Ok((token, expires_in)) => {
            info!("👤 New account: {}", user.email);
            (
                StatusCode::CREATED,
                Json(AuthResponse {
                    token,
                    expires_in,
                    user: UserResponse::from_user(&user),
                }),
            )
                .into_response()
        }
        Err(e) => {
            warn!("Token generation failed after signup: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}

/// POST /api/auth/signin
pub async fn signin(
    State(state): State<AuthState>,
    Json(req): Json<SigninRequest>,
) -> impl IntoResponse {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Email and password required" })),
        )
            .into_response();
    }

    let user = match state.user_store.verify_credentials(req.email.trim(), &req.password) {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid credentials" })),
            )
                .into_response();
        }
        Err(e) => {
            warn!("Credential check failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response();
        }
    };

    match state.jwt_handler.generate_token(&user) {
        Ok((token, expires_in)) => Json(AuthResponse {
            token,
            expires_in,
            user: UserResponse::from_user(&user),
        })
        .into_response(),
        Err(e) => {
            warn!("Token generation failed on signin: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}

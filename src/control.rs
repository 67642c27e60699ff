//! Control endpoint.
//!
//! - `POST /update-token`: replace the credential and restart sessions
//! - `GET /health`: session readiness and delivery counters (always 200)

// Rust guideline compliant 2026-02

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::bridge::{Bridge, HealthReport};
use crate::constants::CONTROL_SECRET_HEADER;
use crate::credentials::Credential;
use crate::error::{ControlError, Result};

/// Shared state of the control handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    bridge: Arc<Bridge>,
    control_secret: Option<Arc<str>>,
}

impl AppState {
    /// Wraps a running bridge. `control_secret`, when set, is required on
    /// token updates.
    #[must_use]
    pub fn new(bridge: Arc<Bridge>, control_secret: Option<String>) -> Self {
        Self {
            bridge,
            control_secret: control_secret.map(Arc::from),
        }
    }
}

/// Body of `POST /update-token`.
#[derive(Debug, Deserialize)]
pub struct UpdateTokenRequest {
    /// The new credential, optionally prefixed with `Bearer `.
    pub token: String,
}

/// Response of a successful `POST /update-token`.
#[derive(Debug, Serialize)]
pub struct UpdateTokenResponse {
    /// Always `accepted`.
    pub status: &'static str,
    /// Sessions that will reconnect with the new credential.
    pub sessions_restarting: usize,
}

/// Build the router with all routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/update-token", post(update_token))
        .route("/health", get(health))
        .with_state(state)
}

/// Replace the credential.
///
/// Returns once session restarts are initiated, not completed.
async fn update_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<UpdateTokenRequest>, JsonRejection>,
) -> Result<Json<UpdateTokenResponse>> {
    authorize(state.control_secret.as_deref(), &headers)?;

    let Json(request) = payload.map_err(|rejection| ControlError::BadRequest(rejection.body_text()))?;
    let credential = normalize_token(&request.token)?;

    let sessions_restarting = state.bridge.update_token(credential);
    log::info!("[Control] Credential updated, {} session(s) restarting", sessions_restarting);

    Ok(Json(UpdateTokenResponse {
        status: "accepted",
        sessions_restarting,
    }))
}

/// Report health.
async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.bridge.health())
}

fn authorize(expected: Option<&str>, headers: &HeaderMap) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let provided = headers
        .get(CONTROL_SECRET_HEADER)
        .map(|value| value.as_bytes())
        .unwrap_or_default();

    if bool::from(provided.ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        log::warn!("[Control] Rejected token update with missing or wrong secret");
        Err(ControlError::Unauthorized)
    }
}

/// Strips an optional `Bearer ` prefix and rejects unusable tokens.
fn normalize_token(raw: &str) -> Result<Credential> {
    let unprefixed = raw.trim_start();
    let token = unprefixed.strip_prefix("Bearer ").unwrap_or(unprefixed).trim();

    if token.is_empty() {
        return Err(ControlError::BadRequest("token must not be empty".to_string()));
    }
    if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ControlError::BadRequest(
            "token must not contain whitespace or control characters".to_string(),
        ));
    }
    Ok(Credential::new(token))
}

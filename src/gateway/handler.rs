//! HTTP handlers for the guard API
//!
//! - `POST /api/v1/guard/mask`: mask PII, persist new tokens
//! - `POST /api/v1/guard/unmask`: resolve known tokens
//! - `GET /api/v1/guard/settings`: protection toggles
//! - `PUT /api/v1/guard/settings`: partial toggle update
//! - `GET /api/v1/guard/tokens`: token counts per label (never values)

use crate::guard::{PromptGuard, SettingsUpdate};
use crate::session::ProtectionSettings;
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared state for guard handlers
#[derive(Clone)]
pub struct GuardState {
    pub guard: Arc<PromptGuard>,
}

/// Create the guard router
pub fn guard_router(state: GuardState) -> Router {
    Router::new()
        .route("/api/v1/guard/mask", post(mask))
        .route("/api/v1/guard/unmask", post(unmask))
        .route("/api/v1/guard/settings", get(get_settings).put(update_settings))
        .route("/api/v1/guard/tokens", get(token_stats))
        .with_state(state)
}

// =============================================================================
// Request / Response types
// =============================================================================

/// Request body for mask and unmask
#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskResponse {
    pub masked_text: String,
    pub tokens: Vec<String>,
    pub masked: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmaskResponse {
    pub text: String,
    pub resolved: Vec<String>,
    pub unresolved: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatsResponse {
    pub count: usize,
    pub labels: BTreeMap<String, usize>,
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /api/v1/guard/mask
async fn mask(
    State(state): State<GuardState>,
    Json(request): Json<TextRequest>,
) -> impl IntoResponse {
    let outcome = state.guard.mask_text(&request.text).await;
    Json(MaskResponse {
        masked: !outcome.is_unchanged(),
        masked_text: outcome.masked_text,
        tokens: outcome.tokens,
    })
}

/// POST /api/v1/guard/unmask
async fn unmask(
    State(state): State<GuardState>,
    Json(request): Json<TextRequest>,
) -> impl IntoResponse {
    let outcome = state.guard.unmask_text(&request.text).await;
    Json(UnmaskResponse {
        text: outcome.text,
        resolved: outcome.resolved,
        unresolved: outcome.unresolved,
    })
}

/// GET /api/v1/guard/settings
async fn get_settings(State(state): State<GuardState>) -> Json<ProtectionSettings> {
    Json(state.guard.settings())
}

/// PUT /api/v1/guard/settings
async fn update_settings(
    State(state): State<GuardState>,
    Json(update): Json<SettingsUpdate>,
) -> Json<ProtectionSettings> {
    Json(state.guard.update_settings(&update))
}

/// GET /api/v1/guard/tokens
async fn token_stats(State(state): State<GuardState>) -> impl IntoResponse {
    let labels = state.guard.token_counts().await;
    Json(TokenStatsResponse {
        count: labels.values().sum(),
        labels,
    })
}

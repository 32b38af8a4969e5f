use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

/// GET /api/health: liveness plus which integrations are configured.
async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let config = &state.config;
    Json(json!({
        "status": "ok",
        "service": "beehive",
        "version": env!("CARGO_PKG_VERSION"),
        "configured": {
            "rituals": config.ritual_base_url.is_some(),
            "capability": config.capability_key.is_some(),
            "sourceControl": config.github_token.is_some(),
            "chat": config.chat_webhook_url.is_some(),
            "buildHooks": config.build_hook_urls.len(),
        },
        "ledgerEntries": state.ledger.len(),
    }))
}

//! Badge endpoints for external badge renderers.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tracing::warn;

use beehive_deploy::{deploy_badge, ritual_badge, Badge};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/badge/deploy", get(deploy))
        .route("/badge/ritual", get(ritual))
}

/// GET /api/badge/deploy: reads only the current deploy snapshot.
async fn deploy(State(state): State<Arc<AppState>>) -> Json<Badge> {
    let current = state.tracker.current().unwrap_or_else(|e| {
        warn!("Failed to read current deploy: {}", e);
        None
    });
    Json(deploy_badge(current.as_ref()))
}

/// GET /api/badge/ritual
async fn ritual(State(state): State<Arc<AppState>>) -> Json<Badge> {
    Json(ritual_badge(state.log.current().as_ref()))
}

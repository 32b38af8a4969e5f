//! Deploy run, status echo and history routes.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{error, info};

use beehive_core::Error;
use beehive_deploy::{deploy_badge, DeployEcho, DeployRequest};

use super::mutations::LimitQuery;
use super::{authorize, clamp_limit, error_response, parse_body};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deploy", post(run_deploy))
        .route("/deploy/status", post(echo_status))
        .route("/deploy/current", get(current_deploy))
        .route("/deploy/history", get(deploy_history))
}

/// POST /api/deploy: trigger every build hook and track the run.
async fn run_deploy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let actor = match authorize(&state, &headers) {
        Ok(actor) => actor,
        Err(rejection) => return rejection,
    };
    let request = match parse_body(&body).and_then(|v| {
        serde_json::from_value::<DeployRequest>(v).map_err(|e| {
            error_response(&Error::InvalidInput(format!("Invalid deploy request: {}", e)))
        })
    }) {
        Ok(request) => request,
        Err(rejection) => return rejection,
    };

    info!("Deploy requested by {}", actor);
    match state.deploy.run(request).await {
        Ok(outcome) if outcome.succeeded() => (StatusCode::OK, Json(json!(outcome))),
        Ok(outcome) => (StatusCode::BAD_GATEWAY, Json(json!(outcome))),
        Err(e) => {
            error!("Deploy run failed: {}", e);
            error_response(&e)
        }
    }
}

/// POST /api/deploy/status: record one status echo from a build emitter.
async fn echo_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }
    let parsed = parse_body(&body)
        .and_then(|v| DeployEcho::parse(&v).map_err(|e| error_response(&e)));
    let echo = match parsed {
        Ok(echo) => echo,
        Err(rejection) => return rejection,
    };

    match state.tracker.echo_status(echo) {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(json!({ "badge": deploy_badge(Some(&snapshot)), "snapshot": snapshot })),
        ),
        Err(e) => {
            error!("Failed to persist deploy status: {}", e);
            error_response(&e)
        }
    }
}

/// GET /api/deploy/current
async fn current_deploy(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.tracker.current() {
        Ok(Some(snapshot)) => (StatusCode::OK, Json(json!(snapshot))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "No deploy recorded" })),
        ),
        Err(e) => error_response(&e),
    }
}

/// GET /api/deploy/history?limit=N: oldest first.
async fn deploy_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    let limit = clamp_limit(query.limit, state.config.deploy_history_max);
    match state.tracker.history(limit) {
        Ok(history) => (
            StatusCode::OK,
            Json(json!({ "count": history.len(), "history": history })),
        ),
        Err(e) => error_response(&e),
    }
}

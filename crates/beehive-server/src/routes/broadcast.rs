//! Broadcast fanout endpoint.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use beehive_runtime::BroadcastRequest;

use super::{authorize, error_response, parse_body};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/broadcast", post(broadcast))
}

/// POST /api/broadcast: deliver a final outcome to every channel.
///
/// Partial channel failure still answers 200; the per-channel results say
/// what happened.
async fn broadcast(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let actor = match authorize(&state, &headers) {
        Ok(actor) => actor,
        Err(rejection) => return rejection,
    };
    let parsed = parse_body(&body)
        .and_then(|v| BroadcastRequest::parse(&v).map_err(|e| error_response(&e)));
    let request = match parsed {
        Ok(request) => request,
        Err(rejection) => return rejection,
    };

    let report = state.fanout.broadcast(&request, &actor).await;
    (StatusCode::OK, Json(json!(report)))
}

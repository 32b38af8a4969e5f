//! Mutation log and ritual ledger reads.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use super::{authorize, clamp_limit};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/mutations", get(list_mutations))
        .route("/mutations/current", get(current_mutation))
        .route("/ledger", get(ledger_snapshot))
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// GET /api/mutations?limit=N: most recent records, oldest first.
async fn list_mutations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }
    let limit = clamp_limit(query.limit, state.log.max_records());
    let records = state.log.recent(limit);
    (
        StatusCode::OK,
        Json(json!({ "count": records.len(), "mutations": records })),
    )
}

/// GET /api/mutations/current
async fn current_mutation(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.log.current() {
        Some(pointer) => (StatusCode::OK, Json(json!(pointer))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "No mutations recorded" })),
        ),
    }
}

/// GET /api/ledger: in-memory ritual invocation ledger.
async fn ledger_snapshot(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let entries = state.ledger.snapshot();
    Json(json!({ "count": entries.len(), "entries": entries }))
}

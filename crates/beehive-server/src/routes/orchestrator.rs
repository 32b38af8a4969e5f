//! Review trigger endpoint.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use tracing::error;

use beehive_runtime::{parse_trigger, ReviewOutcome};

use super::{error_response, parse_body};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/orchestrator", post(trigger_review))
}

/// POST /api/orchestrator: run the review lifecycle for one proposal update.
async fn trigger_review(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let parsed = parse_body(&body).and_then(|v| parse_trigger(&v).map_err(|e| error_response(&e)));
    let trigger = match parsed {
        Ok(trigger) => trigger,
        Err(rejection) => return rejection,
    };

    let outcome = state.orchestrator.handle(trigger).await;
    let message = outcome.message();
    match outcome {
        ReviewOutcome::Ignored { action } => (
            StatusCode::OK,
            Json(json!({ "message": message, "action": action })),
        ),
        ReviewOutcome::Duplicate { job_id } => (
            StatusCode::ACCEPTED,
            Json(json!({ "message": message, "jobId": job_id })),
        ),
        ReviewOutcome::Completed {
            job_id,
            overlay,
            outputs,
        } => (
            StatusCode::OK,
            Json(json!({
                "message": message,
                "jobId": job_id,
                "overlay": overlay,
                "outputs": outputs.to_value(),
            })),
        ),
        ReviewOutcome::Failed { job_id, phase, .. } => {
            error!("{}", message);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message, "jobId": job_id, "phase": phase.as_str() })),
            )
        }
    }
}

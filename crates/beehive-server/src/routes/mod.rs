//! HTTP route handlers.

pub mod badge;
pub mod broadcast;
pub mod deploy;
pub mod health;
pub mod mutations;
pub mod orchestrator;

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use beehive_core::Error;
use beehive_ritual::client::{ACTOR_HEADER, CAPABILITY_HEADER};

use crate::state::AppState;

/// Actor recorded when a caller does not identify itself.
pub const DEFAULT_ACTOR: &str = "Unknown Steward";

/// Default page size for list endpoints.
pub const DEFAULT_LIST_LIMIT: usize = 50;

pub type ApiError = (StatusCode, Json<Value>);

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::routes())
        .merge(orchestrator::routes())
        .merge(broadcast::routes())
        .merge(mutations::routes())
        .merge(deploy::routes())
        .merge(badge::routes())
}

/// Check the capability header and return the caller's actor.
///
/// An unconfigured key rejects every guarded call.
pub(crate) fn authorize(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    let presented = headers.get(CAPABILITY_HEADER).and_then(|v| v.to_str().ok());
    match (state.capability_key(), presented) {
        (Some(expected), Some(presented)) if expected == presented => Ok(actor(headers)),
        (None, _) => {
            warn!("Rejecting guarded call: CODEX_CAPABILITY_KEY is not configured");
            Err(unauthorized())
        }
        _ => Err(unauthorized()),
    }
}

pub(crate) fn actor(headers: &HeaderMap) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_ACTOR)
        .to_string()
}

fn unauthorized() -> ApiError {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Unauthorized: invalid or missing capability" })),
    )
}

/// Map a library error onto an HTTP status and `{error}` body.
pub(crate) fn error_response(err: &Error) -> ApiError {
    let status = match err {
        Error::InvalidInput(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Invocation { .. } | Error::Transport { .. } | Error::MalformedResponse { .. } => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() })))
}

/// Parse a request body as JSON. An empty body reads as `{}`.
pub(crate) fn parse_body(body: &[u8]) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("Invalid JSON body: {}", e) })),
        )
    })
}

pub(crate) fn clamp_limit(limit: Option<usize>, max: usize) -> usize {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, max.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_actor_defaults_when_blank() {
        let mut headers = HeaderMap::new();
        assert_eq!(actor(&headers), DEFAULT_ACTOR);
        headers.insert(ACTOR_HEADER, HeaderValue::from_static("  "));
        assert_eq!(actor(&headers), DEFAULT_ACTOR);
        headers.insert(ACTOR_HEADER, HeaderValue::from_static("Queen Bee"));
        assert_eq!(actor(&headers), "Queen Bee");
    }

    #[test]
    fn test_error_status_mapping() {
        let (status, _) = error_response(&Error::InvalidInput("x".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = error_response(&Error::Transport {
            target: "hook".into(),
            message: "refused".into(),
        });
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let (status, body) = error_response(&Error::configuration("Missing GITHUB_PAT"));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.0["error"].as_str().unwrap().contains("GITHUB_PAT"));
    }

    #[test]
    fn test_empty_body_reads_as_object() {
        assert_eq!(parse_body(b"").unwrap(), json!({}));
        assert_eq!(parse_body(b" \n").unwrap(), json!({}));
        assert!(parse_body(b"{not json").is_err());
    }

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(clamp_limit(None, 1000), DEFAULT_LIST_LIMIT);
        assert_eq!(clamp_limit(Some(0), 1000), 1);
        assert_eq!(clamp_limit(Some(5000), 1000), 1000);
    }
}

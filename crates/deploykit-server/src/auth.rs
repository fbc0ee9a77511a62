//! API key authentication
//!
//! Every route except `/health` requires `Authorization: APIKey <key>`.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::handlers::ApiError;
use crate::AppState;

const SCHEME: &str = "APIKey ";

/// Reject requests that do not carry the configured API key
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| unauthorized("Missing 'Authorization' header"))?;

    let key = provided
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix(SCHEME))
        .ok_or_else(|| {
            unauthorized("Malformed 'Authorization' header, should start with 'APIKey '")
        })?;

    if !key_matches(key.trim(), &state.api_key) {
        debug!(path = %request.uri().path(), "rejected invalid API key");
        return Err(unauthorized("Invalid API key"));
    }

    Ok(next.run(request).await)
}

fn unauthorized(reason: &str) -> ApiError {
    ApiError {
        status: StatusCode::UNAUTHORIZED,
        message: format!("Unauthorized: {reason}"),
    }
}

/// Constant-time comparison of the provided key against the configured one
fn key_matches(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

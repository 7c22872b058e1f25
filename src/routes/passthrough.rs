//! Pass-through proxy handler
//!
//! Catch-all handler that forwards every authenticated request, whatever the
//! path, to the upstream. The body is read once and forwarded unchanged.

use std::sync::Arc;

use axum::{extract::State, response::Response};

use crate::{error::AppError, proxy::InboundRequest, AppState};

/// Pass-through handler for every relayed route
///
/// Authentication has already run as middleware by the time this executes.
pub async fn passthrough_handler(
    State(state): State<Arc<AppState>>,
    request: axum::extract::Request,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();

    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read request body: {}", e)))?;

    let inbound = InboundRequest {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts
            .uri
            .query()
            .filter(|q| !q.is_empty())
            .map(str::to_string),
        headers: parts.headers,
        body,
    };

    state.relay.relay(inbound).await
}

//! Health check endpoint
//!
//! `/health` is the only route that skips the credential check. It reports
//! the upstream's own health so orchestrators probe the whole chain.

use std::sync::Arc;

use axum::{extract::State, response::Response};

use crate::AppState;

/// Unauthenticated liveness probe forwarded to the upstream's `/health`
///
/// Returns the upstream JSON body and status, `{"status": "ok"}` with the
/// upstream status for non-JSON answers, or 502 with
/// `{"status": "upstream_unreachable"}` when the upstream cannot be reached.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    state.relay.health().await
}

//! Authentication middleware
//!
//! Checks the shared bearer secret before a request may reach the relay.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::{
    config::Secret,
    error::{AppError, AppResult},
    metrics, AppState,
};

/// Return the bearer token from an Authorization header value
///
/// The scheme must be exactly `Bearer ` and nothing is trimmed from the token.
pub fn extract_bearer_token(auth_header: &[u8]) -> Option<&[u8]> {
    auth_header.strip_prefix(b"Bearer ")
}

/// Check request headers against the configured secret
///
/// Tokens are compared by SHA-256 digest, so timing does not reveal how much
/// of a guess matched.
pub fn verify_credentials(headers: &HeaderMap, secret: &Secret) -> AppResult<()> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or(AppError::Unauthorized)?;

    let token = extract_bearer_token(auth_header.as_bytes()).ok_or(AppError::InvalidToken)?;

    let digest: [u8; 32] = Sha256::digest(token).into();
    if &digest == secret.digest() {
        Ok(())
    } else {
        Err(AppError::InvalidToken)
    }
}

/// Authentication middleware
///
/// Rejected requests get a 401 and never reach the upstream.
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Err(err) = verify_credentials(request.headers(), &state.config.secret) {
        warn!(reason = err.code(), "Rejected request");
        metrics::record_auth_rejection(err.code());
        return Err(err);
    }

    debug!("Request authenticated");
    Ok(next.run(request).await)
}

//! HTTP routes for vllm-gate
//!
//! Every path is relayed to the upstream after authentication, except
//! `GET /health` which is public.

pub mod health;
pub mod passthrough;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{on, MethodFilter},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{middleware::auth::auth_middleware, AppState};

/// Methods accepted on relayed routes
const RELAYED_METHODS: MethodFilter = MethodFilter::GET
    .or(MethodFilter::POST)
    .or(MethodFilter::PUT)
    .or(MethodFilter::DELETE)
    .or(MethodFilter::PATCH);

/// Relayed methods on `/health`, where GET is taken by the public probe
///
/// HEAD is listed explicitly; axum would otherwise answer it with the GET handler.
const HEALTH_RELAYED_METHODS: MethodFilter = MethodFilter::HEAD
    .or(MethodFilter::POST)
    .or(MethodFilter::PUT)
    .or(MethodFilter::DELETE)
    .or(MethodFilter::PATCH);

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let auth = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let relayed = on(RELAYED_METHODS, passthrough::passthrough_handler).layer(auth.clone());

    // Public probe on GET, everything else on /health is an ordinary relay
    let health = on(MethodFilter::GET, health::health_check).merge(
        on(HEALTH_RELAYED_METHODS, passthrough::passthrough_handler).layer(auth),
    );

    Router::new()
        .route("/health", health)
        .route("/", relayed.clone())
        .route("/*path", relayed)
        // Global middleware (applied to all routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

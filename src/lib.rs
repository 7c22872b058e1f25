//! vllm-gate - Bearer-token authenticating reverse proxy
//!
//! This library provides the core functionality for the vllm-gate proxy
//! server. It guards an OpenAI-compatible inference server behind a shared
//! secret and relays requests, including streamed responses, to it.

pub mod config;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod proxy;
pub mod routes;

use std::time::Duration;

use anyhow::Result;

pub use crate::config::Config;
pub use crate::proxy::RelayEngine;
pub use crate::routes::create_router;

/// Application state shared across all request handlers
pub struct AppState {
    pub config: Config,
    /// Relay engine owning the process-wide upstream connection pool
    pub relay: RelayEngine,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config) -> Result<Self> {
        // No overall timeout: generations may stream for a long time
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let relay = RelayEngine::new(http_client, &config.upstream_url);

        Ok(Self { config, relay })
    }
}

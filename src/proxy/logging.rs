//! Request logging utilities for relayed requests
//!
//! Provides structured logging with short correlation IDs so a single relay
//! can be followed from dispatch to stream end.

use std::time::Instant;

use axum::http::Method;
use tracing::{debug, error, info, warn, Span};
use uuid::Uuid;

use super::mode::TransferMode;

/// Context for tracking a relay through the system
#[derive(Debug, Clone)]
pub struct RelayContext {
    /// Unique identifier for this relay (for log correlation)
    pub trace_id: String,
    /// When the relay started
    pub start_time: Instant,
    pub method: Method,
    /// Path and query as received
    pub target: String,
    pub mode: TransferMode,
}

impl RelayContext {
    /// Create a new relay context
    pub fn new(method: Method, target: impl Into<String>, mode: TransferMode) -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string()[..8].to_string(), // Short ID for readability
            start_time: Instant::now(),
            method,
            target: target.into(),
            mode,
        }
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u128 {
        self.start_time.elapsed().as_millis()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Log relay initiation
    pub fn log_request_start(&self, body_size: usize) {
        info!(
            trace_id = %self.trace_id,
            method = %self.method,
            target = %self.target,
            mode = %self.mode,
            body_size = body_size,
            "Relay started"
        );
    }

    /// Log request being sent to upstream
    pub fn log_upstream_request(&self, url: &str, header_count: usize) {
        debug!(
            trace_id = %self.trace_id,
            url = %url,
            header_count = header_count,
            elapsed_ms = %self.elapsed_ms(),
            "Sending request to upstream"
        );
    }

    /// Log response received from upstream
    pub fn log_upstream_response(&self, status: u16, content_type: Option<&str>) {
        info!(
            trace_id = %self.trace_id,
            target = %self.target,
            status = status,
            content_type = ?content_type,
            elapsed_ms = %self.elapsed_ms(),
            "Response received from upstream"
        );
    }

    /// Log buffered relay completion
    pub fn log_request_complete(&self, status: u16, body_size: usize) {
        info!(
            trace_id = %self.trace_id,
            method = %self.method,
            target = %self.target,
            status = status,
            body_size = body_size,
            elapsed_ms = %self.elapsed_ms(),
            "Relay completed"
        );
    }

    /// Log stream ended after the upstream finished
    pub fn log_stream_ended(&self, chunks: usize, bytes: usize) {
        info!(
            trace_id = %self.trace_id,
            target = %self.target,
            chunks = chunks,
            bytes = bytes,
            elapsed_ms = %self.elapsed_ms(),
            "Streaming response ended"
        );
    }

    /// Log stream dropped before the upstream finished
    pub fn log_stream_abandoned(&self, chunks: usize, bytes: usize) {
        warn!(
            trace_id = %self.trace_id,
            target = %self.target,
            chunks = chunks,
            bytes = bytes,
            elapsed_ms = %self.elapsed_ms(),
            "Caller went away mid-stream, upstream stream released"
        );
    }

    /// Log a warning condition
    pub fn log_warning(&self, message: &str) {
        warn!(
            trace_id = %self.trace_id,
            target = %self.target,
            elapsed_ms = %self.elapsed_ms(),
            message = %message,
            "Warning during relay"
        );
    }

    /// Log relay failure
    pub fn log_error(&self, error: &str) {
        error!(
            trace_id = %self.trace_id,
            method = %self.method,
            target = %self.target,
            mode = %self.mode,
            elapsed_ms = %self.elapsed_ms(),
            error = %error,
            "Relay failed"
        );
    }

    /// Create a tracing span for this relay
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "relay",
            trace_id = %self.trace_id,
            method = %self.method,
            target = %self.target,
            mode = %self.mode,
        )
    }
}

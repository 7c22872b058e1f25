//! Relay engine
//!
//! Forwards authorized requests to the upstream inference server and relays
//! the response back, either buffered or as a stream.

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde_json::{json, Value};
use tracing::{instrument, warn, Instrument};

use super::headers::{
    content_type, filter_request_headers, filter_response_headers, is_json_content_type,
};
use super::logging::RelayContext;
use super::mode::TransferMode;
use super::stream::{relay_body, RelayTracker};
use crate::{error::AppResult, metrics};

/// Media type used for streamed responses that do not declare one
pub const DEFAULT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// An inbound request that passed the credential check
#[derive(Debug)]
pub struct InboundRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    /// Path plus `?query` when a query was sent
    pub fn target(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }
}

/// Upstream relay sharing one pooled HTTP client across all requests
#[derive(Debug, Clone)]
pub struct RelayEngine {
    client: reqwest::Client,
    base_url: String,
    tracker: RelayTracker,
}

impl RelayEngine {
    /// Create a relay engine for the given upstream base URL
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tracker: RelayTracker::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Tracker for streams still holding an upstream connection
    pub fn tracker(&self) -> &RelayTracker {
        &self.tracker
    }

    /// Upstream URL for an inbound path and optional query
    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(query) => format!("{}{}?{}", self.base_url, path, query),
            None => format!("{}{}", self.base_url, path),
        }
    }

    /// Relay an authorized request upstream
    ///
    /// Upstream failures become error responses; they are never returned as
    /// transport faults.
    pub async fn relay(&self, request: InboundRequest) -> AppResult<Response> {
        let mode = TransferMode::detect(&request.method, &request.body);
        let ctx = RelayContext::new(request.method.clone(), request.target(), mode);
        let span = ctx.create_span();

        async move {
            ctx.log_request_start(request.body.len());

            let result = match mode {
                TransferMode::Buffered => self.relay_buffered(&ctx, request).await,
                TransferMode::Streaming => self.relay_streaming(&ctx, request).await,
            };

            match &result {
                Ok(response) => metrics::record_request(
                    mode.as_str(),
                    response.status().as_u16(),
                    ctx.elapsed_secs(),
                ),
                Err(err) => {
                    ctx.log_error(&err.to_string());
                    metrics::record_upstream_failure(err.code());
                    metrics::record_request(
                        mode.as_str(),
                        err.status().as_u16(),
                        ctx.elapsed_secs(),
                    );
                }
            }

            result
        }
        .instrument(span)
        .await
    }

    /// Send the request upstream and wait for the response head
    async fn dispatch(
        &self,
        ctx: &RelayContext,
        request: InboundRequest,
    ) -> AppResult<reqwest::Response> {
        let url = self.upstream_url(&request.path, request.query.as_deref());
        let headers = filter_request_headers(&request.headers);
        ctx.log_upstream_request(&url, headers.len());

        let mut builder = self.client.request(request.method, &url).headers(headers);
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await?;
        ctx.log_upstream_response(response.status().as_u16(), content_type(response.headers()));
        Ok(response)
    }

    /// Wait for the complete upstream response, then answer
    async fn relay_buffered(
        &self,
        ctx: &RelayContext,
        request: InboundRequest,
    ) -> AppResult<Response> {
        let upstream = self.dispatch(ctx, request).await?;

        let status = upstream.status();
        let headers = filter_response_headers(upstream.headers());
        let is_json = is_json_content_type(upstream.headers());
        let bytes = upstream.bytes().await?;

        let body = if is_json {
            reencode_json(&bytes).unwrap_or_else(|| {
                ctx.log_warning("upstream declared JSON but body does not parse, passing through");
                bytes.clone()
            })
        } else {
            bytes
        };

        ctx.log_request_complete(status.as_u16(), body.len());
        Ok(build_response(status, headers, Body::from(body)))
    }

    /// Answer as soon as the upstream head arrives and forward chunks as read
    async fn relay_streaming(
        &self,
        ctx: &RelayContext,
        request: InboundRequest,
    ) -> AppResult<Response> {
        let upstream = self.dispatch(ctx, request).await?;

        let status = upstream.status();
        let mut headers = filter_response_headers(upstream.headers());
        if !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(DEFAULT_STREAM_CONTENT_TYPE),
            );
        }

        let guard = self.tracker.track();
        let body = relay_body(upstream.bytes_stream(), ctx.clone(), guard);

        Ok(build_response(status, headers, Body::from_stream(body)))
    }

    /// Probe the upstream's own `/health`
    ///
    /// Never fails: any problem reaching the upstream becomes a 502 with
    /// `{"status": "upstream_unreachable"}`.
    #[instrument(skip(self), fields(upstream = %self.base_url))]
    pub async fn health(&self) -> Response {
        match self.probe_health().await {
            Ok((status, body)) => (status, Json(body)).into_response(),
            Err(err) => {
                warn!(error = %err, "Upstream health check failed");
                metrics::record_upstream_failure(err.code());
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "status": "upstream_unreachable" })),
                )
                    .into_response()
            }
        }
    }

    async fn probe_health(&self) -> AppResult<(StatusCode, Value)> {
        let response = self
            .client
            .get(self.upstream_url("/health", None))
            .send()
            .await?;

        let status = response.status();
        if is_json_content_type(response.headers()) {
            let body: Value = response.json().await?;
            Ok((status, body))
        } else {
            Ok((status, json!({ "status": "ok" })))
        }
    }
}

/// Decode and re-encode a JSON body, `None` if it does not parse
fn reencode_json(bytes: &[u8]) -> Option<Bytes> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    serde_json::to_vec(&value).ok().map(Bytes::from)
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

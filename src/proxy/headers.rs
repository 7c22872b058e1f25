//! Header sanitization for both relay legs
//!
//! The same hop-by-hop set is applied to the request sent upstream and to the
//! response returned to the caller. `authorization` is part of the set so the
//! proxy credential never leaks to the upstream.

use axum::http::header::{self, HeaderMap, HeaderName};

/// Hop-by-hop headers that must never be forwarded
///
/// `trailers` is the literal name used by the RFC 2616 hop-by-hop list; the
/// standard `trailer` header is dropped alongside it.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "authorization",
];

/// Check if a header is a hop-by-hop header that should not be forwarded
///
/// `HeaderName` is always stored lowercase, so a plain comparison is
/// case-insensitive with respect to the wire.
pub fn is_hop_by_hop_header(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Headers the HTTP stack derives from the body framing it actually sends
fn is_framing_header(name: &HeaderName) -> bool {
    name == header::CONTENT_LENGTH
}

/// Filter headers for the upstream request
///
/// `host` is left to the client so it matches the upstream URL.
pub fn filter_request_headers(incoming: &HeaderMap) -> HeaderMap {
    filter(incoming, |name| name == header::HOST)
}

/// Filter headers from an upstream response before returning them
pub fn filter_response_headers(upstream: &HeaderMap) -> HeaderMap {
    filter(upstream, |_| false)
}

fn filter(source: &HeaderMap, also_drop: impl Fn(&HeaderName) -> bool) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(source.len());

    for (name, value) in source {
        if is_hop_by_hop_header(name) || is_framing_header(name) || also_drop(name) {
            continue;
        }
        // append keeps every occurrence of repeated headers
        filtered.append(name.clone(), value.clone());
    }

    filtered
}

/// Content type of a header map, if present and readable
pub fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

/// Whether the content type declares a JSON body
pub fn is_json_content_type(headers: &HeaderMap) -> bool {
    content_type(headers)
        .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false)
}

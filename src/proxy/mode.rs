//! Transfer mode selection
//!
//! Only a `POST` with a JSON object body whose `stream` field is truthy is
//! relayed as a stream. The body is inspected, never rewritten.

use std::fmt;

use axum::http::Method;
use serde_json::Value;

/// How the upstream response is delivered to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Wait for the full upstream response, then answer
    Buffered,
    /// Forward body chunks as they arrive
    Streaming,
}

impl TransferMode {
    /// Decide the transfer mode for a request
    pub fn detect(method: &Method, body: &[u8]) -> Self {
        if method != Method::POST || body.is_empty() {
            return TransferMode::Buffered;
        }

        match stream_flag(body) {
            Some(true) => TransferMode::Streaming,
            _ => TransferMode::Buffered,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferMode::Buffered => "buffered",
            TransferMode::Streaming => "streaming",
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, TransferMode::Streaming)
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Truthiness of the `stream` field, `None` when the body is not a JSON object
fn stream_flag(body: &[u8]) -> Option<bool> {
    let parsed: Value = serde_json::from_slice(body).ok()?;
    let object = parsed.as_object()?;
    Some(object.get("stream").map(is_truthy).unwrap_or(false))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

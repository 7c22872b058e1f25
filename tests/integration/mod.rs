//! Integration tests for the vllm-gate proxy
//!
//! These tests verify the complete request/response flow through the proxy
//! against mock and real local upstreams.

mod streaming;

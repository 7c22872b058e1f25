//! Mock servers for integration testing
//!
//! - `upstream` - wiremock-based OpenAI-compatible inference server


pub use upstream::MockUpstream;

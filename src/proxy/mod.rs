//! Proxy module
//!
//! Handles request forwarding to the upstream inference server.

pub mod headers;
pub mod logging;
pub mod mode;
pub mod relay;
pub mod stream;

pub use mode::TransferMode;
pub use relay::{InboundRequest, RelayEngine};
pub use stream::RelayTracker;

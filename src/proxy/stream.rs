//! Streaming relay body
//!
//! The caller-facing body owns the upstream byte stream. Dropping the body,
//! whether because the stream finished, the upstream failed or the caller
//! disconnected, drops the upstream response and closes its connection.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};

use super::logging::RelayContext;
use crate::metrics;

/// Counts streaming relays that still hold an upstream stream
#[derive(Debug, Clone, Default)]
pub struct RelayTracker {
    active: Arc<AtomicUsize>,
}

impl RelayTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relay; it stays active until the guard is dropped
    pub fn track(&self) -> RelayGuard {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_active_streams(active);
        RelayGuard {
            active: self.active.clone(),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Keeps a relay counted as active while alive
#[derive(Debug)]
pub struct RelayGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        let previous = self.active.fetch_sub(1, Ordering::SeqCst);
        metrics::set_active_streams(previous - 1);
    }
}

/// Per-stream bookkeeping, reports how the stream ended when dropped
struct StreamProgress {
    ctx: RelayContext,
    _guard: RelayGuard,
    chunks: usize,
    bytes: usize,
    outcome: Outcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Open,
    Finished,
    Failed,
}

impl StreamProgress {
    fn record(&mut self, len: usize) {
        self.chunks += 1;
        self.bytes += len;
    }

    fn finish(&mut self) {
        self.outcome = Outcome::Finished;
    }

    fn fail(&mut self, err: &dyn std::error::Error) {
        self.outcome = Outcome::Failed;
        self.ctx.log_error(&format!("upstream stream failed: {}", err));
    }
}

impl Drop for StreamProgress {
    fn drop(&mut self) {
        let label = match self.outcome {
            Outcome::Finished => {
                self.ctx.log_stream_ended(self.chunks, self.bytes);
                "completed"
            }
            Outcome::Failed => "upstream_error",
            Outcome::Open => {
                self.ctx.log_stream_abandoned(self.chunks, self.bytes);
                "caller_disconnected"
            }
        };
        metrics::record_stream(label, self.chunks, self.ctx.elapsed_secs());
    }
}

/// Wrap an upstream byte stream into the body sent to the caller
///
/// Chunks are yielded exactly as read, in order. A read error is logged and
/// surfaced as an I/O error, which makes the server abort the response
/// instead of leaving the caller waiting; the upstream stream is dropped
/// right after.
pub fn relay_body<S, E>(
    upstream: S,
    ctx: RelayContext,
    guard: RelayGuard,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut progress = StreamProgress {
        ctx,
        _guard: guard,
        chunks: 0,
        bytes: 0,
        outcome: Outcome::Open,
    };

    async_stream::stream! {
        let mut upstream = Box::pin(upstream);

        loop {
            match upstream.next().await {
                Some(Ok(chunk)) => {
                    progress.record(chunk.len());
                    yield Ok(chunk);
                }
                Some(Err(err)) => {
                    progress.fail(&err);
                    yield Err(io::Error::new(io::ErrorKind::Other, err));
                    break;
                }
                None => {
                    progress.finish();
                    break;
                }
            }
        }
    }
}

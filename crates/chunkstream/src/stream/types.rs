//! Stream collaborator contracts
//!
//! `ChunkSink` is what producers see, `MediaInput` is what a pull-based
//! decoder sees, and `ChunkSource` is a producer loop that can be run on a
//! session's producer thread.

use std::sync::atomic::AtomicBool;

use crate::error::Result;

/// Producer-side view of a stream buffer
pub trait ChunkSink: Send + Sync {
    /// Append one chunk; delivered after every previously appended chunk
    fn append_chunk(&self, chunk: Vec<u8>);

    /// No more chunks will ever arrive
    fn mark_finished(&self);
}

/// Decoder-side contract for a forward-only media input.
///
/// `open` is called once before the first `read`. A `read` returning `Ok(0)`
/// means end of stream, never an error. Seeking always fails.
pub trait MediaInput: Send {
    /// Returns the total size when known, `None` for live/unbounded streams
    fn open(&mut self) -> Result<Option<u64>>;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn seek(&mut self, offset: u64) -> Result<u64>;

    fn close(&mut self);
}

/// A producer loop: retrieves chunks and appends them in retrieval order.
///
/// `run` returns when the source is exhausted, hits a fatal error, or sees
/// `stop` set. It does not call `mark_finished`; the caller does that.
pub trait ChunkSource: Send {
    /// Short label for logs
    fn name(&self) -> &str;

    fn run(self: Box<Self>, sink: &dyn ChunkSink, stop: &AtomicBool) -> Result<()>;
}

//! Blocking chunked stream buffer
//!
//! Producers (file loaders, playlist pollers) push whole chunks with
//! [`StreamBuffer::append_chunk`] and signal the end with
//! [`StreamBuffer::mark_finished`]. A single consumer thread pulls bytes with
//! reads of any size and blocks while nothing is pending. Once the producer is
//! finished and every pending byte has been delivered, reads report EOF (0 bytes).
//!
//! Architecture:
//!   Producer thread → append_chunk / mark_finished
//!                  ↓
//!            StreamBuffer (`VecDeque<Vec<u8>>` + Mutex + Condvar)
//!                  ↓ (consumer: Read + MediaSource, forward-only)
//!            StreamBufferReader → decoder
//!
//! Chunks are kept as an owned segment list, so appending costs O(chunk) no
//! matter how much has streamed before. Segments are dropped as soon as the
//! read cursor moves past them.

use std::collections::VecDeque;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::config::buffer::CANCEL_POLL_INTERVAL_MS;
use crate::error::{Result, StreamError};
use crate::stream::types::{ChunkSink, MediaInput};

/// Logical buffer state derived from the finish flag and the pending byte count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Producer has not finished yet
    Streaming,
    /// Producer finished, undelivered bytes remain
    Draining,
    /// Producer finished and everything was delivered; reads return EOF
    Done,
}

/// Snapshot of buffer counters (read by session/CLI)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferStatus {
    pub state: StreamState,
    /// Bytes appended but not yet delivered
    pub pending_bytes: usize,
    pub bytes_appended: u64,
    /// Absolute read cursor
    pub bytes_delivered: u64,
    pub chunks_appended: u64,
    /// Non-empty segments currently held in memory
    pub segments_held: usize,
    /// Number of times the reader had to block for data
    pub reader_waits: u64,
}

impl Default for BufferStatus {
    fn default() -> Self {
        Self {
            state: StreamState::Streaming,
            pending_bytes: 0,
            bytes_appended: 0,
            bytes_delivered: 0,
            chunks_appended: 0,
            segments_held: 0,
            reader_waits: 0,
        }
    }
}

/// Shared mutable state behind Mutex
struct BufferInner {
    /// Undelivered chunks, oldest first
    segments: VecDeque<Vec<u8>>,
    /// Bytes of `segments[0]` already delivered
    head_offset: usize,
    /// Total undelivered bytes across all segments
    pending: usize,
    /// Absolute position of the next undelivered byte
    read_cursor: u64,
    bytes_appended: u64,
    chunks_appended: u64,
    reader_waits: u64,
    finished: bool,
    closed: bool,
}

impl BufferInner {
    fn new() -> Self {
        Self {
            segments: VecDeque::new(),
            head_offset: 0,
            pending: 0,
            read_cursor: 0,
            bytes_appended: 0,
            chunks_appended: 0,
            reader_waits: 0,
            finished: false,
            closed: false,
        }
    }

    fn state(&self) -> StreamState {
        match (self.finished, self.pending) {
            (false, _) => StreamState::Streaming,
            (true, 0) => StreamState::Done,
            (true, _) => StreamState::Draining,
        }
    }

    /// Copy up to `out.len()` pending bytes, crossing segment boundaries.
    /// Fully consumed segments are released.
    fn copy_pending(&mut self, out: &mut [u8]) -> usize {
        let mut copied = 0;

        while copied < out.len() {
            let Some(front) = self.segments.front() else {
                break;
            };
            let available = &front[self.head_offset..];
            let n = available.len().min(out.len() - copied);
            out[copied..copied + n].copy_from_slice(&available[..n]);
            copied += n;
            self.head_offset += n;

            if self.head_offset == front.len() {
                self.segments.pop_front();
                self.head_offset = 0;
            }
        }

        self.pending -= copied;
        self.read_cursor += copied as u64;
        copied
    }
}

/// Thread-safe, growable, forward-only byte buffer.
///
/// Exactly one consumer may read at a time; concurrent reads are not
/// supported and may interleave unpredictably. Any number of producer-side
/// callers may append, and chunks are delivered in append order.
pub struct StreamBuffer {
    inner: Mutex<BufferInner>,
    data_available: Condvar,
}

impl Default for StreamBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BufferInner::new()),
            data_available: Condvar::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BufferInner>> {
        self.inner.lock().map_err(|_| StreamError::Poisoned)
    }

    /// Append one chunk and wake the blocked reader.
    ///
    /// Zero-length chunks are accepted and counted. Chunks arriving after
    /// [`mark_finished`](Self::mark_finished) or [`close`](Self::close) are
    /// dropped so that EOF stays final.
    pub fn append_chunk(&self, chunk: Vec<u8>) {
        let Ok(mut inner) = self.inner.lock() else {
            warn!(len = chunk.len(), "stream buffer poisoned, dropping chunk");
            return;
        };

        if inner.finished {
            warn!(
                len = chunk.len(),
                closed = inner.closed,
                "chunk appended after finish, ignoring"
            );
            return;
        }

        let len = chunk.len();
        inner.chunks_appended += 1;
        inner.bytes_appended += len as u64;
        if len > 0 {
            inner.pending += len;
            inner.segments.push_back(chunk);
        }
        debug!(
            len,
            pending = inner.pending,
            chunks = inner.chunks_appended,
            "chunk appended"
        );

        drop(inner);
        self.data_available.notify_all();
    }

    /// Signal that no more chunks will arrive. Idempotent.
    ///
    /// Pending bytes are kept and still delivered before EOF.
    pub fn mark_finished(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            if inner.finished {
                return;
            }
            inner.finished = true;
            debug!(
                pending = inner.pending,
                total = inner.bytes_appended,
                "stream marked finished"
            );
        }
        self.data_available.notify_all();
    }

    /// Release every held segment and finish the stream.
    ///
    /// A reader blocked at the time of the call wakes up and sees EOF.
    pub fn close(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            if !inner.closed {
                let discarded = inner.pending;
                inner.segments.clear();
                inner.segments.shrink_to_fit();
                inner.head_offset = 0;
                inner.pending = 0;
                inner.finished = true;
                inner.closed = true;
                debug!(discarded, delivered = inner.read_cursor, "stream buffer closed");
            }
        }
        self.data_available.notify_all();
    }

    /// Block until bytes are pending or the stream is finished.
    ///
    /// With a stop flag the wait wakes every `CANCEL_POLL_INTERVAL_MS` to
    /// check it; without one it only wakes on an explicit notify.
    fn wait_readable(&self, stop: Option<&AtomicBool>) -> Result<MutexGuard<'_, BufferInner>> {
        let mut inner = self.lock()?;
        let mut waited = false;

        while inner.pending == 0 && !inner.finished {
            if stop.is_some_and(|s| s.load(Ordering::Relaxed)) {
                return Err(StreamError::Cancelled);
            }
            if !waited {
                inner.reader_waits += 1;
                waited = true;
                trace!(cursor = inner.read_cursor, "reader waiting for data");
            }

            inner = match stop {
                None => self
                    .data_available
                    .wait(inner)
                    .map_err(|_| StreamError::Poisoned)?,
                Some(_) => {
                    let timeout = Duration::from_millis(CANCEL_POLL_INTERVAL_MS);
                    self.data_available
                        .wait_timeout(inner, timeout)
                        .map_err(|_| StreamError::Poisoned)?
                        .0
                }
            };
        }

        Ok(inner)
    }

    fn read_with(&self, buf: &mut [u8], stop: Option<&AtomicBool>) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut inner = self.wait_readable(stop)?;
        if inner.pending == 0 {
            trace!(cursor = inner.read_cursor, "reader at EOF");
            return Ok(0);
        }

        let n = inner.copy_pending(buf);
        trace!(n, requested = buf.len(), cursor = inner.read_cursor, "read");
        if inner.state() == StreamState::Done {
            debug!(total = inner.read_cursor, "stream fully drained");
        }
        Ok(n)
    }

    /// Read up to `buf.len()` bytes into `buf`.
    ///
    /// Returns as soon as any bytes are pending (short reads are normal),
    /// blocks while the buffer is empty and unfinished, and returns `Ok(0)`
    /// once finished and drained. An empty `buf` returns `Ok(0)` immediately.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.read_with(buf, None)
    }

    /// Like [`read`](Self::read), but gives up with [`StreamError::Cancelled`]
    /// once `stop` is set while blocked.
    pub fn read_cancellable(&self, buf: &mut [u8], stop: &AtomicBool) -> Result<usize> {
        self.read_with(buf, Some(stop))
    }

    /// Read up to `max_len` bytes and return them as an owned vector.
    ///
    /// An empty vector means EOF (or `max_len == 0`).
    pub fn read_chunk(&self, max_len: usize) -> Result<Vec<u8>> {
        if max_len == 0 {
            return Ok(Vec::new());
        }

        let mut inner = self.wait_readable(None)?;
        let mut out = vec![0u8; max_len.min(inner.pending)];
        let n = inner.copy_pending(&mut out);
        out.truncate(n);
        Ok(out)
    }

    /// Absolute position of the next undelivered byte
    pub fn position(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .read_cursor
    }

    pub fn is_finished(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finished
    }

    pub fn state(&self) -> StreamState {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state()
    }

    /// Current counters. Never blocks on the reader.
    pub fn status(&self) -> BufferStatus {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        BufferStatus {
            state: inner.state(),
            pending_bytes: inner.pending,
            bytes_appended: inner.bytes_appended,
            bytes_delivered: inner.read_cursor,
            chunks_appended: inner.chunks_appended,
            segments_held: inner.segments.len(),
            reader_waits: inner.reader_waits,
        }
    }
}

impl ChunkSink for StreamBuffer {
    fn append_chunk(&self, chunk: Vec<u8>) {
        StreamBuffer::append_chunk(self, chunk);
    }

    fn mark_finished(&self) {
        StreamBuffer::mark_finished(self);
    }
}

/// Consumer side: the decoder's view of a [`StreamBuffer`].
///
/// Implements [`MediaInput`] (open/read/seek/close negotiation), plus
/// `Read` + symphonia's `MediaSource` so it can be handed to a decoder
/// directly. The stream is forward-only: every seek that would move the
/// cursor is rejected.
pub struct StreamBufferReader {
    buffer: Arc<StreamBuffer>,
    opened: bool,
    closed: bool,
}

impl StreamBufferReader {
    pub fn new(buffer: Arc<StreamBuffer>) -> Self {
        Self {
            buffer,
            opened: false,
            closed: false,
        }
    }

    /// Read that gives up once `stop` is set while waiting for data
    pub fn read_cancellable(&mut self, buf: &mut [u8], stop: &AtomicBool) -> Result<usize> {
        self.ensure_readable()?;
        self.buffer.read_cancellable(buf, stop)
    }

    /// Absolute number of bytes delivered so far
    pub fn position(&self) -> u64 {
        self.buffer.position()
    }

    pub fn buffer(&self) -> &Arc<StreamBuffer> {
        &self.buffer
    }

    fn ensure_readable(&self) -> Result<()> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        if !self.opened {
            return Err(StreamError::NotOpened);
        }
        Ok(())
    }
}

impl MediaInput for StreamBufferReader {
    fn open(&mut self) -> Result<Option<u64>> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        self.opened = true;
        debug!("media input opened, size unknown");
        Ok(None)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_readable()?;
        self.buffer.read(buf)
    }

    fn seek(&mut self, offset: u64) -> Result<u64> {
        debug!(offset, "seek rejected on forward-only stream");
        Err(StreamError::SeekUnsupported)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.buffer.close();
    }
}

/// Plain `io::Read` does not require `open`; decoders that negotiate through
/// `MediaSource::byte_len` get the same "unknown size" answer there.
impl Read for StreamBufferReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(StreamError::Closed.into());
        }
        Ok(self.buffer.read(buf)?)
    }
}

impl Seek for StreamBufferReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        // Position queries are allowed; anything that moves the cursor is not.
        match pos {
            SeekFrom::Current(0) => Ok(self.buffer.position()),
            _ => {
                debug!(?pos, "seek rejected on forward-only stream");
                Err(StreamError::SeekUnsupported.into())
            }
        }
    }
}

impl symphonia::core::io::MediaSource for StreamBufferReader {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

//! Stream handling
//!
//! The chunked stream buffer and the producers that feed it: plain readers,
//! local chunk files, and HLS playlist polling, plus TS audio extraction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::timeouts::{MAX_BACKOFF_SECS, RETRY_BASE_DELAY_SECS, STOP_POLL_INTERVAL_MS};

pub mod buffer;
pub mod hls;
pub mod playlist;
pub mod source;
pub mod ts;
pub mod types;

pub use buffer::{BufferStatus, StreamBuffer, StreamBufferReader, StreamState};
pub use hls::{HlsSource, HlsSourceOptions};
pub use source::{FileSource, FileSourceOptions, ReaderSource};
pub use ts::TsAudioReader;
pub use types::{ChunkSink, ChunkSource, MediaInput};

/// Calculate exponential backoff delay: min(2^(n-1) * base, max)
/// e.g., with base=2s: 2s, 4s, 8s, 16s, 30s, ...
pub(crate) fn backoff_delay(consecutive_failures: u32) -> Duration {
    let exp = consecutive_failures.saturating_sub(1).min(5);
    let delay_secs = RETRY_BASE_DELAY_SECS.saturating_mul(1u64 << exp);
    Duration::from_secs(delay_secs.min(MAX_BACKOFF_SECS))
}

/// Sleep for `total`, checking `stop_flag` every `STOP_POLL_INTERVAL_MS`.
/// Returns true if the full duration elapsed, false if stopped early.
pub(crate) fn interruptible_sleep(total: Duration, stop_flag: &AtomicBool) -> bool {
    let interval = Duration::from_millis(STOP_POLL_INTERVAL_MS);
    let start = Instant::now();
    while start.elapsed() < total {
        if stop_flag.load(Ordering::Relaxed) {
            return false;
        }
        let remaining = total.saturating_sub(start.elapsed());
        std::thread::sleep(remaining.min(interval));
    }
    !stop_flag.load(Ordering::Relaxed)
}

/// Sleep with backoff, checking stop_flag while waiting.
pub(crate) fn backoff_sleep(consecutive_failures: u32, stop_flag: &AtomicBool) -> bool {
    interruptible_sleep(backoff_delay(consecutive_failures), stop_flag)
}

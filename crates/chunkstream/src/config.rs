//! Configuration constants for the chunkstream engine

/// Network-related configuration
pub mod network {
    /// User agent for HTTP requests
    pub const USER_AGENT: &str = concat!("chunkstream/", env!("CARGO_PKG_VERSION"));

    /// Connection timeout in seconds
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;
}

/// HLS-related configuration
pub mod hls {
    /// Segments queued from the tail of a live playlist on the first fetch
    pub const SEGMENT_PREBUFFER: usize = 3;

    /// Segment download timeout in seconds
    pub const SEGMENT_TIMEOUT_SECS: u64 = 15;

    /// Floor for the live playlist reload interval in seconds
    pub const MIN_RELOAD_SECS: u64 = 2;

    /// Reload interval for a VOD playlist that still has missing segments
    pub const VOD_RELOAD_SECS: u64 = 1;
}

/// Timeout configuration for resilience
pub mod timeouts {
    /// Base delay between retries in seconds (exponential backoff: 2^n * base)
    pub const RETRY_BASE_DELAY_SECS: u64 = 2;

    /// Maximum backoff delay in seconds (cap for exponential backoff)
    pub const MAX_BACKOFF_SECS: u64 = 30;

    /// How often interruptible sleeps check the stop flag (milliseconds)
    pub const STOP_POLL_INTERVAL_MS: u64 = 250;
}

/// Stream buffer configuration (producer-consumer architecture)
pub mod buffer {
    /// Chunk size for producer reads from an inner reader (bytes)
    pub const PRODUCER_CHUNK_SIZE: usize = 8 * 1024;

    /// How often a cancellable read re-checks its stop flag while blocked (milliseconds)
    pub const CANCEL_POLL_INTERVAL_MS: u64 = 100;

    /// Default consumer read size used by the CLI drain loop (bytes)
    pub const DEFAULT_READ_SIZE: usize = 32 * 1024;
}

/// Local chunk file configuration
pub mod files {
    /// Delay between consecutive chunk files in milliseconds
    pub const DEFAULT_CHUNK_INTERVAL_MS: u64 = 1000;
}

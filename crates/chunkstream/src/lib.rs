//! chunkstream — blocking chunk stream buffer
//!
//! Bridges chunk producers (local files, HLS playlist polling) to a
//! synchronous, pull-based media decoder through a growable, forward-only
//! byte buffer.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::io::Read;
//!
//! use chunkstream::session::PlaybackSession;
//! use chunkstream::stream::{HlsSource, HlsSourceOptions};
//!
//! let source = HlsSource::new("https://example.com/live/index.m3u8", HlsSourceOptions::default());
//! let session = PlaybackSession::start(Box::new(source)).unwrap();
//! let mut reader = session.reader();
//! let mut buf = [0u8; 4096];
//! let n = reader.read(&mut buf).unwrap();
//! ```

pub mod config;
pub mod error;
pub mod probe;
pub mod session;
pub mod stream;

pub use error::{Result, StreamError};

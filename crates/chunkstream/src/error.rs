//! Error types for chunkstream
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Main error type for the chunk stream engine
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("{}", friendly_network_error(.0))]
    Network(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Playlist error: {0}")]
    Playlist(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Stream is forward-only and cannot seek")]
    SeekUnsupported,

    #[error("Stream was read before being opened")]
    NotOpened,

    #[error("Stream is closed")]
    Closed,

    #[error("Read cancelled")]
    Cancelled,

    #[error("Stream buffer lock poisoned")]
    Poisoned,
}

/// Result type alias for chunkstream
pub type Result<T> = std::result::Result<T, StreamError>;

impl From<StreamError> for std::io::Error {
    fn from(e: StreamError) -> Self {
        use std::io::ErrorKind;
        match e {
            StreamError::Io(inner) => inner,
            StreamError::SeekUnsupported => {
                std::io::Error::new(ErrorKind::Unsupported, StreamError::SeekUnsupported)
            }
            StreamError::Cancelled => std::io::Error::new(ErrorKind::Interrupted, e),
            StreamError::NotOpened | StreamError::Closed => {
                std::io::Error::new(ErrorKind::NotConnected, e)
            }
            other => std::io::Error::other(other),
        }
    }
}

fn friendly_network_error(e: &reqwest::Error) -> String {
    if e.is_builder() {
        if let Some(url) = e.url() {
            return format!("Invalid URL: {url}");
        }
        return "Invalid URL".to_string();
    }
    if e.is_connect() {
        if let Some(url) = e.url() {
            return format!("Could not connect to {}", url.host_str().unwrap_or("server"));
        }
        return "Could not connect to server".to_string();
    }
    if e.is_timeout() {
        return "Connection timed out".to_string();
    }
    if let Some(status) = e.status() {
        return format!("HTTP {status}");
    }
    format!("Network error: {e}")
}

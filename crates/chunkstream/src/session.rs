//! Playback session
//!
//! Owns one [`StreamBuffer`] and the producer thread feeding it. Every
//! session is independent; nothing is shared through globals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::stream::buffer::{BufferStatus, StreamBuffer, StreamBufferReader};
use crate::stream::types::ChunkSource;

/// One playback session: a buffer plus the producer thread that fills it.
///
/// The producer marks the buffer finished when its source returns, whether
/// it ran out, failed, or was stopped, so the reader always reaches EOF.
pub struct PlaybackSession {
    buffer: Arc<StreamBuffer>,
    stop_flag: Arc<AtomicBool>,
    producer: Option<JoinHandle<()>>,
    producer_error: Arc<Mutex<Option<String>>>,
}

impl PlaybackSession {
    /// Create a buffer and start `source` on a `chunk-producer` thread.
    pub fn start(source: Box<dyn ChunkSource>) -> Result<Self> {
        let buffer = Arc::new(StreamBuffer::new());
        let stop_flag = Arc::new(AtomicBool::new(false));
        let producer_error = Arc::new(Mutex::new(None));

        let producer_buffer = buffer.clone();
        let producer_stop = stop_flag.clone();
        let error_slot = producer_error.clone();

        let handle = thread::Builder::new()
            .name("chunk-producer".to_string())
            .spawn(move || {
                let name = source.name().to_string();
                info!(source = %name, "producer started");

                match source.run(producer_buffer.as_ref(), &producer_stop) {
                    Ok(()) => debug!(source = %name, "producer finished"),
                    Err(e) => {
                        warn!(source = %name, error = %e, "producer failed");
                        *error_slot.lock().unwrap_or_else(PoisonError::into_inner) =
                            Some(e.to_string());
                    }
                }
                producer_buffer.mark_finished();
            })?;

        Ok(Self {
            buffer,
            stop_flag,
            producer: Some(handle),
            producer_error,
        })
    }

    pub fn buffer(&self) -> &Arc<StreamBuffer> {
        &self.buffer
    }

    /// New consumer handle over this session's buffer
    pub fn reader(&self) -> StreamBufferReader {
        StreamBufferReader::new(self.buffer.clone())
    }

    /// Flag set by [`stop`](Self::stop); usable with cancellable reads
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    pub fn status(&self) -> BufferStatus {
        self.buffer.status()
    }

    pub fn is_producer_done(&self) -> bool {
        self.producer.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Message of the error that ended the producer, if any
    pub fn producer_error(&self) -> Option<String> {
        self.producer_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait for the producer to finish on its own
    pub fn join(&mut self) {
        if let Some(handle) = self.producer.take() {
            if handle.join().is_err() {
                warn!("producer thread panicked");
                self.buffer.mark_finished();
            }
        }
    }

    /// Stop the producer, release the buffer and join the thread.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.buffer.close();
        self.join();
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use crate::stream::source::{FileSource, FileSourceOptions, ReaderSource};
    use crate::stream::types::{ChunkSink, MediaInput};
    use std::io::{Cursor, Read};
    use std::time::{Duration, Instant};

    /// Source that appends its chunks, then fails
    struct FlakySource {
        chunks: Vec<Vec<u8>>,
    }

    impl ChunkSource for FlakySource {
        fn name(&self) -> &str {
            "flaky"
        }

        fn run(self: Box<Self>, sink: &dyn ChunkSink, _stop: &AtomicBool) -> Result<()> {
            for chunk in self.chunks {
                sink.append_chunk(chunk);
            }
            Err(StreamError::Playlist("gone".to_string()))
        }
    }

    /// Source that never produces anything until stopped
    struct IdleSource;

    impl ChunkSource for IdleSource {
        fn name(&self) -> &str {
            "idle"
        }

        fn run(self: Box<Self>, _sink: &dyn ChunkSink, stop: &AtomicBool) -> Result<()> {
            while !stop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        }
    }

    fn read_all(reader: &mut StreamBufferReader) -> Vec<u8> {
        reader.open().unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 1000];
        loop {
            let n = MediaInput::read(reader, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[test]
    fn session_delivers_reader_source() {
        let data: Vec<u8> = (0..30_000u32).map(|i| (i * 7 % 256) as u8).collect();
        let mut session =
            PlaybackSession::start(Box::new(ReaderSource::new(Cursor::new(data.clone())))).unwrap();

        let mut reader = session.reader();
        assert_eq!(read_all(&mut reader), data);

        session.join();
        assert!(session.is_producer_done());
        assert!(session.producer_error().is_none());
        assert_eq!(session.status().bytes_delivered, data.len() as u64);
    }

    #[test]
    fn producer_error_still_ends_stream() {
        let source = FlakySource {
            chunks: vec![vec![1, 2], vec![3]],
        };
        let mut session = PlaybackSession::start(Box::new(source)).unwrap();

        let mut reader = session.reader();
        assert_eq!(read_all(&mut reader), vec![1, 2, 3]);

        session.join();
        assert_eq!(
            session.producer_error().as_deref(),
            Some("Playlist error: gone")
        );
    }

    #[test]
    fn stop_unblocks_reader_and_joins_producer() {
        let mut session = PlaybackSession::start(Box::new(IdleSource)).unwrap();
        let mut reader = session.reader();

        let consumer = thread::spawn(move || {
            let mut buf = [0u8; 16];
            Read::read(&mut reader, &mut buf).unwrap()
        });

        thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        session.stop();

        assert_eq!(consumer.join().unwrap(), 0);
        assert!(session.is_producer_done());
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn cancellable_read_with_session_stop_flag() {
        let session = PlaybackSession::start(Box::new(IdleSource)).unwrap();
        let mut reader = session.reader();
        reader.open().unwrap();

        let stop = session.stop_flag();
        stop.store(true, Ordering::SeqCst);
        let mut buf = [0u8; 4];
        assert!(matches!(
            reader.read_cancellable(&mut buf, &stop),
            Err(StreamError::Cancelled)
        ));
    }

    #[test]
    fn sessions_are_independent() {
        let first =
            PlaybackSession::start(Box::new(ReaderSource::new(Cursor::new(vec![1u8; 10])))).unwrap();
        let second =
            PlaybackSession::start(Box::new(ReaderSource::new(Cursor::new(vec![2u8; 20])))).unwrap();

        assert_eq!(read_all(&mut second.reader()), vec![2u8; 20]);
        assert_eq!(read_all(&mut first.reader()), vec![1u8; 10]);
    }

    #[test]
    fn drop_stops_slow_file_source() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3 {
            std::fs::write(dir.path().join(format!("part{i}.bin")), [i as u8; 4]).unwrap();
        }
        let options = FileSourceOptions::default().with_interval(Duration::from_secs(30));
        let session = PlaybackSession::start(Box::new(FileSource::numbered(
            dir.path(),
            "part",
            "bin",
            3,
            options,
        )))
        .unwrap();

        let mut reader = session.reader();
        let mut first = [0u8; 4];
        reader.read_exact(&mut first).unwrap();
        assert_eq!(first, [0u8; 4]);

        let start = Instant::now();
        drop(session);
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}

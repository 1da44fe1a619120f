//! Local chunk producers
//!
//! `ReaderSource` slices any `Read` into fixed-size chunks. `FileSource`
//! appends a list of pre-cut chunk files one whole file at a time, pausing
//! between files to mimic segment arrival.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::buffer::PRODUCER_CHUNK_SIZE;
use crate::config::files::DEFAULT_CHUNK_INTERVAL_MS;
use crate::error::Result;
use crate::stream::interruptible_sleep;
use crate::stream::types::{ChunkSink, ChunkSource};

/// Reads an inner reader in `chunk_size` pieces until EOF.
pub struct ReaderSource<R> {
    reader: R,
    chunk_size: usize,
}

impl<R: Read + Send> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            chunk_size: PRODUCER_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl<R: Read + Send> ChunkSource for ReaderSource<R> {
    fn name(&self) -> &str {
        "reader"
    }

    fn run(mut self: Box<Self>, sink: &dyn ChunkSink, stop: &AtomicBool) -> Result<()> {
        let mut chunk = vec![0u8; self.chunk_size];
        let mut total = 0u64;

        loop {
            if stop.load(Ordering::Relaxed) {
                debug!(total, "reader source stopped");
                return Ok(());
            }

            match self.reader.read(&mut chunk) {
                Ok(0) => {
                    debug!(total, "reader source reached EOF");
                    return Ok(());
                }
                Ok(n) => {
                    total += n as u64;
                    sink.append_chunk(chunk[..n].to_vec());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(total, error = %e, "reader source failed");
                    return Err(e.into());
                }
            }
        }
    }
}

/// Options for [`FileSource`]
#[derive(Debug, Clone)]
pub struct FileSourceOptions {
    /// Pause between consecutive files
    pub interval: Duration,
}

impl Default for FileSourceOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_CHUNK_INTERVAL_MS),
        }
    }
}

impl FileSourceOptions {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Appends each file as one chunk, in list order.
pub struct FileSource {
    paths: Vec<PathBuf>,
    options: FileSourceOptions,
}

impl FileSource {
    pub fn new(paths: Vec<PathBuf>, options: FileSourceOptions) -> Self {
        Self { paths, options }
    }

    /// Numbered chunk files: `dir/{prefix}{i}.{extension}` for `i` in `0..count`,
    /// e.g. `chunks/segment0.ts` … `chunks/segment11.ts`.
    pub fn numbered(
        dir: impl AsRef<Path>,
        prefix: &str,
        extension: &str,
        count: usize,
        options: FileSourceOptions,
    ) -> Self {
        let dir = dir.as_ref();
        let paths = (0..count)
            .map(|i| dir.join(format!("{prefix}{i}.{extension}")))
            .collect();
        Self::new(paths, options)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl ChunkSource for FileSource {
    fn name(&self) -> &str {
        "files"
    }

    fn run(self: Box<Self>, sink: &dyn ChunkSink, stop: &AtomicBool) -> Result<()> {
        let count = self.paths.len();

        for (i, path) in self.paths.iter().enumerate() {
            if stop.load(Ordering::Relaxed) {
                return Ok(());
            }

            let chunk = std::fs::read(path).map_err(|e| {
                warn!(path = %path.display(), error = %e, "failed to load chunk file");
                e
            })?;
            info!(path = %path.display(), len = chunk.len(), "loaded chunk {}/{}", i + 1, count);
            sink.append_chunk(chunk);

            let is_last = i + 1 == count;
            if !is_last
                && !self.options.interval.is_zero()
                && !interruptible_sleep(self.options.interval, stop)
            {
                return Ok(());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use crate::stream::buffer::StreamBuffer;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    /// Sink that records every chunk as appended
    #[derive(Default)]
    struct RecordingSink {
        chunks: Mutex<Vec<Vec<u8>>>,
        finished: AtomicBool,
    }

    impl ChunkSink for RecordingSink {
        fn append_chunk(&self, chunk: Vec<u8>) {
            self.chunks.lock().unwrap().push(chunk);
        }

        fn mark_finished(&self) {
            self.finished.store(true, Ordering::Relaxed);
        }
    }

    /// Reader that fails after yielding some bytes
    struct FailingReader {
        data: Cursor<Vec<u8>>,
        fail_after: usize,
        interrupted_once: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.interrupted_once {
                self.interrupted_once = true;
                return Err(io::Error::new(io::ErrorKind::Interrupted, "signal"));
            }
            if self.data.position() as usize >= self.fail_after {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
            }
            let limit = self.fail_after - self.data.position() as usize;
            let len = buf.len().min(limit);
            self.data.read(&mut buf[..len])
        }
    }

    // --- ReaderSource ---

    #[test]
    fn reader_source_splits_into_chunks() {
        let data: Vec<u8> = (0..100).collect();
        let sink = RecordingSink::default();
        let stop = AtomicBool::new(false);

        let source = Box::new(ReaderSource::new(Cursor::new(data.clone())).with_chunk_size(30));
        source.run(&sink, &stop).unwrap();

        let chunks = sink.chunks.lock().unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[3].len(), 10);
        assert_eq!(chunks.concat(), data);
        assert!(!sink.finished.load(Ordering::Relaxed), "caller finishes, not the source");
    }

    #[test]
    fn reader_source_feeds_buffer() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 256) as u8).collect();
        let buffer = StreamBuffer::new();
        let stop = AtomicBool::new(false);

        Box::new(ReaderSource::new(Cursor::new(data.clone())))
            .run(&buffer, &stop)
            .unwrap();
        buffer.mark_finished();

        let mut out = Vec::new();
        loop {
            let bytes = buffer.read_chunk(4096).unwrap();
            if bytes.is_empty() {
                break;
            }
            out.extend(bytes);
        }
        assert_eq!(out, data);
    }

    #[test]
    fn reader_source_propagates_error_after_partial_data() {
        let reader = FailingReader {
            data: Cursor::new(vec![5u8; 50]),
            fail_after: 20,
            interrupted_once: false,
        };
        let sink = RecordingSink::default();
        let stop = AtomicBool::new(false);

        let result = Box::new(ReaderSource::new(reader).with_chunk_size(8)).run(&sink, &stop);
        assert!(matches!(result, Err(StreamError::Io(_))));
        assert_eq!(sink.chunks.lock().unwrap().concat(), vec![5u8; 20]);
    }

    #[test]
    fn reader_source_respects_stop_flag() {
        let sink = RecordingSink::default();
        let stop = AtomicBool::new(true);

        Box::new(ReaderSource::new(Cursor::new(vec![1u8; 64])))
            .run(&sink, &stop)
            .unwrap();
        assert!(sink.chunks.lock().unwrap().is_empty());
    }

    // --- FileSource ---

    fn write_chunks(dir: &Path, count: usize) -> Vec<Vec<u8>> {
        (0..count)
            .map(|i| {
                let bytes = vec![i as u8; 10 + i];
                std::fs::write(dir.join(format!("chunk{i}.ts")), &bytes).unwrap();
                bytes
            })
            .collect()
    }

    #[test]
    fn file_source_appends_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let expected = write_chunks(dir.path(), 4);
        let sink = RecordingSink::default();
        let stop = AtomicBool::new(false);

        let options = FileSourceOptions::default().with_interval(Duration::ZERO);
        let source = FileSource::numbered(dir.path(), "chunk", "ts", 4, options);
        assert_eq!(source.paths().len(), 4);
        Box::new(source).run(&sink, &stop).unwrap();

        assert_eq!(*sink.chunks.lock().unwrap(), expected);
    }

    #[test]
    fn file_source_waits_between_files() {
        let dir = tempfile::tempdir().unwrap();
        write_chunks(dir.path(), 3);
        let sink = RecordingSink::default();
        let stop = AtomicBool::new(false);

        let options = FileSourceOptions::default().with_interval(Duration::from_millis(40));
        let start = Instant::now();
        Box::new(FileSource::numbered(dir.path(), "chunk", "ts", 3, options))
            .run(&sink, &stop)
            .unwrap();

        // Two gaps between three files, none after the last
        assert!(start.elapsed() >= Duration::from_millis(80));
        assert_eq!(sink.chunks.lock().unwrap().len(), 3);
    }

    #[test]
    fn file_source_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        write_chunks(dir.path(), 1);
        let sink = RecordingSink::default();
        let stop = AtomicBool::new(false);

        let options = FileSourceOptions::default().with_interval(Duration::ZERO);
        let result =
            Box::new(FileSource::numbered(dir.path(), "chunk", "ts", 2, options)).run(&sink, &stop);

        assert!(matches!(result, Err(StreamError::Io(_))));
        assert_eq!(sink.chunks.lock().unwrap().len(), 1);
    }

    #[test]
    fn file_source_stops_during_interval() {
        let dir = tempfile::tempdir().unwrap();
        write_chunks(dir.path(), 3);
        let sink = Arc::new(RecordingSink::default());
        let stop = Arc::new(AtomicBool::new(false));

        let options = FileSourceOptions::default().with_interval(Duration::from_secs(10));
        let source = Box::new(FileSource::numbered(dir.path(), "chunk", "ts", 3, options));

        let thread_sink = sink.clone();
        let thread_stop = stop.clone();
        let handle = std::thread::spawn(move || source.run(thread_sink.as_ref(), &thread_stop));

        std::thread::sleep(Duration::from_millis(100));
        stop.store(true, Ordering::Relaxed);
        let start = Instant::now();
        handle.join().unwrap().unwrap();

        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(sink.chunks.lock().unwrap().len(), 1);
    }
}

//! chunkstream CLI — feed chunk files or an HLS playlist through a stream buffer

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use chunkstream::config::buffer::DEFAULT_READ_SIZE;
use chunkstream::config::files::DEFAULT_CHUNK_INTERVAL_MS;
use chunkstream::config::hls::SEGMENT_PREBUFFER;
use chunkstream::probe::probe_stream;
use chunkstream::session::PlaybackSession;
use chunkstream::stream::{
    ChunkSource, FileSource, FileSourceOptions, HlsSource, HlsSourceOptions, MediaInput,
};

#[derive(Parser)]
#[command(
    name = "chunkstream",
    about = "Stream chunk files or an HLS playlist through a blocking chunk buffer",
    version
)]
struct Cli {
    #[command(subcommand)]
    source: SourceCommand,

    /// Write the drained stream here (`-` for stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Consumer read size in bytes
    #[arg(long, default_value_t = DEFAULT_READ_SIZE, global = true)]
    read_size: usize,

    /// Probe the container/codec instead of draining
    #[arg(long, global = true)]
    probe: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum SourceCommand {
    /// Append local chunk files in order
    Files {
        /// Chunk files, appended in the order given
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Pause between files in milliseconds
        #[arg(long, default_value_t = DEFAULT_CHUNK_INTERVAL_MS)]
        interval_ms: u64,
    },
    /// Poll an HLS playlist and append new segments
    Hls {
        /// Master or media playlist URL
        url: String,

        /// Extra request header, `Name: value` (repeatable)
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Segments taken from the live edge on the first fetch
        #[arg(long, default_value_t = SEGMENT_PREBUFFER, value_parser = parse_prebuffer)]
        prebuffer: usize,

        /// Finish after this many segments
        #[arg(long)]
        max_segments: Option<usize>,

        /// Ignore system proxy settings
        #[arg(long)]
        no_proxy: bool,
    },
}

impl SourceCommand {
    fn into_source(self) -> Box<dyn ChunkSource> {
        match self {
            SourceCommand::Files { paths, interval_ms } => {
                let options =
                    FileSourceOptions::default().with_interval(Duration::from_millis(interval_ms));
                Box::new(FileSource::new(paths, options))
            }
            SourceCommand::Hls {
                url,
                headers,
                prebuffer,
                max_segments,
                no_proxy,
            } => {
                let mut options = HlsSourceOptions::default()
                    .with_prebuffer_segments(prebuffer)
                    .with_no_proxy(no_proxy);
                for (name, value) in headers {
                    options = options.with_header(name, value);
                }
                if let Some(max) = max_segments {
                    options = options.with_max_segments(max);
                }
                Box::new(HlsSource::new(url, options))
            }
        }
    }

    /// Extension hint for the probe, taken from the first file or the URL
    fn extension_hint(&self) -> Option<String> {
        let name = match self {
            SourceCommand::Files { paths, .. } => paths.first()?.to_string_lossy().into_owned(),
            SourceCommand::Hls { .. } => return Some("ts".to_string()),
        };
        name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: value`, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in `{raw}`"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_prebuffer(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("prebuffer must be at least 1 segment".to_string()),
        Ok(count) => Ok(count),
        Err(e) => Err(format!("invalid segment count `{raw}`: {e}")),
    }
}

fn open_output(path: Option<&PathBuf>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match path {
        Some(p) if p.as_os_str() == "-" => Box::new(BufWriter::new(io::stdout().lock())),
        Some(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("creating {}", p.display()))?,
        )),
        None => Box::new(io::sink()),
    })
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if cli.read_size == 0 {
        bail!("--read-size must be greater than zero");
    }

    let hint = cli.source.extension_hint();
    let mut session = PlaybackSession::start(cli.source.into_source())
        .context("starting producer thread")?;
    let mut reader = session.reader();
    let started = Instant::now();

    if cli.probe {
        let summary = probe_stream(reader, hint.as_deref()).context("probing stream")?;
        eprintln!(
            "codec: {}  sample rate: {}  channels: {}  tracks: {}",
            summary.codec,
            summary
                .sample_rate
                .map_or_else(|| "?".to_string(), |r| r.to_string()),
            summary
                .channels
                .map_or_else(|| "?".to_string(), |c| c.to_string()),
            summary.track_count
        );
        session.stop();
        return Ok(());
    }

    let mut output = open_output(cli.output.as_ref())?;
    let size = reader.open()?;
    info!(size = ?size, read_size = cli.read_size, "consumer opened stream");

    let mut buf = vec![0u8; cli.read_size];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        output.write_all(&buf[..n])?;
    }
    output.flush()?;
    reader.close();

    session.join();
    let status = session.status();
    eprintln!(
        "{} bytes in {} chunks, {} reader waits, {:.1}s",
        status.bytes_delivered,
        status.chunks_appended,
        status.reader_waits,
        started.elapsed().as_secs_f64()
    );

    if let Some(err) = session.producer_error() {
        bail!("producer stopped early: {err}");
    }
    Ok(())
}

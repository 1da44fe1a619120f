//! HLS playlist poller
//!
//! Polls a media playlist, downloads segments that have not been seen yet and
//! appends them to the sink in playlist order. Live playlists are polled
//! forever (until stopped); VOD playlists finish once every segment is in.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, info, warn};

use crate::config::hls::{
    MIN_RELOAD_SECS, SEGMENT_PREBUFFER, SEGMENT_TIMEOUT_SECS, VOD_RELOAD_SECS,
};
use crate::config::network::{CONNECT_TIMEOUT_SECS, USER_AGENT};
use crate::error::{Result, StreamError};
use crate::stream::playlist::{parse_playlist, resolve_uri, ParsedPlaylist};
use crate::stream::types::{ChunkSink, ChunkSource};
use crate::stream::{backoff_sleep, interruptible_sleep};

/// Maximum master → media playlist nesting followed before giving up
const MAX_PLAYLIST_DEPTH: usize = 5;

/// Options for [`HlsSource`]
#[derive(Debug, Clone)]
pub struct HlsSourceOptions {
    /// Extra request headers sent with every playlist and segment request
    pub headers: Vec<(String, String)>,
    /// Segments taken from the tail of a live playlist on the first fetch
    pub prebuffer_segments: usize,
    /// Stop after this many segments have been appended
    pub max_segments: Option<usize>,
    /// Ignore system proxy settings
    pub no_proxy: bool,
}

impl Default for HlsSourceOptions {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            prebuffer_segments: SEGMENT_PREBUFFER,
            max_segments: None,
            no_proxy: false,
        }
    }
}

impl HlsSourceOptions {
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Live-edge prebuffer on the first fetch. `0` is raised to `1`, so a
    /// live stream always starts with at least the newest segment.
    pub fn with_prebuffer_segments(mut self, count: usize) -> Self {
        self.prebuffer_segments = count.max(1);
        self
    }

    pub fn with_max_segments(mut self, max: usize) -> Self {
        self.max_segments = Some(max);
        self
    }

    pub fn with_no_proxy(mut self, no_proxy: bool) -> Self {
        self.no_proxy = no_proxy;
        self
    }

    fn header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.trim().as_bytes())
                .map_err(|_| StreamError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value.trim())
                .map_err(|_| StreamError::InvalidHeader(format!("{name}: {value}")))?;
            map.append(name, value);
        }
        Ok(map)
    }
}

/// Tracks which segment URLs were already handed to the sink.
///
/// Dedup is by absolute URL rather than media sequence number, since some
/// servers keep `EXT-X-MEDIA-SEQUENCE` fixed while rotating segment URLs.
#[derive(Debug)]
pub(crate) struct SegmentTracker {
    downloaded: HashSet<String>,
    first_fetch: bool,
    prebuffer: usize,
}

impl SegmentTracker {
    pub(crate) fn new(prebuffer: usize) -> Self {
        Self {
            downloaded: HashSet::new(),
            first_fetch: true,
            prebuffer,
        }
    }

    /// Segments from `urls` still to fetch, in playlist order.
    ///
    /// The first live fetch starts `prebuffer` segments back from the live
    /// edge; VOD starts at the beginning.
    pub(crate) fn select(&mut self, urls: &[String], is_live: bool) -> Vec<String> {
        let start_idx = if self.first_fetch && is_live {
            urls.len().saturating_sub(self.prebuffer.min(urls.len()))
        } else {
            0
        };

        if self.first_fetch && start_idx > 0 {
            // Older segments are never fetched; treat them as seen.
            self.downloaded.extend(urls[..start_idx].iter().cloned());
        }
        self.first_fetch = false;

        urls[start_idx..]
            .iter()
            .filter(|url| !self.downloaded.contains(*url))
            .cloned()
            .collect()
    }

    pub(crate) fn mark(&mut self, url: String) {
        self.downloaded.insert(url);
    }

    /// Forget URLs that scrolled out of the live window
    pub(crate) fn retain_window(&mut self, urls: &[String]) {
        let current: HashSet<&String> = urls.iter().collect();
        self.downloaded.retain(|url| current.contains(url));
    }

    pub(crate) fn all_seen(&self, urls: &[String]) -> bool {
        urls.iter().all(|url| self.downloaded.contains(url))
    }
}

/// Playlist reload timing (RFC 8216 §6.3.4): a full target duration after
/// the playlist changed, half of it when nothing new appeared.
pub(crate) fn reload_interval(
    target_duration_secs: u64,
    is_live: bool,
    fetched_new: bool,
) -> Duration {
    if !is_live {
        return Duration::from_secs(VOD_RELOAD_SECS);
    }
    let base = target_duration_secs.max(MIN_RELOAD_SECS);
    if fetched_new {
        Duration::from_secs(base)
    } else {
        Duration::from_millis(base * 500)
    }
}

/// Polls an HLS playlist and appends every new segment.
pub struct HlsSource {
    url: String,
    options: HlsSourceOptions,
}

impl HlsSource {
    pub fn new(url: impl Into<String>, options: HlsSourceOptions) -> Self {
        Self {
            url: url.into(),
            options,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_client(&self) -> Result<Client> {
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(self.options.header_map()?)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(SEGMENT_TIMEOUT_SECS * 2));
        if self.options.no_proxy {
            builder = builder.no_proxy();
        }
        Ok(builder.build()?)
    }
}

fn fetch_bytes(client: &Client, url: &str) -> Result<Vec<u8>> {
    let response = client.get(url).send()?.error_for_status()?;
    Ok(response.bytes()?.to_vec())
}

/// Follow master playlists down to a media playlist URL
fn resolve_media_url(client: &Client, url: &str) -> Result<String> {
    let mut current = url.to_string();

    for _ in 0..MAX_PLAYLIST_DEPTH {
        let content = fetch_bytes(client, &current)?;
        match parse_playlist(&content)? {
            ParsedPlaylist::Media(_) => return Ok(current),
            ParsedPlaylist::Master(variants) => {
                let variant = variants.first().ok_or_else(|| {
                    StreamError::Playlist("No variants in master playlist".to_string())
                })?;
                let next = resolve_uri(&current, variant);
                debug!(master = %current, variant = %next, "following master playlist");
                current = next;
            }
        }
    }

    Err(StreamError::Playlist("HLS playlist nesting too deep".to_string()))
}

impl ChunkSource for HlsSource {
    fn name(&self) -> &str {
        "hls"
    }

    fn run(self: Box<Self>, sink: &dyn ChunkSink, stop: &AtomicBool) -> Result<()> {
        let client = self.build_client()?;
        let media_url = resolve_media_url(&client, &self.url)?;
        info!(url = %media_url, "polling media playlist");

        let mut tracker = SegmentTracker::new(self.options.prebuffer_segments);
        let mut consecutive_failures: u32 = 0;
        let mut appended: usize = 0;

        loop {
            if stop.load(Ordering::SeqCst) {
                return Ok(());
            }

            let fetched = fetch_bytes(&client, &media_url).and_then(|body| parse_playlist(&body));
            let playlist = match fetched {
                Ok(ParsedPlaylist::Media(playlist)) => playlist,
                Ok(ParsedPlaylist::Master(_)) => {
                    return Err(StreamError::Playlist(
                        "Expected media playlist".to_string(),
                    ));
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(error = %e, consecutive_failures, "playlist refresh failed");
                    if !backoff_sleep(consecutive_failures, stop) {
                        return Ok(());
                    }
                    continue;
                }
            };

            // Playlist fetched successfully, reset backoff
            consecutive_failures = 0;

            let is_live = playlist.is_live();
            let urls: Vec<String> = playlist
                .segment_uris
                .iter()
                .map(|uri| resolve_uri(&media_url, uri))
                .collect();

            let pending = tracker.select(&urls, is_live);
            debug!(
                segments = urls.len(),
                new = pending.len(),
                is_live,
                "playlist refreshed"
            );
            let mut fetched_new = false;

            for segment_url in pending {
                if stop.load(Ordering::SeqCst) {
                    return Ok(());
                }

                match fetch_bytes(&client, &segment_url) {
                    Ok(data) if data.is_empty() => {
                        warn!(url = %segment_url, "empty segment, skipping");
                    }
                    Ok(data) => {
                        debug!(url = %segment_url, len = data.len(), "segment downloaded");
                        if stop.load(Ordering::SeqCst) {
                            return Ok(());
                        }
                        sink.append_chunk(data);
                        appended += 1;
                    }
                    Err(e) => {
                        // Still marked as seen below: failed segments are never retried.
                        warn!(url = %segment_url, error = %e, "segment failed, skipping");
                    }
                }
                tracker.mark(segment_url);
                fetched_new = true;

                if self.options.max_segments.is_some_and(|max| appended >= max) {
                    info!(appended, "segment limit reached");
                    return Ok(());
                }
            }

            tracker.retain_window(&urls);

            if !is_live && tracker.all_seen(&urls) {
                info!(appended, "playlist ended, all segments downloaded");
                return Ok(());
            }

            let wait = reload_interval(playlist.target_duration_secs, is_live, fetched_new);
            if !interruptible_sleep(wait, stop) {
                return Ok(());
            }
        }
    }
}

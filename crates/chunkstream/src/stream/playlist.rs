//! HLS playlist parsing and URL helpers

use m3u8_rs::Playlist;
use reqwest::Url;

use crate::error::{Result, StreamError};

/// Target duration assumed when a playlist does not declare one
pub const DEFAULT_TARGET_DURATION_SECS: u64 = 5;

/// Media playlist reduced to what the segment poller needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPlaylistSnapshot {
    /// Segment URIs in playlist order, as written (possibly relative)
    pub segment_uris: Vec<String>,
    pub target_duration_secs: u64,
    /// `#EXT-X-ENDLIST` present: no more segments will be added
    pub end_list: bool,
}

impl MediaPlaylistSnapshot {
    pub fn is_live(&self) -> bool {
        !self.end_list
    }
}

/// Result of parsing a playlist body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPlaylist {
    /// Master playlist: variant URIs in declaration order
    Master(Vec<String>),
    Media(MediaPlaylistSnapshot),
}

/// Parse a playlist body.
///
/// Bodies m3u8-rs rejects fall back to a line scan for `.ts` URIs, treated
/// as a live playlist.
pub fn parse_playlist(content: &[u8]) -> Result<ParsedPlaylist> {
    match m3u8_rs::parse_playlist(content) {
        Ok((_, Playlist::MasterPlaylist(master))) => Ok(ParsedPlaylist::Master(
            master.variants.into_iter().map(|v| v.uri).collect(),
        )),
        Ok((_, Playlist::MediaPlaylist(media))) => {
            Ok(ParsedPlaylist::Media(MediaPlaylistSnapshot {
                segment_uris: media
                    .segments
                    .into_iter()
                    .map(|s| s.uri)
                    .filter(|uri| is_valid_segment_uri(uri))
                    .collect(),
                target_duration_secs: media.target_duration as u64,
                end_list: media.end_list,
            }))
        }
        Err(e) => {
            let text = String::from_utf8_lossy(content);
            scan_media_playlist(&text)
                .map(ParsedPlaylist::Media)
                .ok_or_else(|| StreamError::Playlist(format!("Playlist parse error: {:?}", e)))
        }
    }
}

/// Line-based fallback: every non-tag line naming a `.ts` file is a segment.
pub fn scan_media_playlist(content: &str) -> Option<MediaPlaylistSnapshot> {
    let mut target_duration_secs = DEFAULT_TARGET_DURATION_SECS;
    let mut end_list = false;
    let mut segment_uris = Vec::new();

    for line in content.lines().map(str::trim) {
        if let Some(value) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
            if let Ok(secs) = value.trim().parse::<f64>() {
                target_duration_secs = secs.ceil() as u64;
            }
        } else if line == "#EXT-X-ENDLIST" {
            end_list = true;
        } else if !line.starts_with('#') && is_ts_uri(line) {
            segment_uris.push(line.to_string());
        }
    }

    if segment_uris.is_empty() {
        return None;
    }
    Some(MediaPlaylistSnapshot {
        segment_uris,
        target_duration_secs,
        end_list,
    })
}

fn is_ts_uri(line: &str) -> bool {
    !line.is_empty()
        && !line.contains(char::is_whitespace)
        && (line.ends_with(".ts") || line.contains(".ts?"))
}

/// Check that a parsed segment URI is not blank or a stray `key="value"` line.
///
/// Any other text is a URI reference; extensionless names like `chunk_001`
/// or `seg?id=3` are valid segments.
pub fn is_valid_segment_uri(uri: &str) -> bool {
    let trimmed = uri.trim();
    !trimmed.is_empty() && !trimmed.contains("=\"") && !trimmed.contains("='")
}

/// Resolve a (possibly relative) URI against the playlist it was listed in.
pub fn resolve_uri(playlist_url: &str, uri: &str) -> String {
    let uri = uri.trim();
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return uri.to_string();
    }

    match Url::parse(playlist_url).and_then(|base| base.join(uri)) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{}/{}", get_base_url(playlist_url), uri),
    }
}

/// Extract the base URL (directory) from a full URL
pub fn get_base_url(url: &str) -> String {
    url.rsplit_once('/')
        .map(|(base, _)| base)
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIVE_PLAYLIST: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:4
#EXT-X-MEDIA-SEQUENCE:120
#EXTINF:4.000,
seg120.ts
#EXTINF:4.000,
seg121.ts
#EXTINF:4.000,
seg122.ts
";

    const VOD_PLAYLIST: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:0
#EXTINF:6.000,
https://cdn.example.com/a/0.ts
#EXTINF:6.000,
https://cdn.example.com/a/1.ts
#EXT-X-ENDLIST
";

    const MASTER_PLAYLIST: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=1280000,RESOLUTION=640x360
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2560000,RESOLUTION=1280x720
high/index.m3u8
";

    // --- parse_playlist ---

    #[test]
    fn parses_live_media_playlist() {
        let ParsedPlaylist::Media(media) = parse_playlist(LIVE_PLAYLIST.as_bytes()).unwrap()
        else {
            panic!("expected media playlist");
        };
        assert_eq!(media.segment_uris, vec!["seg120.ts", "seg121.ts", "seg122.ts"]);
        assert_eq!(media.target_duration_secs, 4);
        assert!(media.is_live());
    }

    #[test]
    fn parses_vod_media_playlist() {
        let ParsedPlaylist::Media(media) = parse_playlist(VOD_PLAYLIST.as_bytes()).unwrap()
        else {
            panic!("expected media playlist");
        };
        assert_eq!(media.segment_uris.len(), 2);
        assert!(media.end_list);
        assert!(!media.is_live());
    }

    #[test]
    fn parses_master_playlist_variants() {
        let parsed = parse_playlist(MASTER_PLAYLIST.as_bytes()).unwrap();
        assert_eq!(
            parsed,
            ParsedPlaylist::Master(vec![
                "low/index.m3u8".to_string(),
                "high/index.m3u8".to_string()
            ])
        );
    }

    #[test]
    fn garbage_is_playlist_error() {
        let result = parse_playlist(b"<html>not a playlist</html>");
        assert!(matches!(result, Err(StreamError::Playlist(_))));
    }

    // --- scan_media_playlist ---

    #[test]
    fn scan_finds_ts_lines() {
        let body = "#EXTM3U\n#EXT-X-TARGETDURATION:8\n#EXTINF:8,\nmono-1.ts\n#EXTINF:8,\nmono-2.ts?tok=1\n";
        let media = scan_media_playlist(body).unwrap();
        assert_eq!(media.segment_uris, vec!["mono-1.ts", "mono-2.ts?tok=1"]);
        assert_eq!(media.target_duration_secs, 8);
        assert!(!media.end_list);
    }

    #[test]
    fn scan_defaults_target_duration() {
        let media = scan_media_playlist("a.ts\n#EXT-X-ENDLIST\n").unwrap();
        assert_eq!(media.target_duration_secs, DEFAULT_TARGET_DURATION_SECS);
        assert!(media.end_list);
    }

    #[test]
    fn scan_without_segments_is_none() {
        assert!(scan_media_playlist("#EXTM3U\n#EXT-X-VERSION:3\n").is_none());
    }

    // --- is_valid_segment_uri ---

    #[test]
    fn valid_segment_uris() {
        assert!(is_valid_segment_uri("seg1.ts"));
        assert!(is_valid_segment_uri("seg1.aac?x=1"));
        assert!(is_valid_segment_uri("path/to/segment"));
        assert!(is_valid_segment_uri("https://example.com/anything"));
        assert!(is_valid_segment_uri("segment"));
        assert!(is_valid_segment_uri("seg?id=3"));
    }

    #[test]
    fn invalid_segment_uris() {
        assert!(!is_valid_segment_uri(""));
        assert!(!is_valid_segment_uri("   "));
        assert!(!is_valid_segment_uri("TITLE=\"Song\""));
        assert!(!is_valid_segment_uri("artist='Band'"));
    }

    #[test]
    fn keeps_extensionless_segment_uris() {
        let body = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:2
#EXTINF:2.000,
chunk_001
#EXTINF:2.000,
chunk_002
#EXTINF:2.000,
seg?id=3
#EXT-X-ENDLIST
";
        let ParsedPlaylist::Media(media) = parse_playlist(body.as_bytes()).unwrap() else {
            panic!("expected media playlist");
        };
        assert_eq!(media.segment_uris, vec!["chunk_001", "chunk_002", "seg?id=3"]);
        assert!(!media.is_live());
    }

    // --- resolve_uri ---

    #[test]
    fn resolve_relative_uri() {
        assert_eq!(
            resolve_uri("https://cdn.example.com/live/tracks/mono.m3u8", "seg1.ts"),
            "https://cdn.example.com/live/tracks/seg1.ts"
        );
    }

    #[test]
    fn resolve_root_relative_uri() {
        assert_eq!(
            resolve_uri("https://cdn.example.com/live/mono.m3u8", "/other/seg1.ts"),
            "https://cdn.example.com/other/seg1.ts"
        );
    }

    #[test]
    fn resolve_absolute_uri_unchanged() {
        assert_eq!(
            resolve_uri("https://a.example.com/x.m3u8", "http://b.example.com/y.ts"),
            "http://b.example.com/y.ts"
        );
    }

    #[test]
    fn resolve_falls_back_for_unparseable_base() {
        assert_eq!(resolve_uri("chunks/list.m3u8", "seg.ts"), "chunks/seg.ts");
    }

    #[test]
    fn base_url_strips_last_component() {
        assert_eq!(get_base_url("http://x.com/a/b.m3u8"), "http://x.com/a");
        assert_eq!(get_base_url("nodir"), "");
    }
}

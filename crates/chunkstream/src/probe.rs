//! Format probing over a forward-only stream
//!
//! Runs symphonia's probe directly on a non-seekable media source, the same
//! way a decoder would consume a [`StreamBufferReader`](crate::stream::StreamBufferReader).
//! MPEG-TS input is demuxed to its audio elementary stream first.

use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::error::{Result, StreamError};
use crate::stream::ts::TsAudioReader;

/// What the probe found in the first track with a known codec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSummary {
    /// Short codec name, e.g. `mp3` or `pcm_s16le`
    pub codec: String,
    pub sample_rate: Option<u32>,
    pub channels: Option<usize>,
    pub track_count: usize,
}

/// Probe the container and codec of `source`.
///
/// Blocks on the source's reads until enough bytes arrived to identify the
/// format. `extension` is an optional file-extension hint (`"ts"`, `"aac"`).
/// A `ts` hint routes the source through [`TsAudioReader`] and probes the
/// extracted audio as ADTS.
pub fn probe_stream<S>(source: S, extension: Option<&str>) -> Result<ProbeSummary>
where
    S: MediaSource + 'static,
{
    let is_ts = extension.is_some_and(|ext| ext.eq_ignore_ascii_case("ts"));
    let (source, extension): (Box<dyn MediaSource>, _) = if is_ts {
        debug!("demuxing transport stream before probe");
        (Box::new(TsAudioReader::new(source)), Some("aac"))
    } else {
        (Box::new(source), extension)
    };
    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| StreamError::Decode(format!("Probe error: {}", e)))?;

    let format = probed.format;
    let tracks = format.tracks();
    let track = tracks
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| StreamError::Decode("No decodable track found".to_string()))?;

    let params = &track.codec_params;
    let codec = symphonia::default::get_codecs()
        .get_codec(params.codec)
        .map(|d| d.short_name.to_string())
        .unwrap_or_else(|| format!("{:?}", params.codec));

    let summary = ProbeSummary {
        codec,
        sample_rate: params.sample_rate,
        channels: params.channels.map(|c| c.count()),
        track_count: tracks.len(),
    };
    debug!(?summary, "stream probed");
    Ok(summary)
}

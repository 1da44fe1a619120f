//! MPEG-TS audio extraction
//!
//! HLS segments are MPEG transport streams, which symphonia has no reader
//! for. [`TsAudioReader`] pulls TS packets from a forward-only source and
//! yields the audio elementary stream (usually ADTS AAC) as plain bytes, so
//! the probe and decoders can treat it like a `.aac` file.

use std::collections::HashSet;
use std::io::{self, Read, Seek, SeekFrom};

use mpeg2ts::ts::{ReadTsPacket, TsPacketReader, TsPayload};
use symphonia::core::io::MediaSource;
use tracing::{debug, warn};

/// PMT stream types carrying audio: MPEG-1/2 audio (0x03, 0x04), ADTS AAC
/// (0x0F), LATM AAC (0x11), AC-3 (0x81) and private data (0x80).
const AUDIO_STREAM_TYPES: [u8; 6] = [0x03, 0x04, 0x0F, 0x11, 0x81, 0x80];

/// PIDs assumed to carry audio until a PMT says otherwise
const FALLBACK_AUDIO_PIDS: [u16; 2] = [0x101, 0x102];

/// Streaming TS demuxer over any reader.
///
/// Malformed input ends the stream rather than failing the read; whatever
/// audio was extracted up to that point stays readable.
pub struct TsAudioReader<R: Read> {
    packets: TsPacketReader<R>,
    audio_pids: HashSet<u16>,
    pmt_seen: bool,
    pending: Vec<u8>,
    pending_pos: usize,
    delivered: u64,
    finished: bool,
}

impl<R: Read> TsAudioReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            packets: TsPacketReader::new(inner),
            audio_pids: HashSet::new(),
            pmt_seen: false,
            pending: Vec::new(),
            pending_pos: 0,
            delivered: 0,
            finished: false,
        }
    }

    fn is_audio_pid(&self, pid: u16) -> bool {
        if self.pmt_seen {
            self.audio_pids.contains(&pid)
        } else {
            FALLBACK_AUDIO_PIDS.contains(&pid)
        }
    }

    /// Read packets until some audio payload is pending or the input ends.
    fn fill(&mut self) {
        self.pending.clear();
        self.pending_pos = 0;

        while self.pending.is_empty() && !self.finished {
            let packet = match self.packets.read_ts_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => {
                    debug!(delivered = self.delivered, "transport stream ended");
                    self.finished = true;
                    return;
                }
                Err(e) => {
                    warn!(delivered = self.delivered, error = %e, "bad TS packet, ending stream");
                    self.finished = true;
                    return;
                }
            };

            let pid = packet.header.pid.as_u16();
            match packet.payload {
                Some(TsPayload::Pmt(pmt)) => {
                    let pids: HashSet<u16> = pmt
                        .es_info
                        .iter()
                        .filter(|es| AUDIO_STREAM_TYPES.contains(&(es.stream_type as u8)))
                        .map(|es| es.elementary_pid.as_u16())
                        .collect();
                    if !pids.is_empty() {
                        debug!(?pids, "audio PIDs from PMT");
                        self.audio_pids = pids;
                        self.pmt_seen = true;
                    }
                }
                Some(TsPayload::PesStart(pes)) if self.is_audio_pid(pid) => {
                    self.pending.extend_from_slice(pes.data.as_ref());
                }
                Some(TsPayload::PesContinuation(data)) if self.is_audio_pid(pid) => {
                    self.pending.extend_from_slice(data.as_ref());
                }
                Some(TsPayload::Raw(data)) if self.is_audio_pid(pid) => {
                    self.pending.extend_from_slice(data.as_ref());
                }
                _ => {}
            }
        }
    }
}

impl<R: Read> Read for TsAudioReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pending_pos == self.pending.len() {
            self.fill();
        }

        let available = &self.pending[self.pending_pos..];
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pending_pos += n;
        self.delivered += n as u64;
        Ok(n)
    }
}

impl<R: Read> Seek for TsAudioReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.delivered),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "demuxed transport stream is forward-only",
            )),
        }
    }
}

impl<R: Read + Send + Sync> MediaSource for TsAudioReader<R> {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

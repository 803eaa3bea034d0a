//! Media assembler on top of `SabrStream`. One extractor handles one
//! elementary track: it translates the server's codec string, rewrites
//! length-prefixed NAL units into start-code-delimited ones for H.264 and
//! H.265, frames SubRip/SSA cues behind their fixed prefix templates, and
//! pushes everything else through to the sink untouched.

use std::io::Read;

use crate::error::{Result, SabrStreamError};
use crate::parts::{SabrPart, SeekReason};
use crate::proto::FormatId;
use crate::stream::SabrStream;

const NAL_START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Prefix template for SubRip cues, UTF-8 for
/// "1\n00:00:00,000 --> 00:00:00,000\n". The 12 byte end timecode at
/// `SUBRIP_END_TIMECODE_OFFSET` is a placeholder patched from the segment
/// duration once it is known.
const SUBRIP_PREFIX: &[u8] = b"1\n00:00:00,000 --> 00:00:00,000\n";
const SUBRIP_END_TIMECODE_OFFSET: usize = 19;
/// End timecode meaning "display until the next cue".
const SUBRIP_TIMECODE_EMPTY: &[u8] = b"            ";

/// Prefix template for SSA cues, with the 10 byte end timecode at
/// `SSA_END_TIMECODE_OFFSET` patched the same way.
const SSA_PREFIX: &[u8] = b"Dialogue: 0:00:00:00,0:00:00:00,";
const SSA_END_TIMECODE_OFFSET: usize = 21;
const SSA_TIMECODE_EMPTY: &[u8] = b"          ";

/// Dialogue format line SSA decoders expect as initialization data when
/// cues are delivered in the prefix framing above.
pub const SSA_DIALOGUE_FORMAT: &[u8] = b"Format: Start, End, ReadOrder, Layer, Style, Name, \
MarginL, MarginR, MarginV, Effect, Text";

// ---------------------------------------------------------------------------
// Codecs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    Opus,
    Vorbis,
    Aac,
    Vp8,
    Vp9,
    Av1,
    H264,
    H265,
    SubRip,
    Ssa,
}

impl CodecId {
    /// Translate an RFC 6381 codec string (the `codecs` parameter of the
    /// format's MIME type) to a canonical codec id.
    pub fn from_codec_string(codec: &str) -> Result<Self> {
        let id = if codec.starts_with("opus") {
            CodecId::Opus
        } else if codec.starts_with("vorbis") {
            CodecId::Vorbis
        } else if codec.starts_with("mp4a") {
            CodecId::Aac
        } else if codec.starts_with("avc") {
            CodecId::H264
        } else if codec.starts_with("hev1") || codec.starts_with("hvc1") {
            CodecId::H265
        } else if codec.starts_with("vp8") || codec.starts_with("vp08") {
            CodecId::Vp8
        } else if codec.starts_with("vp9") || codec.starts_with("vp09") {
            CodecId::Vp9
        } else if codec.starts_with("av01") {
            CodecId::Av1
        } else if codec.starts_with("srt") || codec.starts_with("subrip") {
            CodecId::SubRip
        } else if codec.starts_with("ssa") || codec.starts_with("ass") {
            CodecId::Ssa
        } else {
            return Err(SabrStreamError::UnsupportedCodec(codec.to_string()));
        };
        Ok(id)
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            CodecId::Opus => "audio/opus",
            CodecId::Vorbis => "audio/vorbis",
            CodecId::Aac => "audio/mp4a-latm",
            CodecId::Vp8 => "video/x-vnd.on2.vp8",
            CodecId::Vp9 => "video/x-vnd.on2.vp9",
            CodecId::Av1 => "video/av01",
            CodecId::H264 => "video/avc",
            CodecId::H265 => "video/hevc",
            CodecId::SubRip => "application/x-subrip",
            CodecId::Ssa => "text/x-ssa",
        }
    }

    pub fn track_kind(self) -> TrackKind {
        match self {
            CodecId::Opus | CodecId::Vorbis | CodecId::Aac => TrackKind::Audio,
            CodecId::Vp8 | CodecId::Vp9 | CodecId::Av1 | CodecId::H264 | CodecId::H265 => {
                TrackKind::Video
            }
            CodecId::SubRip | CodecId::Ssa => TrackKind::Text,
        }
    }

    fn needs_nal_rewrite(self) -> bool {
        matches!(self, CodecId::H264 | CodecId::H265)
    }

    fn is_text(self) -> bool {
        matches!(self, CodecId::SubRip | CodecId::Ssa)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
    Text,
}

#[derive(Debug, Clone)]
pub struct TrackMetadata {
    pub format_id: FormatId,
    pub codec: CodecId,
    pub mime_type: &'static str,
    pub track_kind: TrackKind,
    pub end_time_ms: Option<i64>,
    /// Decoder initialization payloads; the SSA dialogue format line for
    /// SSA tracks, empty otherwise.
    pub initialization_data: Vec<Vec<u8>>,
}

// ---------------------------------------------------------------------------
// Sink boundary
// ---------------------------------------------------------------------------

/// Receives the assembled elementary stream. One track per extractor.
pub trait TrackSink {
    fn open_track(&mut self, metadata: &TrackMetadata) -> Result<()>;

    /// A run of sample bytes, already rewritten/framed for the codec.
    fn sample_data(&mut self, data: &[u8]) -> Result<()>;

    /// Commits the bytes written since the previous commit as one sample.
    fn sample_metadata(&mut self, time_us: i64, duration_us: Option<i64>, byte_count: usize)
        -> Result<()>;

    /// Segment ordering is about to break; the next sample is not
    /// contiguous with the previous one.
    fn discontinuity(&mut self, format_id: &FormatId);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadResult {
    Continue,
    EndOfInput,
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

struct TrackState {
    codec: CodecId,
    /// Byte width of the NAL length field in the source sample data.
    nal_length_field_len: usize,
}

pub struct SabrExtractor<S: TrackSink> {
    stream: SabrStream,
    sink: S,
    track: Option<TrackState>,
    // NAL rewrite state, carried across data chunks.
    nal_bytes_remaining: usize,
    nal_length_buf: [u8; 4],
    nal_length_filled: usize,
    // Text cue buffered until the end timecode is known.
    subtitle_sample: Vec<u8>,
    sample_bytes_written: usize,
}

impl<S: TrackSink> SabrExtractor<S> {
    pub fn new(stream: SabrStream, sink: S) -> Self {
        Self {
            stream,
            sink,
            track: None,
            nal_bytes_remaining: 0,
            nal_length_buf: [0; 4],
            nal_length_filled: 0,
            subtitle_sample: Vec::new(),
            sample_bytes_written: 0,
        }
    }

    pub fn stream(&self) -> &SabrStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut SabrStream {
        &mut self.stream
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Pump one protocol event through the assembler. `EndOfInput` means
    /// the byte source is exhausted; the caller issues the next request
    /// and calls again.
    pub fn read<R: Read>(&mut self, input: &mut R) -> Result<ReadResult> {
        match self.stream.parse(input)? {
            Some(part) => {
                self.handle_part(part)?;
                Ok(ReadResult::Continue)
            }
            None => Ok(ReadResult::EndOfInput),
        }
    }

    /// Drop in-flight sample state after the consumer seeks.
    pub fn seek(&mut self) {
        self.stream.reset();
        self.reset_sample();
        self.subtitle_sample.clear();
        self.sample_bytes_written = 0;
    }

    fn handle_part(&mut self, part: SabrPart) -> Result<()> {
        match part {
            SabrPart::FormatInitialized {
                format_id,
                mime_type,
                end_time_ms,
            } => self.initialize_track(format_id, mime_type.as_deref(), end_time_ms),
            SabrPart::MediaSegmentInit { .. } => {
                self.reset_sample();
                Ok(())
            }
            SabrPart::MediaSegmentData {
                data,
                is_init_segment,
                ..
            } => self.write_sample_data(&data, is_init_segment),
            SabrPart::MediaSegmentEnd {
                start_ms,
                duration_ms,
                is_init_segment,
                ..
            } => self.end_segment(start_ms, duration_ms, is_init_segment),
            SabrPart::MediaSeek {
                reason: SeekReason::ServerSeek,
                format_id,
            } => {
                self.reset_sample();
                self.subtitle_sample.clear();
                self.sample_bytes_written = 0;
                self.sink.discontinuity(&format_id);
                Ok(())
            }
            SabrPart::PoTokenStatus(status) => {
                tracing::debug!("[sabr] po token status: {:?}", status);
                Ok(())
            }
            SabrPart::RefreshPlayerResponse { reason, .. } => {
                tracing::warn!("[sabr] player response refresh requested: {:?}", reason);
                Ok(())
            }
        }
    }

    // -- track setup ---------------------------------------------------------

    fn initialize_track(
        &mut self,
        format_id: FormatId,
        mime_type: Option<&str>,
        end_time_ms: Option<i64>,
    ) -> Result<()> {
        let mime = mime_type.ok_or(SabrStreamError::MissingField("mime_type"))?;
        let codec = CodecId::from_codec_string(codec_string(mime))?;

        let initialization_data = if codec == CodecId::Ssa {
            vec![SSA_DIALOGUE_FORMAT.to_vec()]
        } else {
            Vec::new()
        };

        let metadata = TrackMetadata {
            format_id,
            codec,
            mime_type: codec.mime_type(),
            track_kind: codec.track_kind(),
            end_time_ms,
            initialization_data,
        };
        self.sink.open_track(&metadata)?;
        self.track = Some(TrackState {
            codec,
            nal_length_field_len: 4,
        });
        Ok(())
    }

    // -- sample data ---------------------------------------------------------

    fn write_sample_data(&mut self, data: &[u8], is_init_segment: bool) -> Result<()> {
        let track = self
            .track
            .as_ref()
            .ok_or(SabrStreamError::MissingField("format_initialization"))?;

        // Init segments carry container/codec configuration, never
        // length-prefixed samples or cue text.
        if is_init_segment {
            self.sink.sample_data(data)?;
            self.sample_bytes_written += data.len();
            return Ok(());
        }

        if track.codec.is_text() {
            if self.subtitle_sample.is_empty() {
                let prefix = match track.codec {
                    CodecId::SubRip => SUBRIP_PREFIX,
                    _ => SSA_PREFIX,
                };
                self.subtitle_sample.extend_from_slice(prefix);
            }
            self.subtitle_sample.extend_from_slice(data);
            return Ok(());
        }

        if track.codec.needs_nal_rewrite() {
            return self.write_nal_sample_data(data);
        }

        self.sink.sample_data(data)?;
        self.sample_bytes_written += data.len();
        Ok(())
    }

    /// NAL units arrive length-delimited but decoders want start-code
    /// delimited units. Replace each length field with a start code as it
    /// streams past; a length field or unit payload may span chunks.
    fn write_nal_sample_data(&mut self, data: &[u8]) -> Result<()> {
        let field_len = match &self.track {
            Some(track) => track.nal_length_field_len,
            None => 4,
        };
        let mut pos = 0;

        while pos < data.len() {
            if self.nal_bytes_remaining == 0 {
                let need = field_len - self.nal_length_filled;
                let take = need.min(data.len() - pos);
                let offset = (4 - field_len) + self.nal_length_filled;
                self.nal_length_buf[offset..offset + take].copy_from_slice(&data[pos..pos + take]);
                self.nal_length_filled += take;
                pos += take;
                if self.nal_length_filled < field_len {
                    // Length field continues in the next chunk.
                    return Ok(());
                }

                self.nal_bytes_remaining = u32::from_be_bytes(self.nal_length_buf) as usize;
                self.nal_length_filled = 0;
                // Top bytes stay zero for fields shorter than four bytes.
                self.nal_length_buf = [0; 4];

                self.sink.sample_data(&NAL_START_CODE)?;
                self.sample_bytes_written += NAL_START_CODE.len();
            } else {
                let take = self.nal_bytes_remaining.min(data.len() - pos);
                self.sink.sample_data(&data[pos..pos + take])?;
                self.sample_bytes_written += take;
                self.nal_bytes_remaining -= take;
                pos += take;
            }
        }
        Ok(())
    }

    // -- segment end ---------------------------------------------------------

    fn end_segment(&mut self, start_ms: i64, duration_ms: i64, is_init_segment: bool) -> Result<()> {
        let track = self
            .track
            .as_ref()
            .ok_or(SabrStreamError::MissingField("format_initialization"))?;

        if track.codec.is_text() && !is_init_segment {
            self.commit_subtitle_sample(track.codec, duration_ms)?;
        }

        let time_us = start_ms * 1000;
        let duration_us = (duration_ms > 0).then_some(duration_ms * 1000);
        self.sink
            .sample_metadata(time_us, duration_us, self.sample_bytes_written)?;
        self.sample_bytes_written = 0;
        Ok(())
    }

    fn commit_subtitle_sample(&mut self, codec: CodecId, duration_ms: i64) -> Result<()> {
        if self.subtitle_sample.is_empty() {
            return Ok(());
        }

        let duration_us = (duration_ms > 0).then_some(duration_ms * 1000);
        let (offset, timecode) = match codec {
            CodecId::SubRip => (
                SUBRIP_END_TIMECODE_OFFSET,
                end_timecode(duration_us, TimecodeStyle::SubRip),
            ),
            _ => (
                SSA_END_TIMECODE_OFFSET,
                end_timecode(duration_us, TimecodeStyle::Ssa),
            ),
        };
        self.subtitle_sample[offset..offset + timecode.len()].copy_from_slice(&timecode);

        self.sink.sample_data(&self.subtitle_sample)?;
        self.sample_bytes_written += self.subtitle_sample.len();
        self.subtitle_sample.clear();
        Ok(())
    }

    fn reset_sample(&mut self) {
        self.nal_bytes_remaining = 0;
        self.nal_length_filled = 0;
        self.nal_length_buf = [0; 4];
    }
}

// ---------------------------------------------------------------------------
// Timecodes
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum TimecodeStyle {
    /// "HH:MM:SS,mmm", last value in milliseconds.
    SubRip,
    /// "H:MM:SS:cc", last value in 1/100ths of a second.
    Ssa,
}

/// Render the cue end timecode for a duration, or the "display until the
/// next cue" placeholder when the duration is unknown.
fn end_timecode(duration_us: Option<i64>, style: TimecodeStyle) -> Vec<u8> {
    const MICROS_PER_SECOND: i64 = 1_000_000;

    let mut remaining = match duration_us {
        Some(duration_us) => duration_us,
        None => {
            return match style {
                TimecodeStyle::SubRip => SUBRIP_TIMECODE_EMPTY.to_vec(),
                TimecodeStyle::Ssa => SSA_TIMECODE_EMPTY.to_vec(),
            }
        }
    };

    let hours = remaining / (3600 * MICROS_PER_SECOND);
    remaining -= hours * 3600 * MICROS_PER_SECOND;
    let minutes = remaining / (60 * MICROS_PER_SECOND);
    remaining -= minutes * 60 * MICROS_PER_SECOND;
    let seconds = remaining / MICROS_PER_SECOND;
    remaining -= seconds * MICROS_PER_SECOND;

    match style {
        TimecodeStyle::SubRip => {
            let millis = remaining / 1000;
            format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}").into_bytes()
        }
        TimecodeStyle::Ssa => {
            let centis = remaining / 10_000;
            format!("{hours:01}:{minutes:02}:{seconds:02}:{centis:02}").into_bytes()
        }
    }
}

/// Extract the `codecs` parameter from a MIME type, falling back to the
/// whole string when the parameter is absent.
fn codec_string(mime: &str) -> &str {
    let Some(idx) = mime.find("codecs=") else {
        return mime;
    };
    let rest = mime[idx + "codecs=".len()..].trim_start_matches('"');
    match rest.find(|c| c == '"' || c == ';') {
        Some(end) => &rest[..end],
        None => rest,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

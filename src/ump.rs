//! UMP part framing for the SABR wire stream.
//!
//! Every record ("part") on the wire is:
//!   [varint: part_type] [varint: part_size] [raw bytes: part_data]
//!
//! The varint encoding is YouTube's own variable-length integer format,
//! NOT standard protobuf varint: the number of leading ones in the first
//! byte selects the total width, and multi-byte values are assembled
//! little-endian-ish from the remaining bytes.

use bytes::Bytes;

// ---------------------------------------------------------------------------
// Part ids
// ---------------------------------------------------------------------------

/// Wire ids for every part type the protocol is known to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PartId {
    OnesieHeader = 10,
    OnesieData = 11,
    MediaHeader = 20,
    Media = 21,
    MediaEnd = 22,
    LiveMetadata = 31,
    HostnameChangeHint = 32,
    LiveMetadataPromise = 33,
    LiveMetadataPromiseCancellation = 34,
    NextRequestPolicy = 35,
    UstreamerVideoAndFormatData = 36,
    FormatSelectionConfig = 37,
    UstreamerSelectedMediaStream = 38,
    FormatInitializationMetadata = 42,
    SabrRedirect = 43,
    SabrError = 44,
    SabrSeek = 45,
    ReloadPlayerResponse = 46,
    PlaybackStartPolicy = 47,
    AllowedCachedFormats = 48,
    StartBwSamplingHint = 49,
    PauseBwSamplingHint = 50,
    SelectableFormats = 51,
    RequestIdentifier = 52,
    RequestCancellationPolicy = 53,
    OnesiePrefetchRejection = 54,
    TimelineContext = 55,
    RequestPipelining = 56,
    SabrContextUpdate = 57,
    StreamProtectionStatus = 58,
    SabrContextSendingPolicy = 59,
    LawnmowerPolicy = 60,
    SabrAck = 61,
    EndOfTrack = 62,
    CacheLoadPolicy = 63,
    LawnmowerMessagingPolicy = 64,
    PrewarmConnection = 65,
    PlaybackDebugInfo = 66,
    SnackbarMessage = 67,
}

impl PartId {
    pub fn from_u32(raw: u32) -> Option<Self> {
        use PartId::*;
        Some(match raw {
            10 => OnesieHeader,
            11 => OnesieData,
            20 => MediaHeader,
            21 => Media,
            22 => MediaEnd,
            31 => LiveMetadata,
            32 => HostnameChangeHint,
            33 => LiveMetadataPromise,
            34 => LiveMetadataPromiseCancellation,
            35 => NextRequestPolicy,
            36 => UstreamerVideoAndFormatData,
            37 => FormatSelectionConfig,
            38 => UstreamerSelectedMediaStream,
            42 => FormatInitializationMetadata,
            43 => SabrRedirect,
            44 => SabrError,
            45 => SabrSeek,
            46 => ReloadPlayerResponse,
            47 => PlaybackStartPolicy,
            48 => AllowedCachedFormats,
            49 => StartBwSamplingHint,
            50 => PauseBwSamplingHint,
            51 => SelectableFormats,
            52 => RequestIdentifier,
            53 => RequestCancellationPolicy,
            54 => OnesiePrefetchRejection,
            55 => TimelineContext,
            56 => RequestPipelining,
            57 => SabrContextUpdate,
            58 => StreamProtectionStatus,
            59 => SabrContextSendingPolicy,
            60 => LawnmowerPolicy,
            61 => SabrAck,
            62 => EndOfTrack,
            63 => CacheLoadPolicy,
            64 => LawnmowerMessagingPolicy,
            65 => PrewarmConnection,
            66 => PlaybackDebugInfo,
            67 => SnackbarMessage,
            _ => return None,
        })
    }
}

// ---------------------------------------------------------------------------
// Variable-length integer codec
// ---------------------------------------------------------------------------

/// Read a YouTube-style varint from `buf`.
///
/// Returns `Some((value, bytes_consumed))` or `None` if `buf` is too short.
///
/// Encoding:
///   1 byte:  first < 128      -> value = byte
///   2 bytes: first 128..192   -> value = (b0 & 0x3F) + 64 * b1
///   3 bytes: first 192..224   -> value = (b0 & 0x1F) + 32 * (b1 + 256 * b2)
///   4 bytes: first 224..240   -> value = (b0 & 0x0F) + 16 * (b1 + 256 * (b2 + 256 * b3))
///   5 bytes: first >= 240     -> value = u32::from_le_bytes(buf[1..5])
pub fn read_varint(buf: &[u8]) -> Option<(u32, usize)> {
    let first = *buf.first()?;

    if first < 128 {
        Some((first as u32, 1))
    } else if first < 192 {
        let b1 = *buf.get(1)?;
        let value = (first as u32 & 0x3F) + 64 * b1 as u32;
        Some((value, 2))
    } else if first < 224 {
        let b1 = *buf.get(1)?;
        let b2 = *buf.get(2)?;
        let value = (first as u32 & 0x1F) + 32 * (b1 as u32 + 256 * b2 as u32);
        Some((value, 3))
    } else if first < 240 {
        let b1 = *buf.get(1)?;
        let b2 = *buf.get(2)?;
        let b3 = *buf.get(3)?;
        let value =
            (first as u32 & 0x0F) + 16 * (b1 as u32 + 256 * (b2 as u32 + 256 * b3 as u32));
        Some((value, 4))
    } else {
        if buf.len() < 5 {
            return None;
        }
        let value = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]);
        Some((value, 5))
    }
}

/// Encode a value as a YouTube-style varint and append it to `out`.
pub fn write_varint(out: &mut Vec<u8>, value: u32) {
    if value < 128 {
        out.push(value as u8);
    } else if value < 1 << 14 {
        // 2 bytes: value = (b0 & 0x3F) + 64 * b1, b0 = 10xx_xxxx,
        // max 63 + 64 * 255 = 16383
        let lo = value % 64;
        let hi = value / 64;
        out.push(128 | lo as u8);
        out.push(hi as u8);
    } else if value < 1 << 21 {
        // 3 bytes: value = (b0 & 0x1F) + 32 * (b1 + 256 * b2), b0 = 110x_xxxx,
        // max 31 + 32 * 65535 = 2_097_151
        let lo = value % 32;
        let rest = value / 32;
        out.push(192 | lo as u8);
        out.push((rest % 256) as u8);
        out.push((rest / 256) as u8);
    } else if value < 1 << 28 {
        // 4 bytes: value = (b0 & 0x0F) + 16 * (b1 + 256 * (b2 + 256 * b3)),
        // b0 = 1110_xxxx, max 15 + 16 * 16_777_215 = 268_435_455
        let lo = value % 16;
        let mut rest = value / 16;
        out.push(224 | lo as u8);
        out.push((rest % 256) as u8);
        rest /= 256;
        out.push((rest % 256) as u8);
        out.push((rest / 256) as u8);
    } else {
        // 5 bytes: prefix byte >= 240, then raw LE u32
        out.push(240);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

// ---------------------------------------------------------------------------
// UMP part
// ---------------------------------------------------------------------------

/// One complete framed part. `part_type` keeps the raw wire id so callers
/// can report ids that [`PartId::from_u32`] does not recognize.
#[derive(Debug, Clone)]
pub struct UmpPart {
    pub part_type: u32,
    pub data: Bytes,
}

impl UmpPart {
    pub fn id(&self) -> Option<PartId> {
        PartId::from_u32(self.part_type)
    }
}

/// Frame a part (for tests and request synthesis).
pub fn write_part(out: &mut Vec<u8>, part_type: u32, data: &[u8]) {
    write_varint(out, part_type);
    write_varint(out, data.len() as u32);
    out.extend_from_slice(data);
}

// ---------------------------------------------------------------------------
// Streaming parser
// ---------------------------------------------------------------------------

/// Accumulates raw stream bytes and yields complete UMP parts.
#[derive(Default)]
pub struct UmpParser {
    buffer: Vec<u8>,
}

impl UmpParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the latest read.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract the next complete UMP part from the internal buffer.
    ///
    /// Returns `None` if there is not enough data yet -- call `push` with
    /// more bytes and try again.
    pub fn next_part(&mut self) -> Option<UmpPart> {
        let buf = &self.buffer;

        let (part_type, type_len) = read_varint(buf)?;
        let (part_size, size_len) = read_varint(&buf[type_len..])?;

        let header_len = type_len + size_len;
        let total_len = header_len + part_size as usize;

        if buf.len() < total_len {
            return None;
        }

        let data = Bytes::copy_from_slice(&buf[header_len..total_len]);
        self.buffer.drain(..total_len);

        Some(UmpPart { part_type, data })
    }

    /// Drop all buffered bytes. Used when the rest of a response is
    /// abandoned.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Bytes sitting in the buffer that do not yet form a complete part.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

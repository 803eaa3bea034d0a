//! Protocol events yielded to the consumer, one per `SabrStream::parse`
//! call. These are the crate's output boundary; the media assembler in
//! `extractor.rs` is their primary consumer.

use bytes::Bytes;

use crate::proto::FormatId;

/// Resolved proof-of-origin token state, combining the server-reported
/// protection status with whether a token is configured locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoTokenStatus {
    /// Token present and accepted.
    Ok,
    /// No token configured, none required.
    NotRequired,
    /// Token present, attestation still pending.
    Pending,
    /// Attestation pending but no token configured.
    PendingMissing,
    /// Token present but rejected.
    Invalid,
    /// Token required but not configured.
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekReason {
    /// The server moved the play head (explicit SABR_SEEK part, or the
    /// simulated seek to the live minimum-seekable time).
    ServerSeek,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    /// The server asked the client to reload its player response.
    SabrReloadPlayerResponse,
}

/// One decoded protocol event.
#[derive(Debug, Clone)]
pub enum SabrPart {
    /// A format the consumer selected is ready; emitted once per format.
    FormatInitialized {
        format_id: FormatId,
        mime_type: Option<String>,
        end_time_ms: Option<i64>,
    },

    /// A new media segment is starting (MEDIA_HEADER processed).
    MediaSegmentInit {
        format_id: FormatId,
        player_time_ms: Option<i64>,
        sequence_number: i64,
        total_segments: Option<i64>,
        duration_ms: i64,
        duration_estimated: bool,
        start_data_range: Option<i64>,
        start_ms: i64,
        is_init_segment: bool,
        content_length: Option<i64>,
        content_length_estimated: bool,
    },

    /// A chunk of media bytes for an in-flight segment.
    MediaSegmentData {
        format_id: FormatId,
        sequence_number: i64,
        is_init_segment: bool,
        total_segments: Option<i64>,
        start_ms: i64,
        data: Bytes,
        /// Byte offset of this chunk within the segment.
        start_byte_offset: i64,
    },

    /// The segment is complete; consumed ranges are updated before this
    /// is emitted so the consumer observes the post-segment state.
    MediaSegmentEnd {
        format_id: FormatId,
        sequence_number: i64,
        is_init_segment: bool,
        total_segments: Option<i64>,
        start_ms: i64,
        duration_ms: i64,
    },

    /// Segment ordering is about to break for this format; the consumer
    /// should treat the next segment as a discontinuity.
    MediaSeek {
        reason: SeekReason,
        format_id: FormatId,
    },

    /// Resolved proof-of-origin token status.
    PoTokenStatus(PoTokenStatus),

    /// The server wants a fresh player response before it will continue.
    RefreshPlayerResponse {
        reason: RefreshReason,
        token: Option<String>,
    },
}

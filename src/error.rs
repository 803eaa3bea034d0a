//! Error types for the SABR pipeline.
//!
//! Almost everything here is a *protocol* error: the server sent data that
//! contradicts our local state, and bounded recovery cannot fix the
//! divergence, so the session must be torn down and restarted. The single
//! recoverable case is [`SabrStreamError::MediaSegmentMismatch`], which the
//! stream orchestrator absorbs for live streams via a bounded player-time
//! nudge (see `stream.rs`).

use thiserror::Error;

use crate::proto::FormatId;

pub type Result<T> = std::result::Result<T, SabrStreamError>;

#[derive(Debug, Error)]
pub enum SabrStreamError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("received part for video {received} (expecting {expected})")]
    VideoIdMismatch { expected: String, received: String },

    #[error("required field missing: {0}")]
    MissingField(&'static str),

    #[error("header id {0} already exists in partial segments")]
    DuplicateHeaderId(u64),

    #[error("header id {0} not found in partial segments")]
    UnknownHeaderId(u64),

    #[error("no initialized format for {}", format_key(.0))]
    UnknownFormat(FormatId),

    #[error("format {} does not match any format selector", format_key(.0))]
    UnmatchedFormat(FormatId),

    #[error("server changed format; changing formats mid-session is not supported")]
    FormatChanged,

    #[error("compressed media headers are not supported")]
    CompressionUnsupported,

    #[error("cannot determine duration of segment {sequence_number} for {}", format_key(.format_id))]
    UnknownDuration {
        format_id: FormatId,
        sequence_number: i64,
    },

    /// Segment arrived out of order. Recoverable for live streams only,
    /// and only for the off-by-one cases the orchestrator knows how to
    /// nudge around; everything else is fatal.
    #[error(
        "segment mismatch for {}: expected sequence {expected}, received {received}",
        format_key(.format_id)
    )]
    MediaSegmentMismatch {
        format_id: FormatId,
        expected: i64,
        received: i64,
    },

    #[error(
        "content length mismatch for {} (sequence {sequence_number}): expected {expected} bytes, got {received}",
        format_key(.format_id)
    )]
    ContentLengthMismatch {
        format_id: FormatId,
        sequence_number: i64,
        expected: i64,
        received: i64,
    },

    #[error("seek part is missing required seek time")]
    MissingSeekTime,

    #[error("broadcast id changed from {old:?} to {new:?}; the session must be restarted")]
    BroadcastChanged {
        old: Option<String>,
        new: Option<String>,
    },

    #[error("SABR protocol error: type={error_type}, code={code}")]
    Server { error_type: String, code: i32 },

    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("invalid po_token: {0}")]
    InvalidPoToken(#[from] base64::DecodeError),

    #[error("protobuf decode failed: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn format_key(id: &FormatId) -> String {
    id.key()
}

//! Decoder pipeline for YouTube's SABR (server-assisted adaptive bitrate)
//! streaming protocol.
//!
//! The wire format is a stream of length-prefixed, type-tagged "UMP parts"
//! multiplexing protobuf control messages and raw media byte ranges for one
//! video across one or more tracks. This crate turns that stream into
//! ordered media segments plus the bookkeeping state (consumed ranges,
//! sequence continuity, live-seek adjustment, outgoing request context)
//! needed to keep asking the server for the right bytes.
//!
//! Layering, bottom up:
//!   [`ump`]        - part framing (varint codec, part ids, streaming parser)
//!   [`proto`]      - the SABR protobuf messages
//!   [`processor`]  - `SabrProcessor`, the pure protocol state machine
//!   [`stream`]     - `SabrStream`, the read loop / orchestrator
//!   [`extractor`]  - `SabrExtractor`, media assembly into a `TrackSink`
//!
//! Everything is synchronous and pull-based: `SabrStream::parse` blocks on
//! the byte source and yields at most one [`parts::SabrPart`] event per
//! call. HTTP transport and request building are the caller's job; the
//! crate hands back a `StreamerContext` to attach to the next request.

pub mod error;
pub mod extractor;
pub mod model;
pub mod parts;
pub mod processor;
pub mod proto;
pub mod stream;
pub mod ump;

pub use error::SabrStreamError;
pub use extractor::{CodecId, ReadResult, SabrExtractor, TrackKind, TrackMetadata, TrackSink};
pub use model::FormatSelector;
pub use parts::{PoTokenStatus, RefreshReason, SabrPart, SeekReason};
pub use processor::{SabrConfig, SabrProcessor};
pub use stream::SabrStream;

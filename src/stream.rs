//! The SABR read loop.
//!
//! `SabrStream` owns the UMP parser and the protocol state machine. Each
//! `parse` call pulls framed parts from the byte source until one of them
//! produces a consumer-visible event, absorbing the bounded live
//! sequence-mismatch retry and the redirect/broadcast-identity check on
//! the way.

use std::collections::{HashSet, VecDeque};
use std::io::Read;

use bytes::Bytes;
use prost::Message;

use crate::error::{Result, SabrStreamError};
use crate::model::FormatSelector;
use crate::parts::{RefreshReason, SabrPart};
use crate::processor::{SabrConfig, SabrProcessor};
use crate::proto::{
    FormatInitializationMetadata, LiveMetadata, MediaHeader, NextRequestPolicy,
    ReloadPlayerResponse, SabrContextSendingPolicy, SabrContextUpdate, SabrError, SabrRedirect,
    SabrSeek, StreamProtectionStatus, StreamerContext,
};
use crate::ump::{self, PartId, UmpParser, UmpPart};

const READ_CHUNK: usize = 8192;

/// Part types dispatched to the processor.
const KNOWN_PARTS: &[PartId] = &[
    PartId::MediaHeader,
    PartId::Media,
    PartId::MediaEnd,
    PartId::LiveMetadata,
    PartId::NextRequestPolicy,
    PartId::FormatInitializationMetadata,
    PartId::SabrRedirect,
    PartId::SabrError,
    PartId::SabrSeek,
    PartId::ReloadPlayerResponse,
    PartId::SabrContextUpdate,
    PartId::StreamProtectionStatus,
    PartId::SabrContextSendingPolicy,
];

/// Benign hints, skipped without comment.
const IGNORED_PARTS: &[PartId] = &[
    PartId::PlaybackStartPolicy,
    PartId::AllowedCachedFormats,
    PartId::StartBwSamplingHint,
    PartId::PauseBwSamplingHint,
    PartId::SelectableFormats,
    PartId::RequestIdentifier,
    PartId::RequestCancellationPolicy,
    PartId::RequestPipelining,
    PartId::PrewarmConnection,
];

/// Counts consecutive response cycles that delivered no new segment.
/// Extension point for live stall detection; no thresholds are applied
/// here, the consumer reads the count and decides.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSegmentsTracker {
    consecutive_requests: u32,
    live_head_sequence_started: Option<i64>,
}

impl NoSegmentsTracker {
    fn increment(&mut self, live_head_sequence: Option<i64>) {
        if self.consecutive_requests == 0 {
            self.live_head_sequence_started = live_head_sequence;
        }
        self.consecutive_requests += 1;
    }

    fn reset(&mut self) {
        self.consecutive_requests = 0;
        self.live_head_sequence_started = None;
    }

    pub fn consecutive_requests(&self) -> u32 {
        self.consecutive_requests
    }

    pub fn live_head_sequence_started(&self) -> Option<i64> {
        self.live_head_sequence_started
    }
}

pub struct SabrStream {
    parser: UmpParser,
    processor: SabrProcessor,
    url: String,
    /// Buffered events from the two multi-event part types, drained one
    /// per `parse` call.
    pending: VecDeque<SabrPart>,
    unknown_part_types: HashSet<u32>,
    no_segments_tracker: NoSegmentsTracker,
    received_new_segments: bool,
    response_ended: bool,
    mismatch_forward_count: u32,
    mismatch_backtrack_count: u32,
}

impl SabrStream {
    pub fn new(
        server_abr_streaming_url: impl Into<String>,
        config: SabrConfig,
        selectors: Vec<FormatSelector>,
    ) -> Result<Self> {
        Ok(Self {
            parser: UmpParser::new(),
            processor: SabrProcessor::new(config, selectors)?,
            url: server_abr_streaming_url.into(),
            pending: VecDeque::new(),
            unknown_part_types: HashSet::new(),
            no_segments_tracker: NoSegmentsTracker::default(),
            received_new_segments: false,
            response_ended: false,
            mismatch_forward_count: 0,
            mismatch_backtrack_count: 0,
        })
    }

    // -- public surface ------------------------------------------------------

    /// Pull the next protocol event from `input`. `Ok(None)` means end of
    /// input, or a live mismatch nudge that requires the caller to issue
    /// a fresh request at the adjusted player time.
    pub fn parse<R: Read>(&mut self, input: &mut R) -> Result<Option<SabrPart>> {
        if let Some(part) = self.pending.pop_front() {
            return Ok(Some(part));
        }

        loop {
            let part = match self.next_known_part(input)? {
                Some(part) => part,
                None => {
                    self.end_of_response();
                    return Ok(None);
                }
            };
            self.response_ended = false;

            match self.dispatch(part)? {
                Dispatch::Event(part) => return Ok(Some(part)),
                Dispatch::Retry => {
                    // The rest of the buffered response targets the
                    // rejected segment; the re-request starts from a
                    // clean parser.
                    self.parser.clear();
                    return Ok(None);
                }
                Dispatch::Continue => {
                    if let Some(part) = self.pending.pop_front() {
                        return Ok(Some(part));
                    }
                }
            }
        }
    }

    /// Clear the no-progress tracker. Call when the consumer seeks.
    pub fn reset(&mut self) {
        self.no_segments_tracker.reset();
    }

    /// Forget one format's resume position.
    pub fn reset_format(&mut self, itag: i32) {
        self.processor.reset_format(itag);
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_live(&self) -> bool {
        self.processor.is_live()
    }

    pub fn player_time_ms(&self) -> i64 {
        self.processor.player_time_ms()
    }

    pub fn backoff_time_ms(&self) -> Option<i32> {
        self.processor.backoff_time_ms()
    }

    pub fn segment_start_time_ms(&self, itag: i32) -> i64 {
        self.processor.segment_start_time_ms(itag)
    }

    pub fn segment_duration_ms(&self, itag: i32) -> i64 {
        self.processor.segment_duration_ms(itag)
    }

    pub fn no_segments_tracker(&self) -> &NoSegmentsTracker {
        &self.no_segments_tracker
    }

    pub fn create_streamer_context(&self) -> Result<StreamerContext> {
        self.processor.create_streamer_context()
    }

    /// Part type ids seen on the wire that this implementation does not
    /// recognize at all.
    pub fn unknown_part_types(&self) -> &HashSet<u32> {
        &self.unknown_part_types
    }

    // -- read loop -----------------------------------------------------------

    fn next_known_part<R: Read>(&mut self, input: &mut R) -> Result<Option<UmpPart>> {
        let mut buf = [0u8; READ_CHUNK];

        loop {
            while let Some(part) = self.parser.next_part() {
                match part.id() {
                    Some(id) if KNOWN_PARTS.contains(&id) => return Ok(Some(part)),
                    Some(id) if IGNORED_PARTS.contains(&id) => {
                        tracing::debug!("[sabr] skipping part type {:?}", id);
                    }
                    _ => {
                        if self.unknown_part_types.insert(part.part_type) {
                            tracing::debug!(
                                "[sabr] unhandled part type {} ({} bytes)",
                                part.part_type,
                                part.data.len()
                            );
                        }
                    }
                }
            }

            let read = match input.read(&mut buf) {
                Ok(read) => read,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            if read == 0 {
                return Ok(None);
            }
            self.parser.push(&buf[..read]);
        }
    }

    fn dispatch(&mut self, part: UmpPart) -> Result<Dispatch> {
        let data = part.data.clone();
        match part.id() {
            Some(PartId::MediaHeader) => self.on_media_header(&data),
            Some(PartId::Media) => self.on_media(data),
            Some(PartId::MediaEnd) => self.on_media_end(&data),
            Some(PartId::FormatInitializationMetadata) => {
                let meta = FormatInitializationMetadata::decode(data)?;
                Ok(self
                    .processor
                    .process_format_initialization_metadata(meta)?
                    .into())
            }
            Some(PartId::StreamProtectionStatus) => {
                let status = StreamProtectionStatus::decode(data)?;
                Ok(self.processor.process_stream_protection_status(status).into())
            }
            Some(PartId::LiveMetadata) => {
                let meta = LiveMetadata::decode(data)?;
                self.pending.extend(self.processor.process_live_metadata(meta));
                Ok(Dispatch::Continue)
            }
            Some(PartId::SabrSeek) => {
                let seek = SabrSeek::decode(data)?;
                self.pending.extend(self.processor.process_sabr_seek(seek)?);
                Ok(Dispatch::Continue)
            }
            Some(PartId::NextRequestPolicy) => {
                let policy = NextRequestPolicy::decode(data)?;
                self.processor.process_next_request_policy(policy);
                Ok(Dispatch::Continue)
            }
            Some(PartId::SabrContextUpdate) => {
                let update = SabrContextUpdate::decode(data)?;
                self.processor.process_sabr_context_update(update);
                Ok(Dispatch::Continue)
            }
            Some(PartId::SabrContextSendingPolicy) => {
                let policy = SabrContextSendingPolicy::decode(data)?;
                self.processor.process_sabr_context_sending_policy(policy);
                Ok(Dispatch::Continue)
            }
            Some(PartId::SabrRedirect) => {
                let redirect = SabrRedirect::decode(data)?;
                match redirect.redirect_url {
                    Some(new_url) => self.set_url(&new_url)?,
                    None => tracing::warn!("[sabr] redirect part without a URL, ignoring"),
                }
                Ok(Dispatch::Continue)
            }
            Some(PartId::SabrError) => {
                let error = SabrError::decode(data)?;
                Err(SabrStreamError::Server {
                    error_type: error.error_type.unwrap_or_default(),
                    code: error.code.unwrap_or(0),
                })
            }
            Some(PartId::ReloadPlayerResponse) => {
                let reload = ReloadPlayerResponse::decode(data)?;
                Ok(Dispatch::Event(SabrPart::RefreshPlayerResponse {
                    reason: RefreshReason::SabrReloadPlayerResponse,
                    token: reload
                        .reload_playback_params
                        .and_then(|params| params.token),
                }))
            }
            // next_known_part only hands us known ids
            _ => Ok(Dispatch::Continue),
        }
    }

    // -- part handlers -------------------------------------------------------

    fn on_media_header(&mut self, data: &Bytes) -> Result<Dispatch> {
        let header = MediaHeader::decode(data.clone())?;

        match self.processor.process_media_header(header) {
            Ok(part) => Ok(part.into()),
            Err(SabrStreamError::MediaSegmentMismatch {
                expected, received, ..
            }) if self.processor.is_live() && received == expected - 1 => {
                // Near the live head the server estimates which segment a
                // player time maps to; a longer-than-target predecessor
                // lands us one segment behind. Nudge the clock forward and
                // have the caller re-request.
                let tolerance = self.processor.live_segment_target_duration_tolerance_ms();
                self.processor
                    .set_player_time_ms(self.processor.player_time_ms() + tolerance);
                self.mismatch_forward_count += 1;
                tracing::debug!(
                    "[sabr] sequence {} behind expected {}, nudging player time to {}ms",
                    received,
                    expected,
                    self.processor.player_time_ms()
                );
                Ok(Dispatch::Retry)
            }
            Err(SabrStreamError::MediaSegmentMismatch {
                expected, received, ..
            }) if self.processor.is_live() && received == expected + 2 => {
                // A shorter-than-target predecessor lands us ahead; back
                // the clock off instead.
                let tolerance = self.processor.live_segment_target_duration_tolerance_ms();
                self.processor
                    .set_player_time_ms((self.processor.player_time_ms() - tolerance).max(0));
                self.mismatch_backtrack_count += 1;
                tracing::debug!(
                    "[sabr] sequence {} ahead of expected {}, nudging player time to {}ms",
                    received,
                    expected,
                    self.processor.player_time_ms()
                );
                Ok(Dispatch::Retry)
            }
            Err(err) => Err(err),
        }
    }

    fn on_media(&mut self, data: Bytes) -> Result<Dispatch> {
        let (header_id, consumed) =
            ump::read_varint(&data).ok_or(SabrStreamError::MissingField("header_id"))?;
        let payload = data.slice(consumed..);
        Ok(self
            .processor
            .process_media(u64::from(header_id), payload)?
            .into())
    }

    fn on_media_end(&mut self, data: &Bytes) -> Result<Dispatch> {
        let (header_id, _) =
            ump::read_varint(data).ok_or(SabrStreamError::MissingField("header_id"))?;
        let result = self.processor.process_media_end(u64::from(header_id))?;
        if result.is_new_segment {
            self.received_new_segments = true;
        }
        Ok(result.part.into())
    }

    // -- redirects -----------------------------------------------------------

    fn set_url(&mut self, new_url: &str) -> Result<()> {
        let parsed = match url::Url::parse(new_url) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!("[sabr] redirect to unparseable URL {:?}: {}", new_url, err);
                return Ok(());
            }
        };

        let new_id = query_param(&parsed, "id");
        let old_id = url::Url::parse(&self.url)
            .ok()
            .and_then(|old| query_param(&old, "id"));

        // A different broadcast id on a live session means the stream we
        // were following is gone; the session cannot continue.
        if self.processor.is_live() && new_id != old_id {
            return Err(SabrStreamError::BroadcastChanged {
                old: old_id,
                new: new_id,
            });
        }

        tracing::debug!("[sabr] redirected to {}", new_url);
        self.url = new_url.to_string();

        if query_param(&parsed, "source").as_deref() == Some("yt_live_broadcast") {
            self.processor.set_live(true);
        }
        Ok(())
    }

    // -- helpers -------------------------------------------------------------

    fn end_of_response(&mut self) {
        if self.response_ended {
            return;
        }
        self.response_ended = true;

        if self.received_new_segments {
            self.no_segments_tracker.reset();
        } else {
            self.no_segments_tracker
                .increment(self.processor.live_head_sequence_number());
        }
        self.received_new_segments = false;
    }
}

enum Dispatch {
    /// Yield this event to the consumer.
    Event(SabrPart),
    /// Mismatch nudge applied; the caller must re-request.
    Retry,
    /// Nothing for the consumer, keep reading.
    Continue,
}

impl From<Option<SabrPart>> for Dispatch {
    fn from(part: Option<SabrPart>) -> Self {
        match part {
            Some(part) => Dispatch::Event(part),
            None => Dispatch::Continue,
        }
    }
}

fn query_param(url: &url::Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Segment;
    use crate::parts::SeekReason;
    use crate::proto::FormatId;
    use crate::ump::write_part;
    use std::io::Cursor;

    fn format_id(itag: i32) -> FormatId {
        FormatId {
            itag: Some(itag),
            last_modified: Some(1_700_000_000),
            xtags: None,
        }
    }

    fn selectors() -> Vec<FormatSelector> {
        vec![FormatSelector::new("audio", false).with_format_ids(vec![format_id(140)])]
    }

    fn stream() -> SabrStream {
        SabrStream::new(
            "https://redirector.example/videoplayback?id=abc",
            SabrConfig::default(),
            selectors(),
        )
        .expect("valid config")
    }

    fn encode<M: Message>(id: PartId, message: &M) -> Vec<u8> {
        let mut out = Vec::new();
        write_part(&mut out, id as u32, &message.encode_to_vec());
        out
    }

    fn init_metadata_part() -> Vec<u8> {
        encode(
            PartId::FormatInitializationMetadata,
            &FormatInitializationMetadata {
                format_id: Some(format_id(140)),
                mime_type: Some("audio/mp4".into()),
                end_time_ms: Some(60_000),
                end_segment_number: Some(12),
                ..Default::default()
            },
        )
    }

    fn media_header_part(header_id: u32, sequence: i64) -> Vec<u8> {
        encode(
            PartId::MediaHeader,
            &MediaHeader {
                header_id: Some(header_id),
                format_id: Some(format_id(140)),
                sequence_number: Some(sequence),
                start_ms: Some((sequence - 1) * 5000),
                duration_ms: Some(5000),
                ..Default::default()
            },
        )
    }

    fn media_part(header_id: u32, payload: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        ump::write_varint(&mut body, header_id);
        body.extend_from_slice(payload);
        let mut out = Vec::new();
        write_part(&mut out, PartId::Media as u32, &body);
        out
    }

    fn media_end_part(header_id: u32) -> Vec<u8> {
        let mut body = Vec::new();
        ump::write_varint(&mut body, header_id);
        let mut out = Vec::new();
        write_part(&mut out, PartId::MediaEnd as u32, &body);
        out
    }

    /// Put the processor in the state where the format's previous segment
    /// has `sequence` without a covering consumed range, as happens when
    /// ordering breaks near the live head.
    fn plant_current_segment(stream: &mut SabrStream, sequence: i64) {
        let format = stream
            .processor
            .selected_formats
            .get_mut(&format_id(140).key())
            .expect("format initialized");
        format.current_segment = Some(Segment {
            format_id: format_id(140),
            is_init_segment: false,
            duration_ms: 5000,
            duration_estimated: true,
            start_data_range: None,
            sequence_number: sequence,
            content_length: None,
            content_length_estimated: false,
            start_ms: (sequence - 1) * 5000,
            discard: false,
            consumed: false,
            received_data_length: 0,
            sequence_lmt: None,
        });
        format.consumed_ranges.clear();
    }

    #[test]
    fn full_segment_cycle_yields_init_data_end() {
        let mut wire = Vec::new();
        wire.extend(init_metadata_part());
        wire.extend(media_header_part(1, 1));
        wire.extend(media_part(1, b"segment-bytes"));
        wire.extend(media_end_part(1));

        let mut stream = stream();
        let mut input = Cursor::new(wire);

        assert!(matches!(
            stream.parse(&mut input).expect("parse"),
            Some(SabrPart::FormatInitialized { .. })
        ));
        assert!(matches!(
            stream.parse(&mut input).expect("parse"),
            Some(SabrPart::MediaSegmentInit {
                sequence_number: 1,
                ..
            })
        ));
        match stream.parse(&mut input).expect("parse") {
            Some(SabrPart::MediaSegmentData {
                data,
                start_byte_offset,
                ..
            }) => {
                assert_eq!(&data[..], b"segment-bytes");
                assert_eq!(start_byte_offset, 0);
            }
            other => panic!("unexpected part: {other:?}"),
        }
        assert!(matches!(
            stream.parse(&mut input).expect("parse"),
            Some(SabrPart::MediaSegmentEnd {
                sequence_number: 1,
                ..
            })
        ));
        assert!(stream.parse(&mut input).expect("parse").is_none());
    }

    #[test]
    fn ignored_and_unknown_parts_are_skipped() {
        let mut wire = Vec::new();
        write_part(&mut wire, PartId::RequestIdentifier as u32, &[1, 2, 3]);
        write_part(&mut wire, 240, &[9, 9]);
        wire.extend(init_metadata_part());

        let mut stream = stream();
        let mut input = Cursor::new(wire);

        assert!(matches!(
            stream.parse(&mut input).expect("parse"),
            Some(SabrPart::FormatInitialized { .. })
        ));
        assert!(stream.unknown_part_types().contains(&240));
        assert!(!stream
            .unknown_part_types()
            .contains(&(PartId::RequestIdentifier as u32)));
    }

    #[test]
    fn forward_mismatch_nudges_player_time_and_returns_none() {
        let mut stream = stream();
        stream.processor.set_live(true);
        let mut input = Cursor::new(init_metadata_part());
        stream.parse(&mut input).expect("init").expect("event");

        plant_current_segment(&mut stream, 5);
        let before = stream.player_time_ms();

        // expected 6, received 5
        let mut input = Cursor::new(media_header_part(2, 5));
        assert!(stream.parse(&mut input).expect("parse").is_none());
        assert_eq!(stream.player_time_ms(), before + 100);
        assert_eq!(stream.mismatch_forward_count, 1);
    }

    #[test]
    fn nudge_discards_the_rest_of_the_response() {
        let mut stream = stream();
        stream.processor.set_live(true);
        let mut input = Cursor::new(init_metadata_part());
        stream.parse(&mut input).expect("init").expect("event");

        plant_current_segment(&mut stream, 5);
        let before = stream.player_time_ms();

        // Header, media and end for the rejected segment arrive in one
        // chunk. The nudge must not leave the trailing parts buffered;
        // they reference a header id that was never registered.
        let mut wire = media_header_part(9, 5);
        wire.extend(media_part(9, b"stale"));
        wire.extend(media_end_part(9));
        let mut input = Cursor::new(wire);
        assert!(stream.parse(&mut input).expect("parse").is_none());
        assert_eq!(stream.player_time_ms(), before + 100);

        // The re-request delivers the expected segment cleanly.
        let mut input = Cursor::new(media_header_part(10, 6));
        assert!(matches!(
            stream.parse(&mut input).expect("parse"),
            Some(SabrPart::MediaSegmentInit {
                sequence_number: 6,
                ..
            })
        ));
    }

    #[test]
    fn backward_mismatch_nudges_clamped_at_zero() {
        let mut stream = stream();
        stream.processor.set_live(true);
        let mut input = Cursor::new(init_metadata_part());
        stream.parse(&mut input).expect("init").expect("event");

        plant_current_segment(&mut stream, 5);
        assert_eq!(stream.player_time_ms(), 0);

        // expected 6, received 8
        let mut input = Cursor::new(media_header_part(2, 8));
        assert!(stream.parse(&mut input).expect("parse").is_none());
        assert_eq!(stream.player_time_ms(), 0);
        assert_eq!(stream.mismatch_backtrack_count, 1);
    }

    #[test]
    fn other_mismatch_is_fatal_even_when_live() {
        let mut stream = stream();
        stream.processor.set_live(true);
        let mut input = Cursor::new(init_metadata_part());
        stream.parse(&mut input).expect("init").expect("event");

        plant_current_segment(&mut stream, 5);

        // expected 6, received 9
        let mut input = Cursor::new(media_header_part(2, 9));
        assert!(matches!(
            stream.parse(&mut input),
            Err(SabrStreamError::MediaSegmentMismatch { .. })
        ));
    }

    #[test]
    fn mismatch_on_vod_is_fatal() {
        let mut stream = stream();
        let mut input = Cursor::new(init_metadata_part());
        stream.parse(&mut input).expect("init").expect("event");

        plant_current_segment(&mut stream, 5);

        let mut input = Cursor::new(media_header_part(2, 5));
        assert!(matches!(
            stream.parse(&mut input),
            Err(SabrStreamError::MediaSegmentMismatch { .. })
        ));
    }

    #[test]
    fn sabr_seek_drains_one_event_per_call() {
        let mut stream = stream();
        let mut input = Cursor::new(init_metadata_part());
        stream.parse(&mut input).expect("init").expect("event");

        let mut wire = encode(
            PartId::SabrSeek,
            &SabrSeek {
                seek_time_ticks: Some(42_000),
                timescale: Some(1000),
            },
        );
        wire.extend(media_header_part(1, 9));
        let mut input = Cursor::new(wire);

        match stream.parse(&mut input).expect("parse") {
            Some(SabrPart::MediaSeek {
                reason: SeekReason::ServerSeek,
                ..
            }) => {}
            other => panic!("unexpected part: {other:?}"),
        }
        assert_eq!(stream.player_time_ms(), 42_000);

        // Seek cleared current_segment, so sequence 9 is accepted next.
        assert!(matches!(
            stream.parse(&mut input).expect("parse"),
            Some(SabrPart::MediaSegmentInit {
                sequence_number: 9,
                ..
            })
        ));
    }

    #[test]
    fn sabr_error_part_is_fatal() {
        let wire = encode(
            PartId::SabrError,
            &SabrError {
                error_type: Some("sabr.malformed_config".into()),
                code: Some(7),
            },
        );

        let mut stream = stream();
        let mut input = Cursor::new(wire);
        match stream.parse(&mut input) {
            Err(SabrStreamError::Server { error_type, code }) => {
                assert_eq!(error_type, "sabr.malformed_config");
                assert_eq!(code, 7);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn reload_player_response_yields_refresh_event() {
        let wire = encode(
            PartId::ReloadPlayerResponse,
            &ReloadPlayerResponse {
                reload_playback_params: Some(crate::proto::ReloadPlaybackParams {
                    token: Some("reload-token".into()),
                }),
            },
        );

        let mut stream = stream();
        let mut input = Cursor::new(wire);
        match stream.parse(&mut input).expect("parse") {
            Some(SabrPart::RefreshPlayerResponse { reason, token }) => {
                assert_eq!(reason, RefreshReason::SabrReloadPlayerResponse);
                assert_eq!(token.as_deref(), Some("reload-token"));
            }
            other => panic!("unexpected part: {other:?}"),
        }
    }

    #[test]
    fn redirect_same_broadcast_updates_url() {
        let wire = encode(
            PartId::SabrRedirect,
            &SabrRedirect {
                redirect_url: Some(
                    "https://other.example/videoplayback?id=abc&source=yt_live_broadcast".into(),
                ),
            },
        );

        let mut stream = stream();
        let mut input = Cursor::new(wire);
        assert!(stream.parse(&mut input).expect("parse").is_none());
        assert!(stream.url().starts_with("https://other.example/"));
        assert!(stream.is_live());
    }

    #[test]
    fn redirect_changing_broadcast_id_is_fatal_when_live() {
        let wire = encode(
            PartId::SabrRedirect,
            &SabrRedirect {
                redirect_url: Some("https://other.example/videoplayback?id=zzz".into()),
            },
        );

        let mut stream = stream();
        stream.processor.set_live(true);
        let mut input = Cursor::new(wire);
        match stream.parse(&mut input) {
            Err(SabrStreamError::BroadcastChanged { old, new }) => {
                assert_eq!(old.as_deref(), Some("abc"));
                assert_eq!(new.as_deref(), Some("zzz"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn redirect_changing_broadcast_id_is_accepted_on_vod() {
        let wire = encode(
            PartId::SabrRedirect,
            &SabrRedirect {
                redirect_url: Some("https://other.example/videoplayback?id=zzz".into()),
            },
        );

        let mut stream = stream();
        let mut input = Cursor::new(wire);
        assert!(stream.parse(&mut input).expect("parse").is_none());
        assert_eq!(
            stream.url(),
            "https://other.example/videoplayback?id=zzz"
        );
    }

    #[test]
    fn no_progress_responses_increment_tracker() {
        let mut stream = stream();

        // An empty response: only a policy part, no media.
        let wire = encode(
            PartId::NextRequestPolicy,
            &NextRequestPolicy {
                backoff_time_ms: Some(1000),
                ..Default::default()
            },
        );
        let mut input = Cursor::new(wire);
        assert!(stream.parse(&mut input).expect("parse").is_none());
        assert_eq!(stream.no_segments_tracker().consecutive_requests(), 1);

        // Repeated parse at the same end of input does not double count.
        assert!(stream.parse(&mut input).expect("parse").is_none());
        assert_eq!(stream.no_segments_tracker().consecutive_requests(), 1);

        // A response that delivers a segment resets the streak.
        let mut wire = init_metadata_part();
        wire.extend(media_header_part(1, 1));
        wire.extend(media_part(1, b"data"));
        wire.extend(media_end_part(1));
        let mut input = Cursor::new(wire);
        while stream.parse(&mut input).expect("parse").is_some() {}
        assert_eq!(stream.no_segments_tracker().consecutive_requests(), 0);

        stream.reset();
        assert_eq!(stream.no_segments_tracker().consecutive_requests(), 0);
    }
}

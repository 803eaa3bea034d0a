//! The SABR protocol state machine.
//!
//! `SabrProcessor` holds all per-session protocol state: selected formats
//! and their consumed ranges, in-flight partial segments, the live
//! metadata snapshot, and the outgoing SABR context set. Each `process_*`
//! operation takes one decoded wire message and returns zero or more
//! `SabrPart` events. Every invariant violation is a fatal protocol error;
//! the single recoverable case (`MediaSegmentMismatch`) is absorbed one
//! layer up in `SabrStream`.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use prost::Message;

use crate::error::{Result, SabrStreamError};
use crate::model::{FormatSelector, Segment, SelectedFormat};
use crate::parts::{PoTokenStatus, SabrPart, SeekReason};
use crate::proto::{
    self, ClientInfo, FormatInitializationMetadata, LiveMetadata, MediaHeader, NextRequestPolicy,
    ProtectionStatus, SabrContext, SabrContextSendingPolicy, SabrContextUpdate,
    SabrContextWritePolicy, SabrSeek, StreamProtectionStatus, StreamerContext,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Session construction parameters. Validated by [`SabrProcessor::new`].
#[derive(Debug, Clone)]
pub struct SabrConfig {
    pub video_playback_ustreamer_config: String,
    pub client_info: ClientInfo,
    /// Target duration of a live segment. Segment durations near the live
    /// head are estimated from this.
    pub live_segment_target_duration_sec: i64,
    /// Estimation slack, also the step size of the live mismatch nudge.
    /// Must be less than half the target duration in milliseconds.
    pub live_segment_target_duration_tolerance_ms: i64,
    pub start_time_ms: i64,
    pub po_token: Option<String>,
    pub post_live: bool,
    pub video_id: Option<String>,
    pub duration_ms: Option<i64>,
    /// When set, a declared (not estimated) content length that does not
    /// match the received byte count is fatal instead of logged.
    pub strict_content_length: bool,
}

impl Default for SabrConfig {
    fn default() -> Self {
        Self {
            video_playback_ustreamer_config: String::new(),
            client_info: ClientInfo::default(),
            live_segment_target_duration_sec: 5,
            live_segment_target_duration_tolerance_ms: 100,
            start_time_ms: 0,
            po_token: None,
            post_live: false,
            video_id: None,
            duration_ms: None,
            strict_content_length: false,
        }
    }
}

impl SabrConfig {
    fn validate(&self) -> Result<()> {
        if self.live_segment_target_duration_tolerance_ms
            >= (self.live_segment_target_duration_sec * 1000) / 2
        {
            return Err(SabrStreamError::InvalidConfig(
                "live_segment_target_duration_tolerance_ms must be less than half of \
                 live_segment_target_duration_sec in milliseconds"
                    .into(),
            ));
        }
        if self.start_time_ms < 0 {
            return Err(SabrStreamError::InvalidConfig(
                "start_time_ms must be greater than or equal to 0".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of `process_media_end`. `is_new_segment` is true when the
/// completed segment had not been consumed before; callers use it to
/// detect no-progress response cycles.
#[derive(Debug, Default)]
pub struct MediaEndResult {
    pub part: Option<SabrPart>,
    pub is_new_segment: bool,
}

/// Timing of the last completed (non-init) segment for a format, kept for
/// resume/seek bookkeeping.
#[derive(Debug, Clone, Copy)]
struct LastSegment {
    start_ms: Option<i64>,
    duration_ms: i64,
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

pub struct SabrProcessor {
    config: SabrConfig,
    selectors: Vec<FormatSelector>,
    player_time_ms: i64,
    partial_segments: HashMap<u64, Segment>,
    /// Keyed by `FormatId::key()`. Contains only active formats.
    pub(crate) selected_formats: HashMap<String, SelectedFormat>,
    protection_status: Option<i32>,
    is_live: bool,
    live_metadata: Option<LiveMetadata>,
    total_duration_ms: Option<i64>,
    next_request_policy: Option<NextRequestPolicy>,
    sabr_context_updates: HashMap<i32, SabrContextUpdate>,
    sabr_contexts_to_send: HashSet<i32>,
    /// itag of the last completed segment per format.
    last_segments: HashMap<i32, LastSegment>,
}

impl SabrProcessor {
    pub fn new(config: SabrConfig, selectors: Vec<FormatSelector>) -> Result<Self> {
        config.validate()?;
        tracing::debug!("[sabr] starting playback at {}ms", config.start_time_ms);

        Ok(Self {
            player_time_ms: config.start_time_ms,
            config,
            selectors,
            partial_segments: HashMap::new(),
            selected_formats: HashMap::new(),
            protection_status: None,
            is_live: false,
            live_metadata: None,
            total_duration_ms: None,
            next_request_policy: None,
            sabr_context_updates: HashMap::new(),
            sabr_contexts_to_send: HashSet::new(),
            last_segments: HashMap::new(),
        })
    }

    // -- accessors -----------------------------------------------------------

    pub fn player_time_ms(&self) -> i64 {
        self.player_time_ms
    }

    pub fn set_player_time_ms(&mut self, player_time_ms: i64) {
        self.player_time_ms = player_time_ms;
    }

    pub fn is_live(&self) -> bool {
        self.live_metadata.is_some() || self.is_live
    }

    pub fn set_live(&mut self, is_live: bool) {
        self.is_live = is_live;
    }

    pub fn live_segment_target_duration_tolerance_ms(&self) -> i64 {
        self.config.live_segment_target_duration_tolerance_ms
    }

    pub fn live_segment_target_duration_sec(&self) -> i64 {
        self.config.live_segment_target_duration_sec
    }

    pub fn total_duration_ms(&self) -> Option<i64> {
        self.total_duration_ms
    }

    pub fn protection_status(&self) -> Option<i32> {
        self.protection_status
    }

    pub fn backoff_time_ms(&self) -> Option<i32> {
        self.next_request_policy
            .as_ref()
            .and_then(|policy| policy.backoff_time_ms)
    }

    pub fn live_head_sequence_number(&self) -> Option<i64> {
        self.live_metadata
            .as_ref()
            .and_then(|meta| meta.head_sequence_number)
    }

    /// Start time of the segment that would follow the last completed one
    /// for this format, or 0 when nothing has completed yet.
    pub fn segment_start_time_ms(&self, itag: i32) -> i64 {
        match self.last_segments.get(&itag) {
            Some(last) => match last.start_ms {
                Some(start_ms) => start_ms + last.duration_ms,
                None => 0,
            },
            None => 0,
        }
    }

    pub fn segment_duration_ms(&self, itag: i32) -> i64 {
        self.last_segments
            .get(&itag)
            .map(|last| last.duration_ms)
            .unwrap_or(0)
    }

    /// Forget the resume position for one format. Used when the consumer
    /// restarts a track from scratch.
    pub fn reset_format(&mut self, itag: i32) {
        if let Some(last) = self.last_segments.get_mut(&itag) {
            last.start_ms = None;
        }
    }

    // -- format initialization -----------------------------------------------

    pub fn process_format_initialization_metadata(
        &mut self,
        meta: FormatInitializationMetadata,
    ) -> Result<Option<SabrPart>> {
        let format_id = match &meta.format_id {
            Some(id) => id.clone(),
            None => return Err(SabrStreamError::MissingField("format_id")),
        };

        if self.selected_formats.contains_key(&format_id.key()) {
            tracing::debug!("[sabr] format {} already initialized", format_id.key());
            return Ok(None);
        }

        self.check_video_id(meta.video_id.as_deref())?;

        let selector_index = self
            .match_selector(&format_id, meta.mime_type.as_deref())
            // If we ignored the format the server may refuse to send us any more data
            .ok_or_else(|| SabrStreamError::UnmatchedFormat(format_id.clone()))?;

        // The server re-assigning a selector means it changed the format
        // mid-session (e.g. a quality change), which is unsupported.
        if self
            .selected_formats
            .values()
            .any(|format| format.selector_index == selector_index)
        {
            return Err(SabrStreamError::FormatChanged);
        }

        let duration_ms = proto::ticks_to_ms(meta.duration_units, meta.duration_timescale);

        let total_segments = meta.end_segment_number.or_else(|| {
            self.live_metadata
                .as_ref()
                .and_then(|live| live.head_sequence_number)
        });

        let discard = self.selectors[selector_index].discard_media;

        let mut format = SelectedFormat {
            format_id: format_id.clone(),
            duration_ms,
            end_time_ms: meta.end_time_ms,
            mime_type: meta.mime_type.clone(),
            video_id: meta.video_id.clone(),
            selector_index,
            total_segments,
            discard,
            consumed_ranges: Vec::new(),
            current_segment: None,
            init_segment: None,
            sequence_lmt: None,
        };

        self.total_duration_ms = Some(
            self.total_duration_ms
                .unwrap_or(0)
                .max(meta.end_time_ms.unwrap_or(0))
                .max(duration_ms.unwrap_or(0)),
        );

        if discard {
            // Fully buffered as far as the server is concerned; it stops
            // sending data for this format.
            format.mark_fully_consumed();
        }

        tracing::debug!("[sabr] initialized format {}", format_id.key());
        self.selected_formats.insert(format_id.key(), format);

        if discard {
            return Ok(None);
        }

        Ok(Some(SabrPart::FormatInitialized {
            format_id,
            mime_type: meta.mime_type,
            end_time_ms: meta.end_time_ms,
        }))
    }

    // -- media segments ------------------------------------------------------

    pub fn process_media_header(&mut self, header: MediaHeader) -> Result<Option<SabrPart>> {
        self.check_video_id(header.video_id.as_deref())?;

        let format_id = header
            .format_id
            .clone()
            .ok_or(SabrStreamError::MissingField("format_id"))?;

        let header_id = u64::from(header.header_id.unwrap_or(0));

        // Should not happen unless partial segments were not cleared.
        if self.partial_segments.contains_key(&header_id) {
            return Err(SabrStreamError::DuplicateHeaderId(header_id));
        }

        let is_live = self.is_live();
        let format = self
            .selected_formats
            .get_mut(&format_id.key())
            .ok_or_else(|| SabrStreamError::UnknownFormat(format_id.clone()))?;

        if header.compression_algorithm.is_some() {
            // Unknown when this is used, but it is not supported currently
            return Err(SabrStreamError::CompressionUnsupported);
        }

        let is_init_segment = header.is_init_segment.unwrap_or(false);
        let sequence_number = match header.sequence_number {
            Some(seq) => seq,
            None if is_init_segment => 0,
            None => return Err(SabrStreamError::MissingField("sequence_number")),
        };

        format.sequence_lmt = header.sequence_lmt;

        // A segment already inside a consumed range is a server re-send
        // (transport retry); acknowledge it but do not re-emit its bytes.
        let mut consumed =
            !is_init_segment && format.is_sequence_consumed(sequence_number);
        if consumed {
            tracing::debug!(
                "[sabr] {} segment {} already consumed",
                format_id.key(),
                sequence_number
            );
        }

        // Ordering check. Discarded formats can seek without the consumer
        // knowing, so order is only enforced for emitted segments.
        if let Some(previous) = &format.current_segment {
            if !is_init_segment
                && !previous.discard
                && !format.discard
                && !consumed
                && sequence_number != previous.sequence_number + 1
            {
                return Err(SabrStreamError::MediaSegmentMismatch {
                    format_id,
                    expected: previous.sequence_number + 1,
                    received: sequence_number,
                });
            }
        }

        if is_init_segment && format.init_segment.is_some() {
            tracing::debug!(
                "[sabr] init segment already seen for format {}",
                format_id.key()
            );
            consumed = true;
        }

        let time_range = header.time_range.as_ref();
        let start_ms = header
            .start_ms
            .or_else(|| {
                time_range.and_then(|range| {
                    proto::ticks_to_ms(range.start_ticks, range.timescale)
                })
            })
            .unwrap_or(0);

        // For videos, either duration_ms or time_range should be present.
        // For live streams the duration is estimated from the target
        // segment duration, slightly underestimated since the real
        // duration may fall short of the target.
        let actual_duration_ms = header.duration_ms.or_else(|| {
            time_range.and_then(|range| {
                proto::ticks_to_ms(range.duration_ticks, range.timescale)
            })
        });

        let estimated_duration_ms = if is_live {
            Some(
                self.config.live_segment_target_duration_sec * 1000
                    - self.config.live_segment_target_duration_tolerance_ms,
            )
        } else if is_init_segment {
            Some(0)
        } else {
            None
        };

        let duration_ms = match actual_duration_ms.or(estimated_duration_ms) {
            Some(duration) => duration,
            // Cannot progress without a duration.
            None => {
                return Err(SabrStreamError::UnknownDuration {
                    format_id,
                    sequence_number,
                })
            }
        };

        let estimated_content_length = match (is_live, header.content_length, header.bitrate_bps)
        {
            (true, None, Some(bitrate_bps)) => {
                Some((bitrate_bps as f64 * (duration_ms as f64 / 1000.0)).ceil() as i64)
            }
            _ => None,
        };

        let segment = Segment {
            format_id: format_id.clone(),
            is_init_segment,
            duration_ms,
            duration_estimated: matches!(actual_duration_ms, None | Some(0)),
            start_data_range: header.start_data_range,
            sequence_number,
            content_length: header.content_length.or(estimated_content_length),
            content_length_estimated: estimated_content_length.is_some(),
            start_ms,
            discard: format.discard || consumed,
            consumed,
            received_data_length: 0,
            sequence_lmt: header.sequence_lmt,
        };

        let part = if segment.discard {
            None
        } else {
            Some(SabrPart::MediaSegmentInit {
                format_id,
                player_time_ms: (self.player_time_ms > 0).then_some(self.player_time_ms),
                sequence_number,
                total_segments: format.total_segments,
                duration_ms: segment.duration_ms,
                duration_estimated: segment.duration_estimated,
                start_data_range: segment.start_data_range,
                start_ms: segment.start_ms,
                is_init_segment,
                content_length: segment.content_length,
                content_length_estimated: segment.content_length_estimated,
            })
        };

        tracing::debug!(
            "[sabr] media header {} for sequence {}",
            header_id,
            sequence_number
        );
        self.partial_segments.insert(header_id, segment);

        Ok(part)
    }

    pub fn process_media(&mut self, header_id: u64, data: Bytes) -> Result<Option<SabrPart>> {
        let segment = self
            .partial_segments
            .get_mut(&header_id)
            .ok_or(SabrStreamError::UnknownHeaderId(header_id))?;

        let start_byte_offset = segment.received_data_length;
        segment.received_data_length += data.len() as i64;

        if segment.discard {
            tracing::debug!(
                "[sabr] media: discarding {} bytes for itag={:?}",
                data.len(),
                segment.format_id.itag
            );
            return Ok(None);
        }

        let total_segments = self
            .selected_formats
            .get(&segment.format_id.key())
            .and_then(|format| format.total_segments);

        Ok(Some(SabrPart::MediaSegmentData {
            format_id: segment.format_id.clone(),
            sequence_number: segment.sequence_number,
            is_init_segment: segment.is_init_segment,
            total_segments,
            start_ms: segment.start_ms,
            data,
            start_byte_offset,
        }))
    }

    pub fn process_media_end(&mut self, header_id: u64) -> Result<MediaEndResult> {
        let segment = self
            .partial_segments
            .remove(&header_id)
            .ok_or(SabrStreamError::UnknownHeaderId(header_id))?;

        tracing::debug!(
            "[sabr] media end for {} (sequence {}, {} bytes)",
            segment.format_id.key(),
            segment.sequence_number,
            segment.received_data_length
        );

        if let Some(expected) = segment.content_length {
            if expected != segment.received_data_length {
                if segment.content_length_estimated {
                    tracing::debug!(
                        "[sabr] content length for {} (sequence {}) was estimated: \
                         estimated {} bytes, got {}",
                        segment.format_id.key(),
                        segment.sequence_number,
                        expected,
                        segment.received_data_length
                    );
                } else if self.config.strict_content_length {
                    return Err(SabrStreamError::ContentLengthMismatch {
                        format_id: segment.format_id,
                        sequence_number: segment.sequence_number,
                        expected,
                        received: segment.received_data_length,
                    });
                } else {
                    tracing::debug!(
                        "[sabr] content length mismatch for {} (sequence {}): \
                         expected {} bytes, got {}",
                        segment.format_id.key(),
                        segment.sequence_number,
                        expected,
                        segment.received_data_length
                    );
                }
            }
        }

        if !segment.is_init_segment {
            if let Some(itag) = segment.format_id.itag {
                self.last_segments.insert(
                    itag,
                    LastSegment {
                        start_ms: Some(segment.start_ms),
                        duration_ms: segment.duration_ms,
                    },
                );
            }
        }

        let format = self
            .selected_formats
            .get_mut(&segment.format_id.key())
            .ok_or_else(|| SabrStreamError::UnknownFormat(segment.format_id.clone()))?;

        let mut result = MediaEndResult {
            part: None,
            // Discarded segments that were not consumed still count as new.
            is_new_segment: !segment.consumed,
        };

        if segment.is_init_segment {
            // Init segments are not part of the sequence timeline; no
            // consumed range is created.
            if !segment.discard {
                result.part = Some(end_part(&segment, format.total_segments));
            }
            format.init_segment = Some(segment);
            return Ok(result);
        }

        let discard = segment.discard;
        let consumed = segment.consumed;
        format.current_segment = Some(segment.clone());

        // A consumed segment does not change ranges; it was already
        // accounted for (typically a discarded track marked fully
        // buffered, or a server re-send).
        if !consumed {
            format.record_consumed(segment.start_ms, segment.duration_ms, segment.sequence_number);
        }

        // Emitted after the range update so the consumer observes the
        // post-segment consumed state.
        if !discard {
            result.part = Some(end_part(&segment, format.total_segments));
        }

        Ok(result)
    }

    // -- protection status ---------------------------------------------------

    pub fn process_stream_protection_status(
        &mut self,
        status: StreamProtectionStatus,
    ) -> Option<SabrPart> {
        self.protection_status = status.status;
        let have_token = self.config.po_token.is_some();

        let resolved = match status.status.and_then(|raw| ProtectionStatus::try_from(raw).ok()) {
            Some(ProtectionStatus::Ok) => Some(if have_token {
                PoTokenStatus::Ok
            } else {
                PoTokenStatus::NotRequired
            }),
            Some(ProtectionStatus::AttestationPending) => Some(if have_token {
                PoTokenStatus::Pending
            } else {
                PoTokenStatus::PendingMissing
            }),
            Some(ProtectionStatus::AttestationRequired) => Some(if have_token {
                PoTokenStatus::Invalid
            } else {
                PoTokenStatus::Missing
            }),
            _ => {
                tracing::warn!(
                    "[sabr] received an unknown StreamProtectionStatus: {:?}",
                    status.status
                );
                None
            }
        };

        resolved.map(SabrPart::PoTokenStatus)
    }

    // -- live metadata and seeks ---------------------------------------------

    pub fn process_live_metadata(&mut self, meta: LiveMetadata) -> Vec<SabrPart> {
        if let Some(head_time_ms) = meta.head_sequence_time_ms {
            self.total_duration_ms = Some(head_time_ms);
        }

        // For livestreams the total segment count is not in the format
        // initialization metadata; refinalize it from the live head.
        if let Some(head_sequence) = meta.head_sequence_number {
            for format in self.selected_formats.values_mut() {
                format.total_segments = Some(head_sequence);
            }
        }

        let min_seekable_time_ms =
            proto::ticks_to_ms(meta.min_seekable_time_ticks, meta.min_seekable_timescale);
        self.live_metadata = Some(meta);

        // The server should send a SABR_SEEK when the play head falls
        // below the DVR window, but not all clients receive one. Simulate
        // it so segments are not judged against a stale predecessor.
        match min_seekable_time_ms {
            Some(min_seekable) if self.player_time_ms < min_seekable => {
                tracing::debug!(
                    "[sabr] player time {}ms below min seekable {}ms, simulating server seek",
                    self.player_time_ms,
                    min_seekable
                );
                self.player_time_ms = min_seekable;
                self.seek_all_formats(SeekReason::ServerSeek)
            }
            _ => Vec::new(),
        }
    }

    pub fn process_sabr_seek(&mut self, seek: SabrSeek) -> Result<Vec<SabrPart>> {
        let seek_to_ms = proto::ticks_to_ms(seek.seek_time_ticks, seek.timescale)
            .ok_or(SabrStreamError::MissingSeekTime)?;

        tracing::debug!("[sabr] server seek to {}ms", seek_to_ms);
        self.player_time_ms = seek_to_ms;

        Ok(self.seek_all_formats(SeekReason::ServerSeek))
    }

    /// Clear every format's current segment (ordering restarts) and emit
    /// one seek event per format.
    fn seek_all_formats(&mut self, reason: SeekReason) -> Vec<SabrPart> {
        let mut parts = Vec::with_capacity(self.selected_formats.len());
        for format in self.selected_formats.values_mut() {
            format.current_segment = None;
            parts.push(SabrPart::MediaSeek {
                reason,
                format_id: format.format_id.clone(),
            });
        }
        parts
    }

    // -- request policy and contexts -----------------------------------------

    pub fn process_next_request_policy(&mut self, policy: NextRequestPolicy) {
        tracing::debug!(
            "[sabr] next request policy: backoff={:?}ms",
            policy.backoff_time_ms
        );
        self.next_request_policy = Some(policy);
    }

    pub fn process_sabr_context_update(&mut self, update: SabrContextUpdate) {
        let (context_type, write_policy) = match (update.context_type, update.write_policy) {
            (Some(context_type), Some(write_policy)) if update.value.is_some() => {
                (context_type, write_policy)
            }
            _ => {
                tracing::warn!("[sabr] received an invalid SabrContextUpdate, ignoring");
                return;
            }
        };

        if write_policy == SabrContextWritePolicy::KeepExisting as i32
            && self.sabr_context_updates.contains_key(&context_type)
        {
            tracing::debug!(
                "[sabr] context update type={} has write_policy=KEEP_EXISTING and \
                 already exists, ignoring",
                context_type
            );
            return;
        }

        if update.send_by_default.unwrap_or(false) {
            self.sabr_contexts_to_send.insert(context_type);
        }
        tracing::debug!("[sabr] registered context update type={}", context_type);
        self.sabr_context_updates.insert(context_type, update);
    }

    pub fn process_sabr_context_sending_policy(&mut self, policy: SabrContextSendingPolicy) {
        for start_type in policy.start_policy {
            if self.sabr_contexts_to_send.insert(start_type) {
                tracing::debug!("[sabr] server enabled context type={}", start_type);
            }
        }

        for stop_type in policy.stop_policy {
            if self.sabr_contexts_to_send.remove(&stop_type) {
                tracing::debug!("[sabr] server disabled context type={}", stop_type);
            }
        }

        for discard_type in policy.discard_policy {
            if self.sabr_context_updates.remove(&discard_type).is_some() {
                tracing::debug!("[sabr] server discarded context type={}", discard_type);
            }
        }
    }

    // -- outbound context ----------------------------------------------------

    /// Build the state blob for the next outbound segment request.
    pub fn create_streamer_context(&self) -> Result<StreamerContext> {
        let po_token = match &self.config.po_token {
            Some(token) => Some(decode_po_token(token)?),
            None => None,
        };

        let playback_cookie = self
            .next_request_policy
            .as_ref()
            .and_then(|policy| policy.playback_cookie.as_ref())
            .map(|cookie| cookie.encode_to_vec());

        let sabr_contexts = self
            .sabr_context_updates
            .values()
            .filter(|update| {
                update
                    .context_type
                    .is_some_and(|context_type| self.sabr_contexts_to_send.contains(&context_type))
            })
            .map(|update| SabrContext {
                context_type: update.context_type,
                value: update.value.clone(),
            })
            .collect();

        // Types the server asked us to send but whose payload we never
        // received; declared explicitly so the server knows.
        let unsent_sabr_contexts = self
            .sabr_contexts_to_send
            .iter()
            .filter(|context_type| !self.sabr_context_updates.contains_key(context_type))
            .copied()
            .collect();

        Ok(StreamerContext {
            client_info: Some(self.config.client_info.clone()),
            po_token,
            playback_cookie,
            sabr_contexts,
            unsent_sabr_contexts,
        })
    }

    // -- helpers -------------------------------------------------------------

    fn check_video_id(&self, received: Option<&str>) -> Result<()> {
        if let (Some(received), Some(expected)) = (received, self.config.video_id.as_deref()) {
            if received != expected {
                return Err(SabrStreamError::VideoIdMismatch {
                    expected: expected.to_string(),
                    received: received.to_string(),
                });
            }
        }
        Ok(())
    }

    fn match_selector(
        &self,
        format_id: &crate::proto::FormatId,
        mime_type: Option<&str>,
    ) -> Option<usize> {
        self.selectors
            .iter()
            .position(|selector| selector.matches(format_id, mime_type))
    }
}

fn end_part(segment: &Segment, total_segments: Option<i64>) -> SabrPart {
    SabrPart::MediaSegmentEnd {
        format_id: segment.format_id.clone(),
        sequence_number: segment.sequence_number,
        is_init_segment: segment.is_init_segment,
        total_segments,
        start_ms: segment.start_ms,
        duration_ms: segment.duration_ms,
    }
}

/// PO tokens arrive as URL-safe base64 with optional padding.
fn decode_po_token(token: &str) -> Result<Vec<u8>> {
    use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
    use base64::Engine;

    let engine = GeneralPurpose::new(
        &base64::alphabet::URL_SAFE,
        GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
    );
    Ok(engine.decode(token)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

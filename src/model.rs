//! Durable and transient bookkeeping state for one SABR session:
//! which formats the caller selected, which segment sequence spans have
//! already been received, and the partially reconstructed segment keyed
//! by its ephemeral header id.

use crate::proto::FormatId;

/// Largest sequence number the server accepts (2^53 - 1). Used as the
/// sentinel "everything consumed" bound for discarded formats.
pub const MAX_SEQUENCE: i64 = (1 << 53) - 1;

// ---------------------------------------------------------------------------
// Format selection
// ---------------------------------------------------------------------------

/// Decides whether the consumer wants a server-offered format's bytes or
/// wants them acknowledged but discarded. A selector matches either by an
/// explicit list of format ids or by MIME prefix.
#[derive(Debug, Clone)]
pub struct FormatSelector {
    pub name: String,
    pub discard_media: bool,
    pub format_ids: Vec<FormatId>,
    pub mime_prefix: Option<String>,
}

impl FormatSelector {
    pub fn new(name: impl Into<String>, discard_media: bool) -> Self {
        Self {
            name: name.into(),
            discard_media,
            format_ids: Vec::new(),
            mime_prefix: None,
        }
    }

    pub fn with_format_ids(mut self, format_ids: Vec<FormatId>) -> Self {
        self.format_ids = format_ids;
        self
    }

    pub fn with_mime_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.mime_prefix = Some(prefix.into());
        self
    }

    /// Whether this selector accepts the given format. Explicit ids take
    /// precedence over the MIME prefix.
    pub fn matches(&self, format_id: &FormatId, mime_type: Option<&str>) -> bool {
        if !self.format_ids.is_empty() {
            return self.format_ids.iter().any(|candidate| {
                candidate.itag == format_id.itag
                    && (candidate.last_modified.is_none()
                        || candidate.last_modified == format_id.last_modified)
            });
        }

        match (&self.mime_prefix, mime_type) {
            (Some(prefix), Some(mime)) => mime.starts_with(prefix.as_str()),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Consumed ranges
// ---------------------------------------------------------------------------

/// A contiguous run of segment sequence numbers already received for one
/// format, reported back to the server so it stops re-sending them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumedRange {
    pub start_time_ms: i64,
    pub duration_ms: i64,
    pub start_sequence_number: i64,
    pub end_sequence_number: i64,
}

impl ConsumedRange {
    pub fn contains(&self, sequence_number: i64) -> bool {
        self.start_sequence_number <= sequence_number
            && sequence_number <= self.end_sequence_number
    }
}

// ---------------------------------------------------------------------------
// Segments
// ---------------------------------------------------------------------------

/// Transient reconstruction unit, alive between a MEDIA_HEADER part and
/// the matching MEDIA_END. Media byte counts accumulate here so the end
/// part can be validated and the consumed range updated.
#[derive(Debug, Clone)]
pub struct Segment {
    pub format_id: FormatId,
    pub is_init_segment: bool,
    pub duration_ms: i64,
    pub duration_estimated: bool,
    pub start_data_range: Option<i64>,
    pub sequence_number: i64,
    pub content_length: Option<i64>,
    pub content_length_estimated: bool,
    pub start_ms: i64,
    pub discard: bool,
    pub consumed: bool,
    pub received_data_length: i64,
    pub sequence_lmt: Option<i64>,
}

// ---------------------------------------------------------------------------
// Selected formats
// ---------------------------------------------------------------------------

/// Per-format durable state, created once when the format's
/// initialization metadata arrives and kept for the whole session.
#[derive(Debug, Clone)]
pub struct SelectedFormat {
    pub format_id: FormatId,
    pub duration_ms: Option<i64>,
    pub end_time_ms: Option<i64>,
    pub mime_type: Option<String>,
    pub video_id: Option<String>,
    /// Index into the processor's selector list. Selector identity is
    /// what the format-switch guard compares.
    pub selector_index: usize,
    pub total_segments: Option<i64>,
    pub discard: bool,
    pub consumed_ranges: Vec<ConsumedRange>,
    pub current_segment: Option<Segment>,
    pub init_segment: Option<Segment>,
    pub sequence_lmt: Option<i64>,
}

impl SelectedFormat {
    /// Seed the sentinel range covering the entire sequence space. The
    /// server treats the format as fully buffered and stops sending it.
    pub fn mark_fully_consumed(&mut self) {
        self.consumed_ranges.clear();
        self.consumed_ranges.push(ConsumedRange {
            start_time_ms: 0,
            duration_ms: MAX_SEQUENCE,
            start_sequence_number: 0,
            end_sequence_number: MAX_SEQUENCE,
        });
    }

    pub fn is_sequence_consumed(&self, sequence_number: i64) -> bool {
        self.consumed_ranges
            .iter()
            .any(|range| range.contains(sequence_number))
    }

    /// Fold a newly completed segment into the consumed ranges. Extends
    /// the range ending at `sequence_number - 1` when one exists; a gap
    /// always starts a new range, never a retroactive merge.
    pub fn record_consumed(&mut self, start_ms: i64, duration_ms: i64, sequence_number: i64) {
        if let Some(range) = self
            .consumed_ranges
            .iter_mut()
            .find(|range| range.end_sequence_number == sequence_number - 1)
        {
            range.end_sequence_number = sequence_number;
            range.duration_ms = (start_ms - range.start_time_ms) + duration_ms;
            return;
        }

        self.consumed_ranges.push(ConsumedRange {
            start_time_ms: start_ms,
            duration_ms,
            start_sequence_number: sequence_number,
            end_sequence_number: sequence_number,
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn format_id(itag: i32) -> FormatId {
        FormatId {
            itag: Some(itag),
            last_modified: Some(1_700_000_000),
            xtags: None,
        }
    }

    fn selected(discard: bool) -> SelectedFormat {
        SelectedFormat {
            format_id: format_id(140),
            duration_ms: Some(60_000),
            end_time_ms: None,
            mime_type: Some("audio/mp4".into()),
            video_id: None,
            selector_index: 0,
            total_segments: None,
            discard,
            consumed_ranges: Vec::new(),
            current_segment: None,
            init_segment: None,
            sequence_lmt: None,
        }
    }

    #[test]
    fn adjacent_segments_extend_the_open_range() {
        let mut format = selected(false);
        format.record_consumed(0, 5000, 1);
        format.record_consumed(5000, 5000, 2);
        format.record_consumed(10_000, 5000, 3);

        assert_eq!(format.consumed_ranges.len(), 1);
        let range = format.consumed_ranges[0];
        assert_eq!(range.start_sequence_number, 1);
        assert_eq!(range.end_sequence_number, 3);
        assert_eq!(range.duration_ms, 15_000);
    }

    #[test]
    fn gap_starts_a_new_range() {
        let mut format = selected(false);
        format.record_consumed(0, 5000, 1);
        format.record_consumed(25_000, 5000, 6);
        format.record_consumed(30_000, 5000, 7);

        assert_eq!(format.consumed_ranges.len(), 2);
        assert_eq!(format.consumed_ranges[0].end_sequence_number, 1);
        assert_eq!(format.consumed_ranges[1].start_sequence_number, 6);
        assert_eq!(format.consumed_ranges[1].end_sequence_number, 7);
    }

    #[test]
    fn ranges_stay_ordered_and_disjoint() {
        let mut format = selected(false);
        for seq in [1, 2, 5, 6, 10] {
            format.record_consumed(seq * 5000, 5000, seq);
        }

        let ranges = &format.consumed_ranges;
        for pair in ranges.windows(2) {
            assert!(pair[0].start_sequence_number <= pair[1].start_sequence_number);
            assert!(pair[0].end_sequence_number < pair[1].start_sequence_number);
        }
    }

    #[test]
    fn discard_sentinel_covers_everything() {
        let mut format = selected(true);
        format.mark_fully_consumed();

        assert_eq!(format.consumed_ranges.len(), 1);
        assert!(format.is_sequence_consumed(0));
        assert!(format.is_sequence_consumed(123_456));
        assert!(format.is_sequence_consumed(MAX_SEQUENCE));
    }

    #[test]
    fn selector_matches_by_itag() {
        let selector =
            FormatSelector::new("audio", false).with_format_ids(vec![format_id(140)]);

        assert!(selector.matches(&format_id(140), Some("audio/mp4")));
        assert!(!selector.matches(&format_id(251), Some("audio/webm")));
    }

    #[test]
    fn selector_matches_by_mime_prefix() {
        let selector = FormatSelector::new("video", false).with_mime_prefix("video/");

        assert!(selector.matches(&format_id(248), Some("video/webm")));
        assert!(!selector.matches(&format_id(251), Some("audio/webm")));
        assert!(!selector.matches(&format_id(251), None));
    }

    #[test]
    fn selector_id_list_ignores_lmt_when_unset() {
        let wildcard = FormatId {
            itag: Some(140),
            last_modified: None,
            xtags: None,
        };
        let selector = FormatSelector::new("audio", false).with_format_ids(vec![wildcard]);

        assert!(selector.matches(&format_id(140), None));
    }
}

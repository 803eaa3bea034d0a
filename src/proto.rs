//! Protobuf messages carried inside UMP part payloads.
//!
//! Hand-written `prost` derives rather than `prost-build` output: the SABR
//! schema is reverse engineered, has no official `.proto` source of truth,
//! and every field must stay `optional` because presence/absence carries
//! meaning (the state machine distinguishes "field not sent" from "field
//! is zero" throughout).

use prost::Message;

// ---------------------------------------------------------------------------
// Shared building blocks
// ---------------------------------------------------------------------------

/// Identifies one elementary track/quality variant offered by the server.
#[derive(Clone, PartialEq, Eq, Hash, Message)]
pub struct FormatId {
    #[prost(int32, optional, tag = "1")]
    pub itag: Option<i32>,
    #[prost(uint64, optional, tag = "2")]
    pub last_modified: Option<u64>,
    #[prost(string, optional, tag = "3")]
    pub xtags: Option<String>,
}

impl FormatId {
    /// Stable map key. Distinct `(itag, lmt, xtags)` triples are distinct
    /// formats even when the itag matches.
    pub fn key(&self) -> String {
        format!(
            "{};{};{}",
            self.itag.unwrap_or(0),
            self.last_modified.unwrap_or(0),
            self.xtags.as_deref().unwrap_or("")
        )
    }
}

/// A time span expressed in ticks of an arbitrary timescale.
#[derive(Clone, Copy, PartialEq, Message)]
pub struct TimeRange {
    #[prost(int64, optional, tag = "1")]
    pub start_ticks: Option<i64>,
    #[prost(int64, optional, tag = "2")]
    pub duration_ticks: Option<i64>,
    #[prost(int32, optional, tag = "3")]
    pub timescale: Option<i32>,
}

// ---------------------------------------------------------------------------
// Media parts
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
pub struct MediaHeader {
    #[prost(uint32, optional, tag = "1")]
    pub header_id: Option<u32>,
    #[prost(string, optional, tag = "2")]
    pub video_id: Option<String>,
    #[prost(int32, optional, tag = "3")]
    pub itag: Option<i32>,
    #[prost(uint64, optional, tag = "4")]
    pub last_modified: Option<u64>,
    #[prost(string, optional, tag = "5")]
    pub xtags: Option<String>,
    #[prost(int64, optional, tag = "6")]
    pub start_data_range: Option<i64>,
    #[prost(int32, optional, tag = "7")]
    pub compression_algorithm: Option<i32>,
    #[prost(bool, optional, tag = "8")]
    pub is_init_segment: Option<bool>,
    #[prost(int64, optional, tag = "9")]
    pub sequence_number: Option<i64>,
    #[prost(int64, optional, tag = "10")]
    pub bitrate_bps: Option<i64>,
    #[prost(message, optional, tag = "11")]
    pub time_range: Option<TimeRange>,
    #[prost(int64, optional, tag = "12")]
    pub start_ms: Option<i64>,
    #[prost(int64, optional, tag = "13")]
    pub duration_ms: Option<i64>,
    #[prost(message, optional, tag = "14")]
    pub format_id: Option<FormatId>,
    #[prost(int64, optional, tag = "15")]
    pub content_length: Option<i64>,
    #[prost(int64, optional, tag = "16")]
    pub sequence_lmt: Option<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FormatInitializationMetadata {
    #[prost(string, optional, tag = "1")]
    pub video_id: Option<String>,
    #[prost(message, optional, tag = "2")]
    pub format_id: Option<FormatId>,
    #[prost(int64, optional, tag = "3")]
    pub end_time_ms: Option<i64>,
    #[prost(int64, optional, tag = "4")]
    pub end_segment_number: Option<i64>,
    #[prost(string, optional, tag = "5")]
    pub mime_type: Option<String>,
    #[prost(int64, optional, tag = "9")]
    pub duration_units: Option<i64>,
    #[prost(int32, optional, tag = "10")]
    pub duration_timescale: Option<i32>,
}

// ---------------------------------------------------------------------------
// Live streams
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
pub struct LiveMetadata {
    #[prost(int64, optional, tag = "3")]
    pub head_sequence_number: Option<i64>,
    #[prost(int64, optional, tag = "4")]
    pub head_sequence_time_ms: Option<i64>,
    #[prost(int64, optional, tag = "5")]
    pub min_seekable_time_ticks: Option<i64>,
    #[prost(int32, optional, tag = "6")]
    pub min_seekable_timescale: Option<i32>,
}

#[derive(Clone, Copy, PartialEq, Message)]
pub struct SabrSeek {
    #[prost(int64, optional, tag = "1")]
    pub seek_time_ticks: Option<i64>,
    #[prost(int32, optional, tag = "2")]
    pub timescale: Option<i32>,
}

// ---------------------------------------------------------------------------
// Session control
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
pub struct SabrRedirect {
    #[prost(string, optional, tag = "1")]
    pub redirect_url: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SabrError {
    #[prost(string, optional, tag = "1")]
    pub error_type: Option<String>,
    #[prost(int32, optional, tag = "2")]
    pub code: Option<i32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum ProtectionStatus {
    Unknown = 0,
    Ok = 1,
    AttestationPending = 2,
    AttestationRequired = 3,
}

#[derive(Clone, Copy, PartialEq, Message)]
pub struct StreamProtectionStatus {
    #[prost(enumeration = "ProtectionStatus", optional, tag = "1")]
    pub status: Option<i32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum SabrContextWritePolicy {
    Unspecified = 0,
    Overwrite = 1,
    KeepExisting = 2,
}

#[derive(Clone, PartialEq, Message)]
pub struct SabrContextUpdate {
    #[prost(int32, optional, tag = "1")]
    pub context_type: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub scope: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub value: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "4")]
    pub send_by_default: Option<bool>,
    #[prost(enumeration = "SabrContextWritePolicy", optional, tag = "5")]
    pub write_policy: Option<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SabrContextSendingPolicy {
    #[prost(int32, repeated, tag = "1")]
    pub start_policy: Vec<i32>,
    #[prost(int32, repeated, tag = "2")]
    pub stop_policy: Vec<i32>,
    #[prost(int32, repeated, tag = "3")]
    pub discard_policy: Vec<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PlaybackCookie {
    #[prost(int32, optional, tag = "1")]
    pub field1: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub field2: Option<i32>,
    #[prost(message, optional, tag = "7")]
    pub video_format: Option<FormatId>,
    #[prost(message, optional, tag = "8")]
    pub audio_format: Option<FormatId>,
}

#[derive(Clone, PartialEq, Message)]
pub struct NextRequestPolicy {
    #[prost(int32, optional, tag = "1")]
    pub target_audio_readahead_ms: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub target_video_readahead_ms: Option<i32>,
    #[prost(int32, optional, tag = "4")]
    pub backoff_time_ms: Option<i32>,
    #[prost(message, optional, tag = "7")]
    pub playback_cookie: Option<PlaybackCookie>,
    #[prost(string, optional, tag = "8")]
    pub video_id: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ReloadPlaybackParams {
    #[prost(string, optional, tag = "1")]
    pub token: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ReloadPlayerResponse {
    #[prost(message, optional, tag = "1")]
    pub reload_playback_params: Option<ReloadPlaybackParams>,
}

// ---------------------------------------------------------------------------
// Outbound request context
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
pub struct ClientInfo {
    #[prost(string, optional, tag = "1")]
    pub device_make: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub device_model: Option<String>,
    #[prost(int32, optional, tag = "3")]
    pub client_name: Option<i32>,
    #[prost(string, optional, tag = "4")]
    pub client_version: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub os_name: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub os_version: Option<String>,
    #[prost(int32, optional, tag = "7")]
    pub android_sdk_version: Option<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SabrContext {
    #[prost(int32, optional, tag = "1")]
    pub context_type: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub value: Option<Vec<u8>>,
}

/// The state blob attached to the next outbound segment request.
#[derive(Clone, PartialEq, Message)]
pub struct StreamerContext {
    #[prost(message, optional, tag = "1")]
    pub client_info: Option<ClientInfo>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub po_token: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub playback_cookie: Option<Vec<u8>>,
    #[prost(message, repeated, tag = "5")]
    pub sabr_contexts: Vec<SabrContext>,
    #[prost(int32, repeated, tag = "6")]
    pub unsent_sabr_contexts: Vec<i32>,
}

/// Convert `(ticks, timescale)` to milliseconds. `None` when either side
/// is absent or the timescale is unusable.
pub fn ticks_to_ms(ticks: Option<i64>, timescale: Option<i32>) -> Option<i64> {
    match (ticks, timescale) {
        (Some(t), Some(ts)) if ts > 0 => Some(t.saturating_mul(1000) / ts as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_id_key_distinguishes_lmt() {
        let a = FormatId {
            itag: Some(251),
            last_modified: Some(1),
            xtags: None,
        };
        let b = FormatId {
            itag: Some(251),
            last_modified: Some(2),
            xtags: None,
        };
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn media_header_roundtrip() {
        let header = MediaHeader {
            header_id: Some(3),
            sequence_number: Some(17),
            is_init_segment: Some(false),
            duration_ms: Some(5120),
            format_id: Some(FormatId {
                itag: Some(140),
                last_modified: Some(1700000000),
                xtags: None,
            }),
            ..Default::default()
        };
        let bytes = header.encode_to_vec();
        let decoded = MediaHeader::decode(&bytes[..]).expect("decode");
        assert_eq!(decoded, header);
        assert_eq!(decoded.time_range, None);
    }

    #[test]
    fn ticks_to_ms_conversion() {
        assert_eq!(ticks_to_ms(Some(90000), Some(90000)), Some(1000));
        assert_eq!(ticks_to_ms(Some(30), Some(1)), Some(30000));
        assert_eq!(ticks_to_ms(Some(30), None), None);
        assert_eq!(ticks_to_ms(None, Some(1000)), None);
        assert_eq!(ticks_to_ms(Some(30), Some(0)), None);
    }
}

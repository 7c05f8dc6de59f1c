//! Payload normalization
//!
//! Turns raw multi-representation payloads into `NormalizedContent`.
//! Extraction is best-effort and never fails: a representation that cannot
//! be read simply leaves its field empty.

use chrono::{DateTime, SubsecRound, Utc};
use std::path::PathBuf;
use url::Url;

use super::image::probe_dimensions;
use super::types::{type_tags, CaptureSnapshot, NormalizedContent, RawPayload};

/// Normalize every payload of a snapshot, 1:1 and in order.
pub fn normalize_snapshot(snapshot: &CaptureSnapshot) -> Vec<NormalizedContent> {
    snapshot
        .payloads
        .iter()
        .map(|payload| {
            normalize_payload(
                payload,
                snapshot.captured_at,
                snapshot.source_app_name.as_deref(),
                snapshot.source_app_bundle_id.as_deref(),
            )
        })
        .collect()
}

/// Normalize a single payload.
///
/// The capture timestamp is truncated to millisecond precision, the
/// resolution the history database stores.
pub fn normalize_payload(
    payload: &RawPayload,
    captured_at: DateTime<Utc>,
    source_app_name: Option<&str>,
    source_app_bundle_id: Option<&str>,
) -> NormalizedContent {
    let text = type_tags::TEXT_TAGS
        .iter()
        .find_map(|tag| payload.data_for(tag))
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned());

    let url = payload
        .data_for(type_tags::URL)
        .and_then(|bytes| std::str::from_utf8(bytes).ok())
        .and_then(|s| Url::parse(s.trim()).ok());

    let file_path = payload
        .data_for(type_tags::FILE_URL)
        .and_then(|bytes| std::str::from_utf8(bytes).ok())
        .and_then(parse_file_reference);

    let image_data = type_tags::IMAGE_TAGS
        .iter()
        .find_map(|tag| payload.data_for(tag))
        .map(<[u8]>::to_vec);
    let image_size = image_data.as_deref().and_then(probe_dimensions);

    NormalizedContent {
        text,
        url,
        file_path,
        image_data,
        image_path: None,
        image_size,
        source_types: payload.type_tags(),
        captured_at: captured_at.trunc_subsecs(3),
        source_app_name: source_app_name.map(str::to_string),
        source_app_bundle_id: source_app_bundle_id.map(str::to_string),
    }
}

/// `file://` URLs become filesystem paths; anything else is taken as a path.
fn parse_file_reference(raw: &str) -> Option<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.starts_with("file:") {
        return Url::parse(raw).ok()?.to_file_path().ok();
    }
    Some(PathBuf::from(raw))
}

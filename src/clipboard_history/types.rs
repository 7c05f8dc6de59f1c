//! Clipboard history types
//!
//! Raw capture payloads, normalized content, classified items and the
//! `Entry` pair that the store keeps in its log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use url::Url;
use uuid::Uuid;

/// Representation tags understood by the normalizer
pub mod type_tags {
    pub const PLAIN_TEXT: &str = "public.utf8-plain-text";
    pub const MIME_TEXT: &str = "text/plain";
    pub const URL: &str = "public.url";
    pub const FILE_URL: &str = "public.file-url";
    pub const PNG: &str = "public.png";
    pub const MIME_PNG: &str = "image/png";
    pub const TIFF: &str = "public.tiff";

    pub const TEXT_TAGS: &[&str] = &[PLAIN_TEXT, MIME_TEXT];
    /// Image tags in preference order (PNG before TIFF)
    pub const IMAGE_TAGS: &[&str] = &[PNG, MIME_PNG, TIFF];
}

/// Kind of clipboard item, in classification priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Text,
    Url,
    Image,
    File,
    Unknown,
}

impl ItemType {
    pub const ALL: [ItemType; 5] = [
        ItemType::Text,
        ItemType::Url,
        ItemType::Image,
        ItemType::File,
        ItemType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Text => "text",
            ItemType::Url => "url",
            ItemType::Image => "image",
            ItemType::File => "file",
            ItemType::Unknown => "unknown",
        }
    }

    /// Parse an exact type tag; anything else is `None`
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One representation of a copied payload (type tag + raw bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Representation {
    pub type_tag: String,
    pub data: Vec<u8>,
}

/// A single copied item as delivered by a capture source.
///
/// A payload may carry several representations of the same content
/// (e.g. plain text and a URL).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPayload {
    pub representations: Vec<Representation>,
}

impl RawPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, type_tag: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.representations.push(Representation {
            type_tag: type_tag.into(),
            data: data.into(),
        });
        self
    }

    pub fn text(text: &str) -> Self {
        Self::new().with(type_tags::PLAIN_TEXT, text.as_bytes())
    }

    pub fn png(bytes: Vec<u8>) -> Self {
        Self::new().with(type_tags::PNG, bytes)
    }

    /// First representation with the given tag
    pub fn data_for(&self, type_tag: &str) -> Option<&[u8]> {
        self.representations
            .iter()
            .find(|r| r.type_tag == type_tag)
            .map(|r| r.data.as_slice())
    }

    pub fn type_tags(&self) -> Vec<String> {
        self.representations
            .iter()
            .map(|r| r.type_tag.clone())
            .collect()
    }
}

/// A batch of payloads captured together, with the focused application
#[derive(Debug, Clone)]
pub struct CaptureSnapshot {
    pub payloads: Vec<RawPayload>,
    pub captured_at: DateTime<Utc>,
    pub source_app_name: Option<String>,
    pub source_app_bundle_id: Option<String>,
}

impl CaptureSnapshot {
    pub fn new(payloads: Vec<RawPayload>, captured_at: DateTime<Utc>) -> Self {
        Self {
            payloads,
            captured_at,
            source_app_name: None,
            source_app_bundle_id: None,
        }
    }

    pub fn with_source_app(mut self, name: Option<&str>, bundle_id: Option<&str>) -> Self {
        self.source_app_name = name.map(str::to_string);
        self.source_app_bundle_id = bundle_id.map(str::to_string);
        self
    }
}

/// Structured content extracted from one raw payload
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedContent {
    pub text: Option<String>,
    pub url: Option<Url>,
    pub file_path: Option<PathBuf>,
    /// Raw encoded image bytes; dropped once a sidecar file is written
    pub image_data: Option<Vec<u8>>,
    pub image_path: Option<PathBuf>,
    /// Pixel (width, height) probed from the image header
    pub image_size: Option<(u32, u32)>,
    pub source_types: Vec<String>,
    pub captured_at: DateTime<Utc>,
    pub source_app_name: Option<String>,
    pub source_app_bundle_id: Option<String>,
}

impl NormalizedContent {
    /// Empty content captured at `captured_at`
    pub fn empty(captured_at: DateTime<Utc>) -> Self {
        Self {
            text: None,
            url: None,
            file_path: None,
            image_data: None,
            image_path: None,
            image_size: None,
            source_types: Vec::new(),
            captured_at,
            source_app_name: None,
            source_app_bundle_id: None,
        }
    }

    /// Replace the image payload, keeping everything else
    pub fn with_image(self, image_data: Option<Vec<u8>>, image_path: Option<PathBuf>) -> Self {
        Self {
            image_data,
            image_path,
            ..self
        }
    }
}

/// Classified, addressable view of a clipboard capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub item_type: ItemType,
    pub preview: String,
    pub metadata: BTreeMap<String, String>,
    /// Lowercase hex SHA-256, the dedup key
    pub content_hash: String,
    pub source_app_name: Option<String>,
    pub source_app_bundle_id: Option<String>,
    pub pinned: bool,
}

/// Item plus the content it was classified from
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub item: Item,
    pub content: NormalizedContent,
}

impl Entry {
    pub fn id(&self) -> Uuid {
        self.item.id
    }

    pub fn is_pinned(&self) -> bool {
        self.item.pinned
    }
}

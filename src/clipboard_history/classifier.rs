//! Content classification
//!
//! Assigns type, preview, metadata and content hash to normalized content.
//! Priority (first match wins): image, file, url, text, unknown. The content
//! hash follows the same priority over a single byte source so that two
//! captures of the same thing collapse under dedup.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use url::Url;
use uuid::Uuid;

use super::types::{Entry, Item, ItemType, NormalizedContent};

/// Maximum characters of text kept in a preview
pub const PREVIEW_CHAR_LIMIT: usize = 140;

/// Preview for content that matched no other type
pub const UNKNOWN_PREVIEW: &str = "Unknown clipboard item";

/// Classify content into a new `Item` with a fresh identifier.
pub fn classify(content: &NormalizedContent) -> Item {
    let (item_type, preview, metadata) = describe(content);

    Item {
        id: Uuid::new_v4(),
        created_at: content.captured_at,
        item_type,
        preview,
        metadata,
        content_hash: compute_content_hash(content),
        source_app_name: content.source_app_name.clone(),
        source_app_bundle_id: content.source_app_bundle_id.clone(),
        pinned: false,
    }
}

/// Classify and pair with its content
pub fn classify_entry(content: NormalizedContent) -> Entry {
    Entry {
        item: classify(&content),
        content,
    }
}

fn describe(content: &NormalizedContent) -> (ItemType, String, BTreeMap<String, String>) {
    let mut metadata = BTreeMap::new();

    if content.image_data.is_some() || content.image_path.is_some() || content.image_size.is_some()
    {
        let preview = match content.image_size {
            Some((width, height)) => {
                metadata.insert("width".to_string(), width.to_string());
                metadata.insert("height".to_string(), height.to_string());
                format!("Image ({}x{})", width, height)
            }
            None => "Image".to_string(),
        };
        return (ItemType::Image, preview, metadata);
    }

    if let Some(path) = &content.file_path {
        let path = path.to_string_lossy().into_owned();
        metadata.insert("path".to_string(), path.clone());
        return (ItemType::File, path, metadata);
    }

    let url = content
        .url
        .clone()
        .or_else(|| content.text.as_deref().and_then(text_as_url));
    if let Some(url) = url {
        metadata.insert("url".to_string(), url.as_str().to_string());
        return (ItemType::Url, url.as_str().to_string(), metadata);
    }

    if let Some(text) = content.text.as_deref().filter(|t| !t.is_empty()) {
        return (ItemType::Text, truncate_preview(text, PREVIEW_CHAR_LIMIT), metadata);
    }

    metadata.insert("types".to_string(), content.source_types.join(", "));
    (ItemType::Unknown, UNKNOWN_PREVIEW.to_string(), metadata)
}

/// Parse copied text as an absolute URL.
///
/// The text must be a single token with an explicit scheme; prose that
/// happens to contain a colon is not a URL.
pub fn text_as_url(text: &str) -> Option<Url> {
    if text.is_empty() || text.chars().any(char::is_whitespace) {
        return None;
    }
    Url::parse(text).ok()
}

/// Truncate to `limit` characters, appending an ellipsis when cut
pub fn truncate_preview(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_index, _)) => format!("{}…", &text[..byte_index]),
        None => text.to_string(),
    }
}

/// SHA-256 over the single highest-priority byte source, hex-encoded
pub fn compute_content_hash(content: &NormalizedContent) -> String {
    let mut hasher = Sha256::new();
    if let Some(data) = &content.image_data {
        hasher.update(data);
    } else if let Some(text) = &content.text {
        hasher.update(text.as_bytes());
    } else if let Some(url) = &content.url {
        hasher.update(url.as_str().as_bytes());
    } else if let Some(path) = &content.file_path {
        hasher.update(path.to_string_lossy().as_bytes());
    } else {
        hasher.update(content.source_types.join("|").as_bytes());
    }
    hex::encode(hasher.finalize())
}

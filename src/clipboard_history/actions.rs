//! Paste-back actions
//!
//! Writing a stored entry back to the system clipboard, optionally followed
//! by a paste keystroke. What gets written is decided by `plan_write`; the
//! sink only has to carry it out.

use anyhow::{Context, Result};
use arboard::{Clipboard, ImageData};
use std::borrow::Cow;
use std::path::PathBuf;
use tracing::{debug, warn};
use uuid::Uuid;

use super::blob_store::read_sidecar;
use super::image::decode_to_rgba;
use super::types::Entry;
use super::worker::StoreHandle;

/// What to put on the clipboard for an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardWrite {
    /// Encoded image bytes (PNG or TIFF)
    Image(Vec<u8>),
    FilePath(PathBuf),
    Url(String),
    Text(String),
}

/// Full-fidelity write: image, then file, then URL, then text.
///
/// Image bytes come from memory if still present, otherwise from the
/// sidecar file. Returns None when the entry has nothing writable.
pub fn plan_write(entry: &Entry) -> Option<ClipboardWrite> {
    let content = &entry.content;

    let image = content
        .image_data
        .clone()
        .or_else(|| content.image_path.as_deref().and_then(read_sidecar));
    if let Some(bytes) = image {
        return Some(ClipboardWrite::Image(bytes));
    }
    if let Some(path) = &content.file_path {
        return Some(ClipboardWrite::FilePath(path.clone()));
    }
    if let Some(url) = &content.url {
        return Some(ClipboardWrite::Url(url.as_str().to_string()));
    }
    content
        .text
        .as_ref()
        .filter(|text| !text.is_empty())
        .map(|text| ClipboardWrite::Text(text.clone()))
}

/// Plain-text write: the text if any, else the URL string.
pub fn plan_plain_write(entry: &Entry) -> Option<ClipboardWrite> {
    let content = &entry.content;
    if let Some(text) = content.text.as_ref().filter(|text| !text.is_empty()) {
        return Some(ClipboardWrite::Text(text.clone()));
    }
    content
        .url
        .as_ref()
        .map(|url| ClipboardWrite::Text(url.as_str().to_string()))
}

/// Destination for paste-back
pub trait PasteSink {
    fn write(&mut self, write: &ClipboardWrite) -> Result<()>;

    /// Send the platform paste shortcut to the frontmost app
    fn replay_paste_keystroke(&mut self) -> Result<()>;

    /// Put the entry on the clipboard. Returns false if nothing was writable.
    fn copy(&mut self, entry: &Entry) -> Result<bool> {
        match plan_write(entry) {
            Some(write) => {
                self.write(&write)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn paste(&mut self, entry: &Entry) -> Result<bool> {
        if !self.copy(entry)? {
            return Ok(false);
        }
        self.replay_paste_keystroke()?;
        Ok(true)
    }

    fn paste_plain(&mut self, entry: &Entry) -> Result<bool> {
        let Some(write) = plan_plain_write(entry) else {
            return Ok(false);
        };
        self.write(&write)?;
        self.replay_paste_keystroke()?;
        Ok(true)
    }
}

/// Look an entry up in the store and paste it.
///
/// Returns false when the id is unknown or the entry has nothing to write.
pub fn paste_by_id(
    store: &StoreHandle,
    sink: &mut dyn PasteSink,
    id: Uuid,
    plain: bool,
) -> Result<bool> {
    let Some(entry) = store.get(id)? else {
        debug!(id = %id, "Paste requested for unknown entry");
        return Ok(false);
    };
    if plain {
        sink.paste_plain(&entry)
    } else {
        sink.paste(&entry)
    }
}

/// System clipboard via `arboard`
pub struct SystemClipboardSink {
    clipboard: Clipboard,
}

impl SystemClipboardSink {
    pub fn new() -> Result<Self> {
        let clipboard = Clipboard::new().context("Failed to create clipboard instance")?;
        Ok(Self { clipboard })
    }
}

impl PasteSink for SystemClipboardSink {
    fn write(&mut self, write: &ClipboardWrite) -> Result<()> {
        match write {
            ClipboardWrite::Image(bytes) => {
                let (width, height, rgba) = decode_to_rgba(bytes)?;
                self.clipboard
                    .set_image(ImageData {
                        width: width as usize,
                        height: height as usize,
                        bytes: Cow::Owned(rgba),
                    })
                    .context("Failed to write image to clipboard")?;
            }
            // arboard has no file-list support; the path goes on as text
            ClipboardWrite::FilePath(path) => {
                self.clipboard
                    .set_text(path.to_string_lossy().into_owned())
                    .context("Failed to write file path to clipboard")?;
            }
            ClipboardWrite::Url(text) | ClipboardWrite::Text(text) => {
                self.clipboard
                    .set_text(text.clone())
                    .context("Failed to write text to clipboard")?;
            }
        }
        debug!("Wrote entry to system clipboard");
        Ok(())
    }

    fn replay_paste_keystroke(&mut self) -> Result<()> {
        warn!("Paste keystroke replay is not available; entry left on the clipboard");
        Ok(())
    }
}

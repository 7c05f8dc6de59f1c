//! Clipboard History Module
//!
//! Captures clipboard changes, classifies them and keeps a bounded,
//! deduplicated history backed by SQLite.
//!
//! ## Features
//! - Text, URL, file and image entries (images stored as sidecar files)
//! - Background polling every 500ms with a 200ms settle delay
//! - Count-based retention that prefers evicting unpinned entries
//! - Pin/unpin, delete and substring search
//! - Database keyed from the system keyring when encryption is available
//!
//! ## Module Structure
//! - `types`: Core types (ItemType, RawPayload, NormalizedContent, Item, Entry)
//! - `normalizer`: Raw payload to normalized content
//! - `classifier`: Type, preview, metadata and content hash
//! - `store`: The in-memory history log
//! - `worker`: Store ownership thread and its handle
//! - `persistence`: SQLite rows and migrations
//! - `blob_store`: Image sidecar files
//! - `keychain`: Database key from the system keyring
//! - `image`: Dimension probing and PNG conversion
//! - `monitor`: Background clipboard polling
//! - `actions`: Writing entries back to the clipboard

mod actions;
mod blob_store;
mod classifier;
mod image;
mod keychain;
mod monitor;
mod normalizer;
mod persistence;
mod store;
mod types;
mod worker;

use std::path::Path;
use tracing::{info, warn};

use crate::error::StoreError;

#[cfg(test)]
pub(crate) use store::test_support;

// Types
pub use types::{
    type_tags, CaptureSnapshot, Entry, Item, ItemType, NormalizedContent, RawPayload,
    Representation,
};

// Pipeline
pub use classifier::{
    classify, classify_entry, compute_content_hash, text_as_url, truncate_preview,
    PREVIEW_CHAR_LIMIT, UNKNOWN_PREVIEW,
};
pub use normalizer::{normalize_payload, normalize_snapshot};

// Store and worker
pub use store::{BoxedStorage, HistoryStore, UpdateListener, DEDUP_WINDOW, MAX_SEARCH_LIMIT};
pub use worker::{StoreHandle, StoreRequest, StoreWorker};

// Persistence
pub use blob_store::BlobStore;
pub use keychain::{
    fetch_or_create_key, fetch_or_create_key_for, DatabaseKey, KEYCHAIN_ACCOUNT, KEYCHAIN_SERVICE,
};
pub use persistence::{EntryStorage, Persistence, PersistencePaths, DATABASE_FILE, IMAGES_DIR};

// Capture and paste
pub use actions::{
    paste_by_id, plan_plain_write, plan_write, ClipboardWrite, PasteSink, SystemClipboardSink,
};
pub use monitor::{
    ingest_snapshot, CaptureMonitor, CaptureSource, MonitorTiming, SystemClipboardSource,
};

/// Open on-disk storage under `data_dir` and sweep stale sidecars.
pub fn open_storage(data_dir: &Path, key: Option<&DatabaseKey>) -> Result<Persistence, StoreError> {
    let persistence = Persistence::open(&PersistencePaths::in_dir(data_dir), key)?;
    match persistence.gc_orphaned_sidecars() {
        Ok(0) => {}
        Ok(removed) => info!(removed, "Removed orphaned image sidecars"),
        Err(e) => warn!(error = %e, "Sidecar cleanup failed"),
    }
    Ok(persistence)
}

/// Build the store for `data_dir`, running in memory only if storage fails to open.
pub fn open_history_store(
    data_dir: &Path,
    key: Option<&DatabaseKey>,
    retention_limit: usize,
) -> HistoryStore {
    let storage: Option<BoxedStorage> = match open_storage(data_dir, key) {
        Ok(persistence) => Some(Box::new(persistence)),
        Err(e) => {
            warn!(error = %e, "Clipboard history will not be persisted");
            None
        }
    };
    HistoryStore::new(retention_limit, storage)
}

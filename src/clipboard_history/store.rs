//! Clipboard history store
//!
//! The authoritative, ordered log of entries (newest first). Handles dedup,
//! pinning, deletion, retention eviction and search, and mirrors every
//! mutation into the attached storage. Storage failures are logged and the
//! in-memory log carries on.
//!
//! The store is owned by the worker thread; nothing else touches it directly.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

use super::persistence::EntryStorage;
use super::types::{Entry, Item, ItemType};
use crate::error::ResultExt;

/// Identical content hashes closer than this (by entry timestamp) are dropped
pub const DEDUP_WINDOW: Duration = Duration::seconds(2);

/// Upper bound for search and recent result sizes
pub const MAX_SEARCH_LIMIT: usize = 200;

/// Called with the new revision after every mutation
pub type UpdateListener = Box<dyn Fn(u64) + Send>;

/// Storage handle owned by the store
pub type BoxedStorage = Box<dyn EntryStorage + Send>;

pub struct HistoryStore {
    entries: Vec<Entry>,
    retention_limit: usize,
    storage: Option<BoxedStorage>,
    /// Last accepted timestamp per content hash. Never pruned: capture
    /// timestamps are not guaranteed to arrive in order.
    recent_hashes: HashMap<String, DateTime<Utc>>,
    listener: Option<UpdateListener>,
    revision: u64,
}

impl HistoryStore {
    /// Create a store, loading existing entries from `storage` if present.
    pub fn new(retention_limit: usize, storage: Option<BoxedStorage>) -> Self {
        let entries = storage
            .as_ref()
            .and_then(|storage| storage.load().log_err())
            .unwrap_or_default();

        let mut store = Self {
            entries,
            retention_limit,
            storage,
            recent_hashes: HashMap::new(),
            listener: None,
            revision: 0,
        };
        store.trim_to_limit();

        info!(
            entries = store.entries.len(),
            retention_limit,
            persistent = store.storage.is_some(),
            "Clipboard history store ready"
        );
        store
    }

    pub fn set_listener(&mut self, listener: UpdateListener) {
        self.listener = Some(listener);
    }

    /// Ingest classified entries in batch order.
    ///
    /// Returns the items that were accepted (not deduplicated away).
    pub fn add(&mut self, candidates: Vec<Entry>) -> Vec<Item> {
        let mut accepted = Vec::with_capacity(candidates.len());

        for entry in candidates {
            let hash = &entry.item.content_hash;
            let at = entry.item.created_at;
            if let Some(last) = self.recent_hashes.get(hash) {
                if at.signed_duration_since(*last) < DEDUP_WINDOW {
                    debug!(hash = %hash, "Skipping duplicate clipboard capture");
                    continue;
                }
            }
            self.recent_hashes.insert(hash.clone(), at);
            accepted.push(entry);
        }

        if accepted.is_empty() {
            return Vec::new();
        }

        if let Some(storage) = self.storage.as_mut() {
            if let Some(paths) = storage.save(&accepted).log_err() {
                for entry in accepted.iter_mut() {
                    if entry.content.image_data.is_none() {
                        continue;
                    }
                    if let Some(path) = paths.get(&entry.item.id) {
                        entry.content = entry
                            .content
                            .clone()
                            .with_image(None, Some(path.clone()));
                    }
                }
            }
        }

        let items: Vec<Item> = accepted.iter().map(|entry| entry.item.clone()).collect();
        self.entries.splice(0..0, accepted);
        self.trim_to_limit();

        debug!(
            accepted = items.len(),
            total = self.entries.len(),
            "Added clipboard entries"
        );
        self.notify();
        items
    }

    /// Remove an entry. Returns false if the id is unknown.
    ///
    /// An update is emitted either way.
    pub fn delete(&mut self, id: Uuid) -> bool {
        let Some(index) = self.position(id) else {
            self.notify();
            return false;
        };
        self.entries.remove(index);
        if let Some(storage) = self.storage.as_mut() {
            storage.delete(id).log_err();
        }
        debug!(id = %id, "Deleted clipboard entry");
        self.notify();
        true
    }

    /// Flip the pinned flag in place. Returns the new flag, or None if unknown.
    ///
    /// An update is emitted either way.
    pub fn toggle_pinned(&mut self, id: Uuid) -> Option<bool> {
        let Some(index) = self.position(id) else {
            self.notify();
            return None;
        };
        let entry = &mut self.entries[index];
        entry.item.pinned = !entry.item.pinned;
        let pinned = entry.item.pinned;

        if let Some(storage) = self.storage.as_mut() {
            storage.update_pinned(id, pinned).log_err();
        }
        debug!(id = %id, pinned, "Toggled clipboard entry pin");
        self.notify();
        Some(pinned)
    }

    /// Replace the retention limit and evict down to it.
    pub fn update_retention_limit(&mut self, limit: usize) {
        self.retention_limit = limit;
        self.trim_to_limit();
        info!(retention_limit = limit, entries = self.entries.len(), "Retention limit updated");
        self.notify();
    }

    /// Entries in log order matching every given filter.
    ///
    /// `limit` is clamped to `1..=MAX_SEARCH_LIMIT`. The query is trimmed and
    /// matched case-insensitively as a substring of preview, text, URL, file
    /// path or source app name; an empty query matches everything.
    pub fn search(
        &self,
        query: Option<&str>,
        item_type: Option<ItemType>,
        pinned_only: bool,
        limit: usize,
    ) -> Vec<Entry> {
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT);
        let needle = query
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty());

        self.entries
            .iter()
            .filter(|entry| !pinned_only || entry.item.pinned)
            .filter(|entry| item_type.map_or(true, |wanted| wanted == entry.item.item_type))
            .filter(|entry| match &needle {
                Some(needle) => matches_query(entry, needle),
                None => true,
            })
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn recent(&self, limit: usize) -> Vec<Entry> {
        self.search(None, None, false, limit)
    }

    pub fn entry(&self, id: Uuid) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.item.id == id)
    }

    pub fn latest(&self) -> Option<&Entry> {
        self.entries.first()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn retention_limit(&self) -> usize {
        self.retention_limit
    }

    /// Number of update notifications emitted so far
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.entries.iter().position(|entry| entry.item.id == id)
    }

    fn notify(&mut self) {
        self.revision += 1;
        if let Some(listener) = &self.listener {
            listener(self.revision);
        }
    }

    /// Evict from the tail until the log fits the retention limit.
    ///
    /// Unpinned entries go first. If that is not enough, a second walk from
    /// the tail marks entries regardless of pin state, re-counting those the
    /// first walk already marked, so the log can stay above the limit.
    fn trim_to_limit(&mut self) {
        if self.entries.len() <= self.retention_limit {
            return;
        }
        let excess = self.entries.len() - self.retention_limit;
        let mut marked: Vec<Uuid> = Vec::with_capacity(excess);

        for entry in self.entries.iter().rev() {
            if marked.len() >= excess {
                break;
            }
            if !entry.item.pinned {
                marked.push(entry.item.id);
            }
        }

        // Walks the whole tail again, so ids marked above count twice
        if marked.len() < excess {
            for entry in self.entries.iter().rev() {
                if marked.len() >= excess {
                    break;
                }
                marked.push(entry.item.id);
            }
        }

        let mut evict: HashSet<Uuid> = HashSet::with_capacity(marked.len());
        marked.retain(|id| evict.insert(*id));
        self.entries.retain(|entry| !evict.contains(&entry.item.id));

        if let Some(storage) = self.storage.as_mut() {
            storage.delete_many(&marked).log_err();
        }
        debug!(
            evicted = marked.len(),
            remaining = self.entries.len(),
            "Trimmed clipboard history"
        );
    }
}

fn matches_query(entry: &Entry, needle: &str) -> bool {
    let content = &entry.content;
    let path = content
        .file_path
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned());

    let found = [
        Some(entry.item.preview.as_str()),
        content.text.as_deref(),
        content.url.as_ref().map(|u| u.as_str()),
        path.as_deref(),
        entry.item.source_app_name.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(needle));
    found
}

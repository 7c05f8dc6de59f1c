//! Store worker thread
//!
//! The history store is owned by one dedicated thread and reached only by
//! message passing. Every request carries its own reply channel; the caller
//! blocks on it. Once the worker has stopped, requests fail with
//! `StoreError::WorkerUnavailable`.

use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::store::HistoryStore;
use super::types::{Entry, Item, ItemType};
use crate::error::StoreError;

const WORKER_THREAD_NAME: &str = "clipboard-store";

/// Request types for the store worker
pub enum StoreRequest {
    /// Ingest classified entries (dedup, persist, trim)
    Add {
        entries: Vec<Entry>,
        reply: SyncSender<Vec<Item>>,
    },
    /// Remove an entry
    Delete {
        id: Uuid,
        reply: SyncSender<bool>,
    },
    /// Flip an entry's pinned flag
    TogglePinned {
        id: Uuid,
        reply: SyncSender<Option<bool>>,
    },
    /// Replace the retention limit and re-trim
    UpdateRetentionLimit {
        limit: usize,
        reply: SyncSender<()>,
    },
    /// Filtered entries in log order
    Search {
        query: Option<String>,
        item_type: Option<ItemType>,
        pinned_only: bool,
        limit: usize,
        reply: SyncSender<Vec<Entry>>,
    },
    /// Newest entries in log order
    Recent {
        limit: usize,
        reply: SyncSender<Vec<Entry>>,
    },
    /// Single entry by id
    Get {
        id: Uuid,
        reply: SyncSender<Option<Entry>>,
    },
    /// Total entry count
    Count { reply: SyncSender<usize> },
    /// Stop the worker
    Shutdown,
}

/// Cloneable sender side of the store worker
#[derive(Clone)]
pub struct StoreHandle {
    tx: Sender<StoreRequest>,
}

impl StoreHandle {
    fn request<T>(
        &self,
        build: impl FnOnce(SyncSender<T>) -> StoreRequest,
    ) -> Result<T, StoreError> {
        let (reply, rx) = mpsc::sync_channel(1);
        self.tx
            .send(build(reply))
            .map_err(|_| StoreError::WorkerUnavailable)?;
        rx.recv().map_err(|_| StoreError::WorkerUnavailable)
    }

    pub fn add(&self, entries: Vec<Entry>) -> Result<Vec<Item>, StoreError> {
        self.request(|reply| StoreRequest::Add { entries, reply })
    }

    pub fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        self.request(|reply| StoreRequest::Delete { id, reply })
    }

    pub fn toggle_pinned(&self, id: Uuid) -> Result<Option<bool>, StoreError> {
        self.request(|reply| StoreRequest::TogglePinned { id, reply })
    }

    pub fn update_retention_limit(&self, limit: usize) -> Result<(), StoreError> {
        self.request(|reply| StoreRequest::UpdateRetentionLimit { limit, reply })
    }

    pub fn search(
        &self,
        query: Option<&str>,
        item_type: Option<ItemType>,
        pinned_only: bool,
        limit: usize,
    ) -> Result<Vec<Entry>, StoreError> {
        let query = query.map(str::to_string);
        self.request(|reply| StoreRequest::Search {
            query,
            item_type,
            pinned_only,
            limit,
            reply,
        })
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<Entry>, StoreError> {
        self.request(|reply| StoreRequest::Recent { limit, reply })
    }

    pub fn get(&self, id: Uuid) -> Result<Option<Entry>, StoreError> {
        self.request(|reply| StoreRequest::Get { id, reply })
    }

    pub fn latest(&self) -> Result<Option<Entry>, StoreError> {
        Ok(self.recent(1)?.into_iter().next())
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        self.request(|reply| StoreRequest::Count { reply })
    }
}

/// Owns the worker thread; shuts it down on drop
pub struct StoreWorker {
    handle: StoreHandle,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl StoreWorker {
    /// Move `store` onto a new worker thread
    pub fn spawn(store: HistoryStore) -> Result<Self, StoreError> {
        let (tx, rx): (Sender<StoreRequest>, Receiver<StoreRequest>) = mpsc::channel();

        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker_loop(store, rx))
            .map_err(StoreError::Spawn)?;

        info!("Clipboard store worker started");
        Ok(Self {
            handle: StoreHandle { tx },
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn handle(&self) -> StoreHandle {
        self.handle.clone()
    }

    /// Stop the worker and wait for it. Safe to call more than once.
    pub fn shutdown(&self) {
        let Some(thread) = self.thread.lock().take() else {
            return;
        };
        // Already gone if the send fails
        let _ = self.handle.tx.send(StoreRequest::Shutdown);
        if thread.join().is_err() {
            warn!("Clipboard store worker panicked");
        }
    }
}

impl Drop for StoreWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(mut store: HistoryStore, rx: Receiver<StoreRequest>) {
    debug!("Store worker loop started");
    for request in rx {
        if !handle_request(&mut store, request) {
            break;
        }
    }
    info!("Clipboard store worker stopped");
}

fn handle_request(store: &mut HistoryStore, request: StoreRequest) -> bool {
    match request {
        StoreRequest::Add { entries, reply } => {
            let _ = reply.send(store.add(entries));
        }
        StoreRequest::Delete { id, reply } => {
            let _ = reply.send(store.delete(id));
        }
        StoreRequest::TogglePinned { id, reply } => {
            let _ = reply.send(store.toggle_pinned(id));
        }
        StoreRequest::UpdateRetentionLimit { limit, reply } => {
            store.update_retention_limit(limit);
            let _ = reply.send(());
        }
        StoreRequest::Search {
            query,
            item_type,
            pinned_only,
            limit,
            reply,
        } => {
            let _ = reply.send(store.search(query.as_deref(), item_type, pinned_only, limit));
        }
        StoreRequest::Recent { limit, reply } => {
            let _ = reply.send(store.recent(limit));
        }
        StoreRequest::Get { id, reply } => {
            let _ = reply.send(store.entry(id).cloned());
        }
        StoreRequest::Count { reply } => {
            let _ = reply.send(store.len());
        }
        StoreRequest::Shutdown => {
            debug!("Store worker received shutdown");
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard_history::store::test_support::text_entry;

    fn spawn(limit: usize) -> StoreWorker {
        StoreWorker::spawn(HistoryStore::new(limit, None)).unwrap()
    }

    #[test]
    fn test_requests_round_trip_through_worker() {
        let worker = spawn(10);
        let handle = worker.handle();

        let items = handle
            .add(vec![text_entry("first", 0), text_entry("second", 10)])
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(handle.count().unwrap(), 2);

        let id = items[1].id;
        assert_eq!(handle.toggle_pinned(id).unwrap(), Some(true));
        assert!(handle.get(id).unwrap().unwrap().is_pinned());
        assert_eq!(handle.search(Some("sec"), None, true, 10).unwrap().len(), 1);
        assert_eq!(handle.latest().unwrap().unwrap().item.preview, "first");

        assert!(handle.delete(id).unwrap());
        assert!(!handle.delete(id).unwrap());
        assert_eq!(handle.recent(50).unwrap().len(), 1);
    }

    #[test]
    fn test_retention_update_applies() {
        let worker = spawn(10);
        let handle = worker.handle();
        let batch = (0..5).map(|i| text_entry(&format!("e{}", i), i)).collect();
        handle.add(batch).unwrap();

        handle.update_retention_limit(2).unwrap();
        assert_eq!(handle.count().unwrap(), 2);
    }

    #[test]
    fn test_handles_from_many_threads() {
        let worker = spawn(100);
        let threads: Vec<_> = (0..4)
            .map(|t| {
                let handle = worker.handle();
                std::thread::spawn(move || {
                    for i in 0..5 {
                        handle
                            .add(vec![text_entry(&format!("t{}-{}", t, i), i)])
                            .unwrap();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(worker.handle().count().unwrap(), 20);
    }

    #[test]
    fn test_requests_after_shutdown_fail() {
        let worker = spawn(10);
        let handle = worker.handle();
        worker.shutdown();
        worker.shutdown();

        assert!(matches!(handle.count(), Err(StoreError::WorkerUnavailable)));
        assert!(matches!(
            handle.add(vec![text_entry("late", 0)]),
            Err(StoreError::WorkerUnavailable)
        ));
    }

    #[test]
    fn test_listener_fires_on_worker_thread() {
        let (tx, rx) = mpsc::channel();
        let mut store = HistoryStore::new(10, None);
        store.set_listener(Box::new(move |revision| {
            let _ = tx.send(revision);
        }));
        let worker = StoreWorker::spawn(store).unwrap();
        let handle = worker.handle();

        let items = handle.add(vec![text_entry("a", 0)]).unwrap();
        handle.toggle_pinned(items[0].id).unwrap();
        handle.delete(uuid::Uuid::new_v4()).unwrap();
        worker.shutdown();

        assert_eq!(rx.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}

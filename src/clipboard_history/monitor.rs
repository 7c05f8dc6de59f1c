//! Clipboard monitoring
//!
//! Background thread that polls a capture source, waits for the clipboard to
//! settle, then pushes the snapshot through normalization and classification
//! into the store worker.

use anyhow::{Context, Result};
use arboard::Clipboard;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::classifier::classify_entry;
use super::image::encode_rgba_to_png;
use super::normalizer::normalize_snapshot;
use super::types::{type_tags, CaptureSnapshot, Item, RawPayload};
use super::worker::StoreHandle;
use crate::error::StoreError;

/// Polling interval for clipboard changes
pub const POLL_INTERVAL_MS: u64 = 500;

/// Quiet period after a change before the snapshot is ingested
pub const QUIESCENCE_MS: u64 = 200;

const MONITOR_THREAD_NAME: &str = "clipboard-monitor";

/// Source of clipboard snapshots
pub trait CaptureSource {
    /// Returns a snapshot only when the clipboard changed since the last poll
    fn poll(&mut self) -> Option<CaptureSnapshot>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorTiming {
    pub poll_interval: Duration,
    pub quiescence: Duration,
}

impl Default for MonitorTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
            quiescence: Duration::from_millis(QUIESCENCE_MS),
        }
    }
}

/// Running capture loop; stops on drop
pub struct CaptureMonitor {
    stop_flag: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureMonitor {
    /// Start polling on a background thread.
    ///
    /// The source is built on the monitor thread itself; if building it
    /// fails the loop logs the error and exits.
    pub fn start<S, F>(
        make_source: F,
        store: StoreHandle,
        ignore_list: Vec<String>,
        timing: MonitorTiming,
    ) -> Result<Self>
    where
        S: CaptureSource,
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_flag_clone = stop_flag.clone();

        let thread = thread::Builder::new()
            .name(MONITOR_THREAD_NAME.to_string())
            .spawn(move || match make_source() {
                Ok(source) => monitor_loop(source, &store, &ignore_list, timing, &stop_flag_clone),
                Err(e) => error!(error = %e, "Clipboard monitor could not open its source"),
            })
            .context("Failed to spawn clipboard monitor thread")?;

        info!(
            poll_interval_ms = timing.poll_interval.as_millis() as u64,
            quiescence_ms = timing.quiescence.as_millis() as u64,
            "Clipboard monitor started"
        );
        Ok(Self {
            stop_flag,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Stop the loop and wait for the thread. Safe to call more than once.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                warn!("Clipboard monitor thread panicked");
            }
            info!("Clipboard monitoring stopped");
        }
    }
}

impl Drop for CaptureMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn monitor_loop<S: CaptureSource>(
    mut source: S,
    store: &StoreHandle,
    ignore_list: &[String],
    timing: MonitorTiming,
    stop_flag: &AtomicBool,
) {
    // Latest unsettled snapshot and when it was seen
    let mut pending: Option<(CaptureSnapshot, Instant)> = None;

    loop {
        if stop_flag.load(Ordering::Relaxed) {
            debug!("Clipboard monitor stopping");
            break;
        }

        let start = Instant::now();
        if let Some(snapshot) = source.poll() {
            if pending.is_some() {
                debug!("Clipboard changed again before settling");
            }
            pending = Some((snapshot, start));
        }

        let settled = pending
            .as_ref()
            .is_some_and(|(_, seen)| seen.elapsed() >= timing.quiescence);
        if settled {
            if let Some((snapshot, _)) = pending.take() {
                match ingest_snapshot(&snapshot, ignore_list, store) {
                    Ok(items) => debug!(accepted = items.len(), "Ingested clipboard snapshot"),
                    Err(StoreError::WorkerUnavailable) => {
                        warn!("Store worker gone; clipboard monitor exiting");
                        break;
                    }
                    Err(e) => warn!(error = %e, "Failed to ingest clipboard snapshot"),
                }
            }
        }

        let mut wake_at = start + timing.poll_interval;
        if let Some((_, seen)) = &pending {
            wake_at = wake_at.min(*seen + timing.quiescence);
        }
        let now = Instant::now();
        if wake_at > now {
            thread::sleep(wake_at - now);
        }
    }
}

/// Normalize, classify and store one snapshot.
///
/// Snapshots from an ignored application are dropped before normalization.
pub fn ingest_snapshot(
    snapshot: &CaptureSnapshot,
    ignore_list: &[String],
    store: &StoreHandle,
) -> Result<Vec<Item>, StoreError> {
    if let Some(bundle_id) = snapshot.source_app_bundle_id.as_deref() {
        if ignore_list.iter().any(|ignored| ignored == bundle_id) {
            debug!(bundle_id, "Ignoring clipboard capture from ignored app");
            return Ok(Vec::new());
        }
    }

    let entries: Vec<_> = normalize_snapshot(snapshot)
        .into_iter()
        .map(classify_entry)
        .collect();
    if entries.is_empty() {
        return Ok(Vec::new());
    }
    store.add(entries)
}

/// System clipboard via `arboard` (text and image)
pub struct SystemClipboardSource {
    clipboard: Clipboard,
    last_fingerprint: Option<u64>,
}

impl SystemClipboardSource {
    pub fn new() -> Result<Self> {
        let clipboard = Clipboard::new().context("Failed to create clipboard instance")?;
        Ok(Self {
            clipboard,
            last_fingerprint: None,
        })
    }
}

impl CaptureSource for SystemClipboardSource {
    fn poll(&mut self) -> Option<CaptureSnapshot> {
        let text = self.clipboard.get_text().ok().filter(|t| !t.is_empty());
        let image = self.clipboard.get_image().ok();

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        if let Some(image) = &image {
            (image.width, image.height).hash(&mut hasher);
            image.bytes.hash(&mut hasher);
        }
        let fingerprint = hasher.finish();

        // First poll only records what was already there
        match self.last_fingerprint.replace(fingerprint) {
            Some(previous) if previous != fingerprint => {}
            _ => return None,
        }

        let mut payload = RawPayload::new();
        if let Some(text) = &text {
            payload = payload.with(type_tags::PLAIN_TEXT, text.as_bytes());
        }
        if let Some(image) = image {
            match encode_rgba_to_png(image.width as u32, image.height as u32, image.bytes.into_owned()) {
                Ok(png) => payload = payload.with(type_tags::PNG, png),
                Err(e) => warn!(error = %e, "Failed to encode clipboard image"),
            }
        }
        if payload.representations.is_empty() {
            return None;
        }

        Some(CaptureSnapshot::new(vec![payload], Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard_history::store::HistoryStore;
    use crate::clipboard_history::worker::StoreWorker;
    use std::collections::VecDeque;

    /// Hands out scripted snapshots, one per poll
    struct ScriptedSource {
        script: Arc<Mutex<VecDeque<CaptureSnapshot>>>,
    }

    impl CaptureSource for ScriptedSource {
        fn poll(&mut self) -> Option<CaptureSnapshot> {
            self.script.lock().pop_front()
        }
    }

    fn snapshot(text: &str, bundle_id: Option<&str>) -> CaptureSnapshot {
        CaptureSnapshot::new(vec![RawPayload::text(text)], Utc::now())
            .with_source_app(Some("App"), bundle_id)
    }

    fn fast_timing() -> MonitorTiming {
        MonitorTiming {
            poll_interval: Duration::from_millis(10),
            quiescence: Duration::from_millis(50),
        }
    }

    fn wait_for_count(store: &StoreHandle, expected: usize) -> usize {
        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            let count = store.count().unwrap();
            if count >= expected || Instant::now() > deadline {
                return count;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_default_timing() {
        let timing = MonitorTiming::default();
        assert_eq!(timing.poll_interval, Duration::from_millis(500));
        assert_eq!(timing.quiescence, Duration::from_millis(200));
    }

    #[test]
    fn test_ingest_snapshot_classifies_every_payload() {
        let worker = StoreWorker::spawn(HistoryStore::new(10, None)).unwrap();
        let store = worker.handle();
        let snapshot = CaptureSnapshot::new(
            vec![RawPayload::text("one"), RawPayload::text("https://example.com")],
            Utc::now(),
        );

        let items = ingest_snapshot(&snapshot, &[], &store).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].item_type, crate::clipboard_history::types::ItemType::Url);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_ignored_app_is_dropped() {
        let worker = StoreWorker::spawn(HistoryStore::new(10, None)).unwrap();
        let store = worker.handle();
        let ignore = vec!["com.secret.vault".to_string()];

        let items = ingest_snapshot(&snapshot("hunter2", Some("com.secret.vault")), &ignore, &store)
            .unwrap();
        assert!(items.is_empty());
        assert_eq!(store.count().unwrap(), 0);

        let items = ingest_snapshot(&snapshot("fine", Some("com.other")), &ignore, &store).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_rapid_changes_coalesce_to_latest() {
        let worker = StoreWorker::spawn(HistoryStore::new(10, None)).unwrap();
        let store = worker.handle();
        let script = Arc::new(Mutex::new(VecDeque::from(vec![
            snapshot("draft", None),
            snapshot("final", None),
        ])));
        let source_script = script.clone();

        let monitor = CaptureMonitor::start(
            move || {
                Ok(ScriptedSource {
                    script: source_script,
                })
            },
            store.clone(),
            Vec::new(),
            fast_timing(),
        )
        .unwrap();

        assert_eq!(wait_for_count(&store, 1), 1);
        // Give a stray second ingest the chance to show up
        thread::sleep(Duration::from_millis(150));
        monitor.stop();

        let entries = store.recent(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].item.preview, "final");
    }

    #[test]
    fn test_stop_is_idempotent() {
        let worker = StoreWorker::spawn(HistoryStore::new(10, None)).unwrap();
        let monitor = CaptureMonitor::start(
            || {
                Ok(ScriptedSource {
                    script: Arc::new(Mutex::new(VecDeque::new())),
                })
            },
            worker.handle(),
            Vec::new(),
            fast_timing(),
        )
        .unwrap();

        monitor.stop();
        monitor.stop();
        drop(monitor);
    }

    #[test]
    fn test_failed_source_ends_loop() {
        let worker = StoreWorker::spawn(HistoryStore::new(10, None)).unwrap();
        let monitor = CaptureMonitor::start(
            || -> Result<ScriptedSource> { anyhow::bail!("no clipboard") },
            worker.handle(),
            Vec::new(),
            fast_timing(),
        )
        .unwrap();
        monitor.stop();
        assert_eq!(worker.handle().count().unwrap(), 0);
    }
}

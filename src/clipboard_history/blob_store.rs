//! Image sidecar files
//!
//! Captured image bytes are kept out of SQLite in one file per entry:
//! `<data_dir>/images/<entry-id>.bin`. The database row stores only the path.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

const SIDECAR_EXTENSION: &str = "bin";

/// Directory of per-entry image sidecar files
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    /// Open (creating if needed) the sidecar directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create image directory {:?}", dir))?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.{}", id, SIDECAR_EXTENSION))
    }

    /// Write the sidecar for `id`, replacing any previous file atomically.
    pub fn write(&self, id: Uuid, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(id);
        let tmp_path = self.dir.join(format!(".{}.{}.tmp", id, SIDECAR_EXTENSION));

        fs::write(&tmp_path, bytes)
            .with_context(|| format!("Failed to write sidecar {:?}", tmp_path))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to move sidecar into place at {:?}", path))?;

        debug!(id = %id, size = bytes.len(), "Stored image sidecar");
        Ok(path)
    }

    /// Delete the sidecar for `id`.
    ///
    /// Returns true if a file was removed. Failures are logged, never raised.
    pub fn remove(&self, id: Uuid) -> bool {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(_) => {
                debug!(id = %id, "Deleted image sidecar");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(id = %id, error = %e, "Failed to delete image sidecar");
                false
            }
        }
    }

    /// Remove sidecar files whose entry no longer exists.
    ///
    /// Returns the number of files deleted.
    pub fn gc_orphaned(&self, live_ids: &HashSet<Uuid>) -> Result<usize> {
        let mut deleted = 0;
        let entries = fs::read_dir(&self.dir).context("Failed to read image directory")?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SIDECAR_EXTENSION) {
                continue;
            }
            let orphaned = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|stem| Uuid::parse_str(stem).ok())
                .is_some_and(|id| !live_ids.contains(&id));

            if orphaned && fs::remove_file(&path).is_ok() {
                debug!(path = %path.display(), "GC'd orphaned image sidecar");
                deleted += 1;
            }
        }

        if deleted > 0 {
            debug!(deleted, "Garbage collected orphaned image sidecars");
        }
        Ok(deleted)
    }
}

/// Read a sidecar back (used when writing an image to the system clipboard)
pub fn read_sidecar(path: &Path) -> Option<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read image sidecar");
            None
        }
    }
}

//! Clipboard history persistence
//!
//! SQLite storage for entry rows plus image sidecar files. One row per
//! entry, keyed by entry id. The database is keyed with the keyring secret
//! when the SQLite build supports encryption and falls back to plaintext
//! otherwise.
//!
//! Schema changes are additive only: missing columns are added on open,
//! nothing is ever dropped or rewritten.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::blob_store::BlobStore;
use super::keychain::DatabaseKey;
use super::types::{Entry, Item, ItemType, NormalizedContent};

/// Database file name inside the data directory
pub const DATABASE_FILE: &str = "clipboard.sqlite";

/// Sidecar directory name inside the data directory
pub const IMAGES_DIR: &str = "images";

/// Columns added after the first release, with their type and default
const ADDITIVE_COLUMNS: &[(&str, &str)] = &[
    ("source_app_name", "TEXT"),
    ("source_app_bundle_id", "TEXT"),
    ("pinned", "INTEGER DEFAULT 0"),
    ("metadata", "TEXT"),
    ("source_types", "TEXT"),
];

const SELECT_COLUMNS: &str = "id, created_at, type, preview_title, content_hash, text, url, \
     file_path, image_path, image_width, image_height, source_app_name, \
     source_app_bundle_id, pinned, metadata, source_types";

/// Storage operations the history store depends on
pub trait EntryStorage {
    /// All entries, pinned first, then newest first
    fn load(&self) -> Result<Vec<Entry>>;

    /// Upsert entries; returns sidecar paths for entries that carried image bytes
    fn save(&mut self, entries: &[Entry]) -> Result<HashMap<Uuid, PathBuf>>;

    fn delete(&mut self, id: Uuid) -> Result<()>;

    fn delete_many(&mut self, ids: &[Uuid]) -> Result<()>;

    fn update_pinned(&mut self, id: Uuid, pinned: bool) -> Result<()>;
}

/// Location of the database file and sidecar directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistencePaths {
    pub database: PathBuf,
    pub images_dir: PathBuf,
}

impl PersistencePaths {
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            database: data_dir.join(DATABASE_FILE),
            images_dir: data_dir.join(IMAGES_DIR),
        }
    }
}

/// SQLite-backed entry storage
pub struct Persistence {
    conn: Connection,
    blobs: BlobStore,
    encrypted: bool,
}

impl Persistence {
    /// Open (creating if needed) the database and sidecar directory.
    pub fn open(paths: &PersistencePaths, key: Option<&DatabaseKey>) -> Result<Self> {
        if let Some(parent) = paths.database.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory {:?}", parent))?;
        }
        let blobs = BlobStore::open(&paths.images_dir)?;

        let conn = Connection::open(&paths.database)
            .with_context(|| format!("Failed to open database at {:?}", paths.database))?;

        // Keying must happen before anything else touches the file
        let encrypted = match key {
            Some(key) if !key.is_empty() => enable_encryption(&conn, key),
            _ => {
                info!("No database key available; using plaintext SQLite");
                false
            }
        };

        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout = 5000;",
        )
        .context("Failed to set database pragmas")?;

        create_schema(&conn)?;
        run_migrations(&conn)?;
        create_indexes(&conn)?;

        info!(
            path = %paths.database.display(),
            encrypted,
            "Clipboard history database opened"
        );

        Ok(Self {
            conn,
            blobs,
            encrypted,
        })
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn images_dir(&self) -> &Path {
        self.blobs.dir()
    }

    /// Remove sidecar files left behind by best-effort deletes.
    pub fn gc_orphaned_sidecars(&self) -> Result<usize> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM entries")
            .context("Failed to prepare id query")?;
        let live_ids: HashSet<Uuid> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .filter_map(|id| Uuid::parse_str(&id).ok())
            .collect();

        self.blobs.gc_orphaned(&live_ids)
    }
}

impl EntryStorage for Persistence {
    fn load(&self) -> Result<Vec<Entry>> {
        let sql = format!(
            "SELECT {} FROM entries ORDER BY pinned DESC, created_at DESC",
            SELECT_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare load query")?;

        let entries: Vec<Entry> = stmt
            .query_map([], entry_from_row)
            .context("Failed to query entries")?
            .filter_map(|r| match r {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable history row");
                    None
                }
            })
            .collect();

        debug!(count = entries.len(), "Loaded clipboard history entries");
        Ok(entries)
    }

    fn save(&mut self, entries: &[Entry]) -> Result<HashMap<Uuid, PathBuf>> {
        let mut paths = HashMap::new();
        let tx = self
            .conn
            .transaction()
            .context("Failed to begin save transaction")?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO entries
                     (id, created_at, type, preview_title, content_hash, text, url, file_path,
                      image_path, image_width, image_height, source_app_name, source_app_bundle_id,
                      pinned, metadata, source_types)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                )
                .context("Failed to prepare upsert")?;

            for entry in entries {
                let id = entry.item.id;
                let written = entry.content.image_data.as_deref().and_then(|bytes| {
                    match self.blobs.write(id, bytes) {
                        Ok(path) => Some(path),
                        Err(e) => {
                            warn!(id = %id, error = %e, "Failed to write image sidecar");
                            None
                        }
                    }
                });
                if let Some(path) = &written {
                    paths.insert(id, path.clone());
                }
                let image_path = written.or_else(|| entry.content.image_path.clone());

                let (width, height) = match entry.content.image_size {
                    Some((w, h)) => (Some(w), Some(h)),
                    None => (None, None),
                };
                let metadata = serde_json::to_string(&entry.item.metadata)
                    .context("Failed to encode metadata")?;
                let source_types = serde_json::to_string(&entry.content.source_types)
                    .context("Failed to encode source types")?;

                stmt.execute(params![
                    id.to_string(),
                    entry.item.created_at.timestamp_millis(),
                    entry.item.item_type.as_str(),
                    entry.item.preview,
                    entry.item.content_hash,
                    entry.content.text,
                    entry.content.url.as_ref().map(Url::as_str),
                    entry
                        .content
                        .file_path
                        .as_ref()
                        .map(|p| p.to_string_lossy().into_owned()),
                    image_path.map(|p| p.to_string_lossy().into_owned()),
                    width,
                    height,
                    entry.item.source_app_name,
                    entry.item.source_app_bundle_id,
                    entry.item.pinned,
                    metadata,
                    source_types,
                ])
                .with_context(|| format!("Failed to upsert entry {}", id))?;
            }
        }

        tx.commit().context("Failed to commit saved entries")?;
        debug!(
            count = entries.len(),
            sidecars = paths.len(),
            "Saved clipboard history entries"
        );
        Ok(paths)
    }

    fn delete(&mut self, id: Uuid) -> Result<()> {
        let affected = self
            .conn
            .execute("DELETE FROM entries WHERE id = ?", params![id.to_string()])
            .context("Failed to delete entry")?;
        self.blobs.remove(id);
        debug!(id = %id, affected, "Deleted clipboard history entry");
        Ok(())
    }

    fn delete_many(&mut self, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!("DELETE FROM entries WHERE id IN ({})", placeholders);
        let affected = self
            .conn
            .execute(&sql, params_from_iter(ids.iter().map(Uuid::to_string)))
            .context("Failed to delete entries")?;

        for id in ids {
            self.blobs.remove(*id);
        }
        debug!(requested = ids.len(), affected, "Deleted clipboard history entries");
        Ok(())
    }

    fn update_pinned(&mut self, id: Uuid, pinned: bool) -> Result<()> {
        let affected = self
            .conn
            .execute(
                "UPDATE entries SET pinned = ? WHERE id = ?",
                params![pinned, id.to_string()],
            )
            .context("Failed to update pinned flag")?;
        if affected == 0 {
            debug!(id = %id, "Pin update matched no row");
        }
        Ok(())
    }
}

/// Apply the key and check whether the SQLite build honoured it.
fn enable_encryption(conn: &Connection, key: &DatabaseKey) -> bool {
    if let Err(e) = conn.execute_batch(&format!("PRAGMA key = {};", key.pragma_literal())) {
        warn!(error = %e, "Failed to apply database key");
        return false;
    }

    let cipher_version: Option<String> = conn
        .query_row("PRAGMA cipher_version;", [], |row| row.get(0))
        .optional()
        .unwrap_or(None);

    match cipher_version {
        Some(version) => {
            info!(cipher_version = %version, "Database encryption enabled");
            true
        }
        None => {
            info!("Encryption not available; using plaintext SQLite");
            false
        }
    }
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS entries (
            id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            type TEXT NOT NULL,
            preview_title TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            text TEXT,
            url TEXT,
            file_path TEXT,
            image_path TEXT,
            image_width INTEGER,
            image_height INTEGER
        )",
        [],
    )
    .context("Failed to create entries table")?;
    Ok(())
}

fn run_migrations(conn: &Connection) -> Result<()> {
    for (name, col_type) in ADDITIVE_COLUMNS {
        add_column_if_missing(conn, name, col_type)?;
    }
    Ok(())
}

fn add_column_if_missing(conn: &Connection, name: &str, col_type: &str) -> Result<()> {
    let has: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info('entries') WHERE name = ?",
            params![name],
            |row| row.get::<_, i32>(0),
        )
        .map(|c| c > 0)
        .unwrap_or(false);

    if !has {
        conn.execute(
            &format!("ALTER TABLE entries ADD COLUMN {} {}", name, col_type),
            [],
        )
        .with_context(|| format!("Failed to add {} column", name))?;
        info!(column = name, "Added column to entries table");
    }
    Ok(())
}

fn create_indexes(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_entries_created_at ON entries(created_at DESC)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_entries_pinned_created ON entries(pinned DESC, created_at DESC)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_entries_hash ON entries(content_hash)",
        [],
    )?;
    Ok(())
}

/// Map one row to an entry; rows with an unreadable id are skipped.
fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<Option<Entry>> {
    let id_string: String = row.get(0)?;
    let Ok(id) = Uuid::parse_str(&id_string) else {
        warn!(id = %id_string, "Skipping history row with invalid id");
        return Ok(None);
    };

    let created_at = DateTime::<Utc>::from_timestamp_millis(row.get::<_, i64>(1)?)
        .unwrap_or_default();
    let item_type = ItemType::parse(&row.get::<_, String>(2)?).unwrap_or(ItemType::Unknown);
    let preview: String = row.get(3)?;
    let content_hash: String = row.get(4)?;
    let text: Option<String> = row.get(5)?;
    let url_string: Option<String> = row.get(6)?;
    let file_path: Option<String> = row.get(7)?;
    let image_path: Option<String> = row.get(8)?;
    let width: Option<i64> = row.get(9)?;
    let height: Option<i64> = row.get(10)?;
    let source_app_name: Option<String> = row.get(11)?;
    let source_app_bundle_id: Option<String> = row.get(12)?;
    let pinned = row.get::<_, Option<i64>>(13)?.unwrap_or(0) != 0;
    let metadata_json: Option<String> = row.get(14)?;
    let source_types_json: Option<String> = row.get(15)?;

    let image_size = match (width, height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Some((w as u32, h as u32)),
        _ => None,
    };

    let metadata = metadata_json
        .and_then(|json| serde_json::from_str::<BTreeMap<String, String>>(&json).ok())
        .unwrap_or_else(|| {
            // Rows written before the metadata column existed
            let mut metadata = BTreeMap::new();
            if let Some(path) = &file_path {
                metadata.insert("path".to_string(), path.clone());
            }
            if let Some(url) = &url_string {
                metadata.insert("url".to_string(), url.clone());
            }
            if let Some((w, h)) = image_size {
                metadata.insert("width".to_string(), w.to_string());
                metadata.insert("height".to_string(), h.to_string());
            }
            metadata
        });
    let source_types = source_types_json
        .and_then(|json| serde_json::from_str::<Vec<String>>(&json).ok())
        .unwrap_or_default();

    let content = NormalizedContent {
        text,
        url: url_string.as_deref().and_then(|s| Url::parse(s).ok()),
        file_path: file_path.map(PathBuf::from),
        image_data: None,
        image_path: image_path.map(PathBuf::from),
        image_size,
        source_types,
        captured_at: created_at,
        source_app_name: source_app_name.clone(),
        source_app_bundle_id: source_app_bundle_id.clone(),
    };

    let item = Item {
        id,
        created_at,
        item_type,
        preview,
        metadata,
        content_hash,
        source_app_name,
        source_app_bundle_id,
        pinned,
    };

    Ok(Some(Entry { item, content }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard_history::classifier::classify_entry;
    use crate::clipboard_history::image::test_png;
    use crate::clipboard_history::normalizer::normalize_payload;
    use crate::clipboard_history::types::{type_tags, RawPayload};
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn open_temp() -> (Persistence, TempDir) {
        let dir = TempDir::new().unwrap();
        let persistence = Persistence::open(&PersistencePaths::in_dir(dir.path()), None).unwrap();
        (persistence, dir)
    }

    fn entry_at(payload: RawPayload, offset_secs: i64) -> Entry {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap() + Duration::seconds(offset_secs);
        let content = normalize_payload(&payload, at, Some("Notes"), Some("com.apple.Notes"));
        classify_entry(content)
    }

    #[test]
    fn test_round_trip_scalar_fields() {
        let (mut persistence, _dir) = open_temp();
        let text = entry_at(RawPayload::text("hello world"), 0);
        let url = entry_at(
            RawPayload::new()
                .with(type_tags::PLAIN_TEXT, "Example")
                .with(type_tags::URL, "https://example.com/path"),
            1,
        );
        let file = entry_at(RawPayload::new().with(type_tags::FILE_URL, "/tmp/report.pdf"), 2);
        let unknown = entry_at(RawPayload::new().with("com.example.custom", vec![1u8]), 3);

        let paths = persistence
            .save(&[text.clone(), url.clone(), file.clone(), unknown.clone()])
            .unwrap();
        assert!(paths.is_empty());

        let loaded = persistence.load().unwrap();
        assert_eq!(loaded.len(), 4);
        // Newest first
        assert_eq!(loaded[0], unknown);
        assert_eq!(loaded[1], file);
        assert_eq!(loaded[2], url);
        assert_eq!(loaded[3], text);
    }

    #[test]
    fn test_image_round_trips_to_path() {
        let (mut persistence, dir) = open_temp();
        let png = test_png(100, 200);
        let image = entry_at(RawPayload::png(png.clone()), 0);

        let paths = persistence.save(std::slice::from_ref(&image)).unwrap();
        let path = paths.get(&image.item.id).expect("sidecar path");
        assert!(path.starts_with(dir.path().join(IMAGES_DIR)));
        assert_eq!(std::fs::read(path).unwrap(), png);

        let loaded = persistence.load().unwrap();
        assert_eq!(loaded.len(), 1);
        let loaded = &loaded[0];
        assert!(loaded.content.image_data.is_none());
        assert_eq!(loaded.content.image_path.as_ref(), Some(path));
        assert_eq!(loaded.content.image_size, Some((100, 200)));
        assert_eq!(loaded.item, image.item);
    }

    #[test]
    fn test_resave_keeps_existing_image_path() {
        let (mut persistence, _dir) = open_temp();
        let image = entry_at(RawPayload::png(test_png(4, 4)), 0);
        let paths = persistence.save(std::slice::from_ref(&image)).unwrap();
        let path = paths[&image.item.id].clone();

        let spliced = Entry {
            item: image.item.clone(),
            content: image.content.clone().with_image(None, Some(path.clone())),
        };
        let paths = persistence.save(&[spliced]).unwrap();
        assert!(paths.is_empty());
        assert_eq!(persistence.load().unwrap()[0].content.image_path, Some(path));
    }

    #[test]
    fn test_load_orders_pinned_first() {
        let (mut persistence, _dir) = open_temp();
        let old = entry_at(RawPayload::text("old"), 0);
        let newer = entry_at(RawPayload::text("newer"), 10);
        let newest = entry_at(RawPayload::text("newest"), 20);
        persistence
            .save(&[old.clone(), newer.clone(), newest.clone()])
            .unwrap();
        persistence.update_pinned(old.item.id, true).unwrap();

        let ids: Vec<Uuid> = persistence.load().unwrap().iter().map(Entry::id).collect();
        assert_eq!(ids, vec![old.item.id, newest.item.id, newer.item.id]);
    }

    #[test]
    fn test_delete_and_delete_many() {
        let (mut persistence, _dir) = open_temp();
        let a = entry_at(RawPayload::text("a"), 0);
        let b = entry_at(RawPayload::text("b"), 1);
        let c = entry_at(RawPayload::png(test_png(2, 2)), 2);
        let paths = persistence.save(&[a.clone(), b.clone(), c.clone()]).unwrap();

        persistence.delete(a.item.id).unwrap();
        assert_eq!(persistence.load().unwrap().len(), 2);

        persistence.delete_many(&[b.item.id, c.item.id]).unwrap();
        assert!(persistence.load().unwrap().is_empty());
        assert!(!paths[&c.item.id].exists());

        // Unknown ids are fine
        persistence.delete(Uuid::new_v4()).unwrap();
        persistence.delete_many(&[]).unwrap();
    }

    #[test]
    fn test_reopen_sees_saved_rows() {
        let dir = TempDir::new().unwrap();
        let paths = PersistencePaths::in_dir(dir.path());
        let entry = entry_at(RawPayload::text("persisted"), 0);
        {
            let mut persistence = Persistence::open(&paths, None).unwrap();
            persistence.save(std::slice::from_ref(&entry)).unwrap();
        }
        let persistence = Persistence::open(&paths, None).unwrap();
        assert_eq!(persistence.load().unwrap(), vec![entry]);
    }

    #[test]
    fn test_migrates_legacy_table_additively() {
        let dir = TempDir::new().unwrap();
        let paths = PersistencePaths::in_dir(dir.path());
        {
            let conn = Connection::open(&paths.database).unwrap();
            conn.execute_batch(
                "CREATE TABLE entries (
                    id TEXT PRIMARY KEY, created_at INTEGER NOT NULL, type TEXT NOT NULL,
                    preview_title TEXT NOT NULL, content_hash TEXT NOT NULL, text TEXT, url TEXT,
                    file_path TEXT, image_path TEXT, image_width INTEGER, image_height INTEGER
                );
                INSERT INTO entries (id, created_at, type, preview_title, content_hash, file_path)
                VALUES ('6f0c6f9e-3a55-4a39-9a43-0d5f3c1f1d11', 1700000000000, 'file',
                        '/tmp/legacy.txt', 'abc', '/tmp/legacy.txt');",
            )
            .unwrap();
        }

        let persistence = Persistence::open(&paths, None).unwrap();
        let loaded = persistence.load().unwrap();
        assert_eq!(loaded.len(), 1);
        let entry = &loaded[0];
        assert_eq!(entry.item.item_type, ItemType::File);
        assert!(!entry.item.pinned);
        assert_eq!(entry.item.source_app_name, None);
        assert_eq!(
            entry.item.metadata.get("path").map(String::as_str),
            Some("/tmp/legacy.txt")
        );
        assert_eq!(entry.item.created_at.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_key_without_cipher_support_falls_back_to_plaintext() {
        let dir = TempDir::new().unwrap();
        let key = DatabaseKey::new("k'ey");
        let mut persistence =
            Persistence::open(&PersistencePaths::in_dir(dir.path()), Some(&key)).unwrap();
        assert!(!persistence.is_encrypted());

        let entry = entry_at(RawPayload::text("still works"), 0);
        persistence.save(std::slice::from_ref(&entry)).unwrap();
        assert_eq!(persistence.load().unwrap(), vec![entry]);
    }

    #[test]
    fn test_gc_orphaned_sidecars() {
        let (mut persistence, _dir) = open_temp();
        let live = entry_at(RawPayload::png(test_png(2, 2)), 0);
        let paths = persistence.save(std::slice::from_ref(&live)).unwrap();

        let orphan = persistence.images_dir().join(format!("{}.bin", Uuid::new_v4()));
        std::fs::write(&orphan, b"stale").unwrap();

        assert_eq!(persistence.gc_orphaned_sidecars().unwrap(), 1);
        assert!(!orphan.exists());
        assert!(paths[&live.item.id].exists());
    }
}

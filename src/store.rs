//! Local key/value store.
//!
//! Stands in for browser local storage: string keys, JSON string values, a
//! byte quota, synchronous reads and writes. Keys are scoped by user and,
//! for journal data, by ISO week. Backed by SQLite so it survives restarts.

use crate::error::StoreError;
use crate::logging;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const KEY_PREFIX: &str = "mindful-youth";

pub fn journal_key(user_id: &str, week_id: &str) -> String {
    format!("{}-journal-{}-{}", KEY_PREFIX, user_id, week_id)
}

pub fn summary_key(user_id: &str, week_id: &str) -> String {
    format!("{}-summary-{}-{}", KEY_PREFIX, user_id, week_id)
}

pub fn profile_key(user_id: &str) -> String {
    format!("{}-profile-{}", KEY_PREFIX, user_id)
}

/// Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    quota: usize,
}

impl Store {
    /// Open (or create) the store file at `path`
    pub fn open(path: &Path, quota: usize) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        logging::log_storage(&format!("Opened store at {}", path.display()));
        Self::from_connection(conn, quota)
    }

    pub fn open_in_memory(quota: usize) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, quota)
    }

    fn from_connection(conn: Connection, quota: usize) -> Result<Self, StoreError> {
        conn.execute_batch(
            "
            -- Browser-storage style string store
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Single-row app settings
            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                api_key TEXT,
                updated_at TEXT NOT NULL
            );
            ",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            quota,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves nothing half-written in SQLite
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_connection<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.lock();
        f(&conn)
    }

    // ============ Raw string API ============

    pub fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_connection(|conn| read_item(conn, key))
    }

    /// Write a value. Fails without writing if the store would exceed its quota.
    pub fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let result = self.with_connection(|conn| write_item(conn, self.quota, key, value));
        log_write(key, value.len(), &result);
        result
    }

    // ============ JSON helpers ============

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get_item(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.set_item(key, &raw)
    }

    /// Read, change and write back one JSON value as a single transaction.
    ///
    /// A missing key starts from `T::default()`. If `f` fails, or the write
    /// would exceed the quota, nothing is written.
    pub fn update_json<T, R, E, F>(&self, key: &str, f: F) -> Result<R, E>
    where
        T: Serialize + DeserializeOwned + Default,
        E: From<StoreError>,
        F: FnOnce(&mut T) -> Result<R, E>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(StoreError::from)?;

        let mut value: T = match read_item(&tx, key)? {
            Some(raw) => serde_json::from_str(&raw).map_err(StoreError::from)?,
            None => T::default(),
        };
        let out = f(&mut value)?;

        let raw = serde_json::to_string(&value).map_err(StoreError::from)?;
        let written = write_item(&tx, self.quota, key, &raw);
        log_write(key, raw.len(), &written);
        written?;
        tx.commit().map_err(StoreError::from)?;
        Ok(out)
    }

    // ============ Settings ============

    pub fn get_api_key(&self) -> Result<Option<String>, StoreError> {
        self.with_connection(|conn| {
            let key: Option<Option<String>> = conn
                .query_row("SELECT api_key FROM settings WHERE id = 1", [], |row| row.get(0))
                .optional()?;
            Ok(key.flatten())
        })
    }

    pub fn save_api_key(&self, api_key: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO settings (id, api_key, updated_at) VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET api_key = excluded.api_key, updated_at = excluded.updated_at",
                params![api_key, now],
            )?;
            Ok(())
        })
    }

    pub fn clear_api_key(&self) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE settings SET api_key = NULL, updated_at = ?1 WHERE id = 1",
                params![now],
            )?;
            Ok(())
        })
    }
}

fn read_item(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    let value = conn
        .query_row("SELECT value FROM kv_store WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?;
    Ok(value)
}

fn write_item(conn: &Connection, quota: usize, key: &str, value: &str) -> Result<(), StoreError> {
    let others: i64 = conn.query_row(
        "SELECT COALESCE(SUM(length(CAST(key AS BLOB)) + length(CAST(value AS BLOB))), 0)
         FROM kv_store WHERE key != ?1",
        params![key],
        |row| row.get(0),
    )?;
    let needed = others.max(0) as usize + key.len() + value.len();
    if needed > quota {
        return Err(StoreError::QuotaExceeded { needed, quota });
    }

    conn.execute(
        "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn log_write(key: &str, bytes: usize, result: &Result<(), StoreError>) {
    match result {
        Ok(()) => logging::log_storage(&format!("Wrote {} ({} bytes)", key, bytes)),
        Err(e) => logging::log_error(None, &format!("Write to {} failed: {}", key, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        count: u32,
    }

    fn store() -> Store {
        Store::open_in_memory(1024 * 1024).unwrap()
    }

    #[test]
    fn test_key_scoping() {
        assert_eq!(journal_key("sam", "2024-W05"), "mindful-youth-journal-sam-2024-W05");
        assert_eq!(summary_key("sam", "2024-W05"), "mindful-youth-summary-sam-2024-W05");
        assert_eq!(profile_key("sam"), "mindful-youth-profile-sam");
        assert_ne!(journal_key("sam", "2024-W05"), journal_key("alex", "2024-W05"));
    }

    #[test]
    fn test_set_get_overwrite() {
        let store = store();
        assert_eq!(store.get_item("a").unwrap(), None);

        store.set_item("a", "one").unwrap();
        store.set_item("a", "two").unwrap();
        assert_eq!(store.get_item("a").unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn test_json_helpers() {
        let store = store();
        let sample = Sample { name: "x".into(), count: 3 };
        store.set_json("s", &sample).unwrap();
        assert_eq!(store.get_json::<Sample>("s").unwrap(), Some(sample));

        store.set_item("broken", "{not json").unwrap();
        assert!(matches!(store.get_json::<Sample>("broken"), Err(StoreError::Json(_))));
    }

    #[test]
    fn test_quota_blocks_write_and_keeps_old_value() {
        let store = Store::open_in_memory(32).unwrap();
        store.set_item("k", "small").unwrap();

        let err = store.set_item("k", &"x".repeat(64)).unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { quota: 32, .. }));
        assert_eq!(store.get_item("k").unwrap().as_deref(), Some("small"));
    }

    #[test]
    fn test_overwrite_does_not_double_count() {
        let store = Store::open_in_memory(20).unwrap();
        store.set_item("key", "0123456789").unwrap();
        // Same size again fits because the old value is replaced, not added
        store.set_item("key", "9876543210").unwrap();
    }

    #[test]
    fn test_update_json_starts_from_default() {
        let store = store();
        let len = store
            .update_json("list", |items: &mut Vec<u32>| {
                items.push(7);
                Ok::<_, StoreError>(items.len())
            })
            .unwrap();
        assert_eq!(len, 1);
        assert_eq!(store.get_json::<Vec<u32>>("list").unwrap(), Some(vec![7]));
    }

    #[test]
    fn test_update_json_failure_writes_nothing() {
        let store = store();
        store.set_json("list", &vec![1u32]).unwrap();

        let result: Result<(), StoreError> = store.update_json("list", |items: &mut Vec<u32>| {
            items.clear();
            Err(StoreError::QuotaExceeded { needed: 1, quota: 0 })
        });
        assert!(result.is_err());
        assert_eq!(store.get_json::<Vec<u32>>("list").unwrap(), Some(vec![1]));

        let small = Store::open_in_memory(16).unwrap();
        let result = small.update_json("k", |s: &mut String| {
            s.push_str(&"x".repeat(64));
            Ok::<_, StoreError>(())
        });
        assert!(matches!(result, Err(StoreError::QuotaExceeded { .. })));
        assert_eq!(small.get_item("k").unwrap(), None);
    }

    #[test]
    fn test_update_json_is_atomic_across_threads() {
        let store = store();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..25u32 {
                        store
                            .update_json("list", |items: &mut Vec<u32>| {
                                items.push(t * 100 + i);
                                Ok::<_, StoreError>(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.get_json::<Vec<u32>>("list").unwrap().unwrap().len(), 200);
    }

    #[test]
    fn test_api_key_settings() {
        let store = store();
        assert_eq!(store.get_api_key().unwrap(), None);

        store.save_api_key("abc").unwrap();
        store.save_api_key("def").unwrap();
        assert_eq!(store.get_api_key().unwrap().as_deref(), Some("def"));

        store.clear_api_key().unwrap();
        assert_eq!(store.get_api_key().unwrap(), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mindful.db");

        Store::open(&path, 1024).unwrap().set_item("k", "v").unwrap();
        let reopened = Store::open(&path, 1024).unwrap();
        assert_eq!(reopened.get_item("k").unwrap().as_deref(), Some("v"));
    }
}

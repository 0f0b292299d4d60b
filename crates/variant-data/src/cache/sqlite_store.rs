//! SQLite-backed cache store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};

use super::CacheStore;
use crate::errors::CacheError;
use crate::models::{CacheEntry, RequestSignature};

/// File name used inside the cache directory.
pub const CACHE_FILE_NAME: &str = "responses.sqlite3";

const SCHEMA: &str = "PRAGMA journal_mode=WAL;
CREATE TABLE IF NOT EXISTS cache_entries (
    digest TEXT PRIMARY KEY NOT NULL,
    provider TEXT NOT NULL,
    endpoint TEXT NOT NULL,
    signature TEXT NOT NULL,
    payload TEXT NOT NULL,
    status INTEGER NOT NULL,
    fetched_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_entries_provider ON cache_entries(provider);";

/// Row as stored, before timestamp decoding.
struct StoredRow {
    digest: String,
    provider: String,
    endpoint: String,
    signature: String,
    payload: String,
    status: i64,
    fetched_at: String,
}

impl StoredRow {
    fn into_entry(self) -> Result<CacheEntry, CacheError> {
        let fetched_at = DateTime::parse_from_rfc3339(&self.fetched_at)
            .map_err(|e| CacheError::Corrupt {
                digest: self.digest.clone(),
                message: format!("bad timestamp '{}': {}", self.fetched_at, e),
            })?
            .with_timezone(&Utc);
        let status = u16::try_from(self.status).map_err(|_| CacheError::Corrupt {
            digest: self.digest.clone(),
            message: format!("bad status {}", self.status),
        })?;

        Ok(CacheEntry {
            digest: self.digest,
            provider: self.provider,
            endpoint: self.endpoint,
            signature: self.signature,
            payload: self.payload,
            status,
            fetched_at,
        })
    }
}

/// Cache store persisted to a single SQLite database.
///
/// Every write is one statement on one serialized connection, so readers
/// see either the previous entry or the new one, never a mix.
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteCacheStore {
    /// Open (or create) the cache inside `dir`.
    pub fn open_dir(dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        Self::open(dir.join(CACHE_FILE_NAME))
    }

    /// Open (or create) the cache database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.execute_batch(SCHEMA)?;
        debug!("Response cache opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path),
        })
    }

    /// Non-persistent store, useful for tests and cache-less dry runs.
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Lock the connection, recovering from poison if necessary.
    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("Cache connection mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl CacheStore for SqliteCacheStore {
    fn get(&self, signature: &RequestSignature) -> Result<Option<CacheEntry>, CacheError> {
        let digest = signature.digest();
        let conn = self.lock_conn();
        let row = conn
            .query_row(
                "SELECT digest, provider, endpoint, signature, payload, status, fetched_at
                 FROM cache_entries WHERE digest = ?1",
                params![digest],
                |row| {
                    Ok(StoredRow {
                        digest: row.get(0)?,
                        provider: row.get(1)?,
                        endpoint: row.get(2)?,
                        signature: row.get(3)?,
                        payload: row.get(4)?,
                        status: row.get(5)?,
                        fetched_at: row.get(6)?,
                    })
                },
            )
            .optional()?;

        row.map(StoredRow::into_entry).transpose()
    }

    fn put(
        &self,
        signature: &RequestSignature,
        payload: &str,
        status: u16,
    ) -> Result<CacheEntry, CacheError> {
        let entry = CacheEntry {
            digest: signature.digest(),
            provider: signature.provider().to_string(),
            endpoint: signature.endpoint().to_string(),
            signature: signature.canonical(),
            payload: payload.to_string(),
            status,
            fetched_at: Utc::now(),
        };

        let conn = self.lock_conn();
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries
             (digest, provider, endpoint, signature, payload, status, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.digest,
                entry.provider,
                entry.endpoint,
                entry.signature,
                entry.payload,
                i64::from(entry.status),
                entry.fetched_at.to_rfc3339(),
            ],
        )?;

        Ok(entry)
    }

    fn remove(&self, digest: &str) -> Result<bool, CacheError> {
        let conn = self.lock_conn();
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE digest = ?1",
            params![digest],
        )?;
        Ok(removed > 0)
    }

    fn stats(&self) -> Result<BTreeMap<String, u64>, CacheError> {
        let conn = self.lock_conn();
        let mut stmt =
            conn.prepare("SELECT provider, COUNT(*) FROM cache_entries GROUP BY provider")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (provider, count) = row?;
            counts.insert(provider, u64::try_from(count).unwrap_or(0));
        }
        Ok(counts)
    }

    fn clear_provider(&self, provider: &str) -> Result<u64, CacheError> {
        let conn = self.lock_conn();
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE provider = ?1",
            params![provider.trim().to_ascii_uppercase()],
        )?;
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::HttpMethod;

    fn signature(endpoint: &str) -> RequestSignature {
        RequestSignature::new("ENSEMBL", HttpMethod::Get, endpoint, &[], None)
    }

    #[test]
    fn test_put_then_get() {
        let store = SqliteCacheStore::in_memory().expect("in-memory store");
        let sig = signature("/lookup/symbol/homo_sapiens/APOE");

        assert!(store.get(&sig).expect("get").is_none());

        let written = store.put(&sig, r#"{"id":"ENSG00000130203"}"#, 200).expect("put");
        let read = store.get(&sig).expect("get").expect("entry present");
        assert_eq!(read.payload, written.payload);
        assert_eq!(read.status, 200);
        assert_eq!(read.digest, sig.digest());
        assert_eq!(read.provider, "ENSEMBL");
    }

    #[test]
    fn test_put_replaces_existing_entry() {
        let store = SqliteCacheStore::in_memory().expect("in-memory store");
        let sig = signature("/variation/human/rs429358");

        store.put(&sig, "first", 200).expect("put");
        store.put(&sig, "second", 200).expect("put");

        let read = store.get(&sig).expect("get").expect("entry present");
        assert_eq!(read.payload, "second");
        assert_eq!(store.stats().expect("stats").get("ENSEMBL"), Some(&1));
    }

    #[test]
    fn test_invalidate() {
        let store = SqliteCacheStore::in_memory().expect("in-memory store");
        let sig = signature("/variation/human/rs7412");

        store.put(&sig, "{}", 200).expect("put");
        assert!(store.invalidate(&sig).expect("invalidate"));
        assert!(!store.invalidate(&sig).expect("invalidate"));
        assert!(store.get(&sig).expect("get").is_none());
    }

    #[test]
    fn test_remove_by_entry_digest() {
        let store = SqliteCacheStore::in_memory().expect("in-memory store");
        let sig = signature("/variation/human/rs7412");

        let entry = store.put(&sig, "<html>", 200).expect("put");
        assert!(store.remove(&entry.digest).expect("remove"));
        assert!(store.get(&sig).expect("get").is_none());
        assert_eq!(store.stats().expect("stats").get("ENSEMBL"), None);
    }

    #[test]
    fn test_clear_provider_only_touches_that_provider() {
        let store = SqliteCacheStore::in_memory().expect("in-memory store");
        let ensembl = signature("/a");
        let gtex = RequestSignature::new("GTEX", HttpMethod::Get, "/a", &[], None);

        store.put(&ensembl, "{}", 200).expect("put");
        store.put(&gtex, "{}", 200).expect("put");

        assert_eq!(store.clear_provider("gtex").expect("clear"), 1);
        assert!(store.get(&ensembl).expect("get").is_some());
        assert!(store.get(&gtex).expect("get").is_none());
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sig = signature("/lookup/symbol/homo_sapiens/BRCA2");

        {
            let store = SqliteCacheStore::open_dir(dir.path()).expect("open");
            store.put(&sig, "persisted", 200).expect("put");
        }

        let reopened = SqliteCacheStore::open_dir(dir.path()).expect("reopen");
        let read = reopened.get(&sig).expect("get").expect("entry present");
        assert_eq!(read.payload, "persisted");
        assert_eq!(
            reopened.path(),
            Some(dir.path().join(CACHE_FILE_NAME).as_path())
        );
    }

    #[test]
    fn test_concurrent_writers_do_not_tear_entries() {
        let store = Arc::new(SqliteCacheStore::in_memory().expect("in-memory store"));
        let sig = signature("/overlap/region/human/19:1-100");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let sig = sig.clone();
                std::thread::spawn(move || {
                    let payload = format!("payload-{}", i).repeat(500);
                    store.put(&sig, &payload, 200).expect("put");
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread");
        }

        let read = store.get(&sig).expect("get").expect("entry present");
        let unit = &read.payload[..9];
        assert_eq!(read.payload, unit.repeat(500));
    }
}

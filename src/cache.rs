//! Result cache for finished recommendation sets.
//!
//! Keys hash `lang | user_id | answer fingerprint`. Values carry the catalog
//! version and generation backend they were computed against so callers can
//! ignore stale entries.

use async_trait::async_trait;
use fs2::FileExt;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::answers::{normalized_answers, Answers, Lang};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultCacheKey {
    pub lang: Lang,
    pub user_id: String,
    pub answers_hash: String,
    pub key_hash: String,
}

impl ResultCacheKey {
    pub fn new(lang: Lang, user_id: Option<&str>, answers: &Answers) -> Self {
        let user_id = user_id.map(str::trim).unwrap_or_default().to_string();
        let answers_hash = hash_text(&normalized_answers(answers));
        let key_hash = hash_fields(&[lang.as_str(), &user_id, &answers_hash]);
        Self {
            lang,
            user_id,
            answers_hash,
            key_hash,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    pub catalog_version: String,
    /// Generation backend label at compute time, `none` without a generator.
    #[serde(default)]
    pub backend: String,
    /// `llm` or `fallback`.
    pub path: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache lock poisoned")]
    Poisoned,
    #[error("task join error: {0}")]
    Join(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &ResultCacheKey) -> Result<Option<CachedResult>, CacheError>;
    async fn put(&self, key: &ResultCacheKey, value: &CachedResult) -> Result<(), CacheError>;
}

// =============================================================================
// IN-MEMORY
// =============================================================================

struct MemoryEntries {
    map: HashMap<String, CachedResult>,
    order: VecDeque<String>,
}

/// Bounded process-local cache. The oldest insert is evicted first.
pub struct InMemoryResultCache {
    capacity: usize,
    entries: Mutex<MemoryEntries>,
}

impl InMemoryResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(MemoryEntries {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryResultCache {
    fn default() -> Self {
        Self::new(512)
    }
}

#[async_trait]
impl ResultCache for InMemoryResultCache {
    async fn get(&self, key: &ResultCacheKey) -> Result<Option<CachedResult>, CacheError> {
        let entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.map.get(&key.key_hash).cloned())
    }

    async fn put(&self, key: &ResultCacheKey, value: &CachedResult) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        if entries.map.insert(key.key_hash.clone(), value.clone()).is_none() {
            entries.order.push_back(key.key_hash.clone());
        }
        while entries.map.len() > self.capacity {
            match entries.order.pop_front() {
                Some(oldest) => {
                    entries.map.remove(&oldest);
                }
                None => break,
            }
        }
        Ok(())
    }
}

// =============================================================================
// SQLITE
// =============================================================================

#[derive(Clone)]
pub struct SqliteResultCache {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteResultCache {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; \
             PRAGMA synchronous=NORMAL; \
             CREATE TABLE IF NOT EXISTS result_cache (\
               key_hash TEXT PRIMARY KEY, \
               lang TEXT NOT NULL, \
               user_id TEXT NOT NULL, \
               answers_hash TEXT NOT NULL, \
               catalog_version TEXT NOT NULL, \
               backend TEXT NOT NULL DEFAULT '', \
               path TEXT NOT NULL, \
               payload TEXT NOT NULL, \
               created_at INTEGER NOT NULL, \
               updated_at INTEGER NOT NULL, \
               hit_count INTEGER NOT NULL DEFAULT 0 \
             );",
        )?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("SPORTSYNC_CACHE_PATH") {
            return PathBuf::from(path);
        }
        PathBuf::from(".sportsync_result_cache.sqlite")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_exclusive(&self) -> Result<CacheLock, CacheError> {
        CacheLock::new(&self.path)
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R, CacheError>
    where
        F: FnOnce(&Connection) -> Result<R, CacheError>,
    {
        let guard = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        f(&guard)
    }
}

#[async_trait]
impl ResultCache for SqliteResultCache {
    async fn get(&self, key: &ResultCacheKey) -> Result<Option<CachedResult>, CacheError> {
        let key_hash = key.key_hash.clone();
        let conn = self.clone();
        tokio::task::spawn_blocking(move || {
            conn.with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT catalog_version, backend, path, payload FROM result_cache WHERE key_hash = ?1",
                )?;
                let mut rows = stmt.query(params![key_hash])?;
                let Some(row) = rows.next()? else {
                    return Ok(None);
                };
                let payload: String = row.get(3)?;
                let entry = CachedResult {
                    catalog_version: row.get(0)?,
                    backend: row.get(1)?,
                    path: row.get(2)?,
                    payload: serde_json::from_str(&payload)
                        .map_err(|e| CacheError::Serde(e.to_string()))?,
                };
                conn.execute(
                    "UPDATE result_cache \
                     SET hit_count = hit_count + 1, updated_at = ?1 \
                     WHERE key_hash = ?2",
                    params![now_epoch(), key_hash],
                )?;
                Ok(Some(entry))
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }

    async fn put(&self, key: &ResultCacheKey, value: &CachedResult) -> Result<(), CacheError> {
        let key = key.clone();
        let value = value.clone();
        let conn = self.clone();
        tokio::task::spawn_blocking(move || {
            let payload =
                serde_json::to_string(&value.payload).map_err(|e| CacheError::Serde(e.to_string()))?;
            conn.with_conn(|conn| {
                let now = now_epoch();
                conn.execute(
                    "INSERT INTO result_cache (\
                        key_hash, lang, user_id, answers_hash, catalog_version, backend, path, \
                        payload, created_at, updated_at \
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
                     ON CONFLICT(key_hash) DO UPDATE SET \
                        catalog_version = excluded.catalog_version, \
                        backend = excluded.backend, \
                        path = excluded.path, \
                        payload = excluded.payload, \
                        updated_at = excluded.updated_at",
                    params![
                        key.key_hash,
                        key.lang.as_str(),
                        key.user_id,
                        key.answers_hash,
                        value.catalog_version,
                        value.backend,
                        value.path,
                        payload,
                        now,
                        now,
                    ],
                )?;
                Ok(())
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }
}

#[derive(Debug)]
pub struct CacheLock {
    _file: std::fs::File,
}

impl CacheLock {
    fn new(db_path: &Path) -> Result<Self, CacheError> {
        let mut lock_path = db_path.to_path_buf();
        lock_path.set_extension("lock");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)?;
        file.lock_exclusive()?;
        Ok(Self { _file: file })
    }
}

#[derive(Debug, Serialize)]
pub struct CacheExportRow {
    pub key_hash: String,
    pub lang: String,
    pub user_id: String,
    pub answers_hash: String,
    pub catalog_version: String,
    pub backend: String,
    pub path: String,
    pub payload: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
    pub hit_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CachePruneStats {
    pub deleted: usize,
    pub remaining: usize,
}

impl SqliteResultCache {
    /// Write every row as one JSON line, most recently used first. Returns the row count.
    pub async fn export_jsonl(&self, path: impl AsRef<Path>) -> Result<usize, CacheError> {
        let path = path.as_ref().to_path_buf();
        let conn = self.clone();
        tokio::task::spawn_blocking(move || {
            conn.with_conn(|conn| {
                use std::io::Write;

                let mut stmt = conn.prepare(
                    "SELECT key_hash, lang, user_id, answers_hash, catalog_version, backend, path, \
                            payload, created_at, updated_at, hit_count \
                     FROM result_cache ORDER BY updated_at DESC, key_hash",
                )?;
                let mut rows = stmt.query([])?;
                let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
                let mut written = 0usize;
                while let Some(row) = rows.next()? {
                    let payload: String = row.get(7)?;
                    let record = CacheExportRow {
                        key_hash: row.get(0)?,
                        lang: row.get(1)?,
                        user_id: row.get(2)?,
                        answers_hash: row.get(3)?,
                        catalog_version: row.get(4)?,
                        backend: row.get(5)?,
                        path: row.get(6)?,
                        payload: serde_json::from_str(&payload)
                            .map_err(|e| CacheError::Serde(e.to_string()))?,
                        created_at: row.get(8)?,
                        updated_at: row.get(9)?,
                        hit_count: row.get(10)?,
                    };
                    let line = serde_json::to_string(&record)
                        .map_err(|e| CacheError::Serde(e.to_string()))?;
                    writeln!(file, "{line}")?;
                    written += 1;
                }
                file.flush()?;
                Ok(written)
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }

    pub async fn prune(
        &self,
        max_age_days: Option<u64>,
        max_rows: Option<usize>,
    ) -> Result<CachePruneStats, CacheError> {
        let conn = self.clone();
        tokio::task::spawn_blocking(move || {
            conn.with_conn(|conn| {
                let mut deleted: usize = 0;
                if let Some(days) = max_age_days {
                    let cutoff = now_epoch().saturating_sub((days as i64).saturating_mul(86_400));
                    let removed = conn.execute(
                        "DELETE FROM result_cache WHERE updated_at < ?1",
                        params![cutoff],
                    )?;
                    deleted = deleted.saturating_add(removed);
                }

                if let Some(max_rows) = max_rows {
                    let count: i64 =
                        conn.query_row("SELECT COUNT(*) FROM result_cache", [], |row| row.get(0))?;
                    let keep = max_rows as i64;
                    if count > keep {
                        let removed = conn.execute(
                            "DELETE FROM result_cache WHERE key_hash IN (\
                                SELECT key_hash FROM result_cache \
                                ORDER BY updated_at DESC, key_hash LIMIT -1 OFFSET ?1 \
                             )",
                            params![keep],
                        )?;
                        deleted = deleted.saturating_add(removed);
                    }
                }

                let remaining: i64 =
                    conn.query_row("SELECT COUNT(*) FROM result_cache", [], |row| row.get(0))?;
                Ok(CachePruneStats {
                    deleted,
                    remaining: remaining.max(0) as usize,
                })
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }

    pub async fn hit_count(&self, key: &ResultCacheKey) -> Result<Option<i64>, CacheError> {
        let key_hash = key.key_hash.clone();
        let conn = self.clone();
        tokio::task::spawn_blocking(move || {
            conn.with_conn(|conn| {
                let mut stmt = conn.prepare("SELECT hit_count FROM result_cache WHERE key_hash = ?1")?;
                let mut rows = stmt.query(params![key_hash])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row.get(0)?)),
                    None => Ok(None),
                }
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }
}

fn hash_text(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

fn hash_fields(fields: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            hasher.update(b"|");
        }
        hasher.update(field.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answers::AnswerValue;

    fn answers(pairs: &[(&str, &str)]) -> Answers {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), AnswerValue::text(*v)))
            .collect()
    }

    fn value(tag: &str) -> CachedResult {
        CachedResult {
            catalog_version: "v1".into(),
            backend: "none".into(),
            path: "fallback".into(),
            payload: serde_json::json!({ "tag": tag }),
        }
    }

    #[test]
    fn key_ignores_case_and_diacritics_but_not_lang_or_user() {
        let a = ResultCacheKey::new(Lang::En, Some("u1"), &answers(&[("q1", "Quiet Mornings")]));
        let b = ResultCacheKey::new(Lang::En, Some(" u1 "), &answers(&[("q1", "quiet mornings")]));
        assert_eq!(a.key_hash, b.key_hash);

        let other_lang = ResultCacheKey::new(Lang::Ar, Some("u1"), &answers(&[("q1", "quiet mornings")]));
        let other_user = ResultCacheKey::new(Lang::En, Some("u2"), &answers(&[("q1", "quiet mornings")]));
        let anonymous = ResultCacheKey::new(Lang::En, None, &answers(&[("q1", "quiet mornings")]));
        assert_ne!(a.key_hash, other_lang.key_hash);
        assert_ne!(a.key_hash, other_user.key_hash);
        assert_ne!(a.key_hash, anonymous.key_hash);
    }

    #[test]
    fn key_hash_is_blake3_hex() {
        let key = ResultCacheKey::new(Lang::En, None, &Answers::new());
        assert_eq!(key.key_hash.len(), 64);
        assert!(key.key_hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn in_memory_cache_evicts_oldest_first() {
        let cache = InMemoryResultCache::new(2);
        let k1 = ResultCacheKey::new(Lang::En, None, &answers(&[("q1", "a")]));
        let k2 = ResultCacheKey::new(Lang::En, None, &answers(&[("q1", "b")]));
        let k3 = ResultCacheKey::new(Lang::En, None, &answers(&[("q1", "c")]));
        cache.put(&k1, &value("1")).await.unwrap();
        cache.put(&k2, &value("2")).await.unwrap();
        cache.put(&k1, &value("1b")).await.unwrap();
        cache.put(&k3, &value("3")).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&k1).await.unwrap().is_none());
        assert_eq!(cache.get(&k2).await.unwrap(), Some(value("2")));
        assert_eq!(cache.get(&k3).await.unwrap(), Some(value("3")));
    }
}

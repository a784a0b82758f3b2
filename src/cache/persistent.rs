//! SQLite-backed cache tier
//!
//! Survives restarts. The connection lives behind a mutex and every
//! statement runs on the blocking pool. An optional memory mirror answers
//! hot lookups without touching the database.

use super::memory::MemoryCache;
use super::schema::CacheSchema;
use super::{CacheEntry, CacheKey, CacheStats, CacheStore};
use crate::config::CacheConfig;
use crate::error::{Result, SearchError};
use crate::types::{epoch_seconds, SearchResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on entries kept in the memory mirror
pub const MIRROR_MAX_SIZE: usize = 1_000;

pub struct PersistentCache {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
    ttl: Duration,
    max_size: usize,
    eviction_batch: usize,
    mirror: Option<MemoryCache>,
}

/// A cache row before its results payload is decoded
struct StoredRow {
    key: String,
    query_text: String,
    provider: String,
    requested_count: i64,
    results: String,
    timestamp: f64,
    hits: i64,
    created_at: f64,
    updated_at: f64,
}

const SELECT_COLUMNS: &str =
    "key, query_text, provider, requested_count, results, timestamp, hits, created_at, updated_at";

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            query_text: row.get(1)?,
            provider: row.get(2)?,
            requested_count: row.get(3)?,
            results: row.get(4)?,
            timestamp: row.get(5)?,
            hits: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_entry(self) -> Result<CacheEntry> {
        let results: Vec<SearchResult> = serde_json::from_str(&self.results).map_err(|e| {
            SearchError::CacheError(format!("Corrupt cache payload for {}: {}", self.key, e))
        })?;

        Ok(CacheEntry {
            key: self.key,
            query_text: self.query_text,
            selector: self.provider,
            requested_count: self.requested_count.max(0) as usize,
            results,
            timestamp: self.timestamp,
            hits: self.hits.max(0) as u64,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn insert_entry(conn: &Connection, entry: &CacheEntry, payload: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR REPLACE INTO search_cache
            (key, query_text, provider, requested_count, results, timestamp, hits, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.key,
            entry.query_text,
            entry.selector,
            entry.requested_count as i64,
            payload,
            entry.timestamp,
            entry.hits as i64,
            entry.created_at,
            entry.updated_at,
        ],
    )
}

/// Keys of the `limit` oldest rows
fn oldest_keys(conn: &Connection, limit: usize) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT key FROM search_cache ORDER BY timestamp ASC LIMIT ?1")?;
    let keys = stmt
        .query_map(params![limit as i64], |row| row.get::<_, String>(0))?
        .collect();
    keys
}

impl PersistentCache {
    /// Open (or create) the database at `config.db_path`
    pub fn open(config: &CacheConfig) -> Result<Self> {
        Self::open_at(&config.db_path, config.ttl, config.max_size, config.eviction_batch, config.memory_mirror)
    }

    pub fn open_at(
        db_path: &Path,
        ttl: Duration,
        max_size: usize,
        eviction_batch: usize,
        memory_mirror: bool,
    ) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch(&CacheSchema::init_sql())?;

        let max_size = max_size.max(1);
        let mirror = memory_mirror.then(|| MemoryCache::new(ttl, max_size.min(MIRROR_MAX_SIZE)));

        info!(
            "Persistent cache opened at {} (mirror: {})",
            db_path.display(),
            mirror.is_some()
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: db_path.to_path_buf(),
            ttl,
            max_size,
            eviction_batch: eviction_batch.max(1),
            mirror,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&mut *guard)
        })
        .await
        .map_err(|e| SearchError::Internal(format!("Cache task failed: {}", e)))?
    }
}

#[async_trait]
impl CacheStore for PersistentCache {
    fn kind(&self) -> &'static str {
        "persistent"
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn max_size(&self) -> usize {
        self.max_size
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<SearchResult>>> {
        let fingerprint = key.fingerprint.clone();

        if let Some(mirror) = &self.mirror {
            if let Some(entry) = mirror.lookup(&fingerprint) {
                // keep the durable hit count in step with mirror hits
                let key = fingerprint.clone();
                let touched = self
                    .with_conn(move |conn| {
                        Ok(conn.execute(
                            "UPDATE search_cache SET hits = hits + 1, updated_at = ?1 WHERE key = ?2",
                            params![epoch_seconds(), key],
                        )?)
                    })
                    .await?;

                if touched > 0 {
                    return Ok(Some(entry.results));
                }
                // the row is gone from the database; the mirror copy is stale
                mirror.remove(&fingerprint);
                return Ok(None);
            }
        }

        let ttl = self.ttl.as_secs_f64();
        let row = self
            .with_conn(move |conn| {
                let row = conn
                    .query_row(
                        &format!("SELECT {} FROM search_cache WHERE key = ?1", SELECT_COLUMNS),
                        params![fingerprint],
                        StoredRow::from_row,
                    )
                    .optional()?;

                let Some(mut row) = row else {
                    return Ok(None);
                };

                let now = epoch_seconds();
                if now - row.timestamp > ttl {
                    conn.execute("DELETE FROM search_cache WHERE key = ?1", params![row.key])?;
                    debug!("Persistent cache entry expired: {}", row.key);
                    return Ok(None);
                }

                conn.execute(
                    "UPDATE search_cache SET hits = hits + 1, updated_at = ?1 WHERE key = ?2",
                    params![now, row.key],
                )?;
                row.hits += 1;
                row.updated_at = now;
                Ok(Some(row))
            })
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let key = row.key.clone();
        let entry = match row.into_entry() {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Dropping unreadable cache row: {}", e);
                self.with_conn(move |conn| {
                    conn.execute("DELETE FROM search_cache WHERE key = ?1", params![key])?;
                    Ok(())
                })
                .await?;
                return Ok(None);
            }
        };
        let results = entry.results.clone();
        if let Some(mirror) = &self.mirror {
            mirror.insert(entry);
        }
        Ok(Some(results))
    }

    async fn set(&self, key: &CacheKey, results: &[SearchResult]) -> Result<()> {
        let entry = CacheEntry::new(key, results, epoch_seconds());
        let payload = serde_json::to_string(&entry.results)?;
        let max_size = self.max_size;
        let batch = self.eviction_batch;
        let stored = entry.clone();

        let evicted = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;

                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM search_cache WHERE key = ?1)",
                    params![stored.key],
                    |row| row.get(0),
                )?;
                let count: i64 = tx.query_row("SELECT COUNT(*) FROM search_cache", [], |row| row.get(0))?;

                let mut evicted = Vec::new();
                if !exists && count as usize >= max_size {
                    evicted = oldest_keys(&tx, batch)?;
                    for key in &evicted {
                        tx.execute("DELETE FROM search_cache WHERE key = ?1", params![key])?;
                    }
                }

                insert_entry(&tx, &stored, &payload)?;
                tx.commit()?;
                Ok(evicted)
            })
            .await?;

        if !evicted.is_empty() {
            debug!("Persistent cache evicted {} oldest entries", evicted.len());
        }

        if let Some(mirror) = &self.mirror {
            for key in &evicted {
                mirror.remove(key);
            }
            mirror.insert(entry);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        let removed = self
            .with_conn(|conn| Ok(conn.execute("DELETE FROM search_cache", [])?))
            .await?;

        if let Some(mirror) = &self.mirror {
            mirror.clear().await?;
        }
        Ok(removed)
    }

    async fn remove_expired(&self) -> Result<usize> {
        let cutoff = epoch_seconds() - self.ttl.as_secs_f64();
        let removed = self
            .with_conn(move |conn| {
                Ok(conn.execute("DELETE FROM search_cache WHERE timestamp < ?1", params![cutoff])?)
            })
            .await?;

        if let Some(mirror) = &self.mirror {
            mirror.remove_expired().await?;
        }
        Ok(removed)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let now = epoch_seconds();
        let (size, total_hits, avg_age, providers) = self
            .with_conn(move |conn| {
                let (size, total_hits, avg_age): (i64, Option<i64>, Option<f64>) = conn.query_row(
                    "SELECT COUNT(*), SUM(hits), AVG(?1 - timestamp) FROM search_cache",
                    params![now],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )?;

                let mut stmt = conn.prepare("SELECT provider, COUNT(*) FROM search_cache GROUP BY provider")?;
                let providers = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                    .map(|r| r.map(|(provider, count)| (provider, count.max(0) as usize)))
                    .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

                Ok((size, total_hits.unwrap_or(0), avg_age.unwrap_or(0.0), providers))
            })
            .await?;

        Ok(CacheStats {
            backend: self.kind().to_string(),
            size: size.max(0) as usize,
            max_size: self.max_size,
            total_hits: total_hits.max(0) as u64,
            ttl_seconds: self.ttl.as_secs(),
            avg_age_seconds: avg_age.max(0.0),
            db_path: Some(self.db_path.display().to_string()),
            memory_mirror_size: self.mirror.as_ref().map(|m| m.len()),
            providers,
        })
    }

    async fn vacuum(&self) -> Result<bool> {
        self.with_conn(|conn| {
            conn.execute_batch("VACUUM")?;
            Ok(true)
        })
        .await
    }

    async fn export_entries(&self) -> Result<Vec<CacheEntry>> {
        let rows = self
            .with_conn(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM search_cache ORDER BY timestamp ASC",
                    SELECT_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], StoredRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(StoredRow::into_entry).collect()
    }

    async fn import_entries(&self, entries: Vec<CacheEntry>) -> Result<usize> {
        let now = epoch_seconds();
        let fresh: Vec<CacheEntry> = entries
            .into_iter()
            .filter(|entry| !entry.is_expired(self.ttl, now))
            .collect();

        let payloads = fresh
            .iter()
            .map(|entry| serde_json::to_string(&entry.results))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let rows = fresh.clone();
        let imported = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                for (entry, payload) in rows.iter().zip(&payloads) {
                    insert_entry(&tx, entry, payload)?;
                }
                tx.commit()?;
                Ok(rows.len())
            })
            .await?;

        if let Some(mirror) = &self.mirror {
            for entry in fresh {
                mirror.insert(entry);
            }
        }
        Ok(imported)
    }
}

//! In-process LRU cache tier

use super::{CacheEntry, CacheKey, CacheStats, CacheStore};
use crate::error::Result;
use crate::types::{epoch_seconds, SearchResult};
use async_trait::async_trait;
use lru::LruCache;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Bounded LRU map of result lists with per-entry expiry
pub struct MemoryCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
    max_size: usize,
}

impl MemoryCache {
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            max_size: capacity.get(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Fresh entry for `fingerprint`, bumping its hit count and recency
    pub fn lookup(&self, fingerprint: &str) -> Option<CacheEntry> {
        let now = epoch_seconds();
        let mut entries = self.lock();

        let expired = entries.peek(fingerprint)?.is_expired(self.ttl, now);
        if expired {
            entries.pop(fingerprint);
            debug!("Memory cache entry expired: {}", fingerprint);
            return None;
        }

        let entry = entries.get_mut(fingerprint)?;
        entry.hits += 1;
        entry.updated_at = now;
        Some(entry.clone())
    }

    /// Insert or replace an entry, evicting the least recently used one when full
    pub fn insert(&self, entry: CacheEntry) {
        let key = entry.key.clone();
        if let Some((evicted, _)) = self.lock().push(key.clone(), entry) {
            if evicted != key {
                debug!("Memory cache evicted least recently used entry: {}", evicted);
            }
        }
    }

    pub fn remove(&self, fingerprint: &str) -> Option<CacheEntry> {
        self.lock().pop(fingerprint)
    }

    fn clear_all(&self) -> usize {
        let mut entries = self.lock();
        let removed = entries.len();
        entries.clear();
        removed
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn max_size(&self) -> usize {
        self.max_size
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<SearchResult>>> {
        Ok(self.lookup(&key.fingerprint).map(|entry| entry.results))
    }

    async fn set(&self, key: &CacheKey, results: &[SearchResult]) -> Result<()> {
        self.insert(CacheEntry::new(key, results, epoch_seconds()));
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        Ok(self.clear_all())
    }

    async fn remove_expired(&self) -> Result<usize> {
        let now = epoch_seconds();
        let mut entries = self.lock();

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(self.ttl, now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }

        Ok(expired.len())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let now = epoch_seconds();
        let entries = self.lock();

        let mut providers = BTreeMap::new();
        let mut total_hits = 0;
        let mut total_age = 0.0;
        for (_, entry) in entries.iter() {
            *providers.entry(entry.selector.clone()).or_insert(0) += 1;
            total_hits += entry.hits;
            total_age += entry.age(now);
        }

        let size = entries.len();
        Ok(CacheStats {
            backend: self.kind().to_string(),
            size,
            max_size: self.max_size,
            total_hits,
            ttl_seconds: self.ttl.as_secs(),
            avg_age_seconds: if size > 0 { total_age / size as f64 } else { 0.0 },
            db_path: None,
            memory_mirror_size: None,
            providers,
        })
    }

    async fn vacuum(&self) -> Result<bool> {
        Ok(false)
    }

    async fn export_entries(&self) -> Result<Vec<CacheEntry>> {
        // iter() runs most to least recent; reverse so a re-import keeps recency
        Ok(self.lock().iter().rev().map(|(_, entry)| entry.clone()).collect())
    }

    async fn import_entries(&self, entries: Vec<CacheEntry>) -> Result<usize> {
        let now = epoch_seconds();
        let mut imported = 0;

        for entry in entries {
            if entry.is_expired(self.ttl, now) {
                continue;
            }
            self.insert(entry);
            imported += 1;
        }

        Ok(imported)
    }
}

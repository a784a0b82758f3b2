//! Result cache
//!
//! Two interchangeable tiers sit behind [`CacheStore`]: an in-process LRU
//! and a SQLite-backed store that survives restarts. [`CacheManager`] is the
//! facade used by the orchestrator; it turns storage faults into misses so a
//! broken cache never fails a search.

pub mod memory;
pub mod persistent;
pub mod schema;


pub use memory::MemoryCache;
pub use persistent::PersistentCache;

use crate::config::{CacheBackendKind, CacheConfig};
use crate::error::{Result, SearchError};
use crate::observability::LoggingService;
use crate::types::{epoch_seconds, SearchQuery, SearchResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Identity of a cached result list.
///
/// The fingerprint hashes the raw query text, selector label and count, so
/// two queries differing only in case or whitespace are separate entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub fingerprint: String,
    pub query: String,
    pub selector: String,
    pub count: usize,
}

impl CacheKey {
    pub fn new(query: &str, selector: &str, count: usize) -> Self {
        let material = format!("{}|{}|{}", query, selector, count);
        Self {
            fingerprint: format!("{:016x}", farmhash::fingerprint64(material.as_bytes())),
            query: query.to_string(),
            selector: selector.to_string(),
            count,
        }
    }

    pub fn for_query(query: &SearchQuery) -> Self {
        Self::new(&query.text, query.selector.label(), query.requested_count)
    }
}

/// A stored result list with its bookkeeping.
///
/// Serialized field names match the cache export file format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    #[serde(rename = "query")]
    pub query_text: String,
    #[serde(rename = "provider")]
    pub selector: String,
    #[serde(rename = "count")]
    pub requested_count: usize,
    pub results: Vec<SearchResult>,
    /// Write time in epoch seconds; drives expiry and eviction
    pub timestamp: f64,
    #[serde(default)]
    pub hits: u64,
    pub created_at: f64,
    pub updated_at: f64,
}

impl CacheEntry {
    pub fn new(key: &CacheKey, results: &[SearchResult], now: f64) -> Self {
        Self {
            key: key.fingerprint.clone(),
            query_text: key.query.clone(),
            selector: key.selector.clone(),
            requested_count: key.count,
            results: results.to_vec(),
            timestamp: now,
            hits: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn age(&self, now: f64) -> f64 {
        (now - self.timestamp).max(0.0)
    }

    pub fn is_expired(&self, ttl: Duration, now: f64) -> bool {
        now - self.timestamp > ttl.as_secs_f64()
    }
}

/// Point-in-time statistics reported by a cache tier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub backend: String,
    pub size: usize,
    pub max_size: usize,
    pub total_hits: u64,
    pub ttl_seconds: u64,
    pub avg_age_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mirror_size: Option<usize>,
    /// Entry count per selector label
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub providers: BTreeMap<String, usize>,
}

/// Storage tier behind the cache manager
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Tier name used in stats and logs
    fn kind(&self) -> &'static str;

    fn ttl(&self) -> Duration;

    fn max_size(&self) -> usize;

    /// Fresh results for `key`; expired entries are dropped on the way
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<SearchResult>>>;

    /// Store results, evicting when the tier is full
    async fn set(&self, key: &CacheKey, results: &[SearchResult]) -> Result<()>;

    /// Remove every entry, returning how many were removed
    async fn clear(&self) -> Result<usize>;

    /// Remove expired entries, returning how many were removed
    async fn remove_expired(&self) -> Result<usize>;

    async fn stats(&self) -> Result<CacheStats>;

    /// Compact the backing storage; `false` when the tier has nothing to compact
    async fn vacuum(&self) -> Result<bool>;

    /// Every stored entry, oldest first
    async fn export_entries(&self) -> Result<Vec<CacheEntry>>;

    /// Insert entries as-is, skipping expired ones; returns the number stored
    async fn import_entries(&self, entries: Vec<CacheEntry>) -> Result<usize>;
}

/// On-disk layout written by [`CacheManager::export`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheExport {
    pub ttl: u64,
    pub max_size: usize,
    pub export_time: f64,
    pub entries: Vec<CacheEntry>,
}

/// Hit and miss counts seen by the manager since startup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
}

#[derive(Debug, Default)]
struct LookupCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LookupCounters {
    fn snapshot(&self) -> LookupStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        LookupStats {
            hits,
            misses,
            hit_ratio: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
        }
    }
}

/// Tier statistics plus the manager's lookup counters
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    #[serde(flatten)]
    pub store: CacheStats,
    pub lookups: LookupStats,
}

/// Cache facade used by the orchestrator and management operations
pub struct CacheManager {
    store: Option<Arc<dyn CacheStore>>,
    counters: LookupCounters,
    logger: LoggingService,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store: Some(store),
            counters: LookupCounters::default(),
            logger: LoggingService::new(),
        }
    }

    /// A manager that never stores anything
    pub fn disabled() -> Self {
        Self {
            store: None,
            counters: LookupCounters::default(),
            logger: LoggingService::new(),
        }
    }

    /// Build the configured tier. A persistent tier that cannot be opened
    /// falls back to memory.
    pub fn from_config(config: &CacheConfig) -> Self {
        if !config.enabled {
            info!("Result cache disabled");
            return Self::disabled();
        }

        let store: Arc<dyn CacheStore> = match config.backend {
            CacheBackendKind::Memory => Arc::new(MemoryCache::new(config.ttl, config.max_size)),
            CacheBackendKind::Persistent => match PersistentCache::open(config) {
                Ok(cache) => Arc::new(cache),
                Err(e) => {
                    warn!(
                        "Failed to open persistent cache at {}, falling back to memory: {}",
                        config.db_path.display(),
                        e
                    );
                    let max_size = config.max_size.min(CacheConfig::DEFAULT_MEMORY_MAX_SIZE);
                    Arc::new(MemoryCache::new(config.ttl, max_size))
                }
            },
        };

        info!(
            "Result cache initialized: backend={}, ttl={}s, max_size={}",
            store.kind(),
            store.ttl().as_secs(),
            store.max_size()
        );

        Self::new(store)
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn backend(&self) -> &'static str {
        self.store.as_ref().map(|s| s.kind()).unwrap_or("disabled")
    }

    fn require_store(&self) -> Result<&Arc<dyn CacheStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| SearchError::CacheError("Result cache is disabled".to_string()))
    }

    /// Cached results for `query`. Storage faults are logged and read as a miss.
    pub async fn get(&self, query: &SearchQuery) -> Option<Vec<SearchResult>> {
        let store = self.store.as_ref()?;
        let key = CacheKey::for_query(query);

        let found = match store.get(&key).await {
            Ok(found) => found,
            Err(e) => {
                self.logger.log_error(&e, Some(HashMap::from([
                    ("operation".to_string(), json!("get")),
                    ("cache_type".to_string(), json!(store.kind())),
                ])));
                None
            }
        };

        let operation = if found.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            "hit"
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            "miss"
        };
        self.logger
            .log_cache_operation(operation, store.kind(), Some(&key.fingerprint), None);

        found
    }

    /// Store results for `query`. Storage faults are logged and dropped.
    pub async fn set(&self, query: &SearchQuery, results: &[SearchResult]) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let key = CacheKey::for_query(query);

        match store.set(&key, results).await {
            Ok(()) => self.logger.log_cache_operation(
                "set",
                store.kind(),
                Some(&key.fingerprint),
                Some(HashMap::from([("num_results".to_string(), json!(results.len()))])),
            ),
            Err(e) => self.logger.log_error(&e, Some(HashMap::from([
                ("operation".to_string(), json!("set")),
                ("cache_type".to_string(), json!(store.kind())),
            ]))),
        }
    }

    pub async fn stats(&self) -> Result<CacheReport> {
        let store = self.require_store()?;
        Ok(CacheReport {
            store: store.stats().await?,
            lookups: self.counters.snapshot(),
        })
    }

    pub async fn clear(&self) -> Result<usize> {
        let store = self.require_store()?;
        let removed = store.clear().await?;
        self.logger.log_cache_operation(
            "clear",
            store.kind(),
            None,
            Some(HashMap::from([("removed_count".to_string(), json!(removed))])),
        );
        Ok(removed)
    }

    pub async fn cleanup_expired(&self) -> Result<usize> {
        let store = self.require_store()?;
        let removed = store.remove_expired().await?;
        self.logger.log_cache_operation(
            "cleanup",
            store.kind(),
            None,
            Some(HashMap::from([("removed_count".to_string(), json!(removed))])),
        );
        Ok(removed)
    }

    /// Compact the persistent tier; `false` for the memory tier
    pub async fn vacuum(&self) -> Result<bool> {
        let store = self.require_store()?;
        let performed = store.vacuum().await?;
        self.logger.log_cache_operation(
            "vacuum",
            store.kind(),
            None,
            Some(HashMap::from([("performed".to_string(), json!(performed))])),
        );
        Ok(performed)
    }

    /// Write every entry to `path` as JSON, returning the entry count
    pub async fn export(&self, path: impl AsRef<Path>) -> Result<usize> {
        let store = self.require_store()?;
        let path = path.as_ref();

        let export = CacheExport {
            ttl: store.ttl().as_secs(),
            max_size: store.max_size(),
            export_time: epoch_seconds(),
            entries: store.export_entries().await?,
        };
        let exported = export.entries.len();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_vec_pretty(&export)?).await?;

        self.logger.log_cache_operation(
            "export",
            store.kind(),
            None,
            Some(HashMap::from([
                ("exported_count".to_string(), json!(exported)),
                ("file_path".to_string(), json!(path.display().to_string())),
            ])),
        );
        Ok(exported)
    }

    /// Load entries written by [`CacheManager::export`], skipping expired ones
    pub async fn import(&self, path: impl AsRef<Path>) -> Result<usize> {
        let store = self.require_store()?;
        let path = path.as_ref();

        let raw = tokio::fs::read(path).await?;
        let export: CacheExport = serde_json::from_slice(&raw)?;
        let imported = store.import_entries(export.entries).await?;

        self.logger.log_cache_operation(
            "import",
            store.kind(),
            None,
            Some(HashMap::from([
                ("imported_count".to_string(), json!(imported)),
                ("file_path".to_string(), json!(path.display().to_string())),
            ])),
        );
        Ok(imported)
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("backend", &self.backend())
            .field("lookups", &self.counters.snapshot())
            .finish()
    }
}

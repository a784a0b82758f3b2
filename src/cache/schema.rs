//! SQLite schema for the persistent cache tier

/// Cache table schema
pub struct CacheSchema;

impl CacheSchema {
    /// SQL creating the cache table
    pub fn create_table_sql() -> &'static str {
        "
        CREATE TABLE IF NOT EXISTS search_cache (
            key TEXT PRIMARY KEY,
            query_text TEXT NOT NULL,
            provider TEXT NOT NULL,
            requested_count INTEGER NOT NULL,
            results TEXT NOT NULL,
            timestamp REAL NOT NULL,
            hits INTEGER NOT NULL DEFAULT 0,
            created_at REAL NOT NULL,
            updated_at REAL NOT NULL
        )
        "
    }

    /// Indexes for expiry sweeps, eviction and per-query lookups
    pub fn create_indexes_sql() -> Vec<&'static str> {
        vec![
            "CREATE INDEX IF NOT EXISTS idx_search_cache_timestamp ON search_cache(timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_search_cache_query_provider ON search_cache(query_text, provider)",
        ]
    }

    /// Full initialization batch, safe to run on every open
    pub fn init_sql() -> String {
        let mut sql = String::from(Self::create_table_sql().trim());
        sql.push_str(";\n");
        for index in Self::create_indexes_sql() {
            sql.push_str(index);
            sql.push_str(";\n");
        }
        sql
    }
}

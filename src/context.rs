//! Process-wide search context
//!
//! Built once from [`Config`] and passed by reference to whatever drives the
//! engine. Owns the orchestrator together with its cache, monitor and rate
//! limiters, plus metrics and health checks.

use crate::cache::CacheReport;
use crate::config::Config;
use crate::error::Result;
use crate::observability::{HealthResponse, ObservabilityService, PerformanceReport, ReadinessResponse};
use crate::search::{RateLimiterStatus, SearchOrchestrator, WarmupReport};
use crate::types::{ProviderId, SearchOutcome, SearchQuery, SearchResult};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Metadata block of an exported result file
#[derive(Debug, Clone, Serialize)]
pub struct ExportMetadata {
    pub query: String,
    pub num_results: usize,
    pub requested_engine: String,
    pub actual_engines: Vec<String>,
    pub search_duration_seconds: f64,
    pub timestamp: String,
    pub total_results: usize,
    pub version: String,
}

#[derive(Debug, Serialize)]
struct ExportedResults<'a> {
    results: &'a [SearchResult],
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<ExportMetadata>,
}

/// What an export wrote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub output_file: PathBuf,
    pub file_size_bytes: u64,
    pub total_results: usize,
}

pub struct SearchContext {
    config: Config,
    orchestrator: SearchOrchestrator,
    observability: ObservabilityService,
}

impl SearchContext {
    /// Validate `config` and build every component from it
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let observability = ObservabilityService::new()?;
        let orchestrator = SearchOrchestrator::from_config(&config)?.with_metrics(observability.metrics.clone());

        info!(
            "Search context ready: cache={}, providers={:?}",
            orchestrator.cache().backend(),
            orchestrator.providers()
        );

        Ok(Self {
            config,
            orchestrator,
            observability,
        })
    }

    /// Build from environment variables and `.env`
    pub fn from_env() -> Result<Self> {
        Self::new(Config::from_env()?)
    }

    /// Wrap an already assembled orchestrator
    pub fn with_orchestrator(config: Config, orchestrator: SearchOrchestrator) -> Result<Self> {
        let observability = ObservabilityService::new()?;
        Ok(Self {
            config,
            orchestrator: orchestrator.with_metrics(observability.metrics.clone()),
            observability,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &SearchOrchestrator {
        &self.orchestrator
    }

    pub fn observability(&self) -> &ObservabilityService {
        &self.observability
    }

    /// Search with a selector given by name (`auto`, `all` or a provider).
    ///
    /// Names no provider answers to are served by the fallback list.
    pub async fn search(&self, text: &str, count: usize, selector: &str) -> Result<SearchOutcome> {
        let query = SearchQuery::new(text, count, selector.parse()?);
        self.orchestrator.search(&query).await
    }

    pub async fn warmup(&self, queries: &[SearchQuery]) -> WarmupReport {
        self.orchestrator.warmup(queries).await
    }

    pub async fn cache_stats(&self) -> Result<CacheReport> {
        self.orchestrator.cache().stats().await
    }

    pub async fn clear_cache(&self) -> Result<Value> {
        let removed = self.orchestrator.cache().clear().await?;
        Ok(json!({ "removed_count": removed }))
    }

    pub async fn cleanup_cache(&self) -> Result<Value> {
        let removed = self.orchestrator.cache().cleanup_expired().await?;
        Ok(json!({ "removed_count": removed }))
    }

    pub async fn vacuum_cache(&self) -> Result<Value> {
        let performed = self.orchestrator.cache().vacuum().await?;
        Ok(json!({ "performed": performed }))
    }

    pub async fn export_cache(&self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let exported = self.orchestrator.cache().export(path).await?;
        Ok(json!({ "exported_count": exported, "file_path": path.display().to_string() }))
    }

    pub async fn import_cache(&self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let imported = self.orchestrator.cache().import(path).await?;
        Ok(json!({ "imported_count": imported, "file_path": path.display().to_string() }))
    }

    /// Run a search and write its results to `path` as JSON.
    ///
    /// An empty outcome still produces a file with no results.
    pub async fn export_search_results(
        &self,
        text: &str,
        count: usize,
        selector: &str,
        path: impl AsRef<Path>,
        include_metadata: bool,
    ) -> Result<ExportSummary> {
        let query = SearchQuery::new(text, count, selector.parse()?);
        let started = Instant::now();
        let outcome = self.orchestrator.search(&query).await?;
        let search_duration = started.elapsed().as_secs_f64();
        let results = outcome.results();

        let metadata = include_metadata.then(|| {
            let engines: BTreeSet<&str> = results
                .iter()
                .filter_map(|r| r.provider.map(|p: ProviderId| p.as_str()))
                .collect();

            ExportMetadata {
                query: query.text.clone(),
                num_results: query.requested_count,
                requested_engine: query.selector.label().to_string(),
                actual_engines: engines.into_iter().map(str::to_string).collect(),
                search_duration_seconds: search_duration,
                timestamp: chrono::Utc::now().to_rfc3339(),
                total_results: results.len(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            }
        });

        let body = serde_json::to_vec_pretty(&ExportedResults { results, metadata })?;

        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &body).await?;

        info!("Exported {} search results to {}", results.len(), path.display());

        Ok(ExportSummary {
            output_file: path.to_path_buf(),
            file_size_bytes: body.len() as u64,
            total_results: results.len(),
        })
    }

    pub async fn health(&self) -> HealthResponse {
        self.observability.health.check(&self.orchestrator).await
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        self.observability.health.readiness(&self.orchestrator).await
    }

    pub fn performance_report(&self) -> PerformanceReport {
        self.orchestrator.monitor().generate_report()
    }

    pub async fn export_performance_report(&self, path: impl AsRef<Path>) -> Result<()> {
        self.orchestrator.monitor().export_report(path).await
    }

    pub fn reset_monitor(&self) {
        self.orchestrator.monitor().reset();
    }

    pub async fn rate_limit_status(&self) -> BTreeMap<String, RateLimiterStatus> {
        self.orchestrator.rate_limiter().all_status().await
    }

    /// Prometheus text exposition of every metric
    pub fn metrics_text(&self) -> Result<String> {
        self.observability.metrics.gather()
    }
}

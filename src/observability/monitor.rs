//! Performance monitoring for search calls
//!
//! Keeps running totals per selector ("auto", "all", "google", ...) for
//! orchestration calls, per provider for individual dispatches, and a bounded
//! ring buffer of the most recent calls.

use crate::error::Result;
use crate::types::ProviderId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::info;

/// Default size of the recent-call ring buffer
pub const DEFAULT_RECENT_CAPACITY: usize = 1000;

/// Error messages retained per stats entry
const MAX_ERRORS_PER_ENTRY: usize = 100;

/// Metrics for one orchestration call
#[derive(Debug, Clone)]
pub struct SearchMetrics {
    pub query: String,
    pub selector: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub success: bool,
    pub cached: bool,
    pub result_count: usize,
    pub error: Option<String>,
}

impl SearchMetrics {
    pub fn duration(&self) -> Duration {
        (self.end_time - self.start_time).to_std().unwrap_or_default()
    }

    pub fn to_record(&self) -> SearchRecord {
        SearchRecord {
            query: self.query.clone(),
            engine: self.selector.clone(),
            duration: round_to(self.duration().as_secs_f64(), 3),
            success: self.success,
            cached: self.cached,
            num_results: self.result_count,
            error: self.error.clone(),
            timestamp: self.start_time,
        }
    }
}

/// Serializable view of one orchestration call
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchRecord {
    pub query: String,
    pub engine: String,
    pub duration: f64,
    pub success: bool,
    pub cached: bool,
    pub num_results: usize,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// One dispatch to a single provider
#[derive(Debug, Clone)]
pub struct ProviderCall {
    pub provider: ProviderId,
    pub duration: Duration,
    pub result_count: usize,
    pub error: Option<String>,
}

/// Running totals for a selector or provider
#[derive(Debug, Clone, Default)]
pub struct ProviderStats {
    pub name: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cached_requests: u64,
    pub total_duration: Duration,
    pub total_results: u64,
    pub errors: VecDeque<String>,
}

impl ProviderStats {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, success: bool, cached: bool, duration: Duration, results: usize, error: Option<&str>) {
        self.total_requests += 1;

        if success {
            self.successful_requests += 1;
            self.total_duration += duration;
            self.total_results += results as u64;
        } else {
            self.failed_requests += 1;
            if let Some(error) = error {
                if self.errors.len() >= MAX_ERRORS_PER_ENTRY {
                    self.errors.pop_front();
                }
                self.errors.push_back(error.to_string());
            }
        }

        if cached {
            self.cached_requests += 1;
        }
    }

    pub fn success_rate(&self) -> f64 {
        ratio(self.successful_requests, self.total_requests)
    }

    pub fn cache_hit_rate(&self) -> f64 {
        ratio(self.cached_requests, self.total_requests)
    }

    /// Mean duration over successful requests
    pub fn avg_duration(&self) -> Duration {
        if self.successful_requests == 0 {
            return Duration::ZERO;
        }
        self.total_duration.div_f64(self.successful_requests as f64)
    }

    /// Mean result count over successful requests
    pub fn avg_results(&self) -> f64 {
        ratio(self.total_results, self.successful_requests)
    }

    pub fn snapshot(&self) -> ProviderStatsSnapshot {
        ProviderStatsSnapshot {
            name: self.name.clone(),
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            failed_requests: self.failed_requests,
            cached_requests: self.cached_requests,
            success_rate: round_to(self.success_rate() * 100.0, 2),
            cache_hit_rate: round_to(self.cache_hit_rate() * 100.0, 2),
            avg_duration: round_to(self.avg_duration().as_secs_f64(), 3),
            avg_results: round_to(self.avg_results(), 1),
            total_duration: round_to(self.total_duration.as_secs_f64(), 3),
            error_count: self.errors.len(),
            recent_errors: self.errors.iter().rev().take(5).cloned().collect(),
        }
    }
}

/// Serializable stats with rates expressed as percentages
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProviderStatsSnapshot {
    pub name: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cached_requests: u64,
    pub success_rate: f64,
    pub cache_hit_rate: f64,
    pub avg_duration: f64,
    pub avg_results: f64,
    pub total_duration: f64,
    pub error_count: usize,
    pub recent_errors: Vec<String>,
}

/// Totals across every orchestration call
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OverallStats {
    pub uptime_seconds: f64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cached_requests: u64,
    pub success_rate: f64,
    pub cache_hit_rate: f64,
    pub engines: usize,
    pub recent_searches_count: usize,
}

/// Full report, suitable for export
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub overall: OverallStats,
    pub engines: BTreeMap<String, ProviderStatsSnapshot>,
    pub providers: BTreeMap<String, ProviderStatsSnapshot>,
    pub recent_searches: Vec<SearchRecord>,
}

struct MonitorState {
    selectors: HashMap<String, ProviderStats>,
    providers: HashMap<ProviderId, ProviderStats>,
    recent: VecDeque<SearchMetrics>,
    started: Instant,
}

impl MonitorState {
    fn new() -> Self {
        Self {
            selectors: HashMap::new(),
            providers: HashMap::new(),
            recent: VecDeque::new(),
            started: Instant::now(),
        }
    }

    fn overall(&self) -> OverallStats {
        let total: u64 = self.selectors.values().map(|s| s.total_requests).sum();
        let successful: u64 = self.selectors.values().map(|s| s.successful_requests).sum();
        let cached: u64 = self.selectors.values().map(|s| s.cached_requests).sum();

        OverallStats {
            uptime_seconds: round_to(self.started.elapsed().as_secs_f64(), 1),
            total_requests: total,
            successful_requests: successful,
            failed_requests: total - successful,
            cached_requests: cached,
            success_rate: round_to(ratio(successful, total) * 100.0, 2),
            cache_hit_rate: round_to(ratio(cached, total) * 100.0, 2),
            engines: self.selectors.len(),
            recent_searches_count: self.recent.len(),
        }
    }

    fn recent(&self, limit: usize) -> Vec<SearchRecord> {
        self.recent.iter().rev().take(limit).map(SearchMetrics::to_record).collect()
    }
}

/// Collects and summarizes search performance
pub struct PerformanceMonitor {
    state: Mutex<MonitorState>,
    capacity: usize,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_CAPACITY)
    }
}

impl PerformanceMonitor {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(MonitorState::new()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record one orchestration call
    pub fn record_search(&self, metrics: SearchMetrics) {
        let mut state = self.lock();

        state
            .selectors
            .entry(metrics.selector.clone())
            .or_insert_with(|| ProviderStats::named(&metrics.selector))
            .record(
                metrics.success,
                metrics.cached,
                metrics.duration(),
                metrics.result_count,
                metrics.error.as_deref(),
            );

        if state.recent.len() >= self.capacity {
            state.recent.pop_front();
        }
        state.recent.push_back(metrics);
    }

    /// Record one dispatch to a provider
    pub fn record_provider_call(&self, call: ProviderCall) {
        let mut state = self.lock();
        state
            .providers
            .entry(call.provider)
            .or_insert_with(|| ProviderStats::named(call.provider.as_str()))
            .record(call.error.is_none(), false, call.duration, call.result_count, call.error.as_deref());
    }

    /// Stats for one selector label
    pub fn selector_stats(&self, selector: &str) -> Option<ProviderStatsSnapshot> {
        self.lock().selectors.get(selector).map(ProviderStats::snapshot)
    }

    /// Stats for one provider
    pub fn provider_stats(&self, provider: ProviderId) -> Option<ProviderStatsSnapshot> {
        self.lock().providers.get(&provider).map(ProviderStats::snapshot)
    }

    pub fn all_provider_stats(&self) -> BTreeMap<String, ProviderStatsSnapshot> {
        self.lock()
            .providers
            .values()
            .map(|s| (s.name.clone(), s.snapshot()))
            .collect()
    }

    pub fn overall_stats(&self) -> OverallStats {
        self.lock().overall()
    }

    /// Most recent calls, newest first
    pub fn recent_searches(&self, limit: usize) -> Vec<SearchRecord> {
        self.lock().recent(limit)
    }

    pub fn generate_report(&self) -> PerformanceReport {
        let state = self.lock();

        PerformanceReport {
            generated_at: Utc::now(),
            overall: state.overall(),
            engines: state
                .selectors
                .values()
                .map(|s| (s.name.clone(), s.snapshot()))
                .collect(),
            providers: state
                .providers
                .values()
                .map(|s| (s.name.clone(), s.snapshot()))
                .collect(),
            recent_searches: state.recent(20),
        }
    }

    /// Write the current report as pretty JSON, creating parent directories
    pub async fn export_report(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let report = self.generate_report();
        let body = serde_json::to_vec_pretty(&report)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, body).await?;

        info!("Performance report exported to: {}", path.display());
        Ok(())
    }

    /// Drop all stats and restart the uptime clock
    pub fn reset(&self) {
        *self.lock() = MonitorState::new();
        info!("Performance monitor reset");
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(selector: &str, success: bool, cached: bool, results: usize, millis: i64) -> SearchMetrics {
        let start = Utc::now();
        SearchMetrics {
            query: format!("query-{}", results),
            selector: selector.to_string(),
            start_time: start,
            end_time: start + chrono::Duration::milliseconds(millis),
            success,
            cached,
            result_count: results,
            error: if success { None } else { Some("all providers failed".to_string()) },
        }
    }

    #[test]
    fn test_selector_stats_aggregation() {
        let monitor = PerformanceMonitor::default();
        monitor.record_search(metrics("auto", true, false, 10, 200));
        monitor.record_search(metrics("auto", true, true, 6, 0));
        monitor.record_search(metrics("auto", false, false, 0, 400));

        let stats = monitor.selector_stats("auto").unwrap();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.successful_requests, 2);
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.cached_requests, 1);
        assert_eq!(stats.success_rate, 66.67);
        assert_eq!(stats.cache_hit_rate, 33.33);
        assert_eq!(stats.avg_results, 8.0);
        assert_eq!(stats.avg_duration, 0.1);
        assert_eq!(stats.error_count, 1);
    }

    #[test]
    fn test_overall_stats() {
        let monitor = PerformanceMonitor::default();
        monitor.record_search(metrics("auto", true, false, 5, 10));
        monitor.record_search(metrics("google", false, false, 0, 10));

        let overall = monitor.overall_stats();
        assert_eq!(overall.total_requests, 2);
        assert_eq!(overall.failed_requests, 1);
        assert_eq!(overall.success_rate, 50.0);
        assert_eq!(overall.engines, 2);
        assert_eq!(overall.recent_searches_count, 2);
    }

    #[test]
    fn test_ring_buffer_is_bounded_and_newest_first() {
        let monitor = PerformanceMonitor::new(3);
        for n in 0..5 {
            monitor.record_search(metrics("auto", true, false, n, 1));
        }

        let recent = monitor.recent_searches(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].query, "query-4");
        assert_eq!(recent[2].query, "query-2");
        assert_eq!(monitor.overall_stats().total_requests, 5);
    }

    #[test]
    fn test_provider_calls_tracked_separately() {
        let monitor = PerformanceMonitor::default();
        monitor.record_provider_call(ProviderCall {
            provider: ProviderId::Brave,
            duration: Duration::from_millis(120),
            result_count: 10,
            error: None,
        });
        monitor.record_provider_call(ProviderCall {
            provider: ProviderId::Brave,
            duration: Duration::from_millis(30),
            result_count: 0,
            error: Some("HTTP 429".to_string()),
        });

        let stats = monitor.provider_stats(ProviderId::Brave).unwrap();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.recent_errors, vec!["HTTP 429".to_string()]);
        assert_eq!(monitor.overall_stats().total_requests, 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let monitor = PerformanceMonitor::default();
        monitor.record_search(metrics("all", true, false, 3, 5));
        monitor.reset();

        assert_eq!(monitor.overall_stats().total_requests, 0);
        assert!(monitor.recent_searches(5).is_empty());
        assert!(monitor.selector_stats("all").is_none());
    }

    #[tokio::test]
    async fn test_export_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("perf.json");

        let monitor = PerformanceMonitor::default();
        monitor.record_search(metrics("auto", true, false, 4, 50));
        monitor.export_report(&path).await.unwrap();

        let written: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["overall"]["total_requests"], 1);
        assert_eq!(written["engines"]["auto"]["avg_results"], 4.0);
        assert_eq!(written["recent_searches"].as_array().unwrap().len(), 1);
    }
}

use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{event, Level};
use uuid::Uuid;
use crate::error::SearchError;
use crate::observability::monitor::SearchMetrics;
use crate::types::ProviderId;

/// Structured JSON logging service with trace_id injection
#[derive(Debug, Clone)]
pub struct LoggingService {
    service_name: String,
    service_version: String,
    environment: String,
}

impl Default for LoggingService {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingService {
    /// Create a new logging service
    pub fn new() -> Self {
        let service_name = env::var("SERVICE_NAME")
            .unwrap_or_else(|_| "web-search-aggregator".to_string());

        let service_version = env::var("SERVICE_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let environment = env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string());

        Self {
            service_name,
            service_version,
            environment,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn service_version(&self) -> &str {
        &self.service_version
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Log a structured message with trace_id
    pub fn log_structured(&self, level: Level, message: &str, fields: Option<HashMap<String, Value>>) {
        let trace_id = Uuid::new_v4();

        let mut log_entry = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "level": level.to_string().to_uppercase(),
            "message": message,
            "trace_id": trace_id.to_string(),
            "service": {
                "name": self.service_name,
                "version": self.service_version,
                "environment": self.environment
            }
        });

        if let Some(fields) = fields {
            if let Value::Object(ref mut map) = log_entry {
                for (key, value) in fields {
                    map.insert(key, value);
                }
            }
        }

        match level {
            Level::ERROR => event!(Level::ERROR, %trace_id, "{}", log_entry),
            Level::WARN => event!(Level::WARN, %trace_id, "{}", log_entry),
            Level::INFO => event!(Level::INFO, %trace_id, "{}", log_entry),
            Level::DEBUG => event!(Level::DEBUG, %trace_id, "{}", log_entry),
            Level::TRACE => event!(Level::TRACE, %trace_id, "{}", log_entry),
        }
    }

    /// Log one finished orchestration call
    pub fn log_search(&self, metrics: &SearchMetrics) {
        let mut fields = HashMap::from([
            ("query".to_string(), json!(sanitize_query(&metrics.query))),
            ("engine".to_string(), json!(metrics.selector)),
            ("duration_ms".to_string(), json!(metrics.duration().as_secs_f64() * 1000.0)),
            ("num_results".to_string(), json!(metrics.result_count)),
            ("success".to_string(), json!(metrics.success)),
            ("cached".to_string(), json!(metrics.cached)),
        ]);

        if let Some(ref error) = metrics.error {
            fields.insert("error".to_string(), json!(error));
        }

        let (level, message) = if metrics.success {
            (Level::INFO, "Search completed")
        } else {
            (Level::WARN, "Search returned no results")
        };

        self.log_structured(level, message, Some(fields));
    }

    /// Log a cache management or lookup operation
    pub fn log_cache_operation(&self, operation: &str, cache_type: &str, key: Option<&str>, details: Option<HashMap<String, Value>>) {
        let mut fields = HashMap::from([
            ("operation".to_string(), json!(operation)),
            ("cache_type".to_string(), json!(cache_type)),
        ]);

        if let Some(key) = key {
            fields.insert("sanitized_key".to_string(), json!(sanitize_cache_key(key)));
        }

        if let Some(details) = details {
            fields.extend(details);
        }

        self.log_structured(Level::DEBUG, "Cache operation", Some(fields));
    }

    /// Log time spent waiting on a provider's token bucket
    pub fn log_rate_limit(&self, provider: ProviderId, waited: Duration, tokens: u32) {
        let fields = HashMap::from([
            ("engine".to_string(), json!(provider.as_str())),
            ("wait_seconds".to_string(), json!(waited.as_secs_f64())),
            ("tokens".to_string(), json!(tokens)),
        ]);

        self.log_structured(Level::INFO, "Rate limit wait", Some(fields));
    }

    /// Log error with context
    pub fn log_error(&self, error: &SearchError, context: Option<HashMap<String, Value>>) {
        let mut fields = HashMap::from([
            ("error_type".to_string(), json!(error.error_type())),
            ("error_message".to_string(), json!(error.to_string())),
        ]);

        if let Some(context) = context {
            fields.extend(context);
        }

        self.log_structured(Level::ERROR, "Error occurred", Some(fields));
    }
}

fn email_pattern() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").ok())
        .as_ref()
}

fn phone_pattern() -> Option<&'static Regex> {
    static PHONE: OnceLock<Option<Regex>> = OnceLock::new();
    PHONE
        .get_or_init(|| Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").ok())
        .as_ref()
}

/// Sanitize query for logging (remove PII, truncate)
pub fn sanitize_query(query: &str) -> String {
    let mut sanitized = query.to_string();

    if let Some(email) = email_pattern() {
        sanitized = email.replace_all(&sanitized, "[EMAIL]").into_owned();
    }

    if let Some(phone) = phone_pattern() {
        sanitized = phone.replace_all(&sanitized, "[PHONE]").into_owned();
    }

    if sanitized.chars().count() > 200 {
        sanitized = sanitized.chars().take(197).collect();
        sanitized.push_str("...");
    }

    sanitized
}

/// Shorten cache keys for logging
pub fn sanitize_cache_key(key: &str) -> String {
    if key.len() > 50 && key.is_char_boundary(20) && key.is_char_boundary(key.len() - 10) {
        format!("{}...{}", &key[..20], &key[key.len() - 10..])
    } else {
        key.to_string()
    }
}

impl SearchError {
    /// Get error type as string for logging
    pub fn error_type(&self) -> &'static str {
        match self {
            SearchError::InvalidRequest(_) => "invalid_request",
            SearchError::ProviderUnavailable(_) => "provider_unavailable",
            SearchError::ProviderRejected(_) => "provider_rejected",
            SearchError::Network(_) => "network_error",
            SearchError::Timeout(_) => "timeout",
            SearchError::Parse(_) => "parse_error",
            SearchError::CacheError(_) => "cache_error",
            SearchError::ConfigError(_) => "config_error",
            SearchError::IoError(_) => "io_error",
            SearchError::SerializationError(_) => "serialization_error",
            SearchError::Internal(_) => "internal_error",
        }
    }
}

use thiserror::Error;

/// Main error type for the search aggregator
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Provider is not configured or lacks credentials
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider refused the request (auth, quota, bad request)
    #[error("Provider rejected request: {0}")]
    ProviderRejected(String),

    /// Network-level failure talking to a provider
    #[error("Network error: {0}")]
    Network(String),

    /// Provider call exceeded its deadline
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Provider payload could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Cache operation error
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SearchError {
    /// Transient faults that are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, SearchError::Network(_) | SearchError::Timeout(_))
    }

    /// Check if error originated from a search provider
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            SearchError::ProviderUnavailable(_)
                | SearchError::ProviderRejected(_)
                | SearchError::Network(_)
                | SearchError::Timeout(_)
                | SearchError::Parse(_)
        )
    }

    /// Check if error is related to the cache tiers
    pub fn is_cache_error(&self) -> bool {
        matches!(self, SearchError::CacheError(_))
    }
}

impl From<std::io::Error> for SearchError {
    fn from(err: std::io::Error) -> Self {
        SearchError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::SerializationError(err.to_string())
    }
}

impl From<rusqlite::Error> for SearchError {
    fn from(err: rusqlite::Error) -> Self {
        SearchError::CacheError(err.to_string())
    }
}

/// Result type alias for search operations
pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SearchError::Network("connection reset".to_string()).is_retryable());
        assert!(SearchError::Timeout("30s elapsed".to_string()).is_retryable());
        assert!(!SearchError::ProviderRejected("401".to_string()).is_retryable());
        assert!(!SearchError::ProviderUnavailable("no key".to_string()).is_retryable());
        assert!(!SearchError::Parse("bad json".to_string()).is_retryable());
    }

    #[test]
    fn test_provider_error_classification() {
        assert!(SearchError::Parse("x".to_string()).is_provider_error());
        assert!(!SearchError::CacheError("x".to_string()).is_provider_error());
        assert!(SearchError::CacheError("x".to_string()).is_cache_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.json");
        let err: SearchError = io.into();
        assert!(matches!(err, SearchError::IoError(_)));
        assert!(err.to_string().contains("missing.json"));
    }
}

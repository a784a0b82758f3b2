use tracing::subscriber::set_global_default;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
use crate::error::{Result, SearchError};

const DEFAULT_FILTER: &str = "info,web_search_aggregator=debug";

/// Output encoding of the global subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl LogFormat {
    /// Read `LOG_FORMAT`; anything other than `text` means JSON
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT") {
            Ok(value) if value.trim().eq_ignore_ascii_case("text") => LogFormat::Text,
            _ => LogFormat::Json,
        }
    }
}

/// Filter from explicit directives, falling back to the crate default
/// when they are absent or do not parse
pub fn build_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber honoring `RUST_LOG` and `LOG_FORMAT`.
///
/// Fails if a global subscriber has already been installed.
pub fn init_tracing() -> Result<()> {
    let directives = std::env::var("RUST_LOG").ok();
    init_tracing_with(build_filter(directives.as_deref()), LogFormat::from_env())
}

pub fn init_tracing_with(filter: EnvFilter, format: LogFormat) -> Result<()> {
    let installed = match format {
        LogFormat::Json => set_global_default(
            Registry::default()
                .with(filter)
                .with(fmt::layer().json().with_current_span(false).with_span_list(true)),
        ),
        LogFormat::Text => set_global_default(
            Registry::default()
                .with(filter)
                .with(fmt::layer().compact().with_target(true)),
        ),
    };

    installed.map_err(|e| SearchError::Internal(format!("Failed to set global subscriber: {}", e)))
}

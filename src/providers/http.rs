//! Shared HTTP plumbing for provider requests

use crate::error::{Result, SearchError};
use crate::types::ProviderId;
use rand::seq::SliceRandom;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Browser User-Agent strings, rotated per client
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
];

pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Build a client with the provider timeout and an optional proxy
pub fn build_client(timeout: Duration, proxy: Option<&str>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(random_user_agent())
        .redirect(reqwest::redirect::Policy::limited(10));

    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| SearchError::ConfigError(format!("Invalid proxy {}: {}", proxy, e)))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| SearchError::ConfigError(format!("Failed to build HTTP client: {}", e)))
}

/// Map a non-success HTTP status onto the provider fault taxonomy
pub fn classify_status(provider: ProviderId, status: StatusCode) -> SearchError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SearchError::ProviderRejected(format!("{}: API key is invalid or expired (HTTP {})", provider, status.as_u16()))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            SearchError::ProviderRejected(format!("{}: API quota exceeded (HTTP 429)", provider))
        }
        StatusCode::REQUEST_TIMEOUT => {
            SearchError::Timeout(format!("{}: server reported request timeout", provider))
        }
        s if s.is_server_error() => SearchError::Network(format!("{}: server error (HTTP {})", provider, s.as_u16())),
        s => SearchError::ProviderRejected(format!("{}: HTTP {}", provider, s.as_u16())),
    }
}

/// Map a transport-level failure onto the provider fault taxonomy
pub fn map_request_error(provider: ProviderId, err: reqwest::Error) -> SearchError {
    if err.is_timeout() {
        SearchError::Timeout(format!("{}: {}", provider, err))
    } else if err.is_decode() {
        SearchError::Parse(format!("{}: {}", provider, err))
    } else if let Some(status) = err.status() {
        classify_status(provider, status)
    } else {
        SearchError::Network(format!("{}: {}", provider, err))
    }
}

/// Send a request and return the response if its status is a success
pub async fn send(provider: ProviderId, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
    let response = request.send().await.map_err(|e| map_request_error(provider, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(classify_status(provider, status));
    }

    Ok(response)
}

/// Send a request and decode its JSON body
pub async fn get_json<T: DeserializeOwned>(provider: ProviderId, request: reqwest::RequestBuilder) -> Result<T> {
    let body = send(provider, request)
        .await?
        .text()
        .await
        .map_err(|e| map_request_error(provider, e))?;

    serde_json::from_str(&body)
        .map_err(|e| SearchError::Parse(format!("{}: unexpected response body: {}", provider, e)))
}

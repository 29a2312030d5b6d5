//! reqwest plumbing shared by the HTTP adapters

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::config::{ConfigError, USER_AGENT};
use crate::upstream::error::FetchError;

/// Builds a client whose every request is bounded by `timeout`
pub fn build_client(default_headers: HeaderMap, timeout: Duration) -> Result<Client, ConfigError> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(default_headers)
        .timeout(timeout)
        .build()?)
}

/// Map non-success statuses to `FetchError`
///
/// 404 is not handled here; adapters that treat it as absence check for it first.
pub fn ensure_success(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && header_u64(response.headers(), "x-ratelimit-remaining") == Some(0));
    if rate_limited {
        return Err(FetchError::RateLimited {
            retry_after_secs: header_u64(response.headers(), RETRY_AFTER.as_str()),
        });
    }

    let url = response.url().to_string();
    warn!("Upstream returned status {}: {}", status, url);
    Err(FetchError::Status {
        status: status.as_u16(),
        url,
    })
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Decode each element independently, logging and dropping the ones that do
/// not match `T`
pub fn decode_each<T: DeserializeOwned>(values: Vec<serde_json::Value>, what: &str) -> Vec<T> {
    values
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| {
            serde_json::from_value(value)
                .inspect_err(|e| warn!("Skipping malformed {} at index {}: {}", what, i, e))
                .ok()
        })
        .collect()
}

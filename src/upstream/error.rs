use thiserror::Error;

/// Failure talking to an upstream service
///
/// Cloneable so a single refresh result can be handed to every caller that
/// waited on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Rate limited: retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return FetchError::Timeout;
        }
        if e.is_decode() {
            return FetchError::InvalidResponse(e.to_string());
        }
        FetchError::Transport(e.to_string())
    }
}

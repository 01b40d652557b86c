// Error handling module
// Defines the errors callers of the dispatcher can observe

use thiserror::Error;

/// Network-level failure, always propagated to the caller unchanged
#[derive(Error, Debug)]
pub enum TransportError {
    /// The request did not complete within its timeout
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    /// The connection could not be established
    #[error("Connection to {url} failed: {message}")]
    Connect { url: String, message: String },

    /// The request could not be built (bad URL, header, or proxy)
    #[error("Invalid request to {url}: {message}")]
    InvalidRequest { url: String, message: String },

    /// Any other failure while sending or reading the response
    #[error("Request to {url} failed: {message}")]
    Other { url: String, message: String },
}

impl TransportError {
    /// Categorize a reqwest error
    pub fn from_reqwest(url: &str, error: reqwest::Error) -> Self {
        let url = url.to_string();
        if error.is_timeout() {
            TransportError::Timeout { url }
        } else if error.is_connect() {
            TransportError::Connect {
                url,
                message: error.to_string(),
            }
        } else if error.is_builder() {
            TransportError::InvalidRequest {
                url,
                message: error.to_string(),
            }
        } else {
            TransportError::Other {
                url,
                message: error.to_string(),
            }
        }
    }

    /// Short label for logging
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Timeout { .. } => "timeout",
            TransportError::Connect { .. } => "connection_failed",
            TransportError::InvalidRequest { .. } => "invalid_request",
            TransportError::Other { .. } => "unknown",
        }
    }
}

/// Errors returned by `fetch` and `fetch_json`
#[derive(Error, Debug)]
pub enum FetchError {
    /// The caller supplied an argument the dispatcher reserves
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Network failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Non-success status (only raised by `fetch_json`)
    #[error("HTTP error: {status} for {url}")]
    Status { status: u16, url: String },

    /// Body was not valid JSON
    #[error("Failed to decode JSON body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result type alias for dispatcher operations
pub type Result<T> = std::result::Result<T, FetchError>;

//! Error types for the grid client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the grid
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection could not be established
    #[error("Grid unavailable: {0}")]
    Unavailable(String),

    /// The grid did not answer in time
    #[error("Grid timed out: {0}")]
    Slow(String),

    /// HTTP request failed for another transport reason
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Unavailable(err.to_string())
        } else if err.is_timeout() {
            Self::Slow(err.to_string())
        } else if err.is_decode() {
            Self::ParseError(err.to_string())
        } else {
            Self::RequestFailed(err.to_string())
        }
    }
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Check if the grid could not be reached at all
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Check if the grid timed out
    pub fn is_slow(&self) -> bool {
        matches!(self, Self::Slow(_))
    }

    /// Check if retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        self.is_unavailable() || self.is_slow()
    }
}

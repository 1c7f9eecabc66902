//! Error types for backend probing

use thiserror::Error;

/// Result type alias for probe operations
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Errors raised by a single probe request
///
/// The public probe operations swallow these and report absence instead;
/// they exist so callers inside the crate can tell "answered with 401"
/// from "nothing listening".
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Nothing answered (connection refused, DNS, timeout)
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    /// The backend answered with a non-200 status
    #[error("Unexpected status {0}")]
    Status(u16),

    /// The body was not the JSON we expected
    #[error("Invalid response body: {0}")]
    Body(String),

    /// Building the HTTP client failed
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl ProbeError {
    /// Check if the backend demanded credentials
    pub fn is_auth_required(&self) -> bool {
        matches!(self, Self::Status(401) | Self::Status(403))
    }

    /// Check if a server answered at all
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Status(_) | Self::Body(_))
    }
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Body(err.to_string())
        } else if err.is_builder() {
            Self::Client(err.to_string())
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}

//! API error types for the ZenTao client.

use thiserror::Error;

/// Errors that can occur when interacting with the ZenTao API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Authentication failed - invalid account, password or token.
    #[error("Authentication failed: check your account and password")]
    Unauthorized,

    /// Permission denied - user lacks access to the resource.
    #[error("Permission denied: you don't have access to this resource")]
    Forbidden,

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Rate limited by the server.
    #[error("Rate limited: please wait before retrying")]
    RateLimited,

    /// ZenTao server error.
    #[error("ZenTao server error: {0}")]
    ServerError(String),

    /// Network or HTTP error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Keyring error when storing/retrieving credentials.
    #[error("Keyring error: {0}")]
    Keyring(String),

    /// Invalid response from the API.
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// No usable session: base URL or token is missing.
    #[error("Not logged in: run `zentao login` first")]
    NotLoggedIn,

    /// Stored or supplied credentials are incomplete.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Create an error from an HTTP status code.
    pub fn from_status(status: reqwest::StatusCode, context: &str) -> Self {
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden,
            404 => ApiError::NotFound(context.to_string()),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(format!("HTTP {}: {}", status, context)),
            _ => ApiError::ServerError(format!("Unexpected HTTP {}: {}", status, context)),
        }
    }
}

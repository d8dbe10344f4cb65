//! Centralized error types for zentao-cli.
//!
//! This module provides a unified error hierarchy for the application with
//! user-friendly error messages. All error types use `thiserror` for
//! ergonomic error handling.

use thiserror::Error;

use crate::api::error::ApiError;
use crate::config::ConfigError;

/// The main application error type.
///
/// Aggregates the errors that can reach the command line, keeping the
/// underlying error for logs while offering a plain message for display.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration-related errors.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// API-related errors.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// IO errors (file system, terminal input).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A command ran without something it needs.
    #[error("{0}")]
    Precondition(String),
}

impl AppError {
    /// Create a precondition error.
    pub fn precondition(msg: impl Into<String>) -> Self {
        AppError::Precondition(msg.into())
    }

    /// Get a user-friendly message for display.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Config(e) => match e {
                ConfigError::NoConfigDir => {
                    "Could not find configuration directory. Please check your system settings."
                        .to_string()
                }
                ConfigError::CreateDirError(_) => {
                    "Could not create configuration directory. Check file permissions.".to_string()
                }
                ConfigError::ReadError(_) => {
                    "Could not read configuration file. Please check it is readable.".to_string()
                }
                ConfigError::WriteError(_) => {
                    "Could not save configuration. Please check file permissions.".to_string()
                }
                ConfigError::ParseError(_) => {
                    "Configuration file is invalid. Please check the file format.".to_string()
                }
                ConfigError::SerializeError(_) => {
                    "Could not save configuration. Internal error.".to_string()
                }
                ConfigError::ValidationError(msg) => format!("Configuration error: {}", msg),
            },
            AppError::Api(e) => match e {
                ApiError::Unauthorized => {
                    "Authentication failed. Please check your account and password.".to_string()
                }
                ApiError::Forbidden => {
                    "Access denied. You don't have permission to access this resource.".to_string()
                }
                ApiError::NotFound(resource) => format!("'{}' was not found.", resource),
                ApiError::RateLimited => {
                    "Too many requests. Please wait a moment and try again.".to_string()
                }
                ApiError::ServerError(_) => {
                    "ZenTao server error. Please try again later.".to_string()
                }
                ApiError::Network(_) => {
                    "Connection failed. Please check the server URL and your network.".to_string()
                }
                ApiError::InvalidUrl(msg) => format!("Invalid ZenTao URL: {}", msg),
                ApiError::Keyring(_) => {
                    "Could not access secure storage. Please log in again.".to_string()
                }
                ApiError::InvalidResponse(_) => {
                    "Unexpected response from ZenTao. Please try again.".to_string()
                }
                ApiError::NotLoggedIn => "You are not logged in to ZenTao.".to_string(),
                ApiError::InvalidCredentials(msg) => format!("Invalid login details: {}", msg),
            },
            AppError::Io(_) => "An input/output operation failed.".to_string(),
            AppError::Precondition(msg) => msg.clone(),
        }
    }

    /// Get a suggested action for the user.
    pub fn suggested_action(&self) -> Option<&'static str> {
        match self {
            AppError::Api(ApiError::Unauthorized) | AppError::Api(ApiError::NotLoggedIn) => {
                Some("Run 'zentao login' to sign in again.")
            }
            AppError::Api(ApiError::Keyring(_)) => {
                Some("Run 'zentao logout --forget' to reset the stored record, or pass --no-keyring.")
            }
            AppError::Config(ConfigError::ParseError(_))
            | AppError::Config(ConfigError::ValidationError(_)) => {
                Some("Fix or remove the file shown by 'zentao config-path'.")
            }
            AppError::Api(ApiError::Network(_)) => {
                Some("Check your network connection and the ZenTao URL.")
            }
            _ => None,
        }
    }
}

/// Result type for application operations.
pub type Result<T> = std::result::Result<T, AppError>;

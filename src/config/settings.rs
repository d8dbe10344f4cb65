//! Application settings configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ConfigError, Result};
use crate::api::client::{ClientOptions, DEFAULT_PROBE_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS};
use crate::picker::StatusFilter;

/// Application-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Timeout for every API request, in seconds.
    pub request_timeout_secs: u64,
    /// Timeout for the server configuration probe, in seconds.
    pub probe_timeout_secs: u64,
    /// Per-type switches narrowing picker lists to open items.
    pub status_filter: StatusFilter,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            status_filter: StatusFilter::default(),
        }
    }
}

impl Settings {
    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if a timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.probe_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "probe_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// HTTP settings for the API client.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.request_timeout_secs, 30);
        assert_eq!(settings.probe_timeout_secs, 5);
        assert!(settings.status_filter.story);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let settings = Settings {
            request_timeout_secs: 0,
            ..Default::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn test_client_options() {
        let settings = Settings {
            request_timeout_secs: 10,
            probe_timeout_secs: 2,
            ..Default::default()
        };
        let options = settings.client_options();
        assert_eq!(options.request_timeout, Duration::from_secs(10));
        assert_eq!(options.probe_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            request_timeout_secs = 12

            [status_filter]
            bug = false
            "#,
        )
        .unwrap();

        assert_eq!(settings.request_timeout_secs, 12);
        assert_eq!(settings.probe_timeout_secs, 5);
        assert!(!settings.status_filter.bug);
        assert!(settings.status_filter.task);
    }
}

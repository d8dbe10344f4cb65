//! Credential storage for the ZenTao API.
//!
//! Credentials (server URL, account, password and API token) are persisted
//! as one JSON record per profile, so a save never leaves the four fields
//! out of step with each other. The OS keyring is the production backend;
//! an in-memory store is provided for tests and keyring-less runs.

use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{ApiError, Result};

/// The keyring service name for zentao-cli credentials.
const KEYRING_SERVICE: &str = "zentao-cli";

/// Login details for a ZenTao server.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// The server base URL (e.g. "https://zentao.example.com/").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// The login account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// The account password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// A token previously issued by `POST api.php/v1/tokens`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Credentials {
    /// Create credentials from a URL, account and password.
    pub fn new(url: &str, account: &str, password: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            account: Some(account.to_string()),
            password: Some(password.to_string()),
            token: None,
        }
    }

    /// The non-empty token, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    /// The non-empty server URL, if any.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.is_empty())
    }

    /// Validate credentials supplied for a login.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidUrl` if the URL is not http(s), and
    /// `ApiError::InvalidCredentials` if it is missing or if neither a token
    /// nor an account/password pair is given.
    pub fn validate(&self) -> Result<()> {
        let url = self
            .url()
            .ok_or_else(|| ApiError::InvalidCredentials("server URL cannot be empty".to_string()))?;

        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(ApiError::InvalidUrl(format!(
                "'{}' must start with http:// or https://",
                url
            )));
        }

        if self.token().is_some() {
            return Ok(());
        }

        match (self.account.as_deref(), self.password.as_deref()) {
            (Some(a), Some(_)) if !a.is_empty() => Ok(()),
            _ => Err(ApiError::InvalidCredentials(
                "account and password are required".to_string(),
            )),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("account", &self.account)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Asynchronous storage for a credential record.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the stored credentials, `None` if nothing has been saved.
    async fn load(&self) -> Result<Option<Credentials>>;

    /// Replace the stored record with `credentials` in one write.
    async fn save(&self, credentials: &Credentials) -> Result<()>;

    /// Remove the stored record.
    async fn clear(&self) -> Result<()>;
}

/// Credential store backed by the OS keyring.
///
/// Each profile owns one keyring entry whose secret is the JSON record.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    profile: String,
}

impl KeyringStore {
    /// Create a store for the given profile name.
    pub fn new(profile: &str) -> Self {
        Self {
            profile: profile.to_string(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(KEYRING_SERVICE, &self.profile)
            .map_err(|e| ApiError::Keyring(format!("failed to access keyring: {}", e)))
    }
}

#[async_trait]
impl CredentialStore for KeyringStore {
    async fn load(&self) -> Result<Option<Credentials>> {
        let secret = match self.entry()?.get_password() {
            Ok(secret) => secret,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => {
                return Err(ApiError::Keyring(format!(
                    "failed to retrieve credentials: {}",
                    e
                )))
            }
        };

        let credentials = serde_json::from_str(&secret)
            .map_err(|e| ApiError::Keyring(format!("stored credentials are corrupt: {}", e)))?;
        debug!(profile = %self.profile, "Loaded credentials from keyring");
        Ok(Some(credentials))
    }

    async fn save(&self, credentials: &Credentials) -> Result<()> {
        let secret = serde_json::to_string(credentials)
            .map_err(|e| ApiError::Keyring(format!("failed to encode credentials: {}", e)))?;

        self.entry()?
            .set_password(&secret)
            .map_err(|e| ApiError::Keyring(format!("failed to store credentials: {}", e)))?;
        debug!(profile = %self.profile, "Stored credentials in keyring");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(ApiError::Keyring(format!(
                "failed to delete credentials: {}",
                e
            ))),
        }
    }
}

/// In-process credential store.
///
/// Nothing it holds survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<Credentials>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `credentials`.
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            record: Mutex::new(Some(credentials)),
        }
    }

    fn record(&self) -> std::sync::MutexGuard<'_, Option<Credentials>> {
        self.record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load(&self) -> Result<Option<Credentials>> {
        Ok(self.record().clone())
    }

    async fn save(&self, credentials: &Credentials) -> Result<()> {
        *self.record() = Some(credentials.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.record() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_valid() {
        let creds = Credentials::new("https://zentao.example.com/", "alice", "secret");
        assert!(creds.validate().is_ok());
    }

    #[test]
    fn test_credentials_token_only_valid() {
        let creds = Credentials {
            url: Some("http://localhost:8080/".to_string()),
            token: Some("abc".to_string()),
            ..Default::default()
        };
        assert!(creds.validate().is_ok());
    }

    #[test]
    fn test_credentials_missing_url_rejected() {
        let creds = Credentials::new("", "alice", "secret");
        let err = creds.validate().unwrap_err();
        assert!(err.to_string().contains("URL cannot be empty"));
    }

    #[test]
    fn test_credentials_bad_scheme_rejected() {
        let creds = Credentials::new("zentao.example.com", "alice", "secret");
        let err = creds.validate().unwrap_err();
        assert!(matches!(err, ApiError::InvalidUrl(_)));
        assert!(err.to_string().contains("must start with http"));
    }

    #[test]
    fn test_credentials_missing_account_rejected() {
        let creds = Credentials {
            url: Some("https://zentao.example.com/".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        };
        let err = creds.validate().unwrap_err();
        assert!(err.to_string().contains("account and password"));
    }

    #[test]
    fn test_empty_token_is_absent() {
        let creds = Credentials {
            token: Some(String::new()),
            ..Default::default()
        };
        assert!(creds.token().is_none());
    }

    #[test]
    fn test_credentials_debug_does_not_expose_secrets() {
        let mut creds = Credentials::new("https://zentao.example.com/", "alice", "hunter2");
        creds.token = Some("tok-123".to_string());
        let debug_output = format!("{:?}", creds);

        assert!(!debug_output.contains("hunter2"));
        assert!(!debug_output.contains("tok-123"));
        assert!(debug_output.contains("alice"));
    }

    #[test]
    fn test_credentials_serialization_skips_absent_fields() {
        let creds = Credentials {
            url: Some("https://zentao.example.com/".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&creds).unwrap();
        assert_eq!(json, r#"{"url":"https://zentao.example.com/"}"#);
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip_and_clear() {
        let store = MemoryStore::new();
        assert!(store.load().await.unwrap().is_none());

        let creds = Credentials::new("https://zentao.example.com/", "alice", "secret");
        store.save(&creds).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(creds));

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_save_replaces_whole_record() {
        let mut creds = Credentials::new("https://zentao.example.com/", "alice", "secret");
        creds.token = Some("old".to_string());
        let store = MemoryStore::with_credentials(creds);

        let replacement = Credentials::new("https://other.example.com/", "bob", "pw");
        store.save(&replacement).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.account.as_deref(), Some("bob"));
        assert!(loaded.token.is_none());
    }
}

//! ZenTao API client implementation.
//!
//! This module provides the main client for the ZenTao REST API
//! (`api.php/v1`). It owns the session (base URL, token and the cached user
//! profile, server configuration and commit rules), exchanges credentials for
//! tokens, and exposes one accessor per resource.
//!
//! Accessors never propagate request failures: they report a [`Notice`] to
//! the configured [`Notifier`] and return `None`. Only construction and
//! [`ZentaoClient::login`] return `Result`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use super::auth::{CredentialStore, Credentials};
use super::error::{ApiError, Result};
use super::types::{
    Bug, CommitRules, Execution, PageInfo, Product, ProfileResponse, Project, ServerConfig,
    ServerMode, Story, Task, TokenRequest, TokenResponse, User,
};
use crate::notice::{Notice, Notifier};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default timeout for the server configuration probe in seconds.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Header carrying the API token.
const TOKEN_HEADER: &str = "Token";

/// HTTP settings for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Timeout applied to every request.
    pub request_timeout: Duration,
    /// Timeout for `index.php?mode=getconfig`.
    pub probe_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
        }
    }
}

/// Per-request options for [`ZentaoClient::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    query: Vec<(String, String)>,
    with_token: bool,
    timeout: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            query: Vec::new(),
            with_token: true,
            timeout: None,
        }
    }
}

impl RequestOptions {
    /// Options for an authenticated request with no query parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a query parameter.
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Send the request without the token header.
    pub fn without_token(mut self) -> Self {
        self.with_token = false;
        self
    }

    /// Override the client-wide timeout for this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// The state of a logged-in (or not yet logged-in) client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    /// Normalized server URL, without trailing slash.
    pub base_url: String,
    /// The API token.
    pub token: String,
    /// The current user's profile.
    pub user: Option<User>,
    /// Server configuration from the getconfig probe.
    pub server_config: Option<ServerConfig>,
    /// Commit-message matching rules.
    pub commit_rules: Option<CommitRules>,
}

impl Session {
    /// Whether both a server URL and a token are known.
    pub fn is_authenticated(&self) -> bool {
        !self.base_url.is_empty() && !self.token.is_empty()
    }
}

/// The ZenTao API client.
pub struct ZentaoClient {
    /// The HTTP client.
    client: Client,
    /// Session state, overwritten on every login.
    session: Session,
    /// Where credentials are persisted.
    store: Arc<dyn CredentialStore>,
    /// Where failures are reported.
    notifier: Arc<dyn Notifier>,
    /// HTTP settings.
    options: ClientOptions,
}

impl fmt::Debug for ZentaoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZentaoClient")
            .field("base_url", &self.session.base_url)
            .field("authenticated", &self.session.is_authenticated())
            .field("user", &self.session.user.as_ref().map(|u| &u.account))
            .field("options", &self.options)
            .finish()
    }
}

impl ZentaoClient {
    /// Create a client with an empty session.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
        options: ClientOptions,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(ApiError::Network)?;

        Ok(Self {
            client,
            session: Session::default(),
            store,
            notifier,
            options,
        })
    }

    /// Create a client and restore the session from the credential store.
    ///
    /// When a token is stored, the server configuration, commit rules and
    /// user profile are fetched before this returns, so the cached fields are
    /// settled as soon as the caller holds the client. A failing store is
    /// logged and leaves the session empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    #[instrument(skip_all)]
    pub async fn connect(
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
        options: ClientOptions,
    ) -> Result<Self> {
        let mut client = Self::new(store, notifier, options)?;

        match client.store.load().await {
            Ok(Some(credentials)) => {
                if let Some(url) = credentials.url() {
                    client.session.base_url = normalize_base_url(url);
                }
                if let Some(token) = credentials.token() {
                    client.session.token = token.to_string();
                }
            }
            Ok(None) => debug!("No stored credentials"),
            Err(e) => warn!(error = %e, "Failed to load stored credentials"),
        }

        if client.is_authenticated() {
            client.refresh_session().await;
        }

        Ok(client)
    }

    /// Log in and return the current user.
    ///
    /// Supplied credentials are validated and persisted first; without them
    /// the stored record is used. When no token is known, the account and
    /// password are exchanged for one via `POST api.php/v1/tokens` and the
    /// token is persisted. The server configuration and commit rules are then
    /// refreshed and the user profile is fetched.
    ///
    /// The session is reset on entry and again if the profile fetch fails,
    /// so a failed login leaves no usable token.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are invalid or missing, if the
    /// token exchange fails, or if the user profile cannot be fetched.
    #[instrument(skip_all)]
    pub async fn login(&mut self, credentials: Option<Credentials>) -> Result<User> {
        self.session = Session::default();

        let mut credentials = match credentials {
            Some(credentials) => {
                credentials.validate()?;
                if let Err(e) = self.store.save(&credentials).await {
                    warn!(error = %e, "Failed to persist credentials");
                }
                credentials
            }
            None => self.store.load().await?.ok_or(ApiError::NotLoggedIn)?,
        };

        let base_url = credentials
            .url()
            .map(normalize_base_url)
            .ok_or_else(|| ApiError::InvalidCredentials("no server URL is stored".to_string()))?;

        let stored_token = credentials.token().map(str::to_string);
        let token = match stored_token {
            Some(token) => token,
            None => {
                let token = self
                    .request_token(&base_url, &credentials)
                    .await
                    .map_err(|e| {
                        self.notifier.notify(Notice::from_error(&e, true));
                        e
                    })?;
                credentials.token = Some(token.clone());
                if let Err(e) = self.store.save(&credentials).await {
                    warn!(error = %e, "Failed to persist token");
                }
                token
            }
        };

        self.session.base_url = base_url;
        self.session.token = token;
        self.refresh_config().await;

        let user = match self.fetch_current_user().await {
            Ok(user) => user,
            Err(e) => {
                self.notifier.notify(Notice::from_error(&e, false));
                self.session = Session::default();
                return Err(e);
            }
        };
        info!(account = %user.account, "Logged in");
        self.notifier.notify(Notice::Info(format!(
            "Connected to {} as {}",
            self.session.base_url,
            user.display_name()
        )));
        self.session.user = Some(user.clone());
        Ok(user)
    }

    /// Forget the token, locally and in the credential store.
    ///
    /// The stored URL, account and password are kept for the next login.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential store cannot be updated.
    #[instrument(skip_all)]
    pub async fn logout(&mut self) -> Result<()> {
        self.session = Session::default();
        if let Some(mut credentials) = self.store.load().await? {
            credentials.token = None;
            self.store.save(&credentials).await?;
        }
        info!("Logged out");
        Ok(())
    }

    /// Drop the session and remove the whole stored record.
    ///
    /// The record is not read first, so an unreadable entry is removed too.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential store cannot be cleared.
    #[instrument(skip_all)]
    pub async fn forget(&mut self) -> Result<()> {
        self.session = Session::default();
        self.store.clear().await?;
        info!("Removed stored credentials");
        Ok(())
    }

    /// Re-fetch the server configuration, commit rules and user profile.
    ///
    /// Each part is best-effort: a failure is reported and leaves that
    /// cached field empty.
    pub async fn refresh_session(&mut self) {
        self.refresh_config().await;
        self.session.user = self.get_current_user().await;
    }

    async fn refresh_config(&mut self) {
        let (server_config, commit_rules) =
            tokio::join!(self.get_server_config(), self.get_repos_rules());
        self.session.server_config = server_config;
        self.session.commit_rules = commit_rules;
    }

    /// Exchange an account and password for a token.
    async fn request_token(&self, base_url: &str, credentials: &Credentials) -> Result<String> {
        let (account, password) = match (&credentials.account, &credentials.password) {
            (Some(account), Some(password)) if !account.is_empty() => (account, password),
            _ => {
                return Err(ApiError::InvalidCredentials(
                    "account and password are required".to_string(),
                ))
            }
        };

        debug!(%account, "Requesting token");
        let url = format!("{}/api.php/v1/tokens", base_url);
        let body = TokenRequest { account, password };
        let response = self.send_post(&url, &body, false).await?;

        let token: TokenResponse = from_body(response)?;
        if token.token.is_empty() {
            return Err(ApiError::InvalidResponse("server returned an empty token".to_string()));
        }
        Ok(token.token)
    }

    async fn fetch_current_user(&self) -> Result<User> {
        let url = self.api_url("user")?;
        let body = self.send_get(&url, &RequestOptions::new()).await?;
        let response: ProfileResponse = from_body(body)?;
        Ok(response.profile)
    }

    // ===== Generic requests =====

    /// GET an `api.php/v1` path.
    ///
    /// Returns the response object, or `None` after reporting a notice if
    /// the request fails, the status is not 2xx, or the body is not a JSON
    /// object.
    #[instrument(skip(self, options))]
    pub async fn get(&self, path: &str, options: &RequestOptions) -> Option<Map<String, Value>> {
        let result = match self.api_url(path) {
            Ok(url) => self.send_get(&url, options).await,
            Err(e) => Err(e),
        };
        self.report(result, false)
    }

    /// POST a JSON body to an `api.php/v1` path.
    ///
    /// Failures are reported as for [`ZentaoClient::get`]; a 401 is reported
    /// as bad credentials.
    #[instrument(skip(self, body))]
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Option<Map<String, Value>> {
        let result = match self.api_url(path) {
            Ok(url) => self.send_post(&url, body, true).await,
            Err(e) => Err(e),
        };
        self.report(result, true)
    }

    /// GET a paginated path, re-fetching once when the first page is short.
    ///
    /// If the response carries `limit` and `total` with `limit < total`, the
    /// same path is requested again with `limit=<total>` and that second
    /// response is returned. At most two requests are made; the server is
    /// trusted to honor any limit.
    pub async fn get_all(&self, path: &str) -> Option<Map<String, Value>> {
        let first = self.get(path, &RequestOptions::new()).await?;

        match PageInfo::from_body(&first).full_page_limit() {
            None => Some(first),
            Some(total) => {
                debug!(path, total, "Response truncated, re-fetching with full limit");
                self.get(path, &RequestOptions::new().query("limit", total))
                    .await
            }
        }
    }

    /// Fetch a paginated list and unwrap one named field.
    async fn list<T: DeserializeOwned>(&self, path: &str, field: &str) -> Option<Vec<T>> {
        let body = self.get_all(path).await?;
        let items: Vec<T> = self.report(take_field(body, field), false)?;
        debug!(path, count = items.len(), "Fetched list");
        Some(items)
    }

    async fn send_get(&self, url: &str, options: &RequestOptions) -> Result<Map<String, Value>> {
        let mut request = self
            .client
            .get(url)
            .header(header::CONTENT_TYPE, "application/json");

        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if options.with_token {
            request = request.header(TOKEN_HEADER, &self.session.token);
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        debug!(url, "GET");
        let response = request.send().await?;
        handle_response(response).await
    }

    async fn send_post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        with_token: bool,
    ) -> Result<Map<String, Value>> {
        let mut request = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(body);

        if with_token {
            request = request.header(TOKEN_HEADER, &self.session.token);
        }

        debug!(url, "POST");
        let response = request.send().await?;
        handle_response(response).await
    }

    /// Turn a failed result into a notice and `None`.
    fn report<T>(&self, result: Result<T>, is_post: bool) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "Request failed");
                self.notifier.notify(Notice::from_error(&e, is_post));
                None
            }
        }
    }

    /// Build an `api.php/v1` URL, requiring a known server URL.
    fn api_url(&self, path: &str) -> Result<String> {
        if self.session.base_url.is_empty() {
            return Err(ApiError::NotLoggedIn);
        }
        Ok(format!(
            "{}/api.php/v1/{}",
            self.session.base_url,
            path.trim_start_matches('/')
        ))
    }

    /// Fail early for resource lists when no token is known.
    fn require_token(&self) -> Option<()> {
        if self.session.is_authenticated() {
            Some(())
        } else {
            self.notifier.notify(Notice::NotLoggedIn);
            None
        }
    }

    // ===== Resource accessors =====

    /// Fetch the current user's profile.
    pub async fn get_current_user(&self) -> Option<User> {
        self.require_token()?;
        self.report(self.fetch_current_user().await, false)
    }

    /// Probe `index.php?mode=getconfig`. Sent without a token.
    pub async fn get_server_config(&self) -> Option<ServerConfig> {
        if self.session.base_url.is_empty() {
            self.notifier.notify(Notice::NotLoggedIn);
            return None;
        }

        let url = format!("{}/index.php", self.session.base_url);
        let options = RequestOptions::new()
            .query("mode", "getconfig")
            .without_token()
            .timeout(self.options.probe_timeout);
        let result = match self.send_get(&url, &options).await {
            Ok(body) => from_body(body),
            Err(e) => Err(e),
        };
        self.report(result, false)
    }

    /// Fetch the commit-message matching rules.
    ///
    /// Accepts the rules either bare or wrapped in a `rules` field.
    pub async fn get_repos_rules(&self) -> Option<CommitRules> {
        self.require_token()?;
        let mut body = self.get("repos/rules", &RequestOptions::new()).await?;
        let rules = match body.remove("rules") {
            Some(Value::Object(rules)) => rules,
            Some(other) => {
                body.insert("rules".to_string(), other);
                body
            }
            None => body,
        };
        self.report(from_body(rules), false)
    }

    /// List all products.
    pub async fn get_products(&self) -> Option<Vec<Product>> {
        self.require_token()?;
        self.list("products", "products").await
    }

    /// List the stories of a product.
    pub async fn get_product_stories(&self, product_id: u64) -> Option<Vec<Story>> {
        self.require_token()?;
        self.list(&format!("products/{}/stories", product_id), "stories")
            .await
    }

    /// List the bugs of a product.
    pub async fn get_product_bugs(&self, product_id: u64) -> Option<Vec<Bug>> {
        self.require_token()?;
        self.list(&format!("products/{}/bugs", product_id), "bugs")
            .await
    }

    /// List the projects linked to a product.
    pub async fn get_product_projects(&self, product_id: u64) -> Option<Vec<Project>> {
        self.require_token()?;
        self.list(&format!("products/{}/projects", product_id), "projects")
            .await
    }

    /// List all projects.
    pub async fn get_projects(&self) -> Option<Vec<Project>> {
        self.require_token()?;
        self.list("projects", "projects").await
    }

    /// List the executions of a project.
    pub async fn get_project_executions(&self, project_id: u64) -> Option<Vec<Execution>> {
        self.require_token()?;
        self.list(&format!("projects/{}/executions", project_id), "executions")
            .await
    }

    /// List the stories of a project.
    pub async fn get_project_stories(&self, project_id: u64) -> Option<Vec<Story>> {
        self.require_token()?;
        self.list(&format!("projects/{}/stories", project_id), "stories")
            .await
    }

    /// List the bugs of a project.
    pub async fn get_project_bugs(&self, project_id: u64) -> Option<Vec<Bug>> {
        self.require_token()?;
        self.list(&format!("projects/{}/bugs", project_id), "bugs")
            .await
    }

    /// List the tasks of a project (classic mode).
    pub async fn get_project_tasks(&self, project_id: u64) -> Option<Vec<Task>> {
        self.require_token()?;
        self.list(&format!("projects/{}/tasks", project_id), "tasks")
            .await
    }

    /// List all executions.
    pub async fn get_executions(&self) -> Option<Vec<Execution>> {
        self.require_token()?;
        self.list("executions", "executions").await
    }

    /// List the tasks of an execution.
    pub async fn get_execution_tasks(&self, execution_id: u64) -> Option<Vec<Task>> {
        self.require_token()?;
        self.list(&format!("executions/{}/tasks", execution_id), "tasks")
            .await
    }

    /// List the stories of an execution.
    pub async fn get_execution_stories(&self, execution_id: u64) -> Option<Vec<Story>> {
        self.require_token()?;
        self.list(&format!("executions/{}/stories", execution_id), "stories")
            .await
    }

    /// List the bugs of an execution.
    pub async fn get_execution_bugs(&self, execution_id: u64) -> Option<Vec<Bug>> {
        self.require_token()?;
        self.list(&format!("executions/{}/bugs", execution_id), "bugs")
            .await
    }

    // ===== Session access =====

    /// The current session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Whether a server URL and token are known.
    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    /// The normalized server URL.
    pub fn base_url(&self) -> &str {
        &self.session.base_url
    }

    /// The cached user profile.
    pub fn user(&self) -> Option<&User> {
        self.session.user.as_ref()
    }

    /// The server mode, if the configuration probe succeeded.
    pub fn server_mode(&self) -> Option<ServerMode> {
        self.session
            .server_config
            .as_ref()
            .map(ServerConfig::server_mode)
    }
}

/// Check the status and require a JSON object body.
async fn handle_response(response: Response) -> Result<Map<String, Value>> {
    let status = response.status();
    let url = response.url().to_string();

    if !status.is_success() {
        let error_body = response.text().await.unwrap_or_default();
        debug!("Error response body: {}", error_body);
        return Err(error_from_response(status, &url, &error_body));
    }

    let value: Value = response
        .json()
        .await
        .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

    match value {
        Value::Object(map) => Ok(map),
        other => Err(ApiError::InvalidResponse(format!(
            "expected a JSON object from {}, got {}",
            url,
            json_kind(&other)
        ))),
    }
}

/// Create an error from a non-2xx response, using the server's message if any.
fn error_from_response(status: StatusCode, url: &str, body: &str) -> ApiError {
    let message = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        ["error", "message"]
            .iter()
            .find_map(|key| json.get(*key).and_then(Value::as_str).map(str::to_string))
    });

    match message {
        Some(message) if !message.is_empty() => ApiError::from_status(status, &message),
        _ => ApiError::from_status(status, url),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Deserialize a whole response object.
fn from_body<T: DeserializeOwned>(body: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(body))
        .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)))
}

/// Remove `field` from a response object and deserialize it.
fn take_field<T: DeserializeOwned>(mut body: Map<String, Value>, field: &str) -> Result<T> {
    let value = body
        .remove(field)
        .ok_or_else(|| ApiError::InvalidResponse(format!("response has no '{}' field", field)))?;
    serde_json::from_value(value)
        .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse '{}': {}", field, e)))
}

/// Normalize the base URL by removing trailing slashes and warning on plain HTTP.
pub(crate) fn normalize_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');

    if !url.starts_with("https://") && !url.contains("localhost") && !url.contains("127.0.0.1") {
        warn!("URL does not use HTTPS: {}. This is insecure for production use.", url);
    }

    url.to_string()
}

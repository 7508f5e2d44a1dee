//! Google client configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ProviderError, ProviderResult};
use crate::retry::RetryPolicy;

/// Default Google authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// Default Google token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Base URL for Google Calendar API v3.
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
/// Base URL for Google Tasks API v1.
pub const TASKS_API_BASE: &str = "https://tasks.googleapis.com/tasks/v1";

/// Read-only access to calendars and events.
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";
/// Read/write access to tasks, needed to complete them.
pub const TASKS_SCOPE: &str = "https://www.googleapis.com/auth/tasks";

/// OAuth 2.0 client credentials.
///
/// Users must provide their own OAuth client, downloaded from the Google
/// Cloud Console as `credentials.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    /// The OAuth 2.0 client ID from Google Cloud Console.
    pub client_id: String,
    /// The OAuth 2.0 client secret from Google Cloud Console.
    pub client_secret: String,
    /// Authorization endpoint.
    pub auth_uri: String,
    /// Token endpoint, used for code exchange and refresh.
    pub token_uri: String,
}

/// Structure of Google's OAuth credentials JSON file.
///
/// Supports:
/// 1. Google Cloud Console format with "installed" or "web" section
/// 2. Flat format with client_id and client_secret at root level
#[derive(Debug, Deserialize)]
struct GoogleCredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

impl OAuthCredentials {
    /// Creates credentials that use the Google endpoints.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_uri: GOOGLE_AUTH_URL.to_string(),
            token_uri: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    /// Overrides the token endpoint.
    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = token_uri.into();
        self
    }

    /// Overrides the authorization endpoint.
    pub fn with_auth_uri(mut self, auth_uri: impl Into<String>) -> Self {
        self.auth_uri = auth_uri.into();
        self
    }

    /// Loads credentials from a `credentials.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::configuration(format!(
                "failed to read credentials file {}: {}",
                path.display(),
                e
            ))
            .with_source(e)
        })?;
        Self::from_json(&content)
    }

    /// Parses credentials from a Google credentials JSON string.
    pub fn from_json(json: &str) -> ProviderResult<Self> {
        let file: GoogleCredentialsFile = serde_json::from_str(json).map_err(|e| {
            ProviderError::configuration(format!("failed to parse credentials JSON: {}", e))
        })?;

        let (client_id, client_secret, auth_uri, token_uri) = match file.installed.or(file.web) {
            Some(nested) => (
                nested.client_id,
                nested.client_secret,
                nested.auth_uri,
                nested.token_uri,
            ),
            None => match (file.client_id, file.client_secret) {
                (Some(id), Some(secret)) => (id, secret, file.auth_uri, file.token_uri),
                _ => {
                    return Err(ProviderError::configuration(
                        "credentials file must contain 'installed'/'web' section or 'client_id'/'client_secret' at root level",
                    ));
                }
            },
        };

        let mut credentials = Self::new(client_id, client_secret);
        if let Some(auth_uri) = auth_uri.filter(|u| !u.is_empty()) {
            credentials.auth_uri = auth_uri;
        }
        if let Some(token_uri) = token_uri.filter(|u| !u.is_empty()) {
            credentials.token_uri = token_uri;
        }
        Ok(credentials)
    }

    /// Checks that the credentials look usable.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if self.client_secret.is_empty() {
            return Err("client_secret is required");
        }
        if url::Url::parse(&self.auth_uri).is_err() {
            return Err("auth_uri is not a valid URL");
        }
        if url::Url::parse(&self.token_uri).is_err() {
            return Err("token_uri is not a valid URL");
        }
        Ok(())
    }
}

/// Configuration for the Google clients.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// OAuth credentials for API access.
    pub credentials: OAuthCredentials,

    /// Path of the persisted `token.json`.
    pub token_path: PathBuf,

    /// OAuth scopes to request.
    pub scopes: Vec<String>,

    /// Request timeout.
    pub timeout: Duration,

    /// User agent string for API requests.
    pub user_agent: String,

    /// Port range for the loopback OAuth server.
    pub loopback_port_range: (u16, u16),

    /// Calendar API base URL.
    pub calendar_api_base: String,

    /// Tasks API base URL.
    pub tasks_api_base: String,

    /// Task list titles to show; `@default` is used when none match.
    pub task_lists: Vec<String>,

    /// Retry policy for API calls.
    pub retry: RetryPolicy,
}

impl GoogleConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Default task list title.
    pub const DEFAULT_TASK_LIST: &'static str = "My Tasks";

    /// Creates a configuration with the given credentials and token path.
    pub fn new(credentials: OAuthCredentials, token_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials,
            token_path: token_path.into(),
            scopes: vec![CALENDAR_SCOPE.to_string(), TASKS_SCOPE.to_string()],
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("calwidget/{}", env!("CARGO_PKG_VERSION")),
            loopback_port_range: (8085, 8095),
            calendar_api_base: CALENDAR_API_BASE.to_string(),
            tasks_api_base: TASKS_API_BASE.to_string(),
            task_lists: vec![Self::DEFAULT_TASK_LIST.to_string()],
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the loopback port range for OAuth.
    pub fn with_loopback_port_range(mut self, start: u16, end: u16) -> Self {
        self.loopback_port_range = (start, end);
        self
    }

    /// Sets the OAuth scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Points both API clients at another base URL.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.calendar_api_base = base.clone();
        self.tasks_api_base = base;
        self
    }

    /// Sets the task list titles.
    pub fn with_task_lists(mut self, titles: Vec<String>) -> Self {
        self.task_lists = titles;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builds the shared HTTP client.
    pub fn http_client(&self) -> ProviderResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| {
                ProviderError::internal(format!("failed to create HTTP client: {}", e)).with_source(e)
            })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ProviderResult<()> {
        self.credentials
            .validate()
            .map_err(|e| ProviderError::configuration(format!("invalid credentials: {}", e)))?;

        if self.scopes.is_empty() {
            return Err(ProviderError::configuration(
                "at least one OAuth scope is required",
            ));
        }

        if self.loopback_port_range.0 > self.loopback_port_range.1 {
            return Err(ProviderError::configuration("invalid loopback port range"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credentials() -> OAuthCredentials {
        OAuthCredentials::new("test-client.apps.googleusercontent.com", "test-secret")
    }

    #[test]
    fn credentials_validation() {
        assert!(test_credentials().validate().is_ok());
        assert!(OAuthCredentials::new("", "secret").validate().is_err());
        assert!(OAuthCredentials::new("id", "").validate().is_err());
        assert!(test_credentials().with_token_uri("not a url").validate().is_err());
    }

    #[test]
    fn config_defaults() {
        let config = GoogleConfig::new(test_credentials(), "/tmp/token.json");
        assert_eq!(config.scopes, vec![CALENDAR_SCOPE.to_string(), TASKS_SCOPE.to_string()]);
        assert_eq!(config.task_lists, vec!["My Tasks".to_string()]);
        assert_eq!(config.calendar_api_base, CALENDAR_API_BASE);
        assert_eq!(config.tasks_api_base, TASKS_API_BASE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_validation() {
        let config = GoogleConfig::new(test_credentials(), "/tmp/token.json").with_scopes(vec![]);
        assert!(config.validate().is_err());

        let config =
            GoogleConfig::new(test_credentials(), "/tmp/token.json").with_loopback_port_range(9000, 8000);
        assert!(config.validate().is_err());
    }

    #[test]
    fn api_base_override() {
        let config = GoogleConfig::new(test_credentials(), "/tmp/token.json")
            .with_api_base("http://127.0.0.1:9999");
        assert_eq!(config.calendar_api_base, "http://127.0.0.1:9999");
        assert_eq!(config.tasks_api_base, "http://127.0.0.1:9999");
    }

    #[test]
    fn credentials_from_json_installed() {
        let json = r#"{
            "installed": {
                "client_id": "test-id.apps.googleusercontent.com",
                "project_id": "my-project",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "client_secret": "test-secret",
                "redirect_uris": ["http://localhost"]
            }
        }"#;

        let creds = OAuthCredentials::from_json(json).unwrap();
        assert_eq!(creds.client_id, "test-id.apps.googleusercontent.com");
        assert_eq!(creds.client_secret, "test-secret");
        assert_eq!(creds.auth_uri, "https://accounts.google.com/o/oauth2/auth");
        assert_eq!(creds.token_uri, GOOGLE_TOKEN_URL);
    }

    #[test]
    fn credentials_from_json_web_defaults_endpoints() {
        let json = r#"{
            "web": {
                "client_id": "web-id.apps.googleusercontent.com",
                "client_secret": "web-secret"
            }
        }"#;

        let creds = OAuthCredentials::from_json(json).unwrap();
        assert_eq!(creds.client_id, "web-id.apps.googleusercontent.com");
        assert_eq!(creds.auth_uri, GOOGLE_AUTH_URL);
        assert_eq!(creds.token_uri, GOOGLE_TOKEN_URL);
    }

    #[test]
    fn credentials_from_json_flat() {
        let json = r#"{
            "client_id": "flat-id.apps.googleusercontent.com",
            "client_secret": "flat-secret",
            "refresh_token": "ignored"
        }"#;

        let creds = OAuthCredentials::from_json(json).unwrap();
        assert_eq!(creds.client_id, "flat-id.apps.googleusercontent.com");
        assert_eq!(creds.client_secret, "flat-secret");
    }

    #[test]
    fn credentials_from_json_invalid() {
        let err = OAuthCredentials::from_json(r#"{ "other": {} }"#).unwrap_err();
        assert!(err.message().contains("client_id"));

        let err = OAuthCredentials::from_json("not json").unwrap_err();
        assert!(err.message().contains("parse"));
    }

    #[test]
    fn credentials_missing_file() {
        let err = OAuthCredentials::from_file("/nonexistent/credentials.json").unwrap_err();
        assert_eq!(err.code(), crate::error::ProviderErrorCode::ConfigurationError);
    }
}

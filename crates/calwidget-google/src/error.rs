//! Error types for Google API operations.
//!
//! Every failure is classified with a [`ProviderErrorCode`], and each code maps
//! to an [`ErrorDisposition`] telling the sync layer whether to retry, to
//! re-authenticate, or to surface the error in the widget.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// The category of a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// Authentication failed or credentials are invalid/expired.
    AuthenticationFailed,
    /// Authorization failed - user lacks permission.
    AuthorizationFailed,
    /// Network error - connection failed, timeout, DNS resolution, etc.
    NetworkError,
    /// Rate limit exceeded - too many requests.
    RateLimited,
    /// Server returned an error (5xx status codes).
    ServerError,
    /// Invalid response from the server - parse error, unexpected format.
    InvalidResponse,
    /// Resource not found (404).
    NotFound,
    /// Request was invalid (400) - bad parameters, malformed request.
    BadRequest,
    /// Configuration error - missing or invalid config.
    ConfigurationError,
    /// Internal provider error - unexpected state, bug.
    InternalError,
}

/// What the caller should do about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Transient; try again with backoff.
    Retry,
    /// The access token is no longer accepted; get a fresh one.
    Reauthenticate,
    /// Show the error to the user and keep the current data.
    Surface,
}

impl ProviderErrorCode {
    /// Returns true if this error is transient and the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimited | Self::ServerError
        )
    }

    /// Returns the disposition for this error code.
    pub fn disposition(&self) -> ErrorDisposition {
        match self {
            Self::NetworkError | Self::RateLimited | Self::ServerError => ErrorDisposition::Retry,
            Self::AuthenticationFailed => ErrorDisposition::Reauthenticate,
            _ => ErrorDisposition::Surface,
        }
    }

    /// Returns a human-readable name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::ConfigurationError => "configuration_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error that occurred while talking to Google.
#[derive(Debug, Error)]
pub struct ProviderError {
    /// The error code categorizing this error.
    code: ProviderErrorCode,
    /// A human-readable message describing the error.
    message: String,
    /// The provider that generated this error (e.g., "google-calendar").
    provider: Option<String>,
    /// Server-requested delay before retrying.
    retry_after: Option<Duration>,
    /// The underlying cause of this error, if any.
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Creates a new provider error with the given code and message.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            retry_after: None,
            source: None,
        }
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthenticationFailed, message)
    }

    /// Creates an authorization error.
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthorizationFailed, message)
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    /// Creates a rate limit error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RateLimited, message)
    }

    /// Creates a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ServerError, message)
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NotFound, message)
    }

    /// Creates a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::BadRequest, message)
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ConfigurationError, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InternalError, message)
    }

    /// Maps a transport failure from reqwest.
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        let message = if error.is_timeout() {
            "request timeout".to_string()
        } else if error.is_connect() {
            format!("connection failed: {error}")
        } else if error.is_decode() {
            return Self::invalid_response(format!("failed to decode response: {error}"))
                .with_source(error);
        } else {
            format!("request failed: {error}")
        };
        Self::network(message).with_source(error)
    }

    /// Classifies a non-success HTTP response.
    ///
    /// Google reports quota exhaustion as `403` with a `rateLimitExceeded` or
    /// `userRateLimitExceeded` reason, which is treated like `429`.
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let api_error = serde_json::from_str::<ApiErrorBody>(body).ok().map(|b| b.error);
        let detail = api_error
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| body.chars().take(200).collect());
        let rate_limit_reason = api_error.as_ref().is_some_and(|e| {
            e.errors.iter().any(|item| {
                matches!(
                    item.reason.as_deref(),
                    Some("rateLimitExceeded" | "userRateLimitExceeded")
                )
            })
        });

        let error = match status {
            401 => Self::authentication(format!("access token rejected: {detail}")),
            403 if rate_limit_reason => Self::rate_limited(format!("quota exceeded: {detail}")),
            403 => Self::authorization(format!("access denied: {detail}")),
            404 => Self::not_found(format!("not found: {detail}")),
            429 => Self::rate_limited(format!("rate limit exceeded: {detail}")),
            400..=499 => Self::bad_request(format!("request rejected ({status}): {detail}")),
            500..=599 => Self::server(format!("API error ({status}): {detail}")),
            _ => Self::invalid_response(format!("unexpected status {status}: {detail}")),
        };
        match retry_after {
            Some(delay) => error.with_retry_after(delay),
            None => error,
        }
    }

    /// Sets the provider name for this error.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the server-requested retry delay.
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the provider name, if set.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Returns the server-requested retry delay, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Returns true if this error is transient and may be retried.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Returns what the caller should do about this error.
    pub fn disposition(&self) -> ErrorDisposition {
        self.code.disposition()
    }

    /// Copies code, message, provider and retry delay. The source is dropped.
    pub fn duplicate(&self) -> Self {
        Self {
            code: self.code,
            message: self.message.clone(),
            provider: self.provider.clone(),
            retry_after: self.retry_after,
            source: None,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Google's JSON error envelope.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorItem {
    reason: Option<String>,
}

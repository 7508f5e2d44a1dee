//! Google Calendar and Tasks access for calwidget.
//!
//! - [`WidgetProvider`] - The trait the sync layer fetches through
//! - [`google::GoogleProvider`] - The Google implementation
//! - [`AuthManager`] - OAuth 2.0 PKCE sign-in and token refresh
//! - [`ProviderError`] - Error codes and their [`ErrorDisposition`]
//! - [`RetryPolicy`] - Backoff for transient failures

pub mod auth;
pub mod error;
pub mod google;
pub mod provider;
pub mod retry;

pub use auth::{AuthManager, Authorizer, RefreshedToken};
pub use error::{ErrorDisposition, ProviderError, ProviderErrorCode, ProviderResult};
pub use provider::{BoxFuture, DEFAULT_POLL_INTERVAL, ErrorProvider, WidgetProvider};
pub use retry::RetryPolicy;

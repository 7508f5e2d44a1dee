//! Google Calendar and Tasks backend.
//!
//! # Authentication Flow
//!
//! 1. The user downloads an OAuth client (`credentials.json`) from the Google Cloud Console
//! 2. A local HTTP listener is bound on the first free loopback port
//! 3. The browser opens Google's consent page with a PKCE challenge
//! 4. Google redirects to the listener with the authorization code
//! 5. The code is exchanged for access and refresh tokens
//! 6. Tokens are persisted to `token.json` and refreshed on expiry
//!
//! # Example
//!
//! ```ignore
//! use calwidget_google::google::{GoogleConfig, GoogleProvider, OAuthCredentials};
//!
//! let credentials = OAuthCredentials::from_file("credentials.json")?;
//! let provider = GoogleProvider::new(GoogleConfig::new(credentials, "token.json"))?;
//! let events = provider.fetch_events(week.time_window(&Local)).await?;
//! ```

mod api;
pub(crate) mod calendar;
pub(crate) mod config;
pub(crate) mod oauth;
mod provider;
pub(crate) mod tasks;
pub(crate) mod tokens;

pub use calendar::{CalendarClient, CalendarInfo};
pub use config::{
    CALENDAR_API_BASE, CALENDAR_SCOPE, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL, GoogleConfig,
    OAuthCredentials, TASKS_API_BASE, TASKS_SCOPE,
};
pub use oauth::{OAuthClient, PkceFlow};
pub use provider::GoogleProvider;
pub use tasks::{DEFAULT_TASK_LIST_ID, TaskListInfo, TasksClient};
pub use tokens::{EXPIRY_MARGIN_SECS, TokenInfo, TokenStorage};

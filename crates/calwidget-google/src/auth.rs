//! Access token management.
//!
//! [`AuthManager`] hands out access tokens to the API clients. It refreshes
//! expired tokens and falls back to the interactive consent flow when the
//! refresh token is gone or rejected. Callers are serialized so that two
//! concurrent requests never open two browser windows.
//!
//! Google's consent screen lets the user untick individual scopes. A token
//! that lacks a scope after consent is kept for the scopes it does cover, and
//! calls needing the missing one fail until the user signs in again
//! explicitly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ErrorDisposition, ProviderError, ProviderResult};
use crate::google::config::GoogleConfig;
use crate::google::oauth::OAuthClient;
use crate::google::tokens::{TokenInfo, TokenStorage};
use crate::provider::BoxFuture;

/// Result of a refresh-token grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_in: Option<i64>,
    /// Present only when Google rotates the refresh token.
    pub refresh_token: Option<String>,
}

/// Obtains tokens from the authorization server.
pub trait Authorizer: Send + Sync {
    /// Runs the interactive consent flow.
    fn authorize<'a>(&'a self, scopes: &'a [String]) -> BoxFuture<'a, ProviderResult<TokenInfo>>;

    /// Exchanges a refresh token for a new access token.
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, ProviderResult<RefreshedToken>>;
}

/// Owns the token file and the authorization flow.
pub struct AuthManager {
    storage: TokenStorage,
    authorizer: Arc<dyn Authorizer>,
    scopes: Vec<String>,
    /// The last consent of this session granted fewer scopes than requested.
    scopes_declined: AtomicBool,
    lock: Mutex<()>,
}

impl AuthManager {
    /// Creates a manager over already loaded storage.
    pub fn new(storage: TokenStorage, authorizer: Arc<dyn Authorizer>, scopes: Vec<String>) -> Self {
        Self {
            storage,
            authorizer,
            scopes,
            scopes_declined: AtomicBool::new(false),
            lock: Mutex::new(()),
        }
    }

    /// Creates a manager using Google's OAuth endpoints and loads `token.json`.
    pub fn from_config(config: &GoogleConfig, http_client: reqwest::Client) -> Self {
        let storage = TokenStorage::new(&config.token_path);
        if let Err(e) = storage.load() {
            warn!(error = %e, "failed to load stored tokens");
        }
        let oauth = OAuthClient::new(
            config.credentials.clone(),
            http_client,
            config.loopback_port_range,
        );
        Self::new(storage, Arc::new(oauth), config.scopes.clone())
    }

    /// Returns a valid access token for `scope`, refreshing or
    /// re-authorizing as needed.
    ///
    /// A stored token missing some of the configured scopes triggers one
    /// consent flow per session. If the user declines again, the token is
    /// used for what it covers.
    ///
    /// # Errors
    ///
    /// A refresh that fails for a transient reason is returned as is, so the
    /// caller can keep showing cached data instead of opening a browser while
    /// offline. A declined `scope` is an authorization error.
    pub async fn access_token(&self, scope: &str) -> ProviderResult<String> {
        let _guard = self.lock.lock().await;

        if let Some(tokens) = self.storage.get() {
            if !tokens.has_scopes(&self.scopes) && !self.scopes_declined.load(Ordering::SeqCst) {
                info!("stored token does not cover the required scopes");
            } else if !tokens.has_scope(scope) {
                return Err(scope_not_granted(scope));
            } else if !tokens.is_expired() {
                return Ok(tokens.access_token);
            } else if let Some(refresh_token) = tokens.refresh_token.as_deref() {
                debug!("refreshing expired access token");
                match self.authorizer.refresh(refresh_token).await {
                    Ok(refreshed) => {
                        self.storage.apply_refresh(
                            refreshed.access_token,
                            refreshed.expires_in,
                            refreshed.refresh_token,
                        )?;
                        return self.valid_token(scope);
                    }
                    Err(e) if e.disposition() == ErrorDisposition::Reauthenticate => {
                        warn!(error = %e, "refresh token rejected, re-authenticating");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        self.authorize_locked().await?;
        self.valid_token(scope)
    }

    /// Runs the consent flow again, asking for every configured scope.
    ///
    /// The stored tokens are replaced only when the flow succeeds; a
    /// cancelled or failed sign-in keeps the previous ones.
    pub async fn reauthenticate(&self) -> ProviderResult<()> {
        let _guard = self.lock.lock().await;
        self.authorize_locked().await
    }

    /// Marks the current access token as expired, e.g. after an HTTP 401.
    pub fn invalidate(&self) {
        debug!("invalidating access token");
        self.storage.invalidate();
    }

    /// Removes the stored tokens.
    pub async fn sign_out(&self) -> ProviderResult<()> {
        let _guard = self.lock.lock().await;
        self.storage.clear()
    }

    /// True when a token with the required scopes can be used or refreshed
    /// without user interaction.
    pub fn is_authenticated(&self) -> bool {
        self.storage.get().is_some_and(|tokens| {
            tokens.has_scopes(&self.scopes)
                && (!tokens.is_expired() || tokens.refresh_token.is_some())
        })
    }

    /// Returns the token file path.
    pub fn token_path(&self) -> &std::path::Path {
        self.storage.path()
    }

    async fn authorize_locked(&self) -> ProviderResult<()> {
        info!("starting interactive authorization");
        let tokens = self.authorizer.authorize(&self.scopes).await?;
        if tokens.is_expired() {
            return Err(ProviderError::authentication(
                "authorization did not produce a usable access token",
            ));
        }
        let declined = !tokens.has_scopes(&self.scopes);
        if declined {
            warn!(granted = ?tokens.scopes, "not all requested scopes were granted");
        }
        self.scopes_declined.store(declined, Ordering::SeqCst);
        self.storage.set(tokens)
    }

    fn valid_token(&self, scope: &str) -> ProviderResult<String> {
        match self.storage.get() {
            Some(tokens) if !tokens.has_scope(scope) => Err(scope_not_granted(scope)),
            Some(tokens) if !tokens.is_expired() => Ok(tokens.access_token),
            _ => Err(ProviderError::authentication(
                "authorization did not produce a usable access token",
            )),
        }
    }
}

fn scope_not_granted(scope: &str) -> ProviderError {
    let name = scope.rsplit('/').next().unwrap_or(scope);
    ProviderError::authorization(format!(
        "Google did not grant access to {name}. Sign in again and allow it."
    ))
}

impl std::fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthManager")
            .field("token_path", &self.storage.path())
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

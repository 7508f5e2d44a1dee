//! OAuth token storage.
//!
//! Tokens live in `token.json`, written atomically with owner-only
//! permissions. The in-memory copy is the source of truth between writes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};

/// Access tokens are treated as expired this long before Google says so.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Information about an OAuth token set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// The access token for API requests.
    pub access_token: String,

    /// The refresh token for obtaining new access tokens.
    pub refresh_token: Option<String>,

    /// When the access token stops being used (already includes the margin).
    pub expires_at: Option<DateTime<Utc>>,

    /// The OAuth scopes that were granted.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// When the tokens were last refreshed.
    pub last_refresh: DateTime<Utc>,
}

impl TokenInfo {
    /// Creates a new token info from OAuth response data.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: expires_in_secs.map(|secs| expiry_from(now, secs)),
            scopes,
            last_refresh: now,
        }
    }

    /// Returns true if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Returns true if the access token is unusable at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        // tokens without expiry never expire
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Returns true if the token has the required scopes.
    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.has_scope(scope))
    }

    /// Checks that one scope was granted.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|granted| granted == scope)
    }

    /// Updates the access token after a refresh.
    ///
    /// Google usually omits the refresh token on refresh; the old one is kept then.
    pub fn apply_refresh(
        &mut self,
        access_token: impl Into<String>,
        expires_in_secs: Option<i64>,
        refresh_token: Option<String>,
    ) {
        let now = Utc::now();
        self.access_token = access_token.into();
        self.expires_at = expires_in_secs.map(|secs| expiry_from(now, secs));
        if let Some(refresh_token) = refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        self.last_refresh = now;
    }

    /// Marks the access token as expired, e.g. after the API rejected it.
    pub fn invalidate(&mut self) {
        self.expires_at = Some(Utc::now() - Duration::seconds(1));
    }

    /// Returns the time until the token expires, if known.
    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.expires_at.map(|expires_at| expires_at - Utc::now())
    }
}

fn expiry_from(now: DateTime<Utc>, expires_in_secs: i64) -> DateTime<Utc> {
    now + Duration::seconds(expires_in_secs) - Duration::seconds(EXPIRY_MARGIN_SECS)
}

/// File-backed token storage.
#[derive(Debug)]
pub struct TokenStorage {
    /// Path to the token file.
    path: PathBuf,

    /// In-memory cache of the current tokens.
    tokens: RwLock<Option<TokenInfo>>,
}

impl TokenStorage {
    /// Creates a new token storage at the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tokens: RwLock::new(None),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<TokenInfo>> {
        self.tokens.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<TokenInfo>> {
        self.tokens.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads tokens from disk into memory.
    ///
    /// Returns `Ok(true)` if tokens were loaded, `Ok(false)` if there is no
    /// usable token file. A malformed file counts as absent.
    pub fn load(&self) -> ProviderResult<bool> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no token file");
            return Ok(false);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            ProviderError::configuration(format!("failed to read token file: {}", e)).with_source(e)
        })?;

        match serde_json::from_str::<TokenInfo>(&content) {
            Ok(tokens) => {
                info!(path = %self.path.display(), "loaded tokens");
                *self.write() = Some(tokens);
                Ok(true)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring malformed token file");
                *self.write() = None;
                Ok(false)
            }
        }
    }

    /// Saves the current tokens to disk.
    pub fn save(&self) -> ProviderResult<()> {
        let content = {
            let tokens = self.read();
            let tokens = tokens
                .as_ref()
                .ok_or_else(|| ProviderError::internal("no tokens to save"))?;
            serde_json::to_string_pretty(tokens)
                .map_err(|e| ProviderError::internal(format!("failed to serialize tokens: {}", e)))?
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                ProviderError::configuration(format!("failed to create token directory: {}", e))
            })?;
        }

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &content).map_err(|e| {
            ProviderError::configuration(format!("failed to write token file: {}", e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600));
        }

        fs::rename(&temp_path, &self.path).map_err(|e| {
            ProviderError::configuration(format!("failed to rename token file: {}", e))
        })?;

        debug!(path = %self.path.display(), "saved tokens");
        Ok(())
    }

    /// Returns a clone of the current tokens, if any.
    pub fn get(&self) -> Option<TokenInfo> {
        self.read().clone()
    }

    /// Sets new tokens and saves them to disk.
    pub fn set(&self, tokens: TokenInfo) -> ProviderResult<()> {
        *self.write() = Some(tokens);
        self.save()
    }

    /// Applies a refresh response and saves to disk.
    pub fn apply_refresh(
        &self,
        access_token: impl Into<String>,
        expires_in_secs: Option<i64>,
        refresh_token: Option<String>,
    ) -> ProviderResult<()> {
        {
            let mut tokens = self.write();
            let tokens = tokens
                .as_mut()
                .ok_or_else(|| ProviderError::internal("no tokens to update"))?;
            tokens.apply_refresh(access_token, expires_in_secs, refresh_token);
        }
        self.save()
    }

    /// Marks the in-memory access token as expired.
    pub fn invalidate(&self) {
        if let Some(tokens) = self.write().as_mut() {
            tokens.invalidate();
        }
    }

    /// Clears the stored tokens (both in memory and on disk).
    pub fn clear(&self) -> ProviderResult<()> {
        *self.write() = None;
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| {
                ProviderError::configuration(format!("failed to remove token file: {}", e))
            })?;
            info!(path = %self.path.display(), "cleared tokens");
        }
        Ok(())
    }

    /// Returns the token storage path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if tokens are loaded and not expired.
    pub fn has_valid_tokens(&self) -> bool {
        self.read().as_ref().is_some_and(|t| !t.is_expired())
    }

    /// Returns true if tokens are loaded and have a refresh token.
    pub fn has_refresh_token(&self) -> bool {
        self.read().as_ref().is_some_and(|t| t.refresh_token.is_some())
    }

    /// Returns true if the stored tokens are missing or lack a required scope.
    pub fn needs_reauth(&self, required_scopes: &[String]) -> bool {
        match self.read().as_ref() {
            None => true,
            Some(tokens) => !tokens.has_scopes(required_scopes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage() -> (tempfile::TempDir, TokenStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = TokenStorage::new(dir.path().join("token.json"));
        (dir, storage)
    }

    #[test]
    fn token_info_creation() {
        let token = TokenInfo::new(
            "access-token",
            Some("refresh-token".to_string()),
            Some(3600),
            vec!["scope1".to_string()],
        );

        assert_eq!(token.access_token, "access-token");
        assert_eq!(token.refresh_token, Some("refresh-token".to_string()));
        assert!(!token.is_expired());
        let remaining = token.time_until_expiry().unwrap();
        assert!(remaining <= Duration::seconds(3600 - EXPIRY_MARGIN_SECS));
        assert!(remaining > Duration::seconds(3600 - EXPIRY_MARGIN_SECS - 5));
    }

    #[test]
    fn token_expires_early() {
        // 30 seconds left on the Google clock is already too little
        let token = TokenInfo::new("access", None, Some(30), vec![]);
        assert!(token.is_expired());
    }

    #[test]
    fn empty_access_token_is_expired() {
        let token = TokenInfo::new("", None, None, vec![]);
        assert!(token.is_expired());
    }

    #[test]
    fn invalidate_expires_token() {
        let mut token = TokenInfo::new("access", None, Some(3600), vec![]);
        token.invalidate();
        assert!(token.is_expired());
    }

    #[test]
    fn refresh_keeps_old_refresh_token() {
        let mut token = TokenInfo::new("old", Some("refresh".to_string()), Some(3600), vec![]);
        token.invalidate();
        token.apply_refresh("new", Some(3600), None);
        assert_eq!(token.access_token, "new");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh"));
        assert!(!token.is_expired());

        token.apply_refresh("newer", Some(3600), Some("rotated".to_string()));
        assert_eq!(token.refresh_token.as_deref(), Some("rotated"));
    }

    #[test]
    fn token_info_scope_check() {
        let token = TokenInfo::new(
            "access",
            None,
            None,
            vec!["scope1".to_string(), "scope2".to_string()],
        );

        assert!(token.has_scopes(&["scope1".to_string()]));
        assert!(token.has_scopes(&["scope1".to_string(), "scope2".to_string()]));
        assert!(!token.has_scopes(&["scope3".to_string()]));
    }

    #[test]
    fn token_storage_save_and_load() {
        let (_dir, storage) = temp_storage();
        let token = TokenInfo::new(
            "access-token",
            Some("refresh-token".to_string()),
            Some(3600),
            vec!["scope1".to_string()],
        );

        storage.set(token.clone()).unwrap();
        assert!(storage.path().exists());

        let storage2 = TokenStorage::new(storage.path());
        assert!(storage2.load().unwrap());
        assert_eq!(storage2.get(), Some(token));
    }

    #[cfg(unix)]
    #[test]
    fn token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, storage) = temp_storage();
        storage.set(TokenInfo::new("access", None, None, vec![])).unwrap();
        let mode = fs::metadata(storage.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn malformed_token_file_is_absent() {
        let (_dir, storage) = temp_storage();
        fs::write(storage.path(), "{ not json").unwrap();
        assert!(!storage.load().unwrap());
        assert!(storage.get().is_none());
        assert!(storage.needs_reauth(&["scope1".to_string()]));
    }

    #[test]
    fn token_storage_clear() {
        let (_dir, storage) = temp_storage();
        storage.set(TokenInfo::new("access", None, None, vec![])).unwrap();
        assert!(storage.path().exists());

        storage.clear().unwrap();
        assert!(!storage.path().exists());
        assert!(storage.get().is_none());
    }

    #[test]
    fn token_storage_no_file() {
        let (_dir, storage) = temp_storage();
        assert!(!storage.load().unwrap());
        assert!(storage.get().is_none());
    }

    #[test]
    fn token_storage_apply_refresh() {
        let (_dir, storage) = temp_storage();
        assert!(storage.apply_refresh("x", Some(3600), None).is_err());

        storage
            .set(TokenInfo::new("old", Some("refresh".to_string()), Some(3600), vec![]))
            .unwrap();
        storage.invalidate();
        assert!(!storage.has_valid_tokens());
        assert!(storage.has_refresh_token());

        storage.apply_refresh("new", Some(3600), None).unwrap();
        assert!(storage.has_valid_tokens());

        let reloaded = TokenStorage::new(storage.path());
        reloaded.load().unwrap();
        assert_eq!(reloaded.get().unwrap().access_token, "new");
    }

    #[test]
    fn token_storage_needs_reauth() {
        let (_dir, storage) = temp_storage();
        assert!(storage.needs_reauth(&["scope1".to_string()]));

        let token = TokenInfo::new("access", None, None, vec!["scope1".to_string()]);
        storage.set(token).unwrap();
        assert!(!storage.needs_reauth(&["scope1".to_string()]));
        assert!(storage.needs_reauth(&["scope2".to_string()]));
    }
}

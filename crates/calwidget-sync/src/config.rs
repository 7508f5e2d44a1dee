//! Widget configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/calwidget/config.toml` by default. A missing file means
//! defaults. `credentials.json` is looked up next to the config file and then
//! next to the executable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use calwidget_google::RetryPolicy;
use calwidget_google::google::{GoogleConfig, OAuthCredentials};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::scheduler::SchedulerConfig;

const APP_DIR: &str = "calwidget";
const CREDENTIALS_FILE: &str = "credentials.json";
const TOKEN_FILE: &str = "token.json";
const CACHE_FILE: &str = "cache.json";

/// Configuration for the widget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    /// Debug mode.
    pub debug: bool,

    /// Google account settings.
    pub google: GoogleSettings,

    /// Refresh and cache settings.
    pub sync: SyncSettings,

    /// Window settings.
    pub window: WindowSettings,

    /// Logging settings.
    pub log: LogSettings,
}

/// Google account settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    /// Path to the OAuth client file downloaded from the Cloud Console.
    pub credentials_path: Option<PathBuf>,

    /// Path to token storage.
    pub token_path: Option<PathBuf>,

    /// Task list titles to show.
    pub task_lists: Vec<String>,

    /// Request timeout in seconds.
    pub timeout: u64,

    /// First and last loopback port tried for the OAuth redirect.
    pub loopback_ports: (u16, u16),

    /// Attempts per API call, including the first.
    pub max_attempts: u32,
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            credentials_path: None,
            token_path: None,
            task_lists: vec![GoogleConfig::DEFAULT_TASK_LIST.to_string()],
            timeout: GoogleConfig::DEFAULT_TIMEOUT_SECS,
            loopback_ports: (8085, 8095),
            max_attempts: calwidget_google::retry::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Refresh and cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Seconds between background refreshes.
    pub refresh_interval: u64,

    /// Seconds after a manual refresh during which the timer does not fire.
    pub refresh_cooldown: u64,

    /// Path of the dataset cache.
    pub cache_path: Option<PathBuf>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            refresh_interval: 300,
            refresh_cooldown: 30,
            cache_path: None,
        }
    }
}

/// Window settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    /// Keep the widget above other windows.
    pub always_on_top: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Append logs to this file instead of stderr. A widget started from a
    /// desktop entry has no terminal to log to.
    pub file: Option<PathBuf>,
}

impl WidgetConfig {
    /// Loads configuration from the default path.
    pub fn load() -> SyncResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> SyncResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SyncError::config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Parses TOML configuration.
    pub fn parse(content: &str) -> SyncResult<Self> {
        toml::from_str(content).map_err(|e| SyncError::config(format!("failed to parse config: {}", e)))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    /// Returns the default cache directory.
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(Self::default_config_dir)
            .join(APP_DIR)
    }

    /// Candidate locations for `credentials.json`, in lookup order.
    pub fn credentials_candidates(&self) -> Vec<PathBuf> {
        if let Some(path) = &self.google.credentials_path {
            return vec![path.clone()];
        }
        let mut candidates = vec![Self::default_config_dir().join(CREDENTIALS_FILE)];
        if let Some(dir) = exe_dir() {
            candidates.push(dir.join(CREDENTIALS_FILE));
        }
        candidates
    }

    /// Returns the first existing `credentials.json`.
    pub fn credentials_path(&self) -> Option<PathBuf> {
        self.credentials_candidates().into_iter().find(|p| p.is_file())
    }

    /// Returns the token file path.
    pub fn token_path(&self) -> PathBuf {
        self.google
            .token_path
            .clone()
            .unwrap_or_else(|| Self::default_config_dir().join(TOKEN_FILE))
    }

    /// Returns the cache file path.
    pub fn cache_path(&self) -> PathBuf {
        self.sync
            .cache_path
            .clone()
            .unwrap_or_else(|| Self::default_cache_dir().join(CACHE_FILE))
    }

    /// Builds the Google provider configuration.
    ///
    /// # Errors
    ///
    /// Fails when no `credentials.json` can be found or parsed.
    pub fn to_google_config(&self) -> SyncResult<GoogleConfig> {
        let Some(path) = self.credentials_path() else {
            let searched: Vec<String> = self
                .credentials_candidates()
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            return Err(SyncError::config(format!(
                "{} not found (looked in {})",
                CREDENTIALS_FILE,
                searched.join(", ")
            )));
        };
        let credentials = OAuthCredentials::from_file(&path)?;
        debug!(path = %path.display(), "loaded OAuth client");

        let retry = RetryPolicy {
            max_attempts: self.google.max_attempts.max(1),
            ..RetryPolicy::default()
        };
        let (first_port, last_port) = self.google.loopback_ports;
        let config = GoogleConfig::new(credentials, self.token_path())
            .with_timeout(Duration::from_secs(self.google.timeout.max(1)))
            .with_loopback_port_range(first_port, last_port)
            .with_task_lists(self.google.task_lists.clone())
            .with_retry(retry);
        config.validate()?;
        Ok(config)
    }

    /// Builds the scheduler configuration.
    ///
    /// Failure backoff is capped at the refresh interval.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        let interval = Duration::from_secs(self.sync.refresh_interval.max(30));
        SchedulerConfig::new(interval)
            .with_refresh_cooldown(Duration::from_secs(self.sync.refresh_cooldown))
            .with_backoff(Duration::from_secs(15), interval, 2.0)
    }
}

fn exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

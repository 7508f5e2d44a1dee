//! `auth`, `logout` and `paths` subcommands.

use calwidget_google::WidgetProvider;
use calwidget_google::google::{GoogleProvider, TokenStorage};
use calwidget_sync::{DiskCache, SyncResult, WidgetConfig};
use tracing::info;

/// Runs the Google sign-in flow in the browser and stores the token.
pub async fn auth(config: &WidgetConfig, force: bool) -> SyncResult<()> {
    let provider = GoogleProvider::new(config.to_google_config()?)?;

    if provider.is_authenticated() && !force {
        println!("Already signed in to Google.");
        println!("Use --force to sign in again.");
        return Ok(());
    }

    println!("Starting Google sign-in...");
    println!();
    println!("A browser window will open for you to authorize access.");
    println!("If the browser doesn't open, copy the URL printed below.");
    println!();

    provider.auth().reauthenticate().await?;

    info!(path = %provider.auth().token_path().display(), "signed in");
    println!("Signed in. Token saved to {}", provider.auth().token_path().display());
    Ok(())
}

/// Deletes the stored token and the cached dataset.
pub fn logout(config: &WidgetConfig) -> SyncResult<()> {
    let tokens = TokenStorage::new(config.token_path());
    tokens.clear()?;
    DiskCache::new(config.cache_path()).clear()?;
    println!("Signed out. Removed {}", tokens.path().display());
    Ok(())
}

/// Prints every file the widget reads or writes.
pub fn paths(config: &WidgetConfig, config_path: &std::path::Path) {
    let line = |label: &str, path: &std::path::Path, note: &str| {
        println!("{:<12} {}{}", label, path.display(), note);
    };
    let exists = |path: &std::path::Path| if path.exists() { "" } else { " (missing)" };

    line("config", config_path, exists(config_path));
    match config.credentials_path() {
        Some(path) => line("credentials", &path, ""),
        None => {
            let candidates = config.credentials_candidates();
            for (i, path) in candidates.iter().enumerate() {
                line(if i == 0 { "credentials" } else { "" }, path, " (missing)");
            }
        }
    }

    let tokens = TokenStorage::new(config.token_path());
    let token_note = match tokens.load() {
        Ok(true) if tokens.has_refresh_token() => "",
        Ok(true) => " (no refresh token)",
        _ => " (missing)",
    };
    line("token", tokens.path(), token_note);

    let cache = config.cache_path();
    line("cache", &cache, exists(&cache));

    if let Some(log) = &config.log.file {
        line("log", log, exists(log));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logout_removes_token_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = WidgetConfig::default();
        config.google.token_path = Some(dir.path().join("token.json"));
        config.sync.cache_path = Some(dir.path().join("cache.json"));
        std::fs::write(dir.path().join("token.json"), "{}").unwrap();
        std::fs::write(dir.path().join("cache.json"), "{}").unwrap();

        logout(&config).unwrap();
        assert!(!dir.path().join("token.json").exists());
        assert!(!dir.path().join("cache.json").exists());

        // nothing left to remove
        logout(&config).unwrap();
    }
}

//! Dataset cache on disk.
//!
//! The last successfully fetched dataset is written to `cache.json` so the
//! widget can show something immediately on the next start. Each successful
//! refresh replaces the file; nothing is merged.

use std::fs;
use std::path::{Path, PathBuf};

use calwidget_core::Dataset;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

/// Format version of `cache.json`. Files with another version are discarded.
pub const CACHE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    dataset: Dataset,
}

/// File-backed dataset cache.
#[derive(Debug, Clone)]
pub struct DiskCache {
    path: PathBuf,
}

impl DiskCache {
    /// Creates a cache stored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the cache file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the cached dataset.
    ///
    /// A malformed or outdated file is deleted and treated as absent, so the
    /// next refresh rebuilds it.
    pub fn load(&self) -> Option<Dataset> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no cache file");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read cache");
                return None;
            }
        };

        match serde_json::from_str::<CacheFile>(&content) {
            Ok(file) if file.version == CACHE_VERSION => {
                let mut dataset = file.dataset;
                dataset.sort();
                info!(
                    week = %dataset.window.start(),
                    events = dataset.events.len(),
                    tasks = dataset.tasks.len(),
                    "loaded cached dataset"
                );
                Some(dataset)
            }
            Ok(file) => {
                warn!(version = file.version, "discarding cache with unknown version");
                self.discard();
                None
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "discarding malformed cache");
                self.discard();
                None
            }
        }
    }

    /// Replaces the cached dataset.
    ///
    /// The file is written to a temporary sibling and renamed into place.
    pub fn save(&self, dataset: &Dataset) -> SyncResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = CacheFile {
            version: CACHE_VERSION,
            dataset: dataset.clone(),
        };
        let content = serde_json::to_string(&file)
            .map_err(|e| SyncError::cache(&self.path, format!("failed to serialize: {}", e)))?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &self.path)?;

        debug!(
            path = %self.path.display(),
            events = dataset.events.len(),
            tasks = dataset.tasks.len(),
            "saved cache"
        );
        Ok(())
    }

    /// Removes the cache file.
    pub fn clear(&self) -> SyncResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn discard(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to delete cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calwidget_core::{Event, EventTime, Task, WeekWindow};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn dataset() -> Dataset {
        let window = WeekWindow::containing(NaiveDate::from_ymd_opt(2026, 10, 14).unwrap());
        let event = Event::new(
            "e1",
            "Planning",
            EventTime::from_utc(Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap()),
            EventTime::from_utc(Utc.with_ymd_and_hms(2026, 10, 14, 10, 0, 0).unwrap()),
            "primary",
        );
        let task = Task::new("t1", "Send invoice", "L1")
            .with_due(NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());
        Dataset::new(
            window,
            vec![event],
            vec![task],
            Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap(),
        )
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().join("cache.json"));
        assert!(cache.load().is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().join("nested").join("cache.json"));

        cache.save(&dataset()).unwrap();
        assert!(cache.path().exists());
        assert!(!cache.path().with_extension("json.tmp").exists());
        assert_eq!(cache.load(), Some(dataset()));
    }

    #[test]
    fn save_supersedes_previous_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().join("cache.json"));

        cache.save(&dataset()).unwrap();
        let mut next = dataset();
        next.events.clear();
        next.tasks.push(Task::new("t2", "Book flights", "L1"));
        cache.save(&next).unwrap();

        let loaded = cache.load().unwrap();
        assert!(loaded.events.is_empty());
        assert_eq!(loaded.tasks.len(), 2);
    }

    #[test]
    fn malformed_file_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();

        let cache = DiskCache::new(&path);
        assert!(cache.load().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn unknown_version_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = DiskCache::new(&path);
        cache.save(&dataset()).unwrap();

        let mut value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        value["version"] = serde_json::json!(99);
        fs::write(&path, value.to_string()).unwrap();

        assert!(cache.load().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().join("cache.json"));
        cache.save(&dataset()).unwrap();
        cache.clear().unwrap();
        cache.clear().unwrap();
        assert!(cache.load().is_none());
    }
}

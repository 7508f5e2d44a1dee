//! Widget state and refresh for calwidget.
//!
//! This crate sits between the Google provider and the desktop shell:
//! - Configuration from `config.toml`
//! - The `cache.json` dataset shown at startup
//! - A background scheduler for the 5-minute refresh
//! - The [`Syncer`], which owns the visible week and applies user actions
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use calwidget_core::WeekWindow;
//! use calwidget_google::google::GoogleProvider;
//! use calwidget_sync::{DiskCache, Syncer, WidgetConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WidgetConfig::load()?;
//!     let provider = Arc::new(GoogleProvider::new(config.to_google_config()?)?);
//!     let window = WeekWindow::current(&chrono::Local::now());
//!     let syncer = Syncer::new(provider, Some(DiskCache::new(config.cache_path())), window);
//!
//!     syncer.load_cold_start().await;
//!     syncer.refresh().await?;
//!     Ok(())
//! }
//! ```

mod cache;
mod config;
mod error;
mod scheduler;
mod state;
mod sync;

pub use cache::{CACHE_VERSION, DiskCache};
pub use config::{GoogleSettings, LogSettings, SyncSettings, WidgetConfig, WindowSettings};
pub use error::{SyncError, SyncResult};
pub use scheduler::{
    Scheduler, SchedulerCommand, SchedulerConfig, SchedulerHandle, SchedulerState,
    SharedSchedulerState,
};
pub use state::{Banner, DataSource, WidgetState, WidgetView};
pub use sync::{CompleteOutcome, RefreshOutcome, Syncer};

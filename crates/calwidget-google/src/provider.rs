//! WidgetProvider trait definition.
//!
//! This module defines the [`WidgetProvider`] trait, the seam between the sync
//! layer and whatever backend supplies events and tasks. The Google backend
//! implements it; tests and the demo mode supply their own.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use calwidget_core::{Event, Task, TimeWindow};

use crate::error::{ProviderError, ProviderResult};

/// Default polling interval suggested to the scheduler.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// A boxed future for async trait methods.
///
/// Boxed futures keep the trait object-safe so providers can be swapped
/// behind `Arc<dyn WidgetProvider>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The source of events and tasks shown by the widget.
///
/// # Implementation Notes
///
/// - Implementations must be `Send + Sync`; they are shared with the scheduler
/// - `fetch_events` handles pagination and multiple calendars internally
/// - Authentication state is managed internally
pub trait WidgetProvider: Send + Sync {
    /// Returns the name of this provider (e.g. "google").
    fn name(&self) -> &str;

    /// Fetches every event overlapping `window` across all visible calendars.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` on network errors, authentication failures, etc.
    fn fetch_events(&self, window: TimeWindow) -> BoxFuture<'_, ProviderResult<Vec<Event>>>;

    /// Fetches the open tasks of the configured task lists.
    fn fetch_tasks(&self) -> BoxFuture<'_, ProviderResult<Vec<Task>>>;

    /// Marks a task as completed.
    fn complete_task(&self, tasklist_id: &str, task_id: &str) -> BoxFuture<'_, ProviderResult<()>>;

    /// Checks if the provider currently holds usable credentials.
    fn is_authenticated(&self) -> bool;

    /// Runs the interactive sign-in again, replacing any stored credentials.
    fn reauthenticate(&self) -> BoxFuture<'_, ProviderResult<()>>;

    /// Returns the polling interval this provider suggests.
    fn suggested_poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }
}

/// A provider that always returns an error.
///
/// Used when the real provider fails to initialize, e.g. because
/// `credentials.json` is missing: the widget still starts and shows the error.
#[derive(Debug)]
pub struct ErrorProvider {
    name: String,
    error: ProviderError,
}

impl ErrorProvider {
    /// Creates a new error provider.
    pub fn new(name: impl Into<String>, error: ProviderError) -> Self {
        Self {
            name: name.into(),
            error,
        }
    }

    fn error(&self) -> ProviderError {
        self.error.duplicate().with_provider(&self.name)
    }
}

impl WidgetProvider for ErrorProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_events(&self, _window: TimeWindow) -> BoxFuture<'_, ProviderResult<Vec<Event>>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }

    fn fetch_tasks(&self) -> BoxFuture<'_, ProviderResult<Vec<Task>>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }

    fn complete_task(&self, _tasklist_id: &str, _task_id: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }

    fn is_authenticated(&self) -> bool {
        false
    }

    fn reauthenticate(&self) -> BoxFuture<'_, ProviderResult<()>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }
}

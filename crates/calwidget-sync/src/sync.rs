//! Refresh orchestration.
//!
//! [`Syncer`] owns the widget state. It shows the cached dataset at startup,
//! replaces it with live data on every successful refresh, and applies user
//! actions (week navigation, task completion). Every state change bumps a
//! revision counter on a `watch` channel so the shell can redraw.

use std::fmt::Display;
use std::sync::Arc;

use calwidget_core::{
    Dataset, EventDetail, Navigation, WeekWindow, render_week, updated_label,
};
use calwidget_google::WidgetProvider;
use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, info, warn};

use crate::cache::DiskCache;
use crate::error::{SyncError, SyncResult};
use crate::state::{Banner, DataSource, WidgetState, WidgetView};

/// What a refresh call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new dataset replaced the previous one.
    Updated,
    /// Another refresh was already running; it will pick up any week change.
    InFlight,
}

/// What a task completion call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    /// The API accepted the completion.
    Completed,
    /// The task was already completed or being completed; nothing was sent.
    AlreadyCompleted,
}

/// Owns widget state and talks to the provider.
pub struct Syncer {
    provider: Arc<dyn WidgetProvider>,
    cache: Option<DiskCache>,
    state: RwLock<WidgetState>,
    refresh_lock: Mutex<()>,
    revision: watch::Sender<u64>,
}

impl Syncer {
    /// Creates a syncer showing `window`.
    pub fn new(provider: Arc<dyn WidgetProvider>, cache: Option<DiskCache>, window: WeekWindow) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            provider,
            cache,
            state: RwLock::new(WidgetState::new(window)),
            refresh_lock: Mutex::new(()),
            revision,
        }
    }

    /// Returns the provider.
    pub fn provider(&self) -> &Arc<dyn WidgetProvider> {
        &self.provider
    }

    /// Subscribes to state changes. The value is a revision counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Shows the cached dataset, if any. Returns true when one was loaded.
    pub async fn load_cold_start(&self) -> bool {
        let Some(dataset) = self.cache.as_ref().and_then(DiskCache::load) else {
            return false;
        };
        self.update(|state| {
            // a live fetch may have finished first
            if state.source != DataSource::Live {
                state.dataset = Some(dataset);
                state.source = DataSource::Cache;
            }
        })
        .await;
        true
    }

    /// Fetches the visible week and replaces the dataset.
    ///
    /// At most one refresh runs at a time. When the week changes while a
    /// fetch is in flight, the fetch is repeated for the new week before the
    /// refresh returns.
    ///
    /// # Errors
    ///
    /// Provider failures are returned and also shown as a banner; the
    /// previous dataset stays on screen.
    pub async fn refresh(&self) -> SyncResult<RefreshOutcome> {
        let Ok(_guard) = self.refresh_lock.try_lock() else {
            debug!("refresh already running");
            return Ok(RefreshOutcome::InFlight);
        };

        self.update(|state| state.refreshing = true).await;
        let result = self.refresh_locked().await;
        self.update(|state| {
            state.refreshing = false;
            if let Err(SyncError::Provider(e)) = &result {
                state.banner = Some(Banner::for_error(e));
            }
        })
        .await;
        result
    }

    async fn refresh_locked(&self) -> SyncResult<RefreshOutcome> {
        loop {
            let (window, epoch) = {
                let state = self.state.read().await;
                (state.window, state.epoch)
            };
            let time_window = window.time_window(&Local);
            debug!(week = %window.start(), "fetching week");

            let (events, tasks) = tokio::join!(
                self.provider.fetch_events(time_window),
                self.provider.fetch_tasks()
            );
            let dataset = Dataset::new(window, events?, tasks?, Utc::now());

            let snapshot = {
                let mut state = self.state.write().await;
                if state.window != window {
                    debug!(week = %state.window.start(), "week changed during refresh, fetching again");
                    continue;
                }
                state.supersede(dataset, epoch);
                state.dataset.clone()
            };

            if let Some(dataset) = snapshot {
                info!(
                    week = %dataset.window.start(),
                    events = dataset.events.len(),
                    tasks = dataset.tasks.len(),
                    "dataset updated"
                );
                self.save_cache(&dataset);
            }
            return Ok(RefreshOutcome::Updated);
        }
    }

    /// Moves the visible week and returns the new one.
    ///
    /// The caller is expected to trigger a refresh afterwards.
    pub async fn navigate(&self, navigation: Navigation, today: NaiveDate) -> WeekWindow {
        let window = {
            let mut state = self.state.write().await;
            state.window = state.window.navigate(navigation, today);
            state.window
        };
        self.bump();
        debug!(week = %window.start(), ?navigation, "navigated");
        window
    }

    /// Follows the calendar into a new week when the previous one was on screen.
    ///
    /// Returns true when the visible week changed.
    pub async fn follow_current_week(&self, today: NaiveDate) -> bool {
        let current = WeekWindow::containing(today);
        let previous = WeekWindow::containing(today - Duration::days(7));
        let mut moved = false;
        {
            let mut state = self.state.write().await;
            if state.window == previous && previous != current {
                state.window = current;
                moved = true;
            }
        }
        if moved {
            info!(week = %current.start(), "week rolled over");
            self.bump();
        }
        moved
    }

    /// Marks a task completed locally and on the server.
    ///
    /// The local state flips immediately. Repeated calls for the same task
    /// send at most one request, and a refresh that was already fetching when
    /// the server accepted the completion cannot flip it back. A failed
    /// request reverts the task.
    pub async fn complete_task(&self, tasklist_id: &str, task_id: &str) -> SyncResult<CompleteOutcome> {
        let key = (tasklist_id.to_string(), task_id.to_string());
        {
            let mut state = self.state.write().await;
            if state.completing.contains(&key) {
                return Ok(CompleteOutcome::AlreadyCompleted);
            }
            let task = state
                .task_mut(tasklist_id, task_id)
                .ok_or_else(|| SyncError::task_not_found(tasklist_id, task_id))?;
            if task.completed {
                return Ok(CompleteOutcome::AlreadyCompleted);
            }
            task.completed = true;
            state.completing.insert(key.clone());
        }
        self.bump();

        let result = self.provider.complete_task(tasklist_id, task_id).await;

        let snapshot = {
            let mut state = self.state.write().await;
            state.completing.remove(&key);
            match &result {
                Ok(()) => {
                    state.acknowledge_completion(key);
                    state.dataset.clone()
                }
                Err(e) => {
                    if let Some(task) = state.task_mut(tasklist_id, task_id) {
                        task.completed = false;
                    }
                    state.banner = Some(Banner::for_error(e));
                    None
                }
            }
        };
        self.bump();

        result?;
        if let Some(dataset) = snapshot {
            self.save_cache(&dataset);
        }
        Ok(CompleteOutcome::Completed)
    }

    /// Runs the provider's sign-in flow again and clears any sign-in banner.
    pub async fn reauthenticate(&self) -> SyncResult<()> {
        match self.provider.reauthenticate().await {
            Ok(()) => {
                self.update(|state| {
                    if matches!(state.banner, Some(Banner::SignIn { .. })) {
                        state.banner = None;
                    }
                })
                .await;
                Ok(())
            }
            Err(e) => {
                let banner = Banner::for_error(&e);
                self.update(|state| state.banner = Some(banner)).await;
                Err(e.into())
            }
        }
    }

    /// Shows a startup problem, e.g. a broken config file, for the whole
    /// session. Refresh banners take precedence while they are up.
    pub async fn set_notice(&self, notice: Option<Banner>) {
        self.update(|state| state.notice = notice).await;
    }

    /// Builds the detail view of a visible event.
    pub async fn event_detail<Tz: TimeZone>(
        &self,
        calendar_id: &str,
        event_id: &str,
        tz: &Tz,
    ) -> SyncResult<EventDetail>
    where
        Tz::Offset: Display,
    {
        let state = self.state.read().await;
        state
            .dataset
            .as_ref()
            .and_then(|dataset| dataset.event(calendar_id, event_id))
            .map(|event| EventDetail::new(event, tz))
            .ok_or_else(|| SyncError::EventNotFound(event_id.to_string()))
    }

    /// Returns the Google Calendar link of an event, if it has one.
    pub async fn event_link(&self, calendar_id: &str, event_id: &str) -> SyncResult<Option<String>> {
        let state = self.state.read().await;
        state
            .dataset
            .as_ref()
            .and_then(|dataset| dataset.event(calendar_id, event_id))
            .map(|event| event.html_link.clone())
            .ok_or_else(|| SyncError::EventNotFound(event_id.to_string()))
    }

    /// Returns a copy of the state.
    pub async fn snapshot(&self) -> WidgetState {
        self.state.read().await.clone()
    }

    /// Renders the widget as seen at `now`.
    ///
    /// Events are drawn only from a dataset fetched for the visible week;
    /// tasks are not tied to a week and stay visible while a fetch is pending.
    pub async fn view<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> WidgetView
    where
        Tz::Offset: Display,
    {
        let state = self.state.read().await;
        let visible = state.visible_dataset();
        let events = visible.map(|d| d.events.as_slice()).unwrap_or_default();
        let tasks = state
            .dataset
            .as_ref()
            .map(|d| d.tasks.as_slice())
            .unwrap_or_default();

        WidgetView {
            week: render_week(state.window, events, tasks, now),
            banner: state.visible_banner().cloned(),
            source: state.source,
            refreshing: state.refreshing,
            loading: visible.is_none(),
            updated_label: state
                .dataset
                .as_ref()
                .map(|d| updated_label(d.fetched_at, now.with_timezone(&Utc))),
        }
    }

    async fn update(&self, apply: impl FnOnce(&mut WidgetState)) {
        apply(&mut *self.state.write().await);
        self.bump();
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn save_cache(&self, dataset: &Dataset) {
        if let Some(cache) = &self.cache
            && let Err(e) = cache.save(dataset)
        {
            warn!(error = %e, "failed to write cache");
        }
    }
}

impl std::fmt::Debug for Syncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Syncer")
            .field("provider", &self.provider.name())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

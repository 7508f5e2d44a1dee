//! Google provider implementation.
//!
//! This module implements the [`WidgetProvider`] trait on top of the Calendar
//! and Tasks clients. Every API call goes through the retry policy, and a
//! rejected access token is replaced once before the error is surfaced.

use std::future::Future;

use calwidget_core::{Event, Task, TimeWindow};
use tracing::{debug, info, warn};

use crate::auth::AuthManager;
use crate::error::{ErrorDisposition, ProviderError, ProviderResult};
use crate::provider::{BoxFuture, WidgetProvider};

use super::calendar::CalendarClient;
use super::config::{CALENDAR_SCOPE, GoogleConfig, TASKS_SCOPE};
use super::tasks::TasksClient;

const PROVIDER_NAME: &str = "google";

/// Google Calendar and Tasks provider.
#[derive(Debug)]
pub struct GoogleProvider {
    config: GoogleConfig,
    auth: AuthManager,
    calendar: CalendarClient,
    tasks: TasksClient,
}

impl GoogleProvider {
    /// Creates a provider with the given configuration.
    ///
    /// Stored tokens are loaded but no authentication is attempted until the
    /// first API call.
    pub fn new(config: GoogleConfig) -> ProviderResult<Self> {
        config.validate()?;
        let http_client = config.http_client()?;
        let auth = AuthManager::from_config(&config, http_client.clone());
        Ok(Self::assemble(config, auth, http_client))
    }

    /// Creates a provider with a custom auth manager.
    pub fn with_auth(config: GoogleConfig, auth: AuthManager) -> ProviderResult<Self> {
        let http_client = config.http_client()?;
        Ok(Self::assemble(config, auth, http_client))
    }

    fn assemble(config: GoogleConfig, auth: AuthManager, http_client: reqwest::Client) -> Self {
        let calendar = CalendarClient::new(http_client.clone(), &config.calendar_api_base);
        let tasks = TasksClient::new(http_client, &config.tasks_api_base);
        Self {
            config,
            auth,
            calendar,
            tasks,
        }
    }

    /// Returns the auth manager, e.g. for `auth` and `logout` commands.
    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    /// Runs an API call needing `scope` with retries and one token replacement.
    async fn call<T, F, Fut>(&self, what: &str, scope: &str, operation: F) -> ProviderResult<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let mut token_replaced = false;
        loop {
            let token = self
                .auth
                .access_token(scope)
                .await
                .map_err(|e| e.with_provider(PROVIDER_NAME))?;

            let result = self
                .config
                .retry
                .run(what, || operation(token.clone()))
                .await;

            match result {
                Err(err)
                    if err.disposition() == ErrorDisposition::Reauthenticate && !token_replaced =>
                {
                    warn!(operation = what, error = %err, "access token rejected, replacing it");
                    self.auth.invalidate();
                    token_replaced = true;
                }
                other => return other.map_err(|e| e.with_provider(PROVIDER_NAME)),
            }
        }
    }

    async fn fetch_events_impl(&self, window: TimeWindow) -> ProviderResult<Vec<Event>> {
        let calendars = self
            .call("list calendars", CALENDAR_SCOPE, |token| async move {
                self.calendar.list_calendars(&token).await
            })
            .await?;

        let mut events = Vec::new();
        for calendar in &calendars {
            let result = self
                .call("list events", CALENDAR_SCOPE, |token| async move {
                    self.calendar.list_events(&token, calendar, &window).await
                })
                .await;

            match result {
                Ok(mut fetched) => events.append(&mut fetched),
                Err(err) if calendar.primary || err.disposition() == ErrorDisposition::Reauthenticate => {
                    return Err(err);
                }
                Err(err) => {
                    warn!(calendar = %calendar.name, error = %err, "skipping calendar");
                }
            }
        }

        events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.title.cmp(&b.title)));
        info!(
            calendars = calendars.len(),
            events = events.len(),
            "fetched events"
        );
        Ok(events)
    }

    async fn fetch_tasks_impl(&self) -> ProviderResult<Vec<Task>> {
        let titles = &self.config.task_lists;
        let lists = self
            .call("list task lists", TASKS_SCOPE, |token| async move {
                self.tasks.resolve_task_lists(&token, titles).await
            })
            .await?;

        let mut tasks = Vec::new();
        for list in &lists {
            let mut fetched = self
                .call("list tasks", TASKS_SCOPE, |token| async move {
                    self.tasks.list_tasks(&token, &list.id).await
                })
                .await?;
            debug!(list = %list.title, count = fetched.len(), "fetched task list");
            tasks.append(&mut fetched);
        }
        Ok(tasks)
    }
}

impl WidgetProvider for GoogleProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn fetch_events(&self, window: TimeWindow) -> BoxFuture<'_, ProviderResult<Vec<Event>>> {
        Box::pin(self.fetch_events_impl(window))
    }

    fn fetch_tasks(&self) -> BoxFuture<'_, ProviderResult<Vec<Task>>> {
        Box::pin(self.fetch_tasks_impl())
    }

    fn complete_task(&self, tasklist_id: &str, task_id: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let tasklist_id = tasklist_id.to_string();
        let task_id = task_id.to_string();
        Box::pin(async move {
            let (tasklist_id, task_id) = (&tasklist_id, &task_id);
            self.call("complete task", TASKS_SCOPE, |token| async move {
                self.tasks.complete_task(&token, tasklist_id, task_id).await
            })
            .await
        })
    }

    fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    fn reauthenticate(&self) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async move {
            self.auth
                .reauthenticate()
                .await
                .map_err(|e: ProviderError| e.with_provider(PROVIDER_NAME))
        })
    }
}

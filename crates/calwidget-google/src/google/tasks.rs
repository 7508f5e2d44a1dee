//! Google Tasks API v1 client.

use calwidget_core::Task;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ProviderResult;

use super::api::{MAX_PAGES, send_empty, send_json};

/// Identifier of the user's default task list.
pub const DEFAULT_TASK_LIST_ID: &str = "@default";

/// A task list from `users/@me/lists`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskListInfo {
    pub id: String,
    pub title: String,
}

/// Google Tasks API client.
#[derive(Debug, Clone)]
pub struct TasksClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl TasksClient {
    pub fn new(http_client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Lists all task lists of the user.
    pub async fn list_task_lists(&self, access_token: &str) -> ProviderResult<Vec<TaskListInfo>> {
        let url = format!("{}/users/@me/lists", self.base_url);
        let mut lists = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut request = self
                .http_client
                .get(&url)
                .bearer_auth(access_token)
                .query(&[("maxResults", "100")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let page: TaskListsResponse = send_json(request).await?;

            lists.extend(page.items.into_iter().map(|entry| TaskListInfo {
                title: entry.title.unwrap_or_default(),
                id: entry.id,
            }));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(lists)
    }

    /// Resolves the configured list titles to task lists.
    ///
    /// Titles are matched case-insensitively. When none match, the user's
    /// default list is used.
    pub async fn resolve_task_lists(
        &self,
        access_token: &str,
        titles: &[String],
    ) -> ProviderResult<Vec<TaskListInfo>> {
        let lists = self.list_task_lists(access_token).await?;
        let matched: Vec<TaskListInfo> = lists
            .into_iter()
            .filter(|list| {
                titles
                    .iter()
                    .any(|title| title.trim().eq_ignore_ascii_case(list.title.trim()))
            })
            .collect();

        if matched.is_empty() {
            info!(wanted = ?titles, "no task list matched, using the default list");
            return Ok(vec![TaskListInfo {
                id: DEFAULT_TASK_LIST_ID.to_string(),
                title: DEFAULT_TASK_LIST_ID.to_string(),
            }]);
        }
        Ok(matched)
    }

    /// Lists the open tasks of one list.
    pub async fn list_tasks(&self, access_token: &str, tasklist_id: &str) -> ProviderResult<Vec<Task>> {
        let url = format!(
            "{}/lists/{}/tasks",
            self.base_url,
            urlencoding::encode(tasklist_id)
        );
        let mut tasks = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut request = self
                .http_client
                .get(&url)
                .bearer_auth(access_token)
                .query(&[("showCompleted", "false"), ("maxResults", "100")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let page: TasksResponse = send_json(request).await?;

            tasks.extend(
                page.items
                    .into_iter()
                    .filter_map(|entry| entry.into_task(tasklist_id)),
            );

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(tasklist = %tasklist_id, count = tasks.len(), "fetched tasks");
        Ok(tasks)
    }

    /// Marks a task as completed.
    pub async fn complete_task(
        &self,
        access_token: &str,
        tasklist_id: &str,
        task_id: &str,
    ) -> ProviderResult<()> {
        let url = format!(
            "{}/lists/{}/tasks/{}",
            self.base_url,
            urlencoding::encode(tasklist_id),
            urlencoding::encode(task_id)
        );
        let request = self
            .http_client
            .patch(&url)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "status": "completed" }));
        send_empty(request).await?;
        info!(tasklist = %tasklist_id, task = %task_id, "completed task");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskListsResponse {
    #[serde(default)]
    items: Vec<TaskListEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskListEntry {
    id: String,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TasksResponse {
    #[serde(default)]
    items: Vec<TaskEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskEntry {
    id: Option<String>,
    title: Option<String>,
    status: Option<String>,
    due: Option<String>,
    notes: Option<String>,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    hidden: bool,
}

impl TaskEntry {
    fn into_task(self, tasklist_id: &str) -> Option<Task> {
        if self.deleted || self.hidden {
            return None;
        }
        let id = self.id?;
        let title = self.title.filter(|t| !t.trim().is_empty())?;

        let mut task = Task::new(id, title, tasklist_id);
        task.completed = self.status.as_deref() == Some("completed");
        if let Some(due) = self.due.as_deref().and_then(parse_due) {
            task = task.with_due(due);
        }
        if let Some(notes) = self.notes.filter(|n| !n.is_empty()) {
            task = task.with_notes(notes);
        }
        Some(task)
    }
}

/// The API stores due dates as midnight UTC; only the date is meaningful.
fn parse_due(value: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .or_else(|| NaiveDate::parse_from_str(value, "%Y-%m-%d").ok())
}

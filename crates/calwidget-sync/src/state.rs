//! In-memory widget state and the view handed to the UI.

use std::collections::{HashMap, HashSet};

use calwidget_core::{Dataset, Task, WeekView, WeekWindow};
use calwidget_google::{ErrorDisposition, ProviderError, ProviderErrorCode};
use serde::Serialize;

/// Where the displayed dataset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Nothing fetched or cached yet.
    Empty,
    /// Loaded from `cache.json` at startup.
    Cache,
    /// Fetched from the API during this session.
    Live,
}

/// Non-fatal notice shown above the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Banner {
    /// A transient failure; cached data stays visible and a retry is offered.
    Retry { message: String },
    /// Credentials are missing or were rejected; offers to sign in again.
    SignIn { message: String },
    /// Anything else worth telling the user.
    Error { message: String },
}

impl Banner {
    /// Chooses the banner for a provider error by its disposition.
    ///
    /// Missing permissions, such as a scope declined at consent, offer a new
    /// sign-in without starting one.
    pub fn for_error(error: &ProviderError) -> Self {
        if error.code() == ProviderErrorCode::AuthorizationFailed {
            return Self::SignIn {
                message: error.message().to_string(),
            };
        }
        match error.disposition() {
            ErrorDisposition::Retry => Self::Retry {
                message: "Can't reach Google. Showing saved data.".to_string(),
            },
            ErrorDisposition::Reauthenticate => Self::SignIn {
                message: "Google sign-in expired.".to_string(),
            },
            ErrorDisposition::Surface => Self::Error {
                message: error.message().to_string(),
            },
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Retry { message } | Self::SignIn { message } | Self::Error { message } => message,
        }
    }
}

/// Everything the UI draws, serialized to the webview.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetView {
    pub week: WeekView,
    pub banner: Option<Banner>,
    pub source: DataSource,
    /// A refresh is running.
    pub refreshing: bool,
    /// The visible week has no dataset yet.
    pub loading: bool,
    /// e.g. `updated 3 min ago`.
    pub updated_label: Option<String>,
}

/// Mutable state shared between the UI commands and the refresh task.
#[derive(Debug, Clone)]
pub struct WidgetState {
    /// The week currently on screen.
    pub window: WeekWindow,
    /// The last dataset, possibly for another week while a fetch is pending.
    pub dataset: Option<Dataset>,
    pub source: DataSource,
    /// Set by a failed refresh or task completion.
    pub banner: Option<Banner>,
    /// A setup problem found at startup. Shown whenever no other banner is up.
    pub notice: Option<Banner>,
    pub refreshing: bool,
    /// Tasks whose completion request is in flight, as `(list, task)`.
    pub completing: HashSet<(String, String)>,
    /// Completions the server acknowledged, with the epoch they landed in.
    pub completed: HashMap<(String, String), u64>,
    /// Bumped on every acknowledged completion. A fetch records the epoch it
    /// started in.
    pub epoch: u64,
}

impl WidgetState {
    /// Creates the state shown before any data arrives.
    pub fn new(window: WeekWindow) -> Self {
        Self {
            window,
            dataset: None,
            source: DataSource::Empty,
            banner: None,
            notice: None,
            refreshing: false,
            completing: HashSet::new(),
            completed: HashMap::new(),
            epoch: 0,
        }
    }

    /// Returns the dataset when it belongs to the visible week.
    pub fn visible_dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref().filter(|d| d.window == self.window)
    }

    /// The banner to draw.
    pub fn visible_banner(&self) -> Option<&Banner> {
        self.banner.as_ref().or(self.notice.as_ref())
    }

    /// Records a completion the server accepted and returns its epoch.
    pub fn acknowledge_completion(&mut self, key: (String, String)) -> u64 {
        self.epoch += 1;
        self.completed.insert(key, self.epoch);
        self.epoch
    }

    /// Replaces the dataset with one whose fetch started in `fetch_epoch`.
    ///
    /// Tasks with a completion in flight, or acknowledged after the fetch
    /// started, stay completed. Acknowledgements older than the fetch are
    /// dropped since the server already reflected them.
    pub fn supersede(&mut self, mut dataset: Dataset, fetch_epoch: u64) {
        self.completed.retain(|_, acked| *acked > fetch_epoch);
        for task in &mut dataset.tasks {
            let key = (task.tasklist_id.clone(), task.id.clone());
            if self.completing.contains(&key) || self.completed.contains_key(&key) {
                task.completed = true;
            }
        }
        self.dataset = Some(dataset);
        self.source = DataSource::Live;
        self.banner = None;
    }

    pub fn task_mut(&mut self, tasklist_id: &str, task_id: &str) -> Option<&mut Task> {
        self.dataset.as_mut()?.task_mut(tasklist_id, task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn week() -> WeekWindow {
        WeekWindow::containing(NaiveDate::from_ymd_opt(2026, 10, 14).unwrap())
    }

    #[test]
    fn banner_follows_disposition() {
        assert!(matches!(
            Banner::for_error(&ProviderError::network("offline")),
            Banner::Retry { .. }
        ));
        assert!(matches!(
            Banner::for_error(&ProviderError::authentication("expired")),
            Banner::SignIn { .. }
        ));
        let surfaced = Banner::for_error(&ProviderError::not_found("calendar gone"));
        assert_eq!(surfaced.message(), "calendar gone");
        assert_eq!(
            Banner::for_error(&ProviderError::authorization("no access to tasks")),
            Banner::SignIn {
                message: "no access to tasks".to_string(),
            }
        );
    }

    #[test]
    fn banner_serializes_with_kind() {
        let json = serde_json::to_value(Banner::SignIn {
            message: "Google sign-in expired.".to_string(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "signIn", "message": "Google sign-in expired."})
        );
    }

    #[test]
    fn dataset_for_other_week_is_not_visible() {
        let mut state = WidgetState::new(week());
        state.supersede(Dataset::empty(week(), Utc::now()), 0);
        assert!(state.visible_dataset().is_some());

        state.window = week().shifted(1);
        assert!(state.visible_dataset().is_none());
        assert!(state.dataset.is_some());
    }

    #[test]
    fn supersede_keeps_pending_completions() {
        let mut state = WidgetState::new(week());
        state.banner = Some(Banner::Retry {
            message: "offline".to_string(),
        });
        state
            .completing
            .insert(("L1".to_string(), "t1".to_string()));

        let dataset = Dataset::new(
            week(),
            vec![],
            vec![Task::new("t1", "Pay rent", "L1"), Task::new("t2", "Call mom", "L1")],
            Utc::now(),
        );
        state.supersede(dataset, 0);

        assert_eq!(state.source, DataSource::Live);
        assert!(state.banner.is_none());
        assert!(state.task_mut("L1", "t1").unwrap().completed);
        assert!(!state.task_mut("L1", "t2").unwrap().completed);
    }

    fn pay_rent() -> Dataset {
        Dataset::new(week(), vec![], vec![Task::new("t1", "Pay rent", "L1")], Utc::now())
    }

    #[test]
    fn acknowledged_completion_outlives_older_fetches() {
        let mut state = WidgetState::new(week());
        let started = state.epoch;
        let acked = state.acknowledge_completion(("L1".to_string(), "t1".to_string()));
        assert!(acked > started);

        // fetched before the server saw the completion
        state.supersede(pay_rent(), started);
        assert!(state.task_mut("L1", "t1").unwrap().completed);

        // a fetch started afterwards is authoritative
        state.supersede(pay_rent(), acked);
        assert!(state.completed.is_empty());
        assert!(!state.task_mut("L1", "t1").unwrap().completed);
    }

    #[test]
    fn startup_notice_survives_successful_refresh() {
        let mut state = WidgetState::new(week());
        state.notice = Some(Banner::Error {
            message: "config.toml: invalid value".to_string(),
        });
        state.banner = Some(Banner::Retry {
            message: "offline".to_string(),
        });
        assert!(matches!(state.visible_banner(), Some(Banner::Retry { .. })));

        state.supersede(pay_rent(), 0);
        assert!(state.banner.is_none());
        assert_eq!(
            state.visible_banner().map(Banner::message),
            Some("config.toml: invalid value")
        );
    }
}

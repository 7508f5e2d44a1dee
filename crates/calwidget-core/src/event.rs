//! Calendar events, tasks, and the dataset that bundles them.
//!
//! - [`Event`]: one calendar entry, immutable once fetched
//! - [`Task`]: one entry of a task list; only its completion state changes
//! - [`Dataset`]: everything fetched for one [`WeekWindow`]

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::time::EventTime;
use crate::week::WeekWindow;

/// Colour used when a calendar reports none.
pub const DEFAULT_CALENDAR_COLOR: &str = "#3b82f6";

/// Title shown for events without a summary.
pub const UNTITLED_EVENT: &str = "(No title)";

/// A calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Provider-specific event ID.
    pub id: String,
    /// Event title.
    pub title: String,
    /// Event start.
    pub start: EventTime,
    /// Event end. Exclusive; for all-day events this is the day after the last day.
    pub end: EventTime,
    /// ID of the calendar this event belongs to.
    pub calendar_id: String,
    /// Display name of the calendar.
    pub calendar_name: String,
    /// Calendar colour as a CSS hex string.
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Link to the event in the Google Calendar web UI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
}

impl Event {
    /// Creates an event in the default calendar colour.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start: EventTime,
        end: EventTime,
        calendar_id: impl Into<String>,
    ) -> Self {
        let calendar_id = calendar_id.into();
        Self {
            id: id.into(),
            title: title.into(),
            start,
            end,
            calendar_name: calendar_id.clone(),
            calendar_id,
            color: DEFAULT_CALENDAR_COLOR.to_string(),
            location: None,
            description: None,
            html_link: None,
        }
    }

    /// Sets the calendar display name and colour.
    pub fn with_calendar(mut self, name: impl Into<String>, color: impl Into<String>) -> Self {
        self.calendar_name = name.into();
        self.color = color.into();
        self
    }

    /// Sets the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the web link.
    pub fn with_html_link(mut self, link: impl Into<String>) -> Self {
        self.html_link = Some(link.into());
        self
    }

    /// Returns `true` if this is an all-day event.
    pub fn is_all_day(&self) -> bool {
        self.start.is_all_day()
    }

    /// All-day events cover `[start, end)` dates. Returns `None` for timed events.
    pub fn all_day_dates(&self) -> Option<(NaiveDate, NaiveDate)> {
        let start = self.start.as_date()?;
        let end = self.end.as_date().filter(|end| *end > start);
        Some((start, end.unwrap_or_else(|| start.succ_opt().unwrap_or(start))))
    }

    /// Timed events cover `[start, end)` instants. Returns `None` for all-day events.
    pub fn timed_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.start.as_datetime()?;
        let end = self.end.as_datetime().unwrap_or(start).max(start);
        Some((start, end))
    }
}

/// A task from a Google Tasks list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Provider-specific task ID.
    pub id: String,
    pub title: String,
    /// Due date. Google Tasks only stores the date part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
    /// ID of the list that holds this task.
    pub tasklist_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Task {
    /// Creates an open task.
    pub fn new(id: impl Into<String>, title: impl Into<String>, tasklist_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            due: None,
            completed: false,
            tasklist_id: tasklist_id.into(),
            notes: None,
        }
    }

    /// Sets the due date.
    pub fn with_due(mut self, due: NaiveDate) -> Self {
        self.due = Some(due);
        self
    }

    /// Sets the notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// An open task is overdue once its due date has passed.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.completed && self.due.is_some_and(|due| due < today)
    }
}

/// Events and tasks fetched together for one week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// The week this dataset was fetched for.
    pub window: WeekWindow,
    pub events: Vec<Event>,
    pub tasks: Vec<Task>,
    /// When the data was fetched from the API.
    pub fetched_at: DateTime<Utc>,
}

impl Dataset {
    /// Creates a dataset with events sorted by start time.
    pub fn new(window: WeekWindow, events: Vec<Event>, tasks: Vec<Task>, fetched_at: DateTime<Utc>) -> Self {
        let mut dataset = Self {
            window,
            events,
            tasks,
            fetched_at,
        };
        dataset.sort();
        dataset
    }

    /// An empty dataset for `window`.
    pub fn empty(window: WeekWindow, fetched_at: DateTime<Utc>) -> Self {
        Self::new(window, Vec::new(), Vec::new(), fetched_at)
    }

    /// Sorts events by start time (all-day first), then title.
    pub fn sort(&mut self) {
        self.events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.title.cmp(&b.title)));
    }

    /// Looks up an event by calendar and event ID.
    ///
    /// An invitation shared by two calendars appears once per calendar with
    /// the same event ID.
    pub fn event(&self, calendar_id: &str, event_id: &str) -> Option<&Event> {
        self.events
            .iter()
            .find(|event| event.id == event_id && event.calendar_id == calendar_id)
    }

    /// Looks up a task by list and task ID.
    pub fn task(&self, tasklist_id: &str, task_id: &str) -> Option<&Task> {
        self.tasks
            .iter()
            .find(|task| task.id == task_id && task.tasklist_id == tasklist_id)
    }

    /// Mutable lookup of a task by list and task ID.
    pub fn task_mut(&mut self, tasklist_id: &str, task_id: &str) -> Option<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|task| task.id == task_id && task.tasklist_id == tasklist_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn timed(id: &str, title: &str, hour: u32) -> Event {
        Event::new(
            id,
            title,
            EventTime::from_utc(Utc.with_ymd_and_hms(2026, 10, 14, hour, 0, 0).unwrap()),
            EventTime::from_utc(Utc.with_ymd_and_hms(2026, 10, 14, hour + 1, 0, 0).unwrap()),
            "primary",
        )
    }

    #[test]
    fn new_event_defaults() {
        let event = timed("e1", "Standup", 9);
        assert_eq!(event.color, DEFAULT_CALENDAR_COLOR);
        assert_eq!(event.calendar_name, "primary");
        assert!(!event.is_all_day());
        assert!(event.all_day_dates().is_none());

        let event = event.with_calendar("Work", "#ff0000").with_location("Room 1");
        assert_eq!(event.calendar_name, "Work");
        assert_eq!(event.color, "#ff0000");
        assert_eq!(event.location.as_deref(), Some("Room 1"));
    }

    #[test]
    fn all_day_dates_end_is_exclusive() {
        let event = Event::new(
            "e1",
            "Holiday",
            EventTime::from_date(date(2026, 10, 14)),
            EventTime::from_date(date(2026, 10, 16)),
            "primary",
        );
        assert_eq!(event.all_day_dates(), Some((date(2026, 10, 14), date(2026, 10, 16))));
        assert!(event.timed_range().is_none());
    }

    #[test]
    fn all_day_with_bad_end_covers_one_day() {
        let event = Event::new(
            "e1",
            "Holiday",
            EventTime::from_date(date(2026, 10, 14)),
            EventTime::from_date(date(2026, 10, 14)),
            "primary",
        );
        assert_eq!(event.all_day_dates(), Some((date(2026, 10, 14), date(2026, 10, 15))));
    }

    #[test]
    fn timed_range_never_inverted() {
        let mut event = timed("e1", "Broken", 10);
        event.end = EventTime::from_utc(Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap());
        let (start, end) = event.timed_range().unwrap();
        assert_eq!(start, end);
    }

    #[test]
    fn overdue_tasks() {
        let today = date(2026, 10, 16);
        let task = Task::new("t1", "Pay rent", "list");
        assert!(!task.is_overdue(today));

        let task = task.with_due(date(2026, 10, 15));
        assert!(task.is_overdue(today));

        let mut done = task.clone();
        done.completed = true;
        assert!(!done.is_overdue(today));

        assert!(!Task::new("t2", "Today", "list").with_due(today).is_overdue(today));
    }

    #[test]
    fn dataset_sorts_and_finds() {
        let window = WeekWindow::containing(date(2026, 10, 14));
        let all_day = Event::new(
            "e0",
            "Holiday",
            EventTime::from_date(date(2026, 10, 14)),
            EventTime::from_date(date(2026, 10, 15)),
            "primary",
        );
        let mut dataset = Dataset::new(
            window,
            vec![timed("e2", "Lunch", 12), timed("e1", "Standup", 9), all_day],
            vec![Task::new("t1", "Pay rent", "list")],
            Utc::now(),
        );

        let ids: Vec<_> = dataset.events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["e0", "e1", "e2"]);

        assert_eq!(dataset.event("primary", "e2").map(|e| e.title.as_str()), Some("Lunch"));
        assert!(dataset.event("other", "e2").is_none());
        assert!(dataset.task("other", "t1").is_none());

        dataset.task_mut("list", "t1").unwrap().completed = true;
        assert!(dataset.task("list", "t1").unwrap().completed);
    }

    #[test]
    fn dataset_serde_roundtrip() {
        let window = WeekWindow::containing(date(2026, 10, 14));
        let dataset = Dataset::new(
            window,
            vec![timed("e1", "Standup", 9).with_html_link("https://calendar.google.com/e1")],
            vec![Task::new("t1", "Pay rent", "list").with_due(date(2026, 10, 20))],
            Utc.with_ymd_and_hms(2026, 10, 14, 8, 0, 0).unwrap(),
        );
        let json = serde_json::to_string(&dataset).unwrap();
        let restored: Dataset = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, dataset);
    }
}

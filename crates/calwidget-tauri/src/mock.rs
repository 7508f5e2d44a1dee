//! Demo data for `--mock`, generated around whichever week is on screen.

use std::sync::Mutex;

use calwidget_core::{Event, EventTime, Task, TimeWindow, WeekWindow, local_midnight};
use calwidget_google::{BoxFuture, ProviderError, ProviderResult, WidgetProvider};
use chrono::{Duration, Local, NaiveDate, TimeZone};
use tracing::debug;

const WORK: (&str, &str, &str) = ("work", "Work", "#3b82f6");
const HOME: (&str, &str, &str) = ("home", "Personal", "#10b981");

/// A provider that never leaves the machine.
pub struct DemoProvider<Tz: TimeZone = Local> {
    tz: Tz,
    tasks: Mutex<Vec<Task>>,
}

impl DemoProvider {
    pub fn new(today: NaiveDate) -> Self {
        Self::with_timezone(today, Local)
    }
}

impl<Tz: TimeZone> DemoProvider<Tz> {
    pub fn with_timezone(today: NaiveDate, tz: Tz) -> Self {
        Self {
            tz,
            tasks: Mutex::new(demo_tasks(today)),
        }
    }

    fn events_for(&self, window: TimeWindow) -> Vec<Event> {
        let week = WeekWindow::containing(window.start.with_timezone(&self.tz).date_naive());
        let days: Vec<NaiveDate> = week.days().collect();
        let mut events = Vec::new();

        for (index, day) in days.iter().take(5).enumerate() {
            events.push(self.timed(
                format!("standup-{index}"),
                "Team stand-up",
                *day,
                (9, 30),
                15,
                WORK,
            ));
        }
        events.push(
            self.timed("design-review", "Design review", days[2], (14, 0), 60, WORK)
                .with_location("Room 4B")
                .with_description("Walk through the new onboarding screens."),
        );
        events.push(self.timed("one-on-one", "1:1 with Sam", days[2], (14, 30), 60, WORK));
        events.push(self.timed("release", "Release party", days[4], (22, 0), 180, HOME));
        events.push(self.timed("gym", "Gym", days[5], (10, 0), 90, HOME));
        events.push(
            Event::new(
                "offsite",
                "Team offsite",
                EventTime::from_date(days[3]),
                EventTime::from_date(days[3] + Duration::days(2)),
                WORK.0,
            )
            .with_calendar(WORK.1, WORK.2)
            .with_location("Lisbon"),
        );

        events.retain(|event| {
            event
                .timed_range()
                .is_none_or(|(start, end)| window.overlaps(start, end))
        });
        events
    }

    fn timed(
        &self,
        id: impl Into<String>,
        title: &str,
        day: NaiveDate,
        (hour, minute): (i64, i64),
        length_minutes: i64,
        (calendar_id, calendar_name, color): (&str, &str, &str),
    ) -> Event {
        let start = local_midnight(day, &self.tz) + Duration::minutes(hour * 60 + minute);
        let end = start + Duration::minutes(length_minutes);
        Event::new(
            id,
            title,
            EventTime::from_utc(start),
            EventTime::from_utc(end),
            calendar_id,
        )
        .with_calendar(calendar_name, color)
    }
}

fn demo_tasks(today: NaiveDate) -> Vec<Task> {
    vec![
        Task::new("renew-passport", "Renew passport", "demo")
            .with_due(today - Duration::days(2))
            .with_notes("Photos are in the top drawer."),
        Task::new("pay-rent", "Pay rent", "demo").with_due(today),
        Task::new("book-flights", "Book flights", "demo").with_due(today + Duration::days(3)),
        Task::new("read", "Finish the novel", "demo"),
    ]
}

impl<Tz> WidgetProvider for DemoProvider<Tz>
where
    Tz: TimeZone + Send + Sync,
{
    fn name(&self) -> &str {
        "demo"
    }

    fn fetch_events(&self, window: TimeWindow) -> BoxFuture<'_, ProviderResult<Vec<Event>>> {
        let events = self.events_for(window);
        debug!(count = events.len(), "generated demo events");
        Box::pin(async move { Ok(events) })
    }

    fn fetch_tasks(&self) -> BoxFuture<'_, ProviderResult<Vec<Task>>> {
        Box::pin(async move {
            let tasks = self
                .tasks
                .lock()
                .map_err(|_| ProviderError::internal("demo task lock poisoned"))?;
            Ok(tasks.iter().filter(|t| !t.completed).cloned().collect())
        })
    }

    fn complete_task(&self, tasklist_id: &str, task_id: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let (tasklist_id, task_id) = (tasklist_id.to_string(), task_id.to_string());
        Box::pin(async move {
            let mut tasks = self
                .tasks
                .lock()
                .map_err(|_| ProviderError::internal("demo task lock poisoned"))?;
            let task = tasks
                .iter_mut()
                .find(|t| t.tasklist_id == tasklist_id && t.id == task_id)
                .ok_or_else(|| ProviderError::not_found(format!("task {task_id} not found")))?;
            task.completed = true;
            Ok(())
        })
    }

    fn is_authenticated(&self) -> bool {
        true
    }

    fn reauthenticate(&self) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

//! Week-view layout.
//!
//! [`render_week`] is a pure function from a week, its events and tasks, and
//! the current time to a [`WeekView`] the webview draws without further
//! computation. Vertical positions are percentages of a 24-hour column so the
//! frontend can size the grid freely.
//!
//! Timed events are split into one segment per local day they touch. Segments
//! shorter than [`MIN_EVENT_MINUTES`] are stretched so they stay clickable.
//! Overlapping segments are packed into lanes: each overlap cluster gets as
//! many lanes as its busiest moment needs, and every segment records its lane
//! and the cluster's lane count.

use std::fmt::Display;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use serde::Serialize;

use crate::event::{Event, Task};
use crate::format::{due_label, time_range_label};
use crate::time::{TimeWindow, local_midnight};
use crate::week::{WeekWindow, weekday_short};

/// Minutes in a day column.
pub const MINUTES_PER_DAY: i64 = 24 * 60;

/// Shortest height an event is drawn with.
pub const MIN_EVENT_MINUTES: i64 = 15;

/// The rendered week.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekView {
    pub week_start: NaiveDate,
    pub iso_year: i32,
    pub iso_week: u32,
    /// Header title, e.g. `Week 42`.
    pub title: String,
    /// Date range, e.g. `12 – 18 Oct 2026`.
    pub range_label: String,
    pub days: Vec<DayColumn>,
    /// Current-time line, present only when today is in this week.
    pub now: Option<NowIndicator>,
    pub tasks: Vec<TaskRow>,
    pub can_go_back: bool,
    pub can_go_forward: bool,
}

/// One day of the week grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayColumn {
    pub date: NaiveDate,
    /// Short weekday name, e.g. `Mon`.
    pub weekday: String,
    pub day_of_month: u32,
    pub is_today: bool,
    pub all_day: Vec<AllDayItem>,
    pub timed: Vec<TimedItem>,
}

/// An all-day event in a day's all-day row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllDayItem {
    pub calendar_id: String,
    pub event_id: String,
    pub title: String,
    pub color: String,
    /// The event also covers the previous day.
    pub continues_before: bool,
    /// The event also covers the next day.
    pub continues_after: bool,
}

/// A positioned segment of a timed event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedItem {
    pub calendar_id: String,
    pub event_id: String,
    pub title: String,
    pub color: String,
    pub time_label: String,
    pub location: Option<String>,
    /// Distance from the top of the column, in percent.
    pub top: f64,
    /// Height, in percent of the column.
    pub height: f64,
    /// Zero-based lane inside the overlap cluster.
    pub lane: usize,
    /// Number of lanes in the overlap cluster.
    pub lanes: usize,
    /// The event started on an earlier day.
    pub starts_before: bool,
    /// The event ends on a later day.
    pub ends_after: bool,
}

/// Position of the current-time line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NowIndicator {
    pub day_index: usize,
    pub top: f64,
}

/// A row of the tasks panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRow {
    pub id: String,
    pub tasklist_id: String,
    pub title: String,
    pub due_label: Option<String>,
    pub overdue: bool,
    pub completed: bool,
}

/// Lays out `events` and `tasks` for `window` as seen at `now`.
///
/// The timezone of `now` decides day boundaries and wall-clock positions.
pub fn render_week<Tz: TimeZone>(
    window: WeekWindow,
    events: &[Event],
    tasks: &[Task],
    now: &DateTime<Tz>,
) -> WeekView
where
    Tz::Offset: Display,
{
    let tz = now.timezone();
    let today = now.date_naive();
    let (iso_year, iso_week) = window.iso_week();

    let days = window
        .days()
        .map(|date| DayColumn {
            date,
            weekday: weekday_short(date.weekday()).to_string(),
            day_of_month: date.day(),
            is_today: date == today,
            all_day: all_day_items(date, events),
            timed: timed_items(date, events, &tz),
        })
        .collect();

    let now_indicator = window.day_index(today).map(|day_index| NowIndicator {
        day_index,
        top: percent(minute_of_day(now)),
    });

    WeekView {
        week_start: window.start(),
        iso_year,
        iso_week,
        title: format!("Week {iso_week}"),
        range_label: window.label(),
        days,
        now: now_indicator,
        tasks: task_rows(tasks, today),
        can_go_back: window.has_previous(),
        can_go_forward: window.has_next(),
    }
}

/// Time until the next minute boundary, for the current-time indicator tick.
pub fn next_tick_delay(now: DateTime<Utc>) -> StdDuration {
    // nanosecond() exceeds one second during a leap second
    let nanos = u64::from(now.nanosecond().min(999_999_999));
    let elapsed_ms = u64::from(now.second()) * 1000 + nanos / 1_000_000;
    StdDuration::from_millis(60_000u64.saturating_sub(elapsed_ms).max(1))
}

fn all_day_items(date: NaiveDate, events: &[Event]) -> Vec<AllDayItem> {
    events
        .iter()
        .filter_map(|event| {
            let (start, end) = event.all_day_dates()?;
            if date < start || date >= end {
                return None;
            }
            Some(AllDayItem {
                calendar_id: event.calendar_id.clone(),
                event_id: event.id.clone(),
                title: event.title.clone(),
                color: event.color.clone(),
                continues_before: start < date,
                continues_after: date.succ_opt().is_some_and(|next| next < end),
            })
        })
        .collect()
}

/// A timed segment before lane assignment, in display minutes.
struct Segment<'a> {
    event: &'a Event,
    top: i64,
    len: i64,
    starts_before: bool,
    ends_after: bool,
}

impl Segment<'_> {
    fn bottom(&self) -> i64 {
        self.top + self.len
    }
}

fn timed_items<Tz: TimeZone>(date: NaiveDate, events: &[Event], tz: &Tz) -> Vec<TimedItem>
where
    Tz::Offset: Display,
{
    let day = TimeWindow::for_date(date, tz);
    let mut segments: Vec<Segment<'_>> = events
        .iter()
        .filter_map(|event| segment_for_day(event, &day, tz))
        .collect();
    segments.sort_by(|a, b| {
        a.top
            .cmp(&b.top)
            .then_with(|| b.len.cmp(&a.len))
            .then_with(|| a.event.title.cmp(&b.event.title))
    });

    let lanes = assign_lanes(&segments);
    segments
        .iter()
        .zip(lanes)
        .map(|(segment, (lane, lanes))| TimedItem {
            calendar_id: segment.event.calendar_id.clone(),
            event_id: segment.event.id.clone(),
            title: segment.event.title.clone(),
            color: segment.event.color.clone(),
            time_label: time_range_label(segment.event, tz),
            location: segment.event.location.clone(),
            top: percent(segment.top),
            height: percent(segment.len),
            lane,
            lanes,
            starts_before: segment.starts_before,
            ends_after: segment.ends_after,
        })
        .collect()
}

fn segment_for_day<'a, Tz: TimeZone>(event: &'a Event, day: &TimeWindow, tz: &Tz) -> Option<Segment<'a>> {
    let (start, end) = event.timed_range()?;
    let (clip_start, clip_end) = day.clip(start, end)?;

    let start_min = if clip_start == day.start {
        0
    } else {
        minute_of_day(&clip_start.with_timezone(tz))
    };
    let end_min = if clip_end >= day.end {
        MINUTES_PER_DAY
    } else {
        minute_of_day(&clip_end.with_timezone(tz))
    };

    let len = (end_min - start_min).max(MIN_EVENT_MINUTES);
    let top = start_min.min(MINUTES_PER_DAY - len).max(0);
    Some(Segment {
        event,
        top,
        len,
        starts_before: start < day.start,
        ends_after: end > day.end,
    })
}

/// Returns `(lane, lanes)` for each segment. Segments must be sorted by top.
fn assign_lanes(segments: &[Segment<'_>]) -> Vec<(usize, usize)> {
    let mut result = Vec::with_capacity(segments.len());
    let mut lane_ends: Vec<i64> = Vec::new();
    let mut cluster_start = 0;
    let mut cluster_end = i64::MIN;

    for (index, segment) in segments.iter().enumerate() {
        if segment.top >= cluster_end {
            close_cluster(&mut result[cluster_start..], lane_ends.len());
            lane_ends.clear();
            cluster_start = index;
        }

        let lane = match lane_ends.iter().position(|end| *end <= segment.top) {
            Some(free) => {
                lane_ends[free] = segment.bottom();
                free
            }
            None => {
                lane_ends.push(segment.bottom());
                lane_ends.len() - 1
            }
        };
        cluster_end = cluster_end.max(segment.bottom());
        result.push((lane, 0));
    }
    close_cluster(&mut result[cluster_start..], lane_ends.len());
    result
}

fn close_cluster(cluster: &mut [(usize, usize)], lanes: usize) {
    for entry in cluster {
        entry.1 = lanes;
    }
}

fn task_rows(tasks: &[Task], today: NaiveDate) -> Vec<TaskRow> {
    let mut sorted: Vec<&Task> = tasks.iter().collect();
    sorted.sort_by(|a, b| {
        a.completed
            .cmp(&b.completed)
            .then_with(|| match (a.due, b.due) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
    });

    sorted
        .into_iter()
        .map(|task| TaskRow {
            id: task.id.clone(),
            tasklist_id: task.tasklist_id.clone(),
            title: task.title.clone(),
            due_label: task.due.map(|due| due_label(due, today)),
            overdue: task.is_overdue(today),
            completed: task.completed,
        })
        .collect()
}

fn minute_of_day<Tz: TimeZone>(dt: &DateTime<Tz>) -> i64 {
    i64::from(dt.hour()) * 60 + i64::from(dt.minute())
}

fn percent(minutes: i64) -> f64 {
    let value = minutes as f64 / MINUTES_PER_DAY as f64 * 100.0;
    (value * 1000.0).round() / 1000.0
}

/// Returns the first day of the week after `window` at local midnight.
///
/// Used by the shell to re-render when the week rolls over at Sunday midnight.
pub fn week_rollover<Tz: TimeZone>(window: WeekWindow, tz: &Tz) -> DateTime<Utc> {
    local_midnight(window.start() + Duration::days(7), tz)
}

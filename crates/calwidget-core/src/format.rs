//! Display strings for events and tasks.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::event::Event;

/// Formats a date as e.g. `Wednesday, 14. October`.
pub fn date_label(date: NaiveDate) -> String {
    date.format("%A, %d. %B").to_string()
}

/// Formats the time range of an event in `tz`.
///
/// Timed events render as `09:00 - 10:30`; an event ending on a later day
/// names the end weekday (`22:00 - Thu 02:00`). All-day events render as
/// `All day`, or `All day, until Fri 16 Oct` when they span several days.
pub fn time_range_label<Tz: TimeZone>(event: &Event, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    if let Some((start, end)) = event.all_day_dates() {
        if end - start > Duration::days(1) {
            let last = end.pred_opt().unwrap_or(end);
            return format!("All day, until {}", last.format("%a %-d %b"));
        }
        return "All day".to_string();
    }

    let Some((start, end)) = event.timed_range() else {
        return String::new();
    };
    let start = start.with_timezone(tz);
    let end = end.with_timezone(tz);
    if start.date_naive() == end.date_naive() {
        format!("{} - {}", start.format("%H:%M"), end.format("%H:%M"))
    } else {
        format!("{} - {}", start.format("%H:%M"), end.format("%a %H:%M"))
    }
}

/// Describes a due date relative to `today`.
pub fn due_label(due: NaiveDate, today: NaiveDate) -> String {
    match (due - today).num_days() {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        -1 => "Yesterday".to_string(),
        _ => due.format("%a %-d %b").to_string(),
    }
}

/// Everything the detail popup shows for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetail {
    pub calendar_id: String,
    pub id: String,
    pub title: String,
    pub date_label: String,
    pub time_label: String,
    pub calendar_name: String,
    pub color: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub html_link: Option<String>,
}

impl EventDetail {
    /// Builds the detail view of `event` as seen in `tz`.
    pub fn new<Tz: TimeZone>(event: &Event, tz: &Tz) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            calendar_id: event.calendar_id.clone(),
            id: event.id.clone(),
            title: event.title.clone(),
            date_label: date_label(event.start.local_date(tz)),
            time_label: time_range_label(event, tz),
            calendar_name: event.calendar_name.clone(),
            color: event.color.clone(),
            location: event.location.clone(),
            description: event.description.clone(),
            html_link: event.html_link.clone(),
        }
    }
}

/// Formats how long ago a dataset was fetched, e.g. `updated 3 min ago`.
pub fn updated_label(fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - fetched_at).num_minutes();
    match minutes {
        i64::MIN..=0 => "updated just now".to_string(),
        1..=59 => format!("updated {minutes} min ago"),
        60..=1439 => format!("updated {} h ago", minutes / 60),
        _ => format!("updated {}", fetched_at.format("%-d %b")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::EventTime;
    use chrono::FixedOffset;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn utc(d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, d, h, min, 0).unwrap()
    }

    fn timed(start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event::new("e1", "Review", EventTime::from_utc(start), EventTime::from_utc(end), "primary")
    }

    #[test]
    fn date_labels() {
        assert_eq!(date_label(date(2026, 10, 14)), "Wednesday, 14. October");
        assert_eq!(date_label(date(2026, 3, 2)), "Monday, 02. March");
    }

    #[test]
    fn same_day_range() {
        let event = timed(utc(14, 9, 0), utc(14, 10, 30));
        assert_eq!(time_range_label(&event, &Utc), "09:00 - 10:30");

        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(time_range_label(&event, &plus_two), "11:00 - 12:30");
    }

    #[test]
    fn cross_midnight_range() {
        let event = timed(utc(14, 22, 0), utc(15, 2, 0));
        assert_eq!(time_range_label(&event, &Utc), "22:00 - Thu 02:00");
    }

    #[test]
    fn all_day_ranges() {
        let one_day = Event::new(
            "e1",
            "Holiday",
            EventTime::from_date(date(2026, 10, 14)),
            EventTime::from_date(date(2026, 10, 15)),
            "primary",
        );
        assert_eq!(time_range_label(&one_day, &Utc), "All day");

        let trip = Event::new(
            "e2",
            "Trip",
            EventTime::from_date(date(2026, 10, 14)),
            EventTime::from_date(date(2026, 10, 17)),
            "primary",
        );
        assert_eq!(time_range_label(&trip, &Utc), "All day, until Fri 16 Oct");
    }

    #[test]
    fn due_labels() {
        let today = date(2026, 10, 16);
        assert_eq!(due_label(today, today), "Today");
        assert_eq!(due_label(date(2026, 10, 17), today), "Tomorrow");
        assert_eq!(due_label(date(2026, 10, 15), today), "Yesterday");
        assert_eq!(due_label(date(2026, 10, 20), today), "Tue 20 Oct");
    }

    #[test]
    fn updated_labels() {
        let now = utc(16, 12, 0);
        assert_eq!(updated_label(now, now), "updated just now");
        assert_eq!(updated_label(utc(16, 11, 55), now), "updated 5 min ago");
        assert_eq!(updated_label(utc(16, 9, 0), now), "updated 3 h ago");
        assert_eq!(updated_label(utc(12, 9, 0), now), "updated 12 Oct");
    }

    #[test]
    fn event_detail() {
        let event = timed(utc(14, 9, 0), utc(14, 10, 0))
            .with_calendar("Work", "#16a765")
            .with_location("Room 4")
            .with_html_link("https://calendar.google.com/event?eid=1");
        let detail = EventDetail::new(&event, &Utc);

        insta::assert_json_snapshot!(detail, @r###"
        {
          "calendarId": "primary",
          "id": "e1",
          "title": "Review",
          "dateLabel": "Wednesday, 14. October",
          "timeLabel": "09:00 - 10:00",
          "calendarName": "Work",
          "color": "#16a765",
          "location": "Room 4",
          "description": null,
          "htmlLink": "https://calendar.google.com/event?eid=1"
        }
        "###);
    }
}

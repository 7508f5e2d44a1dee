//! The displayed week.
//!
//! A [`WeekWindow`] is anchored on the Monday of an ISO week. Navigation is
//! clamped so that the UTC range sent to the Calendar API as `timeMin` /
//! `timeMax` always stays within the four-digit years RFC 3339 can express.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Weekday};
use serde::{Deserialize, Serialize};

use crate::time::TimeWindow;

/// Days in a week view.
pub const DAYS_PER_WEEK: usize = 7;

/// First Monday on or after the Unix epoch.
fn min_week_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 5).unwrap_or_default()
}

/// Last Monday whose week ends inside year 9999.
fn max_week_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(9999, 12, 20).unwrap_or(NaiveDate::MAX)
}

/// A navigation request from the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Navigation {
    /// One week back.
    Previous,
    /// One week forward.
    Next,
    /// The week containing today.
    Today,
}

/// The 7-day span currently on screen, Monday through Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "NaiveDate", into = "NaiveDate")]
pub struct WeekWindow {
    start: NaiveDate,
}

impl WeekWindow {
    /// Returns the week containing `date`, clamped to the supported range.
    pub fn containing(date: NaiveDate) -> Self {
        let offset = i64::from(date.weekday().num_days_from_monday());
        let monday = date
            .checked_sub_signed(Duration::days(offset))
            .unwrap_or_else(min_week_start);
        Self {
            start: monday.clamp(min_week_start(), max_week_start()),
        }
    }

    /// Returns the week containing `now` in its own timezone.
    pub fn current<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        Self::containing(now.date_naive())
    }

    /// The earliest week the widget will display.
    pub fn earliest() -> Self {
        Self {
            start: min_week_start(),
        }
    }

    /// The latest week the widget will display.
    pub fn latest() -> Self {
        Self {
            start: max_week_start(),
        }
    }

    /// Monday of this week.
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Monday of the following week (exclusive end).
    pub fn end(&self) -> NaiveDate {
        self.start + Duration::days(DAYS_PER_WEEK as i64)
    }

    /// Sunday of this week.
    pub fn last_day(&self) -> NaiveDate {
        self.start + Duration::days(DAYS_PER_WEEK as i64 - 1)
    }

    /// The seven dates of this week, Monday first.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        (0..DAYS_PER_WEEK as i64).map(move |offset| self.start + Duration::days(offset))
    }

    /// Returns the zero-based day index of `date`, if it is in this week.
    pub fn day_index(&self, date: NaiveDate) -> Option<usize> {
        let offset = (date - self.start).num_days();
        (0..DAYS_PER_WEEK as i64)
            .contains(&offset)
            .then_some(offset as usize)
    }

    /// Checks if `date` falls in this week.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.day_index(date).is_some()
    }

    /// ISO 8601 `(year, week)` of this week.
    pub fn iso_week(&self) -> (i32, u32) {
        let week = self.start.iso_week();
        (week.year(), week.week())
    }

    /// Returns this week shifted by `weeks`, clamped to the supported range.
    pub fn shifted(&self, weeks: i64) -> Self {
        let target = self
            .start
            .checked_add_signed(Duration::weeks(weeks))
            .unwrap_or(if weeks < 0 { min_week_start() } else { max_week_start() });
        Self::containing(target)
    }

    /// Applies a navigation request. `today` is only used by [`Navigation::Today`].
    pub fn navigate(&self, navigation: Navigation, today: NaiveDate) -> Self {
        match navigation {
            Navigation::Previous => self.shifted(-1),
            Navigation::Next => self.shifted(1),
            Navigation::Today => Self::containing(today),
        }
    }

    /// Returns `true` if there is an earlier week to navigate to.
    pub fn has_previous(&self) -> bool {
        self.start > min_week_start()
    }

    /// Returns `true` if there is a later week to navigate to.
    pub fn has_next(&self) -> bool {
        self.start < max_week_start()
    }

    /// The UTC range covering this week in `tz`, used for `timeMin` / `timeMax`.
    pub fn time_window<Tz: TimeZone>(&self, tz: &Tz) -> TimeWindow {
        TimeWindow::for_dates(self.start, self.end(), tz)
    }

    /// Human-readable range, e.g. `12 – 18 Oct 2026` or `28 Sep – 4 Oct 2026`.
    pub fn label(&self) -> String {
        let first = self.start;
        let last = self.last_day();
        if first.year() != last.year() {
            format!("{} – {}", first.format("%-d %b %Y"), last.format("%-d %b %Y"))
        } else if first.month() != last.month() {
            format!("{} – {}", first.format("%-d %b"), last.format("%-d %b %Y"))
        } else {
            format!("{} – {}", first.format("%-d"), last.format("%-d %b %Y"))
        }
    }
}

impl From<NaiveDate> for WeekWindow {
    fn from(date: NaiveDate) -> Self {
        Self::containing(date)
    }
}

impl From<WeekWindow> for NaiveDate {
    fn from(window: WeekWindow) -> Self {
        window.start
    }
}

/// Weekday labels in display order.
pub(crate) fn weekday_short(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

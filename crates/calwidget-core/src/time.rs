//! Time types for calendar events.
//!
//! [`EventTime`] is the start or end of an event, either a specific instant
//! or an all-day date. [`TimeWindow`] is a half-open UTC range used for API
//! queries and for clipping events to a day.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Represents the start or end of a calendar event.
///
/// The Calendar API reports either a `dateTime` (timed events) or a `date`
/// (all-day events). For all-day events the end date is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTime {
    /// A specific instant, stored in UTC.
    DateTime(DateTime<Utc>),
    /// An all-day date (no specific time).
    AllDay(NaiveDate),
}

impl EventTime {
    /// Creates a timed `EventTime` from a UTC datetime.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }

    /// Creates an all-day `EventTime`.
    pub fn from_date(date: NaiveDate) -> Self {
        Self::AllDay(date)
    }

    /// Returns `true` for all-day values.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::AllDay(_))
    }

    /// Returns the instant if this is a timed value.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            Self::AllDay(_) => None,
        }
    }

    /// Returns the date if this is an all-day value.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::AllDay(d) => Some(*d),
            Self::DateTime(_) => None,
        }
    }

    /// Returns the calendar date of this value as seen in `tz`.
    pub fn local_date<Tz: TimeZone>(&self, tz: &Tz) -> NaiveDate {
        match self {
            Self::DateTime(dt) => dt.with_timezone(tz).date_naive(),
            Self::AllDay(date) => *date,
        }
    }

    /// Converts to an instant in `tz`.
    ///
    /// All-day dates map to local midnight, so an all-day event sorts before
    /// timed events of the same day.
    pub fn to_utc_in<Tz: TimeZone>(&self, tz: &Tz) -> DateTime<Utc> {
        match self {
            Self::DateTime(dt) => *dt,
            Self::AllDay(date) => local_midnight(*date, tz),
        }
    }

    /// Converts to a UTC instant, mapping all-day dates to midnight UTC.
    pub fn to_utc_datetime(&self) -> DateTime<Utc> {
        self.to_utc_in(&Utc)
    }
}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_utc_datetime()
            .cmp(&other.to_utc_datetime())
            .then_with(|| other.is_all_day().cmp(&self.is_all_day()))
    }
}

/// Returns the instant of local midnight at the start of `date` in `tz`.
///
/// When midnight does not exist (a DST gap at 00:00) the first valid instant
/// of the day is used.
pub fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    if let Some(dt) = tz.from_local_datetime(&midnight).earliest() {
        return dt.with_timezone(&Utc);
    }
    (1..=3)
        .filter_map(|hours| {
            tz.from_local_datetime(&(midnight + Duration::hours(hours)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .next()
        .unwrap_or_else(|| midnight.and_utc())
}

/// A half-open `[start, end)` interval in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new time window.
    ///
    /// # Panics
    ///
    /// Panics if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start <= end, "TimeWindow start must be <= end");
        Self { start, end }
    }

    /// Creates the window covering local `[first, last_exclusive)` dates in `tz`.
    pub fn for_dates<Tz: TimeZone>(first: NaiveDate, last_exclusive: NaiveDate, tz: &Tz) -> Self {
        let start = local_midnight(first, tz);
        let end = local_midnight(last_exclusive, tz).max(start);
        Self { start, end }
    }

    /// Creates the window covering one local day.
    pub fn for_date<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Self {
        let next = date.succ_opt().unwrap_or(date);
        Self::for_dates(date, next, tz)
    }

    /// Returns the duration of this window.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Checks if an instant falls within `[start, end)`.
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        self.start <= dt && dt < self.end
    }

    /// Checks if the range `[start, end)` overlaps this window.
    ///
    /// A zero-length range overlaps when its instant is inside the window.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        if start >= end {
            return self.contains(start);
        }
        start < self.end && end > self.start
    }

    /// Returns `[start, end)` clipped to this window, if they overlap.
    pub fn clip(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        if !self.overlaps(start, end) {
            return None;
        }
        Some((start.max(self.start), end.max(start).min(self.end)))
    }

    /// Formats the bounds as RFC 3339 strings for `timeMin` / `timeMax`.
    pub fn to_rfc3339_bounds(&self) -> (String, String) {
        (self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    mod event_time {
        use super::*;

        #[test]
        fn timed_and_all_day_accessors() {
            let dt = utc(2026, 10, 14, 9, 30);
            let timed = EventTime::from_utc(dt);
            assert!(!timed.is_all_day());
            assert_eq!(timed.as_datetime(), Some(dt));
            assert_eq!(timed.as_date(), None);

            let all_day = EventTime::from_date(date(2026, 10, 14));
            assert!(all_day.is_all_day());
            assert_eq!(all_day.as_date(), Some(date(2026, 10, 14)));
            assert_eq!(all_day.as_datetime(), None);
        }

        #[test]
        fn local_date_uses_timezone() {
            let late = EventTime::from_utc(utc(2026, 10, 14, 23, 30));
            let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
            assert_eq!(late.local_date(&Utc), date(2026, 10, 14));
            assert_eq!(late.local_date(&plus_two), date(2026, 10, 15));
        }

        #[test]
        fn all_day_sorts_before_timed_on_same_day() {
            let all_day = EventTime::from_date(date(2026, 10, 14));
            let midnight = EventTime::from_utc(utc(2026, 10, 14, 0, 0));
            let morning = EventTime::from_utc(utc(2026, 10, 14, 8, 0));

            assert!(all_day < midnight);
            assert!(all_day < morning);
            assert!(midnight < morning);
        }

        #[test]
        fn serde_roundtrip() {
            let timed = EventTime::from_utc(utc(2026, 10, 14, 9, 30));
            let json = serde_json::to_string(&timed).unwrap();
            assert_eq!(serde_json::from_str::<EventTime>(&json).unwrap(), timed);

            let all_day = EventTime::from_date(date(2026, 10, 14));
            let json = serde_json::to_string(&all_day).unwrap();
            assert!(json.contains("AllDay"));
            assert_eq!(serde_json::from_str::<EventTime>(&json).unwrap(), all_day);
        }
    }

    mod time_window {
        use super::*;

        #[test]
        #[should_panic(expected = "start must be <= end")]
        fn rejects_inverted_bounds() {
            TimeWindow::new(utc(2026, 10, 14, 17, 0), utc(2026, 10, 14, 9, 0));
        }

        #[test]
        fn for_date_in_offset_zone() {
            let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
            let window = TimeWindow::for_date(date(2026, 10, 14), &plus_two);
            assert_eq!(window.start, utc(2026, 10, 13, 22, 0));
            assert_eq!(window.end, utc(2026, 10, 14, 22, 0));
            assert_eq!(window.duration(), Duration::hours(24));
        }

        #[test]
        fn overlaps_is_half_open() {
            let window = TimeWindow::new(utc(2026, 10, 14, 9, 0), utc(2026, 10, 14, 17, 0));

            assert!(window.overlaps(utc(2026, 10, 14, 8, 0), utc(2026, 10, 14, 10, 0)));
            assert!(window.overlaps(utc(2026, 10, 14, 16, 0), utc(2026, 10, 14, 18, 0)));
            assert!(!window.overlaps(utc(2026, 10, 14, 8, 0), utc(2026, 10, 14, 9, 0)));
            assert!(!window.overlaps(utc(2026, 10, 14, 17, 0), utc(2026, 10, 14, 18, 0)));
        }

        #[test]
        fn zero_length_range_overlaps_when_inside() {
            let window = TimeWindow::new(utc(2026, 10, 14, 9, 0), utc(2026, 10, 14, 17, 0));
            let at = utc(2026, 10, 14, 12, 0);
            assert!(window.overlaps(at, at));
            assert!(!window.overlaps(window.end, window.end));
        }

        #[test]
        fn clip_to_window() {
            let window = TimeWindow::new(utc(2026, 10, 14, 0, 0), utc(2026, 10, 15, 0, 0));
            let clipped = window.clip(utc(2026, 10, 13, 22, 0), utc(2026, 10, 14, 2, 0));
            assert_eq!(clipped, Some((utc(2026, 10, 14, 0, 0), utc(2026, 10, 14, 2, 0))));
            assert_eq!(window.clip(utc(2026, 10, 16, 0, 0), utc(2026, 10, 16, 1, 0)), None);
        }

        #[test]
        fn rfc3339_bounds() {
            let window = TimeWindow::new(utc(2026, 10, 12, 0, 0), utc(2026, 10, 19, 0, 0));
            let (min, max) = window.to_rfc3339_bounds();
            assert_eq!(min, "2026-10-12T00:00:00+00:00");
            assert_eq!(max, "2026-10-19T00:00:00+00:00");
        }
    }
}

//! Google Calendar API v3 client.
//!
//! Lists the user's calendars and the events of one calendar inside a time
//! window, following `nextPageToken` until the listing is exhausted.

use calwidget_core::{DEFAULT_CALENDAR_COLOR, Event, EventTime, TimeWindow, UNTITLED_EVENT};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ProviderResult;

use super::api::{MAX_PAGES, send_json};

/// A calendar from the user's calendar list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarInfo {
    pub id: String,
    pub name: String,
    /// CSS hex colour.
    pub color: String,
    pub primary: bool,
}

/// Google Calendar API client.
#[derive(Debug, Clone)]
pub struct CalendarClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl CalendarClient {
    /// Creates a client against `base_url` (normally [`super::config::CALENDAR_API_BASE`]).
    pub fn new(http_client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Lists the calendars shown in the user's Google Calendar UI.
    ///
    /// Hidden and deselected calendars are skipped.
    pub async fn list_calendars(&self, access_token: &str) -> ProviderResult<Vec<CalendarInfo>> {
        let url = format!("{}/users/me/calendarList", self.base_url);
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut request = self.http_client.get(&url).bearer_auth(access_token);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let page: CalendarListResponse = send_json(request).await?;

            for entry in page.items {
                if entry.hidden || entry.selected == Some(false) {
                    debug!(calendar = %entry.id, "skipping hidden calendar");
                    continue;
                }
                calendars.push(entry.into_info());
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = calendars.len(), "listed calendars");
        Ok(calendars)
    }

    /// Lists the events of one calendar overlapping `window`.
    ///
    /// Recurring events are expanded into instances; cancelled instances are
    /// dropped.
    pub async fn list_events(
        &self,
        access_token: &str,
        calendar: &CalendarInfo,
        window: &TimeWindow,
    ) -> ProviderResult<Vec<Event>> {
        let url = format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(&calendar.id)
        );
        let (time_min, time_max) = window.to_rfc3339_bounds();
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut request = self
                .http_client
                .get(&url)
                .bearer_auth(access_token)
                .query(&[
                    ("timeMin", time_min.as_str()),
                    ("timeMax", time_max.as_str()),
                    ("singleEvents", "true"),
                    ("orderBy", "startTime"),
                    ("maxResults", "250"),
                ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let page: EventListResponse = send_json(request).await?;

            events.extend(
                page.items
                    .into_iter()
                    .filter_map(|entry| entry.into_event(calendar)),
            );

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(calendar = %calendar.id, count = events.len(), "fetched events");
        Ok(events)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListEntry {
    id: String,
    summary: Option<String>,
    summary_override: Option<String>,
    background_color: Option<String>,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    hidden: bool,
    selected: Option<bool>,
}

impl CalendarListEntry {
    fn into_info(self) -> CalendarInfo {
        let name = self
            .summary_override
            .or(self.summary)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.id.clone());
        CalendarInfo {
            id: self.id,
            name,
            color: self
                .background_color
                .unwrap_or_else(|| DEFAULT_CALENDAR_COLOR.to_string()),
            primary: self.primary,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<EventEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventEntry {
    id: Option<String>,
    status: Option<String>,
    summary: Option<String>,
    location: Option<String>,
    description: Option<String>,
    html_link: Option<String>,
    start: Option<EventDateTime>,
    end: Option<EventDateTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventDateTime {
    date_time: Option<String>,
    date: Option<String>,
}

impl EventDateTime {
    fn parse(&self) -> Option<EventTime> {
        if let Some(dt) = &self.date_time {
            return DateTime::parse_from_rfc3339(dt)
                .ok()
                .map(|dt| EventTime::from_utc(dt.with_timezone(&Utc)));
        }
        self.date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .map(EventTime::from_date)
    }
}

impl EventEntry {
    fn into_event(self, calendar: &CalendarInfo) -> Option<Event> {
        if self.status.as_deref() == Some("cancelled") {
            return None;
        }
        let id = self.id?;
        let Some(start) = self.start.as_ref().and_then(EventDateTime::parse) else {
            warn!(event = %id, "skipping event with unparseable start");
            return None;
        };
        // a missing end collapses to the start; Event handles that for all-day ranges
        let end = self
            .end
            .as_ref()
            .and_then(EventDateTime::parse)
            .unwrap_or(start);

        let title = self
            .summary
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| UNTITLED_EVENT.to_string());

        let mut event = Event::new(id, title, start, end, &calendar.id)
            .with_calendar(&calendar.name, &calendar.color);
        if let Some(location) = self.location.filter(|s| !s.is_empty()) {
            event = event.with_location(location);
        }
        if let Some(description) = self.description.filter(|s| !s.is_empty()) {
            event = event.with_description(description);
        }
        if let Some(link) = self.html_link {
            event = event.with_html_link(link);
        }
        Some(event)
    }
}

//! calwidget-core: Core types and layout for calwidget.
//!
//! This crate provides the building blocks shared by the Google client,
//! the sync layer and the widget shell:
//! - [`time`]: event times and UTC windows
//! - [`week`]: the displayed ISO week and its navigation
//! - [`event`]: events, tasks and the cached dataset
//! - [`layout`]: the week-view renderer
//! - [`format`]: display strings
//! - [`tracing`]: logging setup

pub mod event;
pub mod format;
pub mod layout;
pub mod time;
pub mod tracing;
pub mod week;

pub use event::{DEFAULT_CALENDAR_COLOR, Dataset, Event, Task, UNTITLED_EVENT};
pub use format::{EventDetail, date_label, due_label, time_range_label, updated_label};
pub use layout::{
    AllDayItem, DayColumn, MIN_EVENT_MINUTES, NowIndicator, TaskRow, TimedItem, WeekView,
    next_tick_delay, render_week, week_rollover,
};
pub use time::{EventTime, TimeWindow, local_midnight};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use week::{Navigation, WeekWindow};

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};
use std::time::Duration;

use crate::config::ScheduleConfig;

/// Source of wall-clock time for the scheduler
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Always reports the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Calendar position relative to today's business hours.
///
/// Derived from the clock on every check, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWindow {
    pub is_weekday: bool,
    /// Negative once start-of-day has passed
    pub seconds_until_start: i64,
    /// Negative once end-of-day has passed
    pub seconds_until_end: i64,
}

impl ScheduleWindow {
    pub fn at(now: NaiveDateTime, start_of_day: NaiveTime, end_of_day: NaiveTime) -> Self {
        let today = now.date();
        ScheduleWindow {
            is_weekday: !matches!(now.weekday(), Weekday::Sat | Weekday::Sun),
            seconds_until_start: (today.and_time(start_of_day) - now).num_seconds(),
            seconds_until_end: (today.and_time(end_of_day) - now).num_seconds(),
        }
    }

    /// Sleep needed to get clear of business hours.
    ///
    /// Only weekdays between start-of-day and end-of-day require a wait, and
    /// the wait always runs to end-of-day.
    pub fn required_sleep(&self) -> Option<Duration> {
        if self.is_weekday && self.seconds_until_start <= 0 && self.seconds_until_end > 0 {
            Some(Duration::from_secs(self.seconds_until_end as u64))
        } else {
            None
        }
    }
}

/// Business-hours policy built from configuration
#[derive(Debug, Clone, Copy)]
pub struct BusinessHours {
    pub enabled: bool,
    pub start_of_day: NaiveTime,
    pub end_of_day: NaiveTime,
}

impl BusinessHours {
    pub fn from_config(config: &ScheduleConfig) -> Self {
        BusinessHours {
            enabled: config.enabled,
            start_of_day: config.start_of_day,
            end_of_day: config.end_of_day,
        }
    }

    pub fn window(&self, now: NaiveDateTime) -> ScheduleWindow {
        ScheduleWindow::at(now, self.start_of_day, self.end_of_day)
    }

    pub fn sleep_for(&self, now: NaiveDateTime) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        self.window(now).required_sleep()
    }
}

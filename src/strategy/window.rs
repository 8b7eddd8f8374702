//! Time windows restricting when a strategy may raise alarms.

use chrono::{Datelike, NaiveDateTime, NaiveTime};
use log::warn;
use serde::{Deserialize, Serialize};

/// A daily window during which alarms are allowed.
///
/// `start` and `end` are `HH:MM` wall-clock times. A window whose start is
/// later than its end wraps past midnight; equal bounds cover the whole day.
/// `days` limits the window to weekdays numbered from Sunday (`0`) to
/// Saturday (`6`); an empty list means every day. The after-midnight part
/// of a wrapping window belongs to the day the window opened on.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use tocsin::strategy::TimeWindow;
///
/// let night = TimeWindow::new("22:00", "06:00");
/// let at = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(23, 30, 0).unwrap();
/// assert!(night.contains(at));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub days: Vec<u8>,
}

impl TimeWindow {
    pub fn new(start: &str, end: &str) -> Self {
        Self {
            start: start.to_string(),
            end: end.to_string(),
            days: Vec::new(),
        }
    }

    pub fn with_days(mut self, days: Vec<u8>) -> Self {
        self.days = days;
        self
    }

    /// Returns `true` when both bounds parse and every day is in `0..=6`.
    pub fn is_valid(&self) -> bool {
        parse_clock(&self.start).is_some()
            && parse_clock(&self.end).is_some()
            && self.days.iter().all(|day| *day <= 6)
    }

    /// Returns `true` when `at` falls inside the window.
    ///
    /// A window with unparsable bounds never matches.
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        let (start, end) = match (parse_clock(&self.start), parse_clock(&self.end)) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                warn!(
                    "Ignoring malformed time window {}-{}",
                    self.start, self.end
                );
                return false;
            }
        };

        let clock = at.time();
        let (inside, opened_yesterday) = if start == end {
            (true, false)
        } else if start < end {
            (clock >= start && clock < end, false)
        } else if clock >= start {
            (true, false)
        } else {
            (clock < end, true)
        };
        if !inside || self.days.is_empty() {
            return inside;
        }

        let mut day = at.weekday();
        if opened_yesterday {
            day = day.pred();
        }
        self.days.contains(&(day.num_days_from_sunday() as u8))
    }
}

fn parse_clock(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

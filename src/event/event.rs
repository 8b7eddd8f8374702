//! Module for the [`Event`] and [`EventFull`] structs.
//!
//! An [`Event`] is one status observation produced upstream; it is never
//! mutated after it enters the pipeline. An [`EventFull`] is the event
//! together with the strategy snapshot and the rendered note, built once per
//! alarm decision.
//!
//! # Example
//! ```
//! use tocsin::event::{Event, EventStatus};
//!
//! let event = Event::new("s_7_host1", EventStatus::Problem)
//!     .with_endpoint("host1")
//!     .with_value(92.5);
//!
//! assert_eq!(event.strategy_id().unwrap(), 7);
//! assert_eq!(event.status.to_string(), "problem");
//! ```

use super::id;
use super::template;
use crate::error::ResolveError;
use crate::strategy::Strategy;
use chrono::{Local, TimeZone, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Status carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Ok,
    Problem,
    Closed,
    Outdated,
    /// Any status this pipeline does not know about.
    #[serde(other)]
    Unknown,
}

impl EventStatus {
    /// Returns `true` for statuses that take an event out of the open set.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            EventStatus::Ok | EventStatus::Closed | EventStatus::Outdated
        )
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventStatus::Ok => "ok",
            EventStatus::Problem => "problem",
            EventStatus::Closed => "closed",
            EventStatus::Outdated => "outdated",
            EventStatus::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// One status observation for a monitored condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Identifier derived from the owning strategy (`s_<sid>_...`).
    pub id: String,
    pub status: EventStatus,
    /// Unix timestamp (seconds) of the observation.
    pub time: i64,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub left_value: f64,
    /// Collection interval of the underlying series, in seconds.
    #[serde(default)]
    pub step: i64,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Explicit owning strategy; takes precedence over the id prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_ref: Option<u64>,
}

impl Event {
    /// Creates a new event stamped with the current time.
    pub fn new(id: &str, status: EventStatus) -> Self {
        Self {
            id: id.to_string(),
            status,
            time: Utc::now().timestamp(),
            endpoint: String::new(),
            left_value: 0.0,
            step: 0,
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            strategy_ref: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_value(mut self, left_value: f64) -> Self {
        self.left_value = left_value;
        self
    }

    pub fn with_time(mut self, time: i64) -> Self {
        self.time = time;
        self
    }

    pub fn with_step(mut self, step: i64) -> Self {
        self.step = step;
        self
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_field(mut self, key: &str, value: &str) -> Self {
        self.fields.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_strategy(mut self, strategy_id: u64) -> Self {
        self.strategy_ref = Some(strategy_id);
        self
    }

    /// Returns a copy of this event carrying a different status.
    pub fn restamped(&self, status: EventStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    /// Resolves the owning strategy id.
    ///
    /// # Errors
    /// Returns [`ResolveError::InvalidEventId`] when there is no
    /// `strategy_ref` and the id does not follow the naming scheme.
    pub fn strategy_id(&self) -> Result<u64, ResolveError> {
        match self.strategy_ref {
            Some(strategy_id) => Ok(strategy_id),
            None => id::parse_strategy_id(&self.id),
        }
    }

    pub fn is_nodata(&self) -> bool {
        id::is_nodata(&self.id)
    }
}

/// An event enriched with its strategy snapshot and rendered note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFull {
    pub event: Event,
    pub strategy: Strategy,
    pub note: String,
    pub priority: u8,
    /// Unix timestamp (seconds) of the decision that built this value.
    pub created: i64,
}

impl EventFull {
    /// Builds the enriched event, rendering the strategy note.
    ///
    /// A note that fails to render falls back to the raw template text.
    pub fn build(event: Event, strategy: Strategy, now: i64) -> Self {
        let note = match template::render(&strategy.note, &event, &strategy) {
            Ok(note) => note,
            Err(e) => {
                warn!(
                    "Failed to render note for event {}: {}, using raw template",
                    event.id, e
                );
                strategy.note.clone()
            }
        };
        let priority = strategy.priority;
        Self {
            event,
            strategy,
            note,
            priority,
            created: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.event.id
    }

    pub fn status(&self) -> EventStatus {
        self.event.status
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

/// Formats a unix timestamp as local wall-clock time.
pub fn format_time(timestamp: i64) -> String {
    match Local.timestamp_opt(timestamp, 0).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => timestamp.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let event = Event::new("s_1_host", EventStatus::Outdated);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"status\":\"outdated\""));
    }

    /// Tests that unknown statuses deserialize instead of failing.
    ///
    /// # Purpose
    /// Upstream may emit statuses this pipeline does not handle; they must
    /// land in [`EventStatus::Unknown`] so the classifier can ignore them.
    ///
    /// # Steps
    /// 1. Deserialize an event with status `flapping`.
    /// 2. Verify the status and the defaulted optional fields.
    #[test]
    fn test_unknown_status_and_defaults() {
        let event: Event =
            serde_json::from_str(r#"{"id":"s_1_host","status":"flapping","time":10}"#).unwrap();
        assert_eq!(event.status, EventStatus::Unknown);
        assert!(event.tags.is_empty());
        assert_eq!(event.strategy_ref, None);
    }

    #[test]
    fn test_resolution_statuses() {
        assert!(EventStatus::Ok.is_resolution());
        assert!(EventStatus::Closed.is_resolution());
        assert!(EventStatus::Outdated.is_resolution());
        assert!(!EventStatus::Problem.is_resolution());
        assert!(!EventStatus::Unknown.is_resolution());
    }

    #[test]
    fn test_strategy_ref_overrides_id() {
        let event = Event::new("custom-id", EventStatus::Problem).with_strategy(5);
        assert_eq!(event.strategy_id().unwrap(), 5);
        assert!(Event::new("custom-id", EventStatus::Problem).strategy_id().is_err());
    }

    #[test]
    fn test_build_falls_back_to_raw_note() {
        let strategy = Strategy::new(1, 1).with_note("cpu {{nope}} high");
        let full = EventFull::build(Event::new("s_1_host", EventStatus::Problem), strategy, 100);
        assert_eq!(full.note, "cpu {{nope}} high");
        assert_eq!(full.priority, 1);
        assert_eq!(full.created, 100);
    }

    #[test]
    fn test_restamped_keeps_payload() {
        let event = Event::new("s_1_host", EventStatus::Problem)
            .with_endpoint("host")
            .with_time(42);
        let outdated = event.restamped(EventStatus::Outdated);
        assert_eq!(outdated.status, EventStatus::Outdated);
        assert_eq!(outdated.endpoint, "host");
        assert_eq!(outdated.time, 42);
    }
}

//! Strategy lookup boundary.
//!
//! Strategies, their notification requests, maintenance windows and the
//! no-data key list live outside this crate. The pipeline only talks to them
//! through [`StrategyResolver`]; [`StaticStrategies`] is the configuration
//! backed implementation shipped with the binary.

pub mod static_source;
pub mod window;

pub use static_source::StaticStrategies;
pub use window::TimeWindow;

use crate::error::ResolveError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Placeholder used for template and team of a synthesized default request.
pub const PLACEHOLDER: &str = "-";

fn default_priority() -> u8 {
    3
}

/// Snapshot of the strategy owning an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    /// Priority, `1` being the most urgent.
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Note template rendered against the event.
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub windows: Vec<TimeWindow>,
    /// Delay in seconds before a recovery notification; `None` disables it.
    #[serde(default)]
    pub recover_notify: Option<u64>,
}

impl Strategy {
    pub fn new(id: u64, priority: u8) -> Self {
        Self {
            id,
            name: format!("strategy-{}", id),
            priority,
            note: String::new(),
            windows: Vec::new(),
            recover_notify: None,
        }
    }

    pub fn with_note(mut self, note: &str) -> Self {
        self.note = note.to_string();
        self
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.windows.push(window);
        self
    }

    pub fn with_recover_notify(mut self, delay_secs: u64) -> Self {
        self.recover_notify = Some(delay_secs);
        self
    }

    /// Returns `true` when alarms are allowed at `at`.
    ///
    /// A strategy without windows is always allowed.
    pub fn allows(&self, at: NaiveDateTime) -> bool {
        self.windows.is_empty() || self.windows.iter().any(|w| w.contains(at))
    }
}

/// Recipients of one notification request, per channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipients {
    #[serde(default)]
    pub mail: Vec<String>,
    #[serde(default)]
    pub sms: Vec<String>,
    #[serde(default)]
    pub im: Vec<String>,
    #[serde(default)]
    pub phone: Vec<String>,
}

impl Recipients {
    pub fn is_empty(&self) -> bool {
        self.mail.is_empty() && self.sms.is_empty() && self.im.is_empty() && self.phone.is_empty()
    }

    /// Comma-joined recipients in channel order: mail, sms, im, phone.
    pub fn joined(&self) -> [String; 4] {
        [
            self.mail.join(","),
            self.sms.join(","),
            self.im.join(","),
            self.phone.join(","),
        ]
    }
}

/// One configured notification for a strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyRequest {
    /// Delay in seconds between the alarm and the notification.
    #[serde(default)]
    pub step: u64,
    #[serde(default)]
    pub recipients: Recipients,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub team: String,
}

impl NotifyRequest {
    /// The request substituted when a strategy resolves no notifications.
    pub fn placeholder() -> Self {
        Self {
            step: 0,
            recipients: Recipients::default(),
            template: PLACEHOLDER.to_string(),
            team: PLACEHOLDER.to_string(),
        }
    }

    /// Returns `true` when nobody would be notified by this request.
    pub fn has_no_target(&self) -> bool {
        let blank = |s: &str| s.is_empty() || s == PLACEHOLDER;
        self.recipients.is_empty() && blank(&self.template) && blank(&self.team)
    }
}

/// A strategy definition together with its notification requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(flatten)]
    pub strategy: Strategy,
    #[serde(default)]
    pub notifications: Vec<NotifyRequest>,
}

/// Lookup of strategy-owned configuration.
pub trait StrategyResolver: Send + Sync {
    fn resolve_strategy(&self, strategy_id: u64) -> Result<Strategy, ResolveError>;

    fn resolve_notification_requests(
        &self,
        strategy_id: u64,
    ) -> Result<Vec<NotifyRequest>, ResolveError>;

    /// Returns `true` when the endpoint is under a maintenance window.
    fn in_maintenance(&self, endpoint: &str) -> bool;

    /// Durable keys owned by the no-data checker.
    fn nodata_keys(&self) -> Vec<String>;
}

use crate::event::{EventFull, EventStatus, format_time};
use crate::strategy::{NotifyRequest, PLACEHOLDER};
use serde::{Deserialize, Serialize};

/// A notification request waiting in an event's bucket.
///
/// Carries the event fields needed to render the notifier arguments so the
/// scan tick never has to look the event up again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledRequest {
    pub event_id: String,
    pub request: NotifyRequest,
    /// Set only for notifications fired after a resolution.
    pub recover: bool,
    pub status: EventStatus,
    pub priority: u8,
    pub note: String,
    pub endpoint: String,
    pub left_value: f64,
    pub time: i64,
    pub service: String,
}

impl ScheduledRequest {
    pub fn new(event: &EventFull, request: NotifyRequest, recover: bool) -> Self {
        let service = event
            .event
            .tags
            .get("service")
            .cloned()
            .unwrap_or_else(|| PLACEHOLDER.to_string());
        Self {
            event_id: event.id().to_string(),
            request,
            recover,
            status: event.status(),
            priority: event.priority,
            note: event.note.clone(),
            endpoint: event.event.endpoint.clone(),
            left_value: event.event.left_value,
            time: event.event.time,
            service,
        }
    }

    /// Returns `true` when firing this request would reach nobody.
    pub fn is_zero_dispatch(&self) -> bool {
        self.request.has_no_target()
    }

    /// Positional arguments handed to the notifier executable.
    ///
    /// Order: note, priority, endpoint, value, time, service, mail, sms, im,
    /// phone, template, team, event id.
    pub fn call_args(&self) -> Vec<String> {
        let [mail, sms, im, phone] = self.request.recipients.joined();
        vec![
            format!(
                "[P{} {}] {}",
                self.priority,
                self.status.to_string().to_uppercase(),
                self.note
            ),
            self.priority.to_string(),
            self.endpoint.clone(),
            self.left_value.to_string(),
            format_time(self.time),
            self.service.clone(),
            mail,
            sms,
            im,
            phone,
            self.request.template.clone(),
            self.request.team.clone(),
            self.event_id.clone(),
        ]
    }
}

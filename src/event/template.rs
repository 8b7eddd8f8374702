//! Handlebars rendering of strategy notes.
//!
//! Known names: `id`, `endpoint`, `status`, `left_value`, `step`, `time`,
//! `priority`, `strategy`, `tags.<key>`, `fields.<key>`. Tag and field keys
//! are also available bare; a tag wins over a field of the same name, and
//! neither can shadow a known name.
//!
//! The registry runs in strict mode, so an unknown name is a render error
//! rather than an empty string. Output is not HTML-escaped.

use super::event::{Event, format_time};
use crate::strategy::Strategy;
use handlebars::{Handlebars, RenderError, no_escape};
use lazy_static::lazy_static;
use serde::Serialize;
use std::collections::BTreeMap;

const BUILTIN_NAMES: [&str; 10] = [
    "id",
    "endpoint",
    "status",
    "left_value",
    "step",
    "time",
    "priority",
    "strategy",
    "tags",
    "fields",
];

lazy_static! {
    static ref NOTES: Handlebars<'static> = {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(no_escape);
        registry
    };
}

/// Context a note template is rendered against.
#[derive(Debug, Serialize)]
struct NoteContext<'a> {
    id: &'a str,
    endpoint: &'a str,
    status: String,
    left_value: String,
    step: i64,
    time: String,
    priority: u8,
    strategy: &'a str,
    tags: &'a BTreeMap<String, String>,
    fields: &'a BTreeMap<String, String>,
    #[serde(flatten)]
    bare: BTreeMap<&'a str, &'a str>,
}

impl<'a> NoteContext<'a> {
    fn new(event: &'a Event, strategy: &'a Strategy) -> Self {
        let mut bare = BTreeMap::new();
        for (key, value) in event.fields.iter().chain(event.tags.iter()) {
            if !BUILTIN_NAMES.contains(&key.as_str()) {
                bare.insert(key.as_str(), value.as_str());
            }
        }
        Self {
            id: &event.id,
            endpoint: &event.endpoint,
            status: event.status.to_string(),
            left_value: event.left_value.to_string(),
            step: event.step,
            time: format_time(event.time),
            priority: strategy.priority,
            strategy: &strategy.name,
            tags: &event.tags,
            fields: &event.fields,
            bare,
        }
    }
}

/// Renders `template` against the event and its strategy.
///
/// # Example
/// ```
/// use tocsin::event::{Event, EventStatus, template::render};
/// use tocsin::strategy::Strategy;
///
/// let event = Event::new("s_1_web01", EventStatus::Problem)
///     .with_endpoint("web01")
///     .with_tag("mount", "/data");
/// let strategy = Strategy::new(1, 2);
/// let note = render("disk {{mount}} full on {{endpoint}}", &event, &strategy).unwrap();
/// assert_eq!(note, "disk /data full on web01");
/// ```
pub fn render(template: &str, event: &Event, strategy: &Strategy) -> Result<String, RenderError> {
    NOTES.render_template(template, &NoteContext::new(event, strategy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventStatus;

    fn event() -> Event {
        Event::new("s_3_db01", EventStatus::Problem)
            .with_endpoint("db01")
            .with_value(97.0)
            .with_step(60)
            .with_tag("service", "mysql")
            .with_field("metric", "cpu.idle")
    }

    #[test]
    fn test_render_builtin_names() {
        let strategy = Strategy::new(3, 1);
        let note = render(
            "[P{{priority}}] {{ id }} {{endpoint}}={{left_value}} every {{step}}s ({{status}})",
            &event(),
            &strategy,
        )
        .unwrap();
        assert_eq!(note, "[P1] s_3_db01 db01=97 every 60s (problem)");
    }

    #[test]
    fn test_render_tags_and_fields() {
        let strategy = Strategy::new(3, 1);
        let note = render(
            "{{tags.service}}/{{fields.metric}}/{{service}}/{{metric}}",
            &event(),
            &strategy,
        )
        .unwrap();
        assert_eq!(note, "mysql/cpu.idle/mysql/cpu.idle");
    }

    /// Tests name precedence in the bare namespace.
    ///
    /// # Purpose
    /// A tag named like a known name must not replace it, and a tag must win
    /// over a field with the same key.
    ///
    /// # Steps
    /// 1. Tag the event with `endpoint` and `metric`.
    /// 2. Render `{{endpoint}}` and `{{metric}}`.
    #[test]
    fn test_render_precedence() {
        let strategy = Strategy::new(3, 1);
        let event = event()
            .with_tag("endpoint", "spoofed")
            .with_tag("metric", "from-tag");
        let note = render("{{endpoint}} {{metric}} {{tags.endpoint}}", &event, &strategy).unwrap();
        assert_eq!(note, "db01 from-tag spoofed");
    }

    /// Tests the two rendering failures.
    ///
    /// # Purpose
    /// Unclosed braces and unknown names must be reported instead of
    /// silently producing partial notes.
    ///
    /// # Steps
    /// 1. Render a template with a dangling `{{`.
    /// 2. Render a template naming an unknown placeholder.
    /// 3. Render a template naming a missing tag.
    #[test]
    fn test_render_errors() {
        let strategy = Strategy::new(3, 1);
        assert!(render("load {{endpoint", &event(), &strategy).is_err());
        assert!(render("{{missing}}", &event(), &strategy).is_err());
        assert!(render("{{tags.missing}}", &event(), &strategy).is_err());
    }

    #[test]
    fn test_render_does_not_escape() {
        let strategy = Strategy::new(3, 1);
        let event = event().with_tag("query", "a < b && c");
        assert_eq!(render("{{query}}", &event, &strategy).unwrap(), "a < b && c");
    }

    #[test]
    fn test_plain_text_is_untouched() {
        let strategy = Strategy::new(3, 1);
        assert_eq!(render("no placeholders", &event(), &strategy).unwrap(), "no placeholders");
    }
}

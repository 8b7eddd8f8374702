//! Process-wide Prometheus metrics for the alarm pipeline.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, TextEncoder, register_int_counter,
    register_int_counter_vec, register_int_gauge,
};

lazy_static! {
    /// Events accepted through `receive`, live and synthetic.
    pub static ref EVENTS_RECEIVED: IntCounter = register_int_counter!(
        "tocsin_events_received_total",
        "Total number of events received"
    )
    .unwrap();

    /// Classification outcomes, labelled by operation.
    pub static ref DECISIONS: IntCounterVec = register_int_counter_vec!(
        "tocsin_decisions_total",
        "Classification outcomes by operation",
        &["operation"]
    )
    .unwrap();

    pub static ref EVENTS_DROPPED: IntCounter = register_int_counter!(
        "tocsin_events_dropped_total",
        "Events dropped because their strategy could not be resolved"
    )
    .unwrap();

    pub static ref STORE_ERRORS: IntCounter = register_int_counter!(
        "tocsin_store_errors_total",
        "Failed durable store operations"
    )
    .unwrap();

    pub static ref OPEN_PROBLEMS: IntGauge = register_int_gauge!(
        "tocsin_open_problems",
        "Number of event ids currently considered open"
    )
    .unwrap();

    pub static ref QUEUE_PUSHED: IntCounterVec = register_int_counter_vec!(
        "tocsin_queue_pushed_total",
        "Alarms pushed onto the transport, by lane",
        &["lane"]
    )
    .unwrap();

    pub static ref QUEUE_POPPED: IntCounterVec = register_int_counter_vec!(
        "tocsin_queue_popped_total",
        "Alarms popped from the transport, by lane",
        &["lane"]
    )
    .unwrap();

    pub static ref QUEUE_MALFORMED: IntCounter = register_int_counter!(
        "tocsin_queue_malformed_total",
        "Transport payloads dropped because they failed to deserialize"
    )
    .unwrap();

    pub static ref NOTIFY_FIRED: IntCounter = register_int_counter!(
        "tocsin_notify_fired_total",
        "Notification requests handed to the external notifier"
    )
    .unwrap();

    pub static ref NOTIFY_FAILED: IntCounter = register_int_counter!(
        "tocsin_notify_failed_total",
        "External notifier invocations that failed"
    )
    .unwrap();

    pub static ref NOTIFY_SKIPPED: IntCounter = register_int_counter!(
        "tocsin_notify_skipped_total",
        "Due notification requests without any target"
    )
    .unwrap();

    pub static ref NOTIFY_SILENCED: IntCounter = register_int_counter!(
        "tocsin_notify_silenced_total",
        "Pending notification requests dropped by a silence flag"
    )
    .unwrap();

    pub static ref OUTDATED_SWEPT: IntCounter = register_int_counter!(
        "tocsin_outdated_swept_total",
        "Synthetic outdated events produced by the outdated sweep"
    )
    .unwrap();

    pub static ref GC_DELETED: IntCounter = register_int_counter!(
        "tocsin_gc_deleted_total",
        "Raw cache keys deleted by the GC sweep"
    )
    .unwrap();
}

/// Renders every registered metric in the text exposition format.
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return format!("# failed to encode metrics: {}\n", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

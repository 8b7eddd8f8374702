//! Module for the event classifier.
//!
//! Every event, live or synthesized by the outdated sweep, enters through
//! [`Judge::receive`]. Classification decides between [`Operation::Ignore`],
//! [`Operation::Alarm`] and [`Operation::Update`] and keeps the
//! [`ProblemMemory`] and the durable alarm records in step; handling then
//! pushes alarms onto the [`PriorityQueue`].
//!
//! Work for one id is serialized through a fixed set of striped locks, so a
//! sweep or a second event for the same id never observes a half-applied
//! decision. Different ids proceed in parallel.

pub mod problems;

pub use problems::ProblemMemory;

use crate::event::{Event, EventFull, EventStatus};
use crate::metrics::{DECISIONS, EVENTS_DROPPED, EVENTS_RECEIVED, STORE_ERRORS};
use crate::queue::PriorityQueue;
use crate::store::{AlarmStore, Dto};
use crate::strategy::StrategyResolver;
use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Outcome of classifying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Ignore,
    Alarm,
    Update,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Ignore => "ignore",
            Operation::Alarm => "alarm",
            Operation::Update => "update",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ingestion entry point shared by live sources and internal sweepers.
pub trait EventSink: Send + Sync {
    fn receive(&self, events: Vec<Event>);
}

/// The event classifier.
///
/// Cloning is cheap; clones share memory, store, queue and locks.
#[derive(Clone)]
pub struct Judge {
    memory: Arc<ProblemMemory>,
    store: AlarmStore,
    resolver: Arc<dyn StrategyResolver>,
    queue: Arc<PriorityQueue>,
    stripes: Arc<Vec<Mutex<()>>>,
}

impl Judge {
    pub fn new(
        memory: Arc<ProblemMemory>,
        store: AlarmStore,
        resolver: Arc<dyn StrategyResolver>,
        queue: Arc<PriorityQueue>,
        lock_stripes: usize,
    ) -> Self {
        let stripes = (0..lock_stripes.max(1)).map(|_| Mutex::new(())).collect();
        Self {
            memory,
            store,
            resolver,
            queue,
            stripes: Arc::new(stripes),
        }
    }

    pub fn memory(&self) -> &Arc<ProblemMemory> {
        &self.memory
    }

    pub fn store(&self) -> &AlarmStore {
        &self.store
    }

    /// Classifies and handles each event on its own blocking task.
    ///
    /// Events are not ordered relative to each other; only work on the same
    /// id is serialized. Must be called from within a Tokio runtime.
    pub fn receive(&self, events: Vec<Event>) -> Vec<JoinHandle<Operation>> {
        if events.is_empty() {
            warn!("Received an empty event batch");
            return Vec::new();
        }
        EVENTS_RECEIVED.inc_by(events.len() as u64);

        events
            .into_iter()
            .map(|event| {
                let judge = self.clone();
                tokio::task::spawn_blocking(move || judge.process(&event, Local::now()))
            })
            .collect()
    }

    /// Classifies and handles one event while holding the lock for its id.
    pub fn process(&self, event: &Event, now: DateTime<Local>) -> Operation {
        let _guard = self.stripe(&event.id).lock();
        let operation = self.classify(event, now);
        DECISIONS.with_label_values(&[operation.as_str()]).inc();
        self.handle(event, operation, now);
        operation
    }

    /// Decides what to do with an event and applies the memory and durable
    /// side effects of that decision.
    ///
    /// Durable failures are logged and counted; the decision still follows
    /// the in-memory state. Callers that skip [`Judge::process`] must
    /// serialize calls for the same id themselves.
    pub fn classify(&self, event: &Event, now: DateTime<Local>) -> Operation {
        match event.status {
            EventStatus::Outdated => {
                self.forget(&event.id);
                Operation::Alarm
            }
            EventStatus::Closed | EventStatus::Ok => {
                if self.memory.is_open(&event.id) {
                    self.forget(&event.id);
                    Operation::Alarm
                } else {
                    Operation::Ignore
                }
            }
            EventStatus::Problem => {
                if self.resolver.in_maintenance(&event.endpoint) {
                    debug!(
                        "Ignoring {}: endpoint {} is under maintenance",
                        event.id, event.endpoint
                    );
                    return Operation::Ignore;
                }
                let full = match self.enrich(event, now) {
                    Some(full) => full,
                    None => return Operation::Ignore,
                };
                self.persist(&full, now.timestamp());
                if self.memory.is_open(&event.id) {
                    Operation::Update
                } else {
                    self.memory.mark_open(&event.id);
                    Operation::Alarm
                }
            }
            EventStatus::Unknown => Operation::Ignore,
        }
    }

    /// Carries out a decision.
    ///
    /// `update` refreshes the stored note only. `alarm` pushes the enriched
    /// event onto the transport, except for problems outside every time
    /// window of their strategy, which are dropped and forgotten so that a
    /// later problem inside the window alarms afresh.
    pub fn handle(&self, event: &Event, operation: Operation, now: DateTime<Local>) {
        match operation {
            Operation::Ignore => {}
            Operation::Update => {
                let full = match self.enrich(event, now) {
                    Some(full) => full,
                    None => return,
                };
                match self.store.update_note(&event.id, &full.note) {
                    Ok(true) => debug!("Refreshed note of {}", event.id),
                    Ok(false) => warn!("No stored record to refresh for {}", event.id),
                    Err(e) => {
                        STORE_ERRORS.inc();
                        error!("Failed to refresh note of {}: {}", event.id, e);
                    }
                }
            }
            Operation::Alarm => {
                let full = match self.enrich(event, now) {
                    Some(full) => full,
                    None => return,
                };
                if event.status == EventStatus::Problem && !full.strategy.allows(now.naive_local()) {
                    info!(
                        "Skipping alarm {}: outside the time windows of strategy {}",
                        event.id, full.strategy.id
                    );
                    self.forget(&event.id);
                    return;
                }
                match self.queue.push(&full, full.priority) {
                    Ok(lane) => info!(
                        "Alarm {} [{}] priority {} queued on the {} lane",
                        event.id, event.status, full.priority, lane
                    ),
                    Err(e) => {
                        STORE_ERRORS.inc();
                        error!("Failed to queue alarm {}: {}", event.id, e);
                    }
                }
            }
        }
    }

    /// Resolves the owning strategy and renders the enriched event.
    ///
    /// Resolution failures drop the event with a warning.
    fn enrich(&self, event: &Event, now: DateTime<Local>) -> Option<EventFull> {
        let strategy = event
            .strategy_id()
            .and_then(|strategy_id| self.resolver.resolve_strategy(strategy_id));
        match strategy {
            Ok(strategy) => Some(EventFull::build(event.clone(), strategy, now.timestamp())),
            Err(e) => {
                EVENTS_DROPPED.inc();
                warn!("Dropping event {}: {}", event.id, e);
                None
            }
        }
    }

    fn persist(&self, full: &EventFull, timestamp: i64) {
        let saved = Dto::from_event(full, timestamp).and_then(|dto| self.store.save(&dto));
        if let Err(e) = saved {
            STORE_ERRORS.inc();
            error!("Failed to persist alarm record {}: {}", full.id(), e);
        }
    }

    /// Removes an id from memory, then from the durable store.
    fn forget(&self, id: &str) {
        self.memory.mark_closed(id);
        if let Err(e) = self.store.remove(id) {
            STORE_ERRORS.inc();
            error!("Failed to remove alarm record {}: {}", id, e);
        }
    }

    fn stripe(&self, id: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        &self.stripes[(hasher.finish() % self.stripes.len() as u64) as usize]
    }
}

impl EventSink for Judge {
    fn receive(&self, events: Vec<Event>) {
        Judge::receive(self, events);
    }
}

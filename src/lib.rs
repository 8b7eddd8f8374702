//! # tocsin
//!
//! Tocsin classifies alert events into alarms and delivers delayed
//! notifications for them. It sits between an upstream judge that produces
//! status observations and an external notifier executable.
//!
//! ## Features
//!
//! - Deduplication of open problems, backed by a durable mirror
//! - Problem, update and resolution decisions per event id
//! - Time windows and maintenance suppression per strategy
//! - Self-termination of stale alarms through the outdated sweep
//! - Sampling garbage collection of the raw value cache
//! - High and low priority transport lanes
//! - Delayed notifications with recovery notifications and silencing
//! - Problem Memory dump and restore across restarts
//! - Prometheus metrics
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::Local;
//! use std::time::Duration;
//! use tocsin::prelude::*;
//!
//! let mirror = Arc::new(MemoryMirror::new());
//! let strategies = Arc::new(StaticStrategies::new());
//! strategies.insert(StrategyConfig {
//!     strategy: Strategy::new(7, 1).with_note("{{endpoint}} disk at {{left_value}}%"),
//!     notifications: Vec::new(),
//! });
//!
//! let queue = Arc::new(PriorityQueue::new(
//!     mirror.clone(),
//!     "queue/high",
//!     "queue/low",
//!     1,
//!     Duration::from_millis(200),
//!     Shutdown::new(Duration::from_secs(5)),
//! ));
//! let judge = Judge::new(
//!     Arc::new(ProblemMemory::new()),
//!     AlarmStore::new(mirror.clone(), 3),
//!     strategies,
//!     queue.clone(),
//!     64,
//! );
//!
//! let event = Event::new("s_7_host1", EventStatus::Problem)
//!     .with_endpoint("host1")
//!     .with_value(93.0);
//! assert_eq!(judge.process(&event, Local::now()), Operation::Alarm);
//! assert_eq!(judge.process(&event, Local::now()), Operation::Update);
//! assert_eq!(queue.len(Lane::High).unwrap(), 1);
//! ```
//!
//! ## CLI Features
//!
//! ### run
//!
//! Starts the service and ingests JSON-lines events from a file, or from
//! standard input when `--events` is omitted. Runs until SIGINT or SIGTERM.
//!
//! ```bash
//! tocsin run --config tocsin.toml --events events.jsonl
//! ```
//!
//! ### check
//!
//! Loads and validates a configuration file.
//!
//! ```bash
//! tocsin check --config tocsin.toml
//! ```
//!
//! ### dump
//!
//! Prints the ids held in a Problem Memory dump.
//!
//! ```bash
//! tocsin dump --path ./data/problems.json
//! ```
//!
//! ### Bench
//!
//! ```bash
//! cargo bench
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod judge;
pub mod metrics;
pub mod notify;
pub mod queue;
pub mod service;
pub mod shutdown;
pub mod store;
pub mod strategy;
pub mod sweep;

pub use error::AlarmError;
pub use judge::Judge;
pub use service::AlarmService;

pub mod prelude {
    pub use crate::config::AlarmConfig;
    pub use crate::error::AlarmError;
    pub use crate::event::{Event, EventFull, EventStatus};
    pub use crate::judge::{EventSink, Judge, Operation, ProblemMemory};
    pub use crate::notify::{CommandInvoker, Invoker, NotifyScheduler};
    pub use crate::queue::{Consumer, Delivery, Dispatcher, FnConsumer, Lane, PriorityQueue};
    pub use crate::service::AlarmService;
    pub use crate::shutdown::Shutdown;
    pub use crate::store::{AlarmStore, MemoryMirror, Mirror};
    pub use crate::strategy::{StaticStrategies, Strategy, StrategyConfig, StrategyResolver};
}

//! Module for the priority queue transport.
//!
//! Decided alarms travel from the classifier to downstream consumers through
//! two durable lists, one per lane. Each lane has its own pop loop feeding
//! the same bounded channel, so high priority alarms are favored only by
//! cadence: a busy low lane can still interleave with the high lane at the
//! channel. Delivery is at-least-once; a stop does not take back alarms that
//! were already sent on the channel.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tocsin::event::{Event, EventFull, EventStatus};
//! use tocsin::queue::{Lane, PriorityQueue};
//! use tocsin::shutdown::Shutdown;
//! use tocsin::store::MemoryMirror;
//! use tocsin::strategy::Strategy;
//!
//! let queue = PriorityQueue::new(
//!     Arc::new(MemoryMirror::new()),
//!     "queue/high",
//!     "queue/low",
//!     1,
//!     Duration::from_millis(50),
//!     Shutdown::new(Duration::from_secs(1)),
//! );
//! let alarm = EventFull::build(Event::new("s_1_host", EventStatus::Problem), Strategy::new(1, 1), 0);
//! assert_eq!(queue.push(&alarm, 1).unwrap(), Lane::High);
//! assert_eq!(queue.len(Lane::High).unwrap(), 1);
//! ```

pub mod dispatch;

pub use dispatch::{Consumer, Dispatcher, FnConsumer};

use crate::error::{AlarmError, Result, StoreResult};
use crate::event::EventFull;
use crate::metrics::{QUEUE_MALFORMED, QUEUE_POPPED, QUEUE_PUSHED, STORE_ERRORS};
use crate::shutdown::Shutdown;
use crate::store::Mirror;
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Transport lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    High,
    Low,
}

impl Lane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::High => "high",
            Lane::Low => "low",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An alarm in transit between the durable list and the consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub event: EventFull,
    pub is_high: bool,
}

pub struct PriorityQueue {
    mirror: Arc<dyn Mirror>,
    high_key: String,
    low_key: String,
    /// Priorities up to and including this value use the high lane.
    high_priority_max: u8,
    poll_interval: Duration,
    shutdown: Shutdown,
}

impl PriorityQueue {
    pub fn new(
        mirror: Arc<dyn Mirror>,
        high_key: &str,
        low_key: &str,
        high_priority_max: u8,
        poll_interval: Duration,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            mirror,
            high_key: high_key.to_string(),
            low_key: low_key.to_string(),
            high_priority_max,
            poll_interval,
            shutdown,
        }
    }

    pub fn lane_for(&self, priority: u8) -> Lane {
        if priority <= self.high_priority_max {
            Lane::High
        } else {
            Lane::Low
        }
    }

    fn key(&self, lane: Lane) -> &str {
        match lane {
            Lane::High => &self.high_key,
            Lane::Low => &self.low_key,
        }
    }

    /// Appends an alarm to the tail of the lane matching `priority`.
    pub fn push(&self, event: &EventFull, priority: u8) -> Result<Lane> {
        let lane = self.lane_for(priority);
        let payload = event.to_json()?;
        self.mirror.rpush(self.key(lane), &payload)?;
        QUEUE_PUSHED.with_label_values(&[lane.as_str()]).inc();
        debug!("Queued alarm {} on the {} lane", event.id(), lane);
        Ok(lane)
    }

    pub fn len(&self, lane: Lane) -> StoreResult<usize> {
        self.mirror.llen(self.key(lane))
    }

    /// Pops the head of a lane.
    ///
    /// A payload that fails to deserialize is dropped and reported as
    /// [`AlarmError::Serialization`]; the list has already advanced past it.
    pub fn pop(&self, lane: Lane) -> Result<Option<Delivery>> {
        let payload = match self.mirror.lpop(self.key(lane))? {
            Some(payload) => payload,
            None => return Ok(None),
        };
        let event = EventFull::from_json(&payload).map_err(|e| {
            QUEUE_MALFORMED.inc();
            AlarmError::Serialization(e)
        })?;
        QUEUE_POPPED.with_label_values(&[lane.as_str()]).inc();
        Ok(Some(Delivery {
            event,
            is_high: lane == Lane::High,
        }))
    }

    /// Spawns one pop loop per lane, both feeding `tx`.
    pub fn start(self: &Arc<Self>, tx: mpsc::Sender<Delivery>) -> Vec<JoinHandle<()>> {
        [Lane::High, Lane::Low]
            .into_iter()
            .map(|lane| {
                let queue = Arc::clone(self);
                let tx = tx.clone();
                tokio::spawn(async move { queue.pop_loop(lane, tx).await })
            })
            .collect()
    }

    /// Requests both pop loops (and every loop sharing the flag) to stop.
    pub fn stop(&self) {
        self.shutdown.request();
    }

    async fn pop_loop(&self, lane: Lane, tx: mpsc::Sender<Delivery>) {
        info!("Pop loop for the {} lane started", lane);
        while !self.shutdown.is_requested() {
            match self.len(lane) {
                Ok(0) => {
                    self.shutdown.sleep(self.poll_interval).await;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    STORE_ERRORS.inc();
                    error!("Failed to read the {} lane length: {}", lane, e);
                    self.shutdown.sleep(self.poll_interval).await;
                    continue;
                }
            }

            match self.pop(lane) {
                Ok(Some(delivery)) => {
                    if tx.send(delivery).await.is_err() {
                        warn!("Delivery channel closed, stopping the {} lane", lane);
                        break;
                    }
                }
                Ok(None) => {}
                Err(AlarmError::Serialization(e)) => {
                    error!("Dropping malformed payload from the {} lane: {}", lane, e);
                }
                Err(e) => {
                    STORE_ERRORS.inc();
                    error!("Failed to pop from the {} lane: {}", lane, e);
                    self.shutdown.sleep(self.poll_interval).await;
                }
            }
        }
        info!("Pop loop for the {} lane stopped", lane);
    }
}

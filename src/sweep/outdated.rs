//! Outdated sweep over the alarm index.
//!
//! Stale ids are snapshotted without the classifier's per-id lock. A live
//! problem that refreshes an id between the snapshot and the classification
//! of its `outdated` event is still closed by that event; the next problem
//! for the id then alarms afresh. Like the two-step record write in
//! [`crate::store::AlarmStore`], this window is accepted rather than locked.

use crate::error::{StoreError, StoreResult};
use crate::event::{Event, EventStatus};
use crate::judge::EventSink;
use crate::metrics::{OUTDATED_SWEPT, STORE_ERRORS};
use crate::shutdown::Shutdown;
use crate::store::AlarmStore;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Terminates open alarms that have not been updated for too long.
///
/// Stale ids are restamped `outdated` and fed back through the ingestion
/// entry point, so the classifier removes them like any other event.
pub struct OutdatedSweeper {
    store: AlarmStore,
    sink: Arc<dyn EventSink>,
    threshold: Duration,
}

impl OutdatedSweeper {
    pub fn new(store: AlarmStore, sink: Arc<dyn EventSink>, threshold: Duration) -> Self {
        Self {
            store,
            sink,
            threshold,
        }
    }

    /// Builds one `outdated` event per indexed id older than the threshold.
    ///
    /// An index entry whose record is missing or unreadable still yields an
    /// event carrying just the id, which lets the classifier drop the entry.
    pub fn sweep(&self, now: i64) -> StoreResult<Vec<Event>> {
        let threshold = self.threshold.as_secs() as i64;
        let mut stale: Vec<(String, i64)> = self
            .store
            .list_open_with_timestamp()?
            .into_iter()
            .filter(|(_, updated)| now - updated >= threshold)
            .collect();
        stale.sort();

        let mut events = Vec::with_capacity(stale.len());
        for (id, updated) in stale {
            let event = match self.store.load_event(&id) {
                Ok(Some(full)) => full.event.restamped(EventStatus::Outdated),
                Ok(None) => {
                    warn!("Indexed alarm {} has no record", id);
                    Event::new(&id, EventStatus::Outdated)
                }
                Err(StoreError::Corrupt(reason)) => {
                    warn!("Indexed alarm {} has a corrupt record: {}", id, reason);
                    Event::new(&id, EventStatus::Outdated)
                }
                Err(e) => return Err(e),
            };
            debug!("Alarm {} is outdated, last updated at {}", id, updated);
            events.push(event);
        }
        Ok(events)
    }

    /// Sweeps once and feeds the result to the sink.
    ///
    /// # Returns
    /// The number of outdated events produced.
    pub fn tick(&self, now: i64) -> usize {
        match self.sweep(now) {
            Ok(events) if events.is_empty() => {
                debug!("Outdated sweep found nothing");
                0
            }
            Ok(events) => {
                let swept = events.len();
                OUTDATED_SWEPT.inc_by(swept as u64);
                info!("Outdated sweep produced {} events", swept);
                self.sink.receive(events);
                swept
            }
            Err(e) => {
                STORE_ERRORS.inc();
                error!("Outdated sweep failed: {}", e);
                0
            }
        }
    }

    pub async fn run(&self, interval: Duration, shutdown: Shutdown) {
        info!("Outdated sweep loop started");
        while !shutdown.is_requested() {
            if !shutdown.sleep(interval).await {
                break;
            }
            self.tick(Utc::now().timestamp());
        }
        info!("Outdated sweep loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventFull;
    use crate::store::{Dto, MemoryMirror, Mirror};
    use crate::strategy::Strategy;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        batches: Mutex<Vec<Vec<Event>>>,
    }

    impl EventSink for CollectingSink {
        fn receive(&self, events: Vec<Event>) {
            self.batches.lock().push(events);
        }
    }

    fn save(store: &AlarmStore, id: &str, timestamp: i64) {
        let full = EventFull::build(
            Event::new(id, EventStatus::Problem).with_endpoint("host1"),
            Strategy::new(7, 2),
            timestamp,
        );
        store.save(&Dto::from_event(&full, timestamp).unwrap()).unwrap();
    }

    /// Tests the staleness threshold.
    ///
    /// # Purpose
    /// Only ids whose age reaches the threshold are restamped, and the
    /// restamped event keeps the stored payload.
    ///
    /// # Steps
    /// 1. Store one alarm updated 4h ago and one updated 1h ago.
    /// 2. Tick with a 3h threshold.
    /// 3. Verify a single batch with one outdated event reached the sink.
    #[test]
    fn test_tick_feeds_stale_alarms_back() {
        let store = AlarmStore::new(Arc::new(MemoryMirror::new()), 3);
        let now = 100_000;
        save(&store, "s_7_old", now - 4 * 3600);
        save(&store, "s_7_fresh", now - 3600);

        let sink = Arc::new(CollectingSink::default());
        let sweeper = OutdatedSweeper::new(store, sink.clone(), Duration::from_secs(3 * 3600));
        assert_eq!(sweeper.tick(now), 1);

        let batches = sink.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].id, "s_7_old");
        assert_eq!(batches[0][0].status, EventStatus::Outdated);
        assert_eq!(batches[0][0].endpoint, "host1");
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let store = AlarmStore::new(Arc::new(MemoryMirror::new()), 3);
        save(&store, "s_7_edge", 1000);
        let sweeper = OutdatedSweeper::new(
            store,
            Arc::new(CollectingSink::default()),
            Duration::from_secs(500),
        );
        assert!(sweeper.sweep(1499).unwrap().is_empty());
        assert_eq!(sweeper.sweep(1500).unwrap().len(), 1);
    }

    #[test]
    fn test_orphan_index_entry_yields_bare_event() {
        let mirror = Arc::new(MemoryMirror::new());
        mirror.zadd("p1time", "s_7_orphan", 0).unwrap();
        let sweeper = OutdatedSweeper::new(
            AlarmStore::new(mirror, 3),
            Arc::new(CollectingSink::default()),
            Duration::from_secs(60),
        );

        let events = sweeper.sweep(1000).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "s_7_orphan");
    }

    #[test]
    fn test_store_failure_sweeps_nothing() {
        let mirror = Arc::new(MemoryMirror::new());
        let store = AlarmStore::new(mirror.clone(), 3);
        save(&store, "s_7_old", 0);
        mirror.set_failing(true);

        let sink = Arc::new(CollectingSink::default());
        let sweeper = OutdatedSweeper::new(store, sink.clone(), Duration::from_secs(1));
        assert_eq!(sweeper.tick(1000), 0);
        assert!(sink.batches.lock().is_empty());
    }
}

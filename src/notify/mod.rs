//! Module for the delayed notification scheduler.
//!
//! Every decided alarm reaches the [`NotifyScheduler`] through the consumer
//! registry. Problems schedule the strategy's notification requests, each at
//! `now + step`; resolutions purge what is still pending. A periodic scan
//! fires what is due through the external [`Invoker`].
//!
//! Requests are kept per event id, ordered by fire time. Fire times inside
//! one bucket are unique: a collision moves the new request to the next
//! free second.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tocsin::event::{Event, EventFull, EventStatus};
//! use tocsin::notify::{CommandInvoker, NotifyScheduler};
//! use tocsin::store::MemoryMirror;
//! use tocsin::strategy::{StaticStrategies, Strategy, StrategyConfig};
//!
//! let strategies = StaticStrategies::new();
//! strategies.insert(StrategyConfig { strategy: Strategy::new(7, 1), notifications: Vec::new() });
//! let scheduler = NotifyScheduler::new(
//!     Arc::new(strategies),
//!     Arc::new(MemoryMirror::new()),
//!     Arc::new(CommandInvoker::new()),
//!     "./notify.sh",
//!     Duration::from_secs(30),
//!     "silence/",
//! );
//!
//! let alarm = EventFull::build(Event::new("s_7_host1", EventStatus::Problem), Strategy::new(7, 1), 0);
//! scheduler.accept(&alarm, 100);
//! assert_eq!(scheduler.pending("s_7_host1"), vec![100]);
//! ```

pub mod invoker;
pub mod request;

pub use invoker::{CommandInvoker, Invoker};
pub use request::ScheduledRequest;

use crate::error::StoreResult;
use crate::event::{EventFull, EventStatus};
use crate::metrics::{NOTIFY_FAILED, NOTIFY_FIRED, NOTIFY_SILENCED, NOTIFY_SKIPPED, STORE_ERRORS};
use crate::queue::{Consumer, Delivery};
use crate::shutdown::Shutdown;
use crate::store::Mirror;
use crate::strategy::{NotifyRequest, StrategyResolver};
use chrono::Utc;
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Outcome of one scan tick.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Requests handed to the invoker.
    pub fired: usize,
    /// Due requests removed without an invocation.
    pub skipped: usize,
    /// Pending requests dropped by a silence flag.
    pub silenced: usize,
    /// Dispatch tasks spawned by this tick.
    pub tasks: Vec<JoinHandle<()>>,
}

pub struct NotifyScheduler {
    buckets: RwLock<HashMap<String, BTreeMap<i64, ScheduledRequest>>>,
    resolver: Arc<dyn StrategyResolver>,
    mirror: Arc<dyn Mirror>,
    invoker: Arc<dyn Invoker>,
    executable: String,
    timeout: Duration,
    silence_prefix: String,
}

impl NotifyScheduler {
    pub fn new(
        resolver: Arc<dyn StrategyResolver>,
        mirror: Arc<dyn Mirror>,
        invoker: Arc<dyn Invoker>,
        executable: &str,
        timeout: Duration,
        silence_prefix: &str,
    ) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            resolver,
            mirror,
            invoker,
            executable: executable.to_string(),
            timeout,
            silence_prefix: silence_prefix.to_string(),
        }
    }

    /// Feeds one decided alarm into the schedule.
    ///
    /// Problems schedule their requests. Every resolution purges pending
    /// non-recover requests; only `ok` schedules recover requests, and only
    /// when the strategy declares a recover delay.
    pub fn accept(&self, event: &EventFull, now: i64) {
        match event.status() {
            EventStatus::Problem => {
                for request in self.requests_for(event) {
                    let fire_at = now + request.step as i64;
                    self.schedule(ScheduledRequest::new(event, request, false), fire_at);
                }
            }
            status if status.is_resolution() => {
                let purged = self.purge_non_recover(event.id());
                if purged > 0 {
                    info!("Purged {} pending notifications for {}", purged, event.id());
                }
                if status != EventStatus::Ok {
                    return;
                }
                if let Some(delay) = event.strategy.recover_notify {
                    for request in self.requests_for(event) {
                        self.schedule(ScheduledRequest::new(event, request, true), now + delay as i64);
                    }
                }
            }
            _ => {}
        }
    }

    /// Inserts a request at `fire_at`, or at the next free second after it.
    ///
    /// # Returns
    /// The fire time actually used.
    pub fn schedule(&self, request: ScheduledRequest, fire_at: i64) -> i64 {
        let mut buckets = self.buckets.write();
        let bucket = buckets.entry(request.event_id.clone()).or_default();
        let mut slot = fire_at;
        while bucket.contains_key(&slot) {
            slot += 1;
        }
        debug!(
            "Scheduled {}notification for {} at {}",
            if request.recover { "recover " } else { "" },
            request.event_id,
            slot
        );
        bucket.insert(slot, request);
        slot
    }

    /// Drops every pending request for `id` that is not a recover request.
    pub fn purge_non_recover(&self, id: &str) -> usize {
        let mut buckets = self.buckets.write();
        let bucket = match buckets.get_mut(id) {
            Some(bucket) => bucket,
            None => return 0,
        };
        let removed = retain_recover(bucket);
        if bucket.is_empty() {
            buckets.remove(id);
        }
        removed
    }

    /// Runs one scan over every bucket.
    ///
    /// The bucket map stays write-locked for the whole scan; invocations run
    /// on spawned tasks. Must be called from within a Tokio runtime.
    pub fn tick(&self, now: i64) -> TickReport {
        let mut report = TickReport::default();
        let mut buckets = self.buckets.write();

        for (id, bucket) in buckets.iter_mut() {
            match self.mirror.flag_get(&self.silence_key(id)) {
                Ok(true) => {
                    let dropped = retain_recover(bucket);
                    if dropped > 0 {
                        NOTIFY_SILENCED.inc_by(dropped as u64);
                        info!("Dropped {} notifications for silenced {}", dropped, id);
                    }
                    report.silenced += dropped;
                }
                Ok(false) => {}
                Err(e) => {
                    STORE_ERRORS.inc();
                    error!("Failed to read the silence flag of {}: {}", id, e);
                }
            }

            let pending = bucket.split_off(&(now + 1));
            let due = std::mem::replace(bucket, pending);
            for (_, request) in due {
                if request.is_zero_dispatch() {
                    NOTIFY_SKIPPED.inc();
                    debug!("Notification for {} has no target, skipping", id);
                    report.skipped += 1;
                    continue;
                }
                NOTIFY_FIRED.inc();
                report.fired += 1;
                report.tasks.push(self.dispatch(request));
            }
        }

        buckets.retain(|_, bucket| !bucket.is_empty());
        if report.fired + report.skipped + report.silenced > 0 {
            info!(
                "Notification scan: {} fired, {} skipped, {} silenced",
                report.fired, report.skipped, report.silenced
            );
        }
        report
    }

    /// Scans every `interval` until a stop is requested.
    pub async fn run(&self, interval: Duration, shutdown: Shutdown) {
        info!("Notification scan loop started");
        while !shutdown.is_requested() {
            self.tick(Utc::now().timestamp());
            shutdown.sleep(interval).await;
        }
        info!("Notification scan loop stopped");
    }

    /// Silences non-recover notifications for `id` during `ttl`.
    pub fn silence(&self, id: &str, ttl: Duration) -> StoreResult<()> {
        self.mirror.flag_set(&self.silence_key(id), ttl)?;
        info!("Silenced {} for {:?}", id, ttl);
        Ok(())
    }

    pub fn unsilence(&self, id: &str) -> StoreResult<()> {
        self.mirror.flag_del(&self.silence_key(id))?;
        info!("Unsilenced {}", id);
        Ok(())
    }

    /// Fire times pending for `id`, ascending.
    pub fn pending(&self, id: &str) -> Vec<i64> {
        self.buckets
            .read()
            .get(id)
            .map(|bucket| bucket.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Pending requests for `id`, in fire order.
    pub fn pending_requests(&self, id: &str) -> Vec<ScheduledRequest> {
        self.buckets
            .read()
            .get(id)
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }

    fn silence_key(&self, id: &str) -> String {
        format!("{}{}", self.silence_prefix, id)
    }

    /// Resolves the strategy's requests, substituting the placeholder when
    /// none are configured.
    fn requests_for(&self, event: &EventFull) -> Vec<NotifyRequest> {
        match self.resolver.resolve_notification_requests(event.strategy.id) {
            Ok(requests) if requests.is_empty() => vec![NotifyRequest::placeholder()],
            Ok(requests) => requests,
            Err(e) => {
                warn!("No notifications for {}: {}", event.id(), e);
                Vec::new()
            }
        }
    }

    fn dispatch(&self, request: ScheduledRequest) -> JoinHandle<()> {
        let invoker = Arc::clone(&self.invoker);
        let executable = self.executable.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            let args = request.call_args();
            match invoker.invoke(&executable, &args, timeout).await {
                Ok(_) => debug!("Notified {} via {}", request.event_id, executable),
                Err(e) => {
                    NOTIFY_FAILED.inc();
                    error!("Failed to notify {}: {}", request.event_id, e);
                }
            }
        })
    }
}

/// Keeps only recover requests, returning how many were dropped.
fn retain_recover(bucket: &mut BTreeMap<i64, ScheduledRequest>) -> usize {
    let before = bucket.len();
    bucket.retain(|_, request| request.recover);
    before - bucket.len()
}

impl Consumer for NotifyScheduler {
    fn id(&self) -> &str {
        "notify-scheduler"
    }

    fn consume(&self, delivery: &Delivery) {
        self.accept(&delivery.event, Utc::now().timestamp());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvokeError;
    use crate::event::Event;
    use crate::store::MemoryMirror;
    use crate::strategy::{Recipients, StaticStrategies, Strategy, StrategyConfig};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingInvoker {
        calls: Mutex<Vec<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl Invoker for RecordingInvoker {
        async fn invoke(
            &self,
            _program: &str,
            args: &[String],
            timeout: Duration,
        ) -> Result<Vec<u8>, InvokeError> {
            self.calls.lock().push(args.to_vec());
            if self.fail {
                Err(InvokeError::Timeout(timeout))
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn request(step: u64, team: &str) -> NotifyRequest {
        NotifyRequest {
            step,
            recipients: Recipients {
                mail: vec![format!("{}@example.com", team)],
                ..Recipients::default()
            },
            template: "default".into(),
            team: team.into(),
        }
    }

    fn scheduler(
        strategy: Strategy,
        requests: Vec<NotifyRequest>,
        invoker: Arc<RecordingInvoker>,
    ) -> (Arc<MemoryMirror>, NotifyScheduler) {
        let strategies = StaticStrategies::new();
        strategies.insert(StrategyConfig {
            strategy,
            notifications: requests,
        });
        let mirror = Arc::new(MemoryMirror::new());
        let scheduler = NotifyScheduler::new(
            Arc::new(strategies),
            mirror.clone(),
            invoker,
            "notify",
            Duration::from_secs(1),
            "silence/",
        );
        (mirror, scheduler)
    }

    fn alarm(status: EventStatus, strategy: &Strategy) -> EventFull {
        EventFull::build(Event::new("s_7_host1", status), strategy.clone(), 0)
    }

    /// Tests that repeated problems merge into one bucket.
    ///
    /// # Purpose
    /// Two problem alarms with different steps must leave the union of their
    /// fire times, and equal fire times must move to the next second.
    ///
    /// # Steps
    /// 1. Accept a problem whose strategy has steps 0 and 60.
    /// 2. Accept the same problem again at the same instant.
    /// 3. Verify all four fire times are present.
    #[test]
    fn test_problems_merge_on_collision() {
        let strategy = Strategy::new(7, 1);
        let (_, scheduler) = scheduler(
            strategy.clone(),
            vec![request(0, "ops"), request(60, "dba")],
            Arc::new(RecordingInvoker::default()),
        );

        scheduler.accept(&alarm(EventStatus::Problem, &strategy), 1000);
        scheduler.accept(&alarm(EventStatus::Problem, &strategy), 1000);
        assert_eq!(scheduler.pending("s_7_host1"), vec![1000, 1001, 1060, 1061]);
        assert_eq!(scheduler.bucket_count(), 1);
    }

    #[test]
    fn test_ok_without_recover_clears_bucket() {
        let strategy = Strategy::new(7, 1);
        let (_, scheduler) = scheduler(
            strategy.clone(),
            vec![request(60, "ops")],
            Arc::new(RecordingInvoker::default()),
        );

        scheduler.accept(&alarm(EventStatus::Problem, &strategy), 1000);
        scheduler.accept(&alarm(EventStatus::Ok, &strategy), 1010);
        assert!(scheduler.pending("s_7_host1").is_empty());
        assert_eq!(scheduler.bucket_count(), 0);
    }

    /// Tests recover scheduling on resolution.
    ///
    /// # Purpose
    /// With a recover delay, `ok` replaces the pending requests with exactly
    /// one recover request per configured request.
    ///
    /// # Steps
    /// 1. Accept a problem for a strategy with two requests.
    /// 2. Accept an ok at t=2000 with a 300s recover delay.
    /// 3. Verify only recover requests remain at 2300 and 2301.
    #[test]
    fn test_ok_with_recover_schedules_recover_requests() {
        let strategy = Strategy::new(7, 1).with_recover_notify(300);
        let (_, scheduler) = scheduler(
            strategy.clone(),
            vec![request(60, "ops"), request(120, "dba")],
            Arc::new(RecordingInvoker::default()),
        );

        scheduler.accept(&alarm(EventStatus::Problem, &strategy), 1000);
        scheduler.accept(&alarm(EventStatus::Ok, &strategy), 2000);

        assert_eq!(scheduler.pending("s_7_host1"), vec![2300, 2301]);
        let pending = scheduler.pending_requests("s_7_host1");
        assert!(pending.iter().all(|r| r.recover && r.status == EventStatus::Ok));
    }

    #[test]
    fn test_closed_purges_without_recover() {
        let strategy = Strategy::new(7, 1).with_recover_notify(300);
        let (_, scheduler) = scheduler(
            strategy.clone(),
            vec![request(60, "ops")],
            Arc::new(RecordingInvoker::default()),
        );

        scheduler.accept(&alarm(EventStatus::Problem, &strategy), 1000);
        scheduler.accept(&alarm(EventStatus::Closed, &strategy), 1010);
        assert_eq!(scheduler.bucket_count(), 0);
    }

    #[test]
    fn test_outdated_purges_and_unknown_is_ignored() {
        let strategy = Strategy::new(7, 1).with_recover_notify(300);
        let (_, scheduler) = scheduler(
            strategy.clone(),
            vec![request(60, "ops")],
            Arc::new(RecordingInvoker::default()),
        );

        scheduler.accept(&alarm(EventStatus::Problem, &strategy), 1000);
        scheduler.accept(&alarm(EventStatus::Unknown, &strategy), 1005);
        assert_eq!(scheduler.pending("s_7_host1"), vec![1060]);

        scheduler.accept(&alarm(EventStatus::Outdated, &strategy), 1010);
        assert_eq!(scheduler.bucket_count(), 0);
    }

    #[tokio::test]
    async fn test_tick_fires_due_requests_only() {
        let strategy = Strategy::new(7, 1);
        let invoker = Arc::new(RecordingInvoker::default());
        let (_, scheduler) = scheduler(
            strategy.clone(),
            vec![request(0, "ops"), request(60, "dba")],
            invoker.clone(),
        );

        scheduler.accept(&alarm(EventStatus::Problem, &strategy), 1000);
        let report = scheduler.tick(1030);
        assert_eq!(report.fired, 1);
        for task in report.tasks {
            task.await.unwrap();
        }

        let calls = invoker.calls.lock().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][11], "ops");
        assert_eq!(calls[0][12], "s_7_host1");
        assert_eq!(scheduler.pending("s_7_host1"), vec![1060]);

        let report = scheduler.tick(1060);
        assert_eq!(report.fired, 1);
        assert_eq!(scheduler.bucket_count(), 0);
    }

    #[tokio::test]
    async fn test_placeholder_is_removed_without_invocation() {
        let strategy = Strategy::new(7, 1);
        let invoker = Arc::new(RecordingInvoker::default());
        let (_, scheduler) = scheduler(strategy.clone(), Vec::new(), invoker.clone());

        scheduler.accept(&alarm(EventStatus::Problem, &strategy), 1000);
        assert_eq!(scheduler.pending("s_7_host1"), vec![1000]);

        let report = scheduler.tick(1000);
        assert_eq!((report.fired, report.skipped), (0, 1));
        assert!(report.tasks.is_empty());
        assert!(invoker.calls.lock().is_empty());
        assert_eq!(scheduler.bucket_count(), 0);
    }

    /// Tests silencing.
    ///
    /// # Purpose
    /// A silence flag drops pending non-recover requests but never a
    /// pending recover request.
    ///
    /// # Steps
    /// 1. Schedule one ordinary and one recover request for the same id.
    /// 2. Silence the id and tick before either is due.
    /// 3. Verify only the recover request survived.
    #[tokio::test]
    async fn test_silence_spares_recover_requests() {
        let strategy = Strategy::new(7, 1);
        let (_, scheduler) = scheduler(
            strategy.clone(),
            vec![request(600, "ops")],
            Arc::new(RecordingInvoker::default()),
        );

        let problem = alarm(EventStatus::Problem, &strategy);
        scheduler.accept(&problem, 1000);
        scheduler.schedule(ScheduledRequest::new(&problem, request(0, "ops"), true), 1700);
        scheduler.silence("s_7_host1", Duration::from_secs(60)).unwrap();

        let report = scheduler.tick(1001);
        assert_eq!(report.silenced, 1);
        assert_eq!(scheduler.pending("s_7_host1"), vec![1700]);

        scheduler.unsilence("s_7_host1").unwrap();
        scheduler.accept(&problem, 1002);
        assert_eq!(scheduler.pending("s_7_host1"), vec![1602, 1700]);
    }

    #[tokio::test]
    async fn test_failed_invocations_are_not_requeued() {
        let strategy = Strategy::new(7, 1);
        let invoker = Arc::new(RecordingInvoker {
            fail: true,
            ..RecordingInvoker::default()
        });
        let (_, scheduler) = scheduler(strategy.clone(), vec![request(0, "ops")], invoker.clone());

        scheduler.accept(&alarm(EventStatus::Problem, &strategy), 1000);
        for task in scheduler.tick(1000).tasks {
            task.await.unwrap();
        }
        assert_eq!(invoker.calls.lock().len(), 1);
        assert_eq!(scheduler.bucket_count(), 0);
    }
}

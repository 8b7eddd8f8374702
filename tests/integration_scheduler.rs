/// Integration tests of the notification scheduler
///
/// Covers merging of repeated problems, cancellation on resolution and
/// silencing, with an in-memory mirror and a recording invoker.
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tocsin::error::InvokeError;
use tocsin::prelude::*;
use tocsin::strategy::{NotifyRequest, Recipients};

#[derive(Default)]
struct RecordingInvoker {
    calls: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl Invoker for RecordingInvoker {
    async fn invoke(
        &self,
        _program: &str,
        args: &[String],
        _timeout: Duration,
    ) -> Result<Vec<u8>, InvokeError> {
        self.calls.lock().push(args.to_vec());
        Ok(b"sent".to_vec())
    }
}

fn request(step: u64, team: &str) -> NotifyRequest {
    NotifyRequest {
        step,
        recipients: Recipients {
            im: vec![format!("#{}", team)],
            ..Recipients::default()
        },
        template: "default".to_string(),
        team: team.to_string(),
    }
}

fn setup(
    strategies: Vec<StrategyConfig>,
) -> (Arc<StaticStrategies>, Arc<RecordingInvoker>, NotifyScheduler) {
    let strategies = Arc::new(StaticStrategies::from_config(&strategies, &[], &[]));
    let invoker = Arc::new(RecordingInvoker::default());
    let scheduler = NotifyScheduler::new(
        strategies.clone(),
        Arc::new(MemoryMirror::new()),
        invoker.clone(),
        "notify",
        Duration::from_secs(5),
        "silence/",
    );
    (strategies, invoker, scheduler)
}

fn alarm(id: &str, status: EventStatus, strategy: &Strategy) -> EventFull {
    EventFull::build(
        Event::new(id, status).with_endpoint("host1"),
        strategy.clone(),
        0,
    )
}

/// Two problem alarms with different steps keep the union of fire times.
#[test]
fn test_repeated_problems_keep_every_request() {
    let first = Strategy::new(7, 1);
    let (strategies, _, scheduler) = setup(vec![StrategyConfig {
        strategy: first.clone(),
        notifications: vec![request(60, "ops")],
    }]);

    scheduler.accept(&alarm("s_7_host1", EventStatus::Problem, &first), 1000);

    // The strategy gains an escalation before the next alarm.
    strategies.insert(StrategyConfig {
        strategy: first.clone(),
        notifications: vec![request(60, "ops"), request(300, "lead")],
    });
    scheduler.accept(&alarm("s_7_host1", EventStatus::Problem, &first), 1000);

    assert_eq!(scheduler.pending("s_7_host1"), vec![1060, 1061, 1300]);
}

/// Resolution with a recover delay swaps pending requests for recover ones.
#[tokio::test]
async fn test_recover_notification_fires_after_resolution() {
    let strategy = Strategy::new(7, 2).with_recover_notify(120);
    let (_, invoker, scheduler) = setup(vec![StrategyConfig {
        strategy: strategy.clone(),
        notifications: vec![request(600, "ops")],
    }]);

    scheduler.accept(&alarm("s_7_host1", EventStatus::Problem, &strategy), 1000);
    scheduler.accept(&alarm("s_7_host1", EventStatus::Ok, &strategy), 1100);
    assert_eq!(scheduler.pending("s_7_host1"), vec![1220]);

    // Silencing never cancels a recover request.
    scheduler
        .silence("s_7_host1", Duration::from_secs(3600))
        .unwrap();
    let report = scheduler.tick(1219);
    assert_eq!((report.fired, report.silenced), (0, 0));

    let report = scheduler.tick(1220);
    assert_eq!(report.fired, 1);
    for task in report.tasks {
        task.await.unwrap();
    }

    let calls = invoker.calls.lock().clone();
    assert_eq!(calls.len(), 1);
    assert!(calls[0][0].starts_with("[P2 OK]"));
    assert_eq!(calls[0][8], "#ops");
    assert_eq!(scheduler.bucket_count(), 0);
}

/// Independent ids keep independent buckets.
#[tokio::test]
async fn test_resolution_only_touches_its_own_id() {
    let strategy = Strategy::new(7, 1);
    let (_, invoker, scheduler) = setup(vec![StrategyConfig {
        strategy: strategy.clone(),
        notifications: vec![request(0, "ops")],
    }]);

    scheduler.accept(&alarm("s_7_host1", EventStatus::Problem, &strategy), 1000);
    scheduler.accept(&alarm("s_7_host2", EventStatus::Problem, &strategy), 1000);
    scheduler.accept(&alarm("s_7_host1", EventStatus::Ok, &strategy), 1000);
    assert_eq!(scheduler.bucket_count(), 1);

    for task in scheduler.tick(1000).tasks {
        task.await.unwrap();
    }
    let calls = invoker.calls.lock().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][12], "s_7_host2");
}

/// A strategy without notification requests still schedules, but never calls out.
#[tokio::test]
async fn test_strategy_without_requests_is_observable() {
    let strategy = Strategy::new(9, 3);
    let (_, invoker, scheduler) = setup(vec![StrategyConfig {
        strategy: strategy.clone(),
        notifications: Vec::new(),
    }]);

    scheduler.accept(&alarm("s_9_host1", EventStatus::Problem, &strategy), 50);
    let pending = scheduler.pending_requests("s_9_host1");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request, NotifyRequest::placeholder());

    let report = scheduler.tick(50);
    assert_eq!(report.skipped, 1);
    assert!(invoker.calls.lock().is_empty());
}

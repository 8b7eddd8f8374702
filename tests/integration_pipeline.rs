/// Integration tests of the classify, queue and notify pipeline
///
/// Drives the public API the way the service wires it: the classifier
/// pushes onto the priority queue, the dispatcher hands deliveries to the
/// notification scheduler.
use async_trait::async_trait;
use chrono::Local;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tocsin::config::AlarmConfig;
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
        Ok(Vec::new())
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn disk_strategy() -> StrategyConfig {
    StrategyConfig {
        strategy: Strategy::new(7, 1).with_note("{{endpoint}} disk at {{left_value}}%"),
        notifications: vec![NotifyRequest {
            step: 600,
            recipients: Recipients {
                mail: vec!["ops@example.com".to_string()],
                ..Recipients::default()
            },
            template: "disk".to_string(),
            team: "ops".to_string(),
        }],
    }
}

struct Pipeline {
    judge: Judge,
    queue: Arc<PriorityQueue>,
    scheduler: Arc<NotifyScheduler>,
    dispatcher: Dispatcher,
}

fn pipeline() -> Pipeline {
    let mirror = Arc::new(MemoryMirror::new());
    let strategies = Arc::new(StaticStrategies::from_config(&[disk_strategy()], &[], &[]));
    let queue = Arc::new(PriorityQueue::new(
        mirror.clone(),
        "queue/high",
        "queue/low",
        1,
        Duration::from_millis(10),
        Shutdown::new(Duration::from_secs(1)),
    ));
    let judge = Judge::new(
        Arc::new(ProblemMemory::new()),
        AlarmStore::new(mirror.clone(), 3),
        strategies.clone(),
        queue.clone(),
        16,
    );
    let scheduler = Arc::new(NotifyScheduler::new(
        strategies,
        mirror,
        Arc::new(RecordingInvoker::default()),
        "notify",
        Duration::from_secs(5),
        "silence/",
    ));
    let dispatcher = Dispatcher::new();
    dispatcher.register(scheduler.clone());
    Pipeline {
        judge,
        queue,
        scheduler,
        dispatcher,
    }
}

/// Pops everything queued on the high lane and dispatches it.
fn drain(pipeline: &Pipeline) -> usize {
    let mut delivered = 0;
    while let Some(delivery) = pipeline.queue.pop(Lane::High).unwrap() {
        pipeline.dispatcher.deliver(&delivery);
        delivered += 1;
    }
    delivered
}

#[test]
fn test_problem_update_ok_scenario() {
    init_logging();
    let p = pipeline();
    let problem = Event::new("s_7_host1", EventStatus::Problem)
        .with_endpoint("host1")
        .with_value(91.0);

    // First problem alarms and schedules one notification.
    assert_eq!(p.judge.process(&problem, Local::now()), Operation::Alarm);
    assert!(p.judge.memory().is_open("s_7_host1"));
    assert_eq!(drain(&p), 1);
    assert_eq!(p.scheduler.pending("s_7_host1").len(), 1);

    // Repeated problem refreshes the note without queueing.
    let worse = problem.clone().with_value(97.0);
    assert_eq!(p.judge.process(&worse, Local::now()), Operation::Update);
    assert_eq!(drain(&p), 0);
    let stored = p.judge.store().load_event("s_7_host1").unwrap().unwrap();
    assert_eq!(stored.note, "host1 disk at 97%");

    // Resolution alarms once more and purges pending notifications.
    let ok = Event::new("s_7_host1", EventStatus::Ok).with_endpoint("host1");
    assert_eq!(p.judge.process(&ok, Local::now()), Operation::Alarm);
    assert!(!p.judge.memory().is_open("s_7_host1"));
    assert!(p.judge.store().get("s_7_host1").unwrap().is_none());
    assert_eq!(drain(&p), 1);
    assert!(p.scheduler.pending("s_7_host1").is_empty());

    // Resolving again is a no-op.
    assert_eq!(p.judge.process(&ok, Local::now()), Operation::Ignore);
    assert_eq!(drain(&p), 0);
}

#[test]
fn test_memory_matches_durable_index() {
    let p = pipeline();
    for host in ["a", "b", "c", "d"] {
        let event = Event::new(&format!("s_7_{}", host), EventStatus::Problem);
        p.judge.process(&event, Local::now());
    }
    let ok = Event::new("s_7_b", EventStatus::Ok);
    p.judge.process(&ok, Local::now());
    let closed = Event::new("s_7_c", EventStatus::Closed);
    p.judge.process(&closed, Local::now());

    let mut memory = p.judge.memory().ids();
    memory.sort();
    let mut durable = p.judge.store().open_ids().unwrap();
    durable.sort();
    assert_eq!(memory, vec!["s_7_a".to_string(), "s_7_d".to_string()]);
    assert_eq!(memory, durable);
}

/// Tests concurrent ingestion of the same id.
///
/// Many concurrent problems for one id must open it exactly once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_receive_opens_once() {
    let p = pipeline();
    let events = (0..32)
        .map(|i| Event::new("s_7_host1", EventStatus::Problem).with_value(i as f64))
        .collect();

    let mut alarms = 0;
    for handle in p.judge.receive(events) {
        if handle.await.unwrap() == Operation::Alarm {
            alarms += 1;
        }
    }
    assert_eq!(alarms, 1);
    assert_eq!(p.queue.len(Lane::High).unwrap(), 1);
    assert_eq!(p.judge.memory().count(), 1);
}

/// Tests the wired service end to end.
///
/// A problem received by the service must reach the notifier through the
/// queue loops, the dispatcher and the scan loop.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_service_notifies_through_every_loop() {
    init_logging();
    let dir = tempdir().unwrap();
    let mut strategy = disk_strategy();
    strategy.notifications[0].step = 0;

    let mut config = AlarmConfig::default();
    config.judge.dump_path = dir.path().join("problems.json");
    config.queue.poll_interval_ms = 10;
    config.strategies = vec![strategy];

    let invoker = Arc::new(RecordingInvoker::default());
    let service = AlarmService::new(config, Arc::new(MemoryMirror::new()), invoker.clone()).unwrap();
    service.start().unwrap();

    let event = Event::new("s_7_host1", EventStatus::Problem)
        .with_endpoint("host1")
        .with_value(99.0);
    for handle in service.receive(vec![event]) {
        assert_eq!(handle.await.unwrap(), Operation::Alarm);
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while invoker.calls.lock().is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    service.shutdown().await.unwrap();

    let calls = invoker.calls.lock().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][0], "[P1 PROBLEM] host1 disk at 99%");
    assert_eq!(calls[0][6], "ops@example.com");
    assert_eq!(calls[0][12], "s_7_host1");
}

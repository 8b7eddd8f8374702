//! Wiring of the whole pipeline.
//!
//! [`AlarmService`] builds every component from an [`AlarmConfig`], starts
//! the long-running loops and stops them again:
//!
//! ```text
//! receive -> Judge -> PriorityQueue (high/low) -> pop loops -> channel
//!                                                               |
//!                      Dispatcher -> NotifyScheduler -> scan -> Invoker
//! OutdatedSweeper -> receive        GcSweeper -> raw cache
//! ```

use crate::config::AlarmConfig;
use crate::error::{AlarmError, Result};
use crate::event::Event;
use crate::judge::{Judge, Operation, ProblemMemory};
use crate::notify::{Invoker, NotifyScheduler};
use crate::queue::{Delivery, Dispatcher, PriorityQueue};
use crate::shutdown::{Shutdown, TaskSet};
use crate::store::{AlarmStore, Mirror};
use crate::strategy::StaticStrategies;
use crate::sweep::{GcSweeper, OutdatedSweeper};
use log::{error, info};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AlarmService {
    config: AlarmConfig,
    shutdown: Shutdown,
    tasks: TaskSet,
    strategies: Arc<StaticStrategies>,
    judge: Judge,
    queue: Arc<PriorityQueue>,
    dispatcher: Arc<Dispatcher>,
    scheduler: Arc<NotifyScheduler>,
    outdated: Arc<OutdatedSweeper>,
    gc: Arc<GcSweeper>,
    delivery_tx: mpsc::Sender<Delivery>,
    delivery_rx: Mutex<Option<mpsc::Receiver<Delivery>>>,
}

impl AlarmService {
    /// Builds the pipeline and restores Problem Memory.
    ///
    /// # Errors
    /// Returns [`AlarmError::Config`] listing every validation failure.
    pub fn new(
        config: AlarmConfig,
        mirror: Arc<dyn Mirror>,
        invoker: Arc<dyn Invoker>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|errors| AlarmError::Config(errors.join("; ")))?;

        let shutdown = Shutdown::new(SHUTDOWN_TIMEOUT);
        let strategies = Arc::new(StaticStrategies::from_config(
            &config.strategies,
            &config.maintenance,
            &config.nodata_keys,
        ));
        let store = AlarmStore::new(mirror.clone(), config.judge.priority_buckets);
        let memory = Arc::new(ProblemMemory::restore(&config.judge.dump_path, &store));

        let queue = Arc::new(PriorityQueue::new(
            mirror.clone(),
            &config.queue.high_key,
            &config.queue.low_key,
            config.judge.high_priority_max,
            config.queue.poll_interval(),
            shutdown.clone(),
        ));
        let judge = Judge::new(
            memory,
            store.clone(),
            strategies.clone(),
            queue.clone(),
            config.judge.lock_stripes,
        );

        let scheduler = Arc::new(NotifyScheduler::new(
            strategies.clone(),
            mirror.clone(),
            invoker,
            &config.notify.executable,
            config.notify.timeout(),
            &config.notify.silence_prefix,
        ));
        let dispatcher = Arc::new(Dispatcher::new());
        dispatcher.register(scheduler.clone());

        let outdated = Arc::new(OutdatedSweeper::new(
            store,
            Arc::new(judge.clone()),
            config.sweep.outdated_threshold(),
        ));
        let gc = Arc::new(GcSweeper::new(
            mirror,
            strategies.clone(),
            config.sweep.gc_interval(),
            config.sweep.gc_expiry(),
            &config.sweep.raw_prefix,
            &[
                config.sweep.alarm_prefix.as_str(),
                config.sweep.nodata_prefix.as_str(),
            ],
        ));

        let (delivery_tx, delivery_rx) = mpsc::channel(config.queue.channel_capacity);
        Ok(Self {
            tasks: TaskSet::new(shutdown.clone()),
            config,
            shutdown,
            strategies,
            judge,
            queue,
            dispatcher,
            scheduler,
            outdated,
            gc,
            delivery_tx,
            delivery_rx: Mutex::new(Some(delivery_rx)),
        })
    }

    /// Spawns every long-running loop.
    ///
    /// # Errors
    /// Fails when the service was already started.
    pub fn start(&self) -> Result<()> {
        let delivery_rx = self
            .delivery_rx
            .lock()
            .take()
            .ok_or_else(|| AlarmError::Config("service already started".to_string()))?;

        for (name, handle) in ["queue-high", "queue-low"]
            .into_iter()
            .zip(self.queue.start(self.delivery_tx.clone()))
        {
            self.tasks.register(name, handle);
        }

        let dispatcher = self.dispatcher.clone();
        let shutdown = self.shutdown.clone();
        self.tasks.register(
            "dispatcher",
            tokio::spawn(async move { dispatcher.run(delivery_rx, shutdown).await }),
        );

        let scheduler = self.scheduler.clone();
        let shutdown = self.shutdown.clone();
        let interval = self.config.notify.scan_interval();
        self.tasks.register(
            "notify-scan",
            tokio::spawn(async move { scheduler.run(interval, shutdown).await }),
        );

        let outdated = self.outdated.clone();
        let shutdown = self.shutdown.clone();
        let interval = self.config.sweep.outdated_interval();
        self.tasks.register(
            "outdated-sweep",
            tokio::spawn(async move { outdated.run(interval, shutdown).await }),
        );

        let gc = self.gc.clone();
        let shutdown = self.shutdown.clone();
        self.tasks
            .register("gc-sweep", tokio::spawn(async move { gc.run(shutdown).await }));

        info!(
            "Alarm service started with {} loops and {} strategies",
            self.tasks.len(),
            self.strategies.len()
        );
        Ok(())
    }

    /// Ingestion entry point for live events.
    pub fn receive(&self, events: Vec<Event>) -> Vec<JoinHandle<Operation>> {
        self.judge.receive(events)
    }

    /// Stops every loop and dumps Problem Memory.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown.request();
        if let Err(errors) = self.tasks.join_all().await {
            error!("Some loops did not stop cleanly: {}", errors.join(", "));
        }
        self.judge.memory().dump(&self.config.judge.dump_path)?;
        info!("Alarm service stopped");
        Ok(())
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &AlarmConfig {
        &self.config
    }

    pub fn judge(&self) -> &Judge {
        &self.judge
    }

    pub fn strategies(&self) -> &Arc<StaticStrategies> {
        &self.strategies
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn scheduler(&self) -> &Arc<NotifyScheduler> {
        &self.scheduler
    }
}

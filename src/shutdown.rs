//! Stop flag shared by every long-running loop.
//!
//! Loops check [`Shutdown::is_requested`] at the top of each iteration and
//! park through [`Shutdown::sleep`], which returns early once a stop is
//! requested. [`TaskSet`] joins the spawned loops with a deadline.

use log::{error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
    notify: Arc<Notify>,
    timeout: Duration,
}

impl Shutdown {
    /// Creates a handle; `timeout` bounds how long [`TaskSet::join_all`]
    /// waits for each loop.
    pub fn new(timeout: Duration) -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
            timeout,
        }
    }

    /// Requests a stop on SIGTERM, SIGINT or SIGQUIT (Ctrl+C elsewhere).
    pub async fn initialize_signal_handlers(&self) -> Result<(), Box<dyn std::error::Error>> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            for (kind, name) in [
                (SignalKind::terminate(), "SIGTERM"),
                (SignalKind::interrupt(), "SIGINT"),
                (SignalKind::quit(), "SIGQUIT"),
            ] {
                let shutdown = self.clone();
                let mut stream = signal(kind)?;
                tokio::spawn(async move {
                    stream.recv().await;
                    info!("Received {}, stopping", name);
                    shutdown.request();
                });
            }
        }

        #[cfg(not(unix))]
        {
            let shutdown = self.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl+C, stopping");
                    shutdown.request();
                }
            });
        }

        info!("Signal handlers initialized");
        Ok(())
    }

    pub fn request(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            info!("Shutdown requested");
            self.notify.notify_waiters();
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Waits until a stop is requested.
    pub async fn wait(&self) {
        while !self.is_requested() {
            let notified = self.notify.notified();
            if self.is_requested() {
                break;
            }
            notified.await;
        }
    }

    /// Sleeps for `duration`, returning early when a stop is requested.
    ///
    /// # Returns
    /// `true` if the full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.wait() => false,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Named handles of the spawned loops.
#[derive(Clone)]
pub struct TaskSet {
    tasks: Arc<Mutex<Vec<(String, JoinHandle<()>)>>>,
    shutdown: Shutdown,
}

impl TaskSet {
    pub fn new(shutdown: Shutdown) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(Vec::new())),
            shutdown,
        }
    }

    pub fn register(&self, name: &str, handle: JoinHandle<()>) {
        self.tasks.lock().push((name.to_string(), handle));
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits for every registered loop, aborting those that overrun the
    /// shutdown timeout.
    ///
    /// # Returns
    /// The names of loops that failed or had to be aborted.
    pub async fn join_all(&self) -> Result<(), Vec<String>> {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        let timeout = self.shutdown.timeout();
        let mut errors = Vec::new();

        for (name, mut handle) in tasks {
            tokio::select! {
                result = &mut handle => {
                    match result {
                        Ok(()) => info!("Loop '{}' stopped", name),
                        Err(e) if e.is_cancelled() => info!("Loop '{}' was cancelled", name),
                        Err(e) => {
                            error!("Loop '{}' failed: {}", name, e);
                            errors.push(format!("{}: {}", name, e));
                        }
                    }
                }
                _ = tokio::time::sleep(timeout) => {
                    warn!("Loop '{}' did not stop within {:?}, aborting", name, timeout);
                    handle.abort();
                    errors.push(format!("{}: timeout", name));
                }
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

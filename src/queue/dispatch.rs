//! Fan-out of transport deliveries to registered consumers.
//!
//! The [`Dispatcher`] drains the bounded delivery channel and hands every
//! [`Delivery`] to each registered [`Consumer`], in registration order.
//!
//! # Example
//! ```rust
//! use std::sync::Arc;
//! use tocsin::queue::{Dispatcher, FnConsumer};
//!
//! let dispatcher = Dispatcher::new();
//! dispatcher.register(Arc::new(FnConsumer::new("printer", Box::new(|delivery: &tocsin::queue::Delivery| {
//!     println!("alarm {}", delivery.event.id());
//! }))));
//! assert_eq!(dispatcher.consumer_ids(), vec!["printer".to_string()]);
//! ```

use super::Delivery;
use crate::shutdown::Shutdown;
use log::{debug, info};
use parking_lot::RwLock;
use std::fmt::{self, Debug};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A downstream consumer of decided alarms.
pub trait Consumer: Send + Sync {
    /// Identifier used in logs.
    fn id(&self) -> &str;

    fn consume(&self, delivery: &Delivery);
}

/// Consumer backed by a callback.
///
/// The callback is wrapped in an [`Arc`] so the consumer can be cloned and
/// shared between tasks.
pub struct FnConsumer {
    pub id: String,
    pub callback: Arc<Box<dyn Fn(&Delivery) + Send + Sync>>,
}

impl FnConsumer {
    pub fn new(id: &str, callback: Box<dyn Fn(&Delivery) + Send + Sync>) -> Self {
        Self {
            id: id.to_string(),
            callback: Arc::new(callback),
        }
    }
}

impl Clone for FnConsumer {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            callback: Arc::clone(&self.callback),
        }
    }
}

impl Debug for FnConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnConsumer").field("id", &self.id).finish()
    }
}

impl Consumer for FnConsumer {
    fn id(&self) -> &str {
        &self.id
    }

    fn consume(&self, delivery: &Delivery) {
        (self.callback)(delivery);
    }
}

#[derive(Default)]
pub struct Dispatcher {
    consumers: RwLock<Vec<Arc<dyn Consumer>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, consumer: Arc<dyn Consumer>) {
        info!("Registered consumer {}", consumer.id());
        self.consumers.write().push(consumer);
    }

    pub fn consumer_ids(&self) -> Vec<String> {
        self.consumers
            .read()
            .iter()
            .map(|consumer| consumer.id().to_string())
            .collect()
    }

    /// Hands one delivery to every consumer.
    pub fn deliver(&self, delivery: &Delivery) {
        let consumers = self.consumers.read().clone();
        for consumer in consumers {
            debug!("Delivering {} to {}", delivery.event.id(), consumer.id());
            consumer.consume(delivery);
        }
    }

    /// Drains `rx` until it closes or a stop is requested.
    ///
    /// Deliveries still buffered in the channel at stop time are abandoned.
    pub async fn run(&self, mut rx: mpsc::Receiver<Delivery>, shutdown: Shutdown) {
        loop {
            if shutdown.is_requested() {
                break;
            }
            tokio::select! {
                received = rx.recv() => match received {
                    Some(delivery) => self.deliver(&delivery),
                    None => break,
                },
                _ = shutdown.wait() => break,
            }
        }
        info!("Dispatcher stopped");
    }
}

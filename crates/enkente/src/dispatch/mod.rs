//! Bounded queue plus a fixed pool of worker tasks.
//!
//! Every producer (the tailer, the ingest endpoint) holds a [`MessageSender`]
//! onto the same queue. Workers race to pop from it, so with more than one
//! worker the handler sees messages in no particular global order. Configure a
//! single worker when strict ordering matters.
//!
//! A full queue blocks producers until a worker frees a slot; nothing is ever
//! dropped. A handler that panics takes only its own worker down: the panic is
//! reported when the pool is shut down and the remaining workers carry on.

mod error;
mod handler;

pub use error::DispatchError;
pub use handler::MessageHandler;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use crate::message::Message;

/// Default number of messages the queue holds before producers block.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default size of the worker pool.
pub const DEFAULT_WORKERS: usize = 4;

type SharedQueue = Arc<Mutex<mpsc::Receiver<Message>>>;

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Queue capacity (`N`).
    pub queue_capacity: usize,
    /// Number of worker tasks (`W`).
    pub workers: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            workers: DEFAULT_WORKERS,
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.queue_capacity == 0 {
            return Err(DispatchError::InvalidConfig(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(DispatchError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Producer handle onto the shared queue.
#[derive(Debug, Clone)]
pub struct MessageSender {
    tx: mpsc::Sender<Message>,
}

impl MessageSender {
    /// Enqueue a message, waiting for a free slot when the queue is full.
    pub async fn submit(&self, message: Message) -> Result<(), DispatchError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| DispatchError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Outcome of draining and joining the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handler invocations that returned.
    pub handled: u64,
    /// Workers that exited normally.
    pub workers_finished: usize,
    /// Workers lost to a panicking handler.
    pub workers_panicked: usize,
}

/// The running pool.
pub struct Dispatcher {
    sender: MessageSender,
    workers: JoinSet<()>,
    handled: Arc<AtomicU64>,
}

impl Dispatcher {
    /// Create the queue and start `config.workers` workers on the current runtime.
    pub fn spawn(
        config: DispatchConfig,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Self, DispatchError> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let queue: SharedQueue = Arc::new(Mutex::new(rx));
        let handled = Arc::new(AtomicU64::new(0));

        let mut workers = JoinSet::new();
        for worker_id in 0..config.workers {
            workers.spawn(run_worker(
                worker_id,
                Arc::clone(&queue),
                Arc::clone(&handler),
                Arc::clone(&handled),
            ));
        }

        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "dispatcher started"
        );

        Ok(Self {
            sender: MessageSender { tx },
            workers,
            handled,
        })
    }

    pub fn sender(&self) -> MessageSender {
        self.sender.clone()
    }

    /// Drop this pool's own sender and wait for the workers.
    ///
    /// Workers keep popping until the queue is empty and every other
    /// [`MessageSender`] has been dropped, so callers must stop their producers
    /// first or this waits forever.
    pub async fn shutdown(self) -> DispatchReport {
        let Self {
            sender,
            mut workers,
            handled,
        } = self;
        drop(sender);

        let mut report = DispatchReport::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(()) => report.workers_finished += 1,
                Err(err) if err.is_panic() => {
                    error!("dispatch worker panicked: {}", err);
                    report.workers_panicked += 1;
                }
                Err(err) => warn!("dispatch worker cancelled: {}", err),
            }
        }
        report.handled = handled.load(Ordering::Relaxed);

        info!(
            handled = report.handled,
            panicked = report.workers_panicked,
            "dispatcher stopped"
        );
        report
    }
}

async fn run_worker(
    worker_id: usize,
    queue: SharedQueue,
    handler: Arc<dyn MessageHandler>,
    handled: Arc<AtomicU64>,
) {
    debug!(worker_id, "worker started");
    loop {
        // The guard is released before the handler runs so other workers can pop.
        let next = queue.lock().await.recv().await;
        let Some(message) = next else {
            break;
        };

        trace!(
            worker_id,
            session_id = %message.session_id,
            sequence = message.sequence,
            "dispatching message"
        );
        handler.handle(worker_id, message).await;
        handled.fetch_add(1, Ordering::Relaxed);
    }
    debug!(worker_id, "worker stopped");
}

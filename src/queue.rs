//! Asynchronous write path.
//!
//! Accepted writes become [`Mutation`]s on a bounded FIFO. A single
//! [`MutationWorker`] applies them to the store in arrival order. Sending
//! waits while the queue is full, so bursts slow the request path down
//! instead of dropping writes.
//!
//! Applying is fire-and-forget: the request already answered 200 when its
//! command was queued, so a failed apply is logged and the worker moves on.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{KeeperError, Result};
use crate::models::{DeleteRequest, Item};
use crate::storage::ServerStore;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Set,
    Update,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Set => write!(f, "set"),
            MutationKind::Update => write!(f, "update"),
            MutationKind::Delete => write!(f, "delete"),
        }
    }
}

/// A write intent together with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set(Item),
    Update(Item),
    Delete(DeleteRequest),
}

impl Command {
    pub fn kind(&self) -> MutationKind {
        match self {
            Command::Set(_) => MutationKind::Set,
            Command::Update(_) => MutationKind::Update,
            Command::Delete(_) => MutationKind::Delete,
        }
    }

    pub fn item_id(&self) -> &str {
        match self {
            Command::Set(item) | Command::Update(item) => &item.id,
            Command::Delete(req) => &req.id,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Command::Set(item) | Command::Update(item) => item.validate(),
            Command::Delete(req) => req.validate(),
        }
    }
}

/// A queued command bound to the identity that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub owner: String,
    pub command: Command,
}

impl Mutation {
    pub fn new(owner: impl Into<String>, command: Command) -> Self {
        Self {
            owner: owner.into(),
            command,
        }
    }

    fn apply(&self, store: &dyn ServerStore) -> Result<()> {
        match &self.command {
            Command::Set(item) | Command::Update(item) => store.put_item(item, &self.owner),
            Command::Delete(req) => store.delete_item(&req.id, &self.owner),
        }
    }
}

/// Producer side of the queue. Cheap to clone, one per request task.
#[derive(Clone)]
pub struct MutationQueue {
    tx: mpsc::Sender<Mutation>,
}

impl MutationQueue {
    /// Creates a queue holding at most `capacity` commands.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Mutation>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Waits for a free slot if the queue is full.
    ///
    /// # Errors
    /// [`KeeperError::QueueClosed`] once the worker stopped accepting.
    pub async fn enqueue(&self, mutation: Mutation) -> Result<()> {
        self.tx
            .send(mutation)
            .await
            .map_err(|_| KeeperError::QueueClosed)
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

/// Counts reported by a worker after it drained.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub applied: u64,
    pub failed: u64,
}

/// The single consumer of the queue.
pub struct MutationWorker {
    rx: mpsc::Receiver<Mutation>,
    store: Arc<dyn ServerStore>,
    report: WorkerReport,
}

impl MutationWorker {
    pub fn new(rx: mpsc::Receiver<Mutation>, store: Arc<dyn ServerStore>) -> Self {
        Self {
            rx,
            store,
            report: WorkerReport::default(),
        }
    }

    /// Creates a queue and starts its worker on the current runtime.
    pub fn spawn(store: Arc<dyn ServerStore>, capacity: usize) -> (MutationQueue, WorkerHandle) {
        let (queue, rx) = MutationQueue::bounded(capacity);
        let handle = MutationWorker::new(rx, store).start();
        (queue, handle)
    }

    pub fn start(self) -> WorkerHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(self.run(stop_rx));
        WorkerHandle {
            stop: Some(stop_tx),
            join,
        }
    }

    async fn run(mut self, mut stop: oneshot::Receiver<()>) -> WorkerReport {
        info!("mutation worker started");
        loop {
            tokio::select! {
                next = self.rx.recv() => match next {
                    Some(mutation) => self.process(mutation),
                    // every producer is gone
                    None => break,
                },
                // An explicit stop and a dropped handle both end intake.
                _ = &mut stop => {
                    self.rx.close();
                    while let Some(mutation) = self.rx.recv().await {
                        self.process(mutation);
                    }
                    break;
                }
            }
        }
        info!(
            applied = self.report.applied,
            failed = self.report.failed,
            "mutation worker drained"
        );
        self.report
    }

    fn process(&mut self, mutation: Mutation) {
        let kind = mutation.command.kind();
        match mutation.apply(self.store.as_ref()) {
            Ok(()) => {
                self.report.applied += 1;
                debug!(owner = %mutation.owner, %kind, id = mutation.command.item_id(), "mutation applied");
            }
            Err(e) => {
                self.report.failed += 1;
                error!(owner = %mutation.owner, %kind, id = mutation.command.item_id(), "mutation failed: {}", e);
            }
        }
    }
}

/// Owner of a running worker.
pub struct WorkerHandle {
    stop: Option<oneshot::Sender<()>>,
    join: JoinHandle<WorkerReport>,
}

impl WorkerHandle {
    /// Stops intake, applies everything still buffered, then joins the task.
    pub async fn shutdown(mut self) -> WorkerReport {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match self.join.await {
            Ok(report) => report,
            Err(e) => {
                error!("mutation worker panicked: {}", e);
                WorkerReport::default()
            }
        }
    }
}

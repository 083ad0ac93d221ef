/// Bounded Worker Pool
///
/// **Core Responsibility:**
/// Run execution requests on a fixed number of tokio tasks fed by a
/// bounded queue. A full queue rejects immediately instead of waiting.
///
/// Run and submit traffic get separate pools so a burst of one cannot
/// starve the other.
use futures_util::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, warn};

type Job = BoxFuture<'static, ()>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("{pool} pool is saturated")]
    Saturated { pool: String },
    #[error("{pool} pool is shut down")]
    Closed { pool: String },
    #[error("job in {pool} pool panicked before producing a result")]
    WorkerLost { pool: String },
}

pub struct WorkerPool {
    name: String,
    sender: mpsc::Sender<Job>,
    workers: usize,
    queue_depth: usize,
}

impl WorkerPool {
    /// Spawn `workers` tasks draining a queue of `queue_depth` slots.
    /// Must be called inside a tokio runtime.
    pub fn new(name: impl Into<String>, workers: usize, queue_depth: usize) -> Self {
        let name = name.into();
        let workers = workers.max(1);
        let queue_depth = queue_depth.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(queue_depth);
        let receiver = Arc::new(Mutex::new(receiver));

        for worker_id in 0..workers {
            let receiver = Arc::clone(&receiver);
            let pool = name.clone();
            tokio::spawn(async move {
                loop {
                    let job = receiver.lock().await.recv().await;
                    let Some(job) = job else { break };
                    if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                        error!(pool = %pool, worker_id, "Job panicked");
                    }
                }
                debug!(pool = %pool, worker_id, "Worker stopped");
            });
        }

        debug!(pool = %name, workers, queue_depth, "Worker pool started");
        Self { name, sender, workers, queue_depth }
    }

    /// Enqueue `job` and wait for its output.
    ///
    /// ## Returns
    /// `PoolError::Saturated` at once when every queue slot is taken.
    pub async fn try_execute<F, T>(&self, job: F) -> Result<T, PoolError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let wrapped: Job = Box::pin(async move {
            let _ = tx.send(job.await);
        });

        self.sender.try_send(wrapped).map_err(|e| match e {
            TrySendError::Full(_) => {
                warn!(pool = %self.name, queue_depth = self.queue_depth, "Rejecting request, queue full");
                PoolError::Saturated { pool: self.name.clone() }
            }
            TrySendError::Closed(_) => PoolError::Closed { pool: self.name.clone() },
        })?;

        rx.await.map_err(|_| PoolError::WorkerLost { pool: self.name.clone() })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Jobs waiting for a worker
    pub fn queued(&self) -> usize {
        self.queue_depth - self.sender.capacity()
    }
}

// Location: src/processing/queue.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::{
    engine::GenerationEngine,
    error::{GenerationError, QueueError},
    types::{Completion, QueueHandle},
};

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// A job in the processing queue
#[derive(Debug)]
struct QueueJob {
    id: u64,
    query: String,
    enqueued_at: Instant,
    response_sender: oneshot::Sender<Result<Completion, QueueError>>,
}

#[derive(Debug, Default)]
struct QueueStats {
    total_jobs: usize,
    completed_jobs: usize,
    failed_jobs: usize,
    total_wait_time: Duration,
    max_wait_time: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueStatsSnapshot {
    pub capacity: usize,
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub average_wait_time: Duration,
    pub max_wait_time: Duration,
}

/// Bounded FIFO queue served by a single worker per engine.
///
/// The worker runs each completion on the blocking pool, so the async
/// runtime never stalls on a forward pass. Must be created inside a tokio
/// runtime.
pub struct GenerationQueue {
    sender: mpsc::Sender<QueueJob>,
    capacity: usize,
    next_job_id: AtomicU64,
    stats: Arc<RwLock<QueueStats>>,
    shutdown_signal: Mutex<Option<oneshot::Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl GenerationQueue {
    pub fn new(engine: Arc<GenerationEngine>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stats = Arc::new(RwLock::new(QueueStats::default()));

        let worker = tokio::spawn(Self::run_worker(engine, receiver, shutdown_rx, stats.clone()));

        Self {
            sender,
            capacity,
            next_job_id: AtomicU64::new(0),
            stats,
            shutdown_signal: Mutex::new(Some(shutdown_tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Submit a query; fails immediately when the queue is full
    pub fn enqueue(&self, query: impl Into<String>) -> Result<QueueHandle, QueueError> {
        let (tx, rx) = oneshot::channel();
        let job_id = self.next_job_id.fetch_add(1, Ordering::Relaxed) + 1;

        let job = QueueJob {
            id: job_id,
            query: query.into(),
            enqueued_at: Instant::now(),
            response_sender: tx,
        };

        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                warn!(capacity = self.capacity, "Generation queue is full");
                QueueError::Full {
                    capacity: self.capacity,
                }
            }
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })?;

        self.stats.write().total_jobs += 1;
        Ok(QueueHandle::new(job_id, rx))
    }

    /// Submit a query and wait for its completion
    pub async fn submit(&self, query: impl Into<String>) -> Result<Completion, QueueError> {
        self.enqueue(query)?.wait().await
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs waiting to be picked up by the worker
    pub fn queue_size(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    pub fn stats(&self) -> QueueStatsSnapshot {
        let stats = self.stats.read();
        let finished = stats.completed_jobs + stats.failed_jobs;

        QueueStatsSnapshot {
            capacity: self.capacity,
            total_jobs: stats.total_jobs,
            completed_jobs: stats.completed_jobs,
            failed_jobs: stats.failed_jobs,
            average_wait_time: if finished > 0 {
                stats.total_wait_time / finished as u32
            } else {
                Duration::default()
            },
            max_wait_time: stats.max_wait_time,
        }
    }

    /// Stop the worker after its current job.
    ///
    /// Jobs still waiting in the queue are dropped and their handles resolve
    /// to [`QueueError::Closed`].
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_signal.lock().take() {
            let _ = tx.send(());
        }

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "Queue worker terminated abnormally");
            }
        }
    }

    async fn run_worker(
        engine: Arc<GenerationEngine>,
        mut receiver: mpsc::Receiver<QueueJob>,
        mut shutdown_rx: oneshot::Receiver<()>,
        stats: Arc<RwLock<QueueStats>>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("Queue worker received shutdown signal");
                    break;
                }
                job = receiver.recv() => match job {
                    Some(job) => Self::process_job(job, engine.clone(), &stats).await,
                    None => break,
                },
            }
        }
    }

    async fn process_job(job: QueueJob, engine: Arc<GenerationEngine>, stats: &RwLock<QueueStats>) {
        let wait_time = job.enqueued_at.elapsed();
        let query = job.query;

        let result = match tokio::task::spawn_blocking(move || engine.complete(&query)).await {
            Ok(result) => result.map_err(QueueError::from),
            Err(e) => {
                error!(job_id = job.id, error = %e, "Generation task failed");
                Err(QueueError::Generation(GenerationError::new(e.to_string())))
            }
        };

        {
            let mut stats = stats.write();
            match &result {
                Ok(_) => stats.completed_jobs += 1,
                Err(_) => stats.failed_jobs += 1,
            }
            stats.total_wait_time += wait_time;
            stats.max_wait_time = stats.max_wait_time.max(wait_time);
        }

        if job.response_sender.send(result).is_err() {
            debug!(job_id = job.id, "Caller dropped queue handle");
        }
    }
}

impl std::fmt::Debug for GenerationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationQueue")
            .field("capacity", &self.capacity)
            .field("queue_size", &self.queue_size())
            .finish()
    }
}

// src/queue.rs
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::QueueError;
use crate::job::Job;
use crate::registry::Registry;

/// Broker transport between submitters and the worker pool.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Enqueues a job immediately into the named queue.
    async fn enqueue(&self, queue: &str, job: Job) -> Result<(), QueueError>;

    /// Holds a job back for `delay` before it becomes poppable.
    async fn enqueue_in(&self, queue: &str, job: Job, delay: Duration) -> Result<(), QueueError>;

    /// Next ready job of the named queue, if any. The job stays in flight
    /// until it is acknowledged.
    async fn pop(&self, queue: &str) -> Result<Option<Job>, QueueError>;

    /// Releases a popped job once its attempt is over.
    async fn ack(&self, queue: &str, job: &Job) -> Result<(), QueueError>;

    /// Puts popped but unacknowledged jobs back at the head of their queue.
    /// Run before any worker polls the queue.
    async fn requeue_unacked(&self, queue: &str) -> Result<usize, QueueError>;

    /// Moves delayed jobs whose time has come onto their queues. Returns how
    /// many were moved.
    async fn promote_due(&self) -> Result<usize, QueueError>;
}

/// The submission side of the worker pool: routes a job to its lineage's
/// queue. Used by the dispatcher, the workers (for retries) and the relay.
#[derive(Clone)]
pub struct Submitter {
    queue: Arc<dyn Queue>,
    registry: Arc<Registry>,
}

impl Submitter {
    pub fn new(queue: Arc<dyn Queue>, registry: Arc<Registry>) -> Self {
        Self { queue, registry }
    }

    pub fn queue(&self) -> &Arc<dyn Queue> {
        &self.queue
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn route(&self, job: &Job) -> Result<String, QueueError> {
        self.registry
            .queue_for(job.lineage())
            .map(str::to_string)
            .ok_or(QueueError::Unrouted(job.lineage()))
    }

    pub async fn submit(&self, job: Job) -> Result<(), QueueError> {
        let queue = self.route(&job)?;
        self.queue.enqueue(&queue, job).await
    }

    pub async fn submit_in(&self, job: Job, delay: Duration) -> Result<(), QueueError> {
        let queue = self.route(&job)?;
        self.queue.enqueue_in(&queue, job, delay).await
    }
}

struct Delayed {
    run_at: Instant,
    seq: u64,
    queue: String,
    job: Job,
}

// Min-heap on (run_at, seq): earliest first, FIFO among equals.
impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.run_at, other.seq).cmp(&(self.run_at, self.seq))
    }
}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Delayed {}

#[derive(Default)]
struct MemoryState {
    ready: HashMap<String, VecDeque<Job>>,
    inflight: HashMap<String, Vec<Job>>,
    delayed: BinaryHeap<Delayed>,
    seq: u64,
}

/// In-process broker. Delays run on the tokio clock, so paused-time tests
/// can step through backoff without waiting.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<MemoryState>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, queue: &str) -> usize {
        self.state.lock().await.ready.get(queue).map_or(0, VecDeque::len)
    }

    /// Popped and not yet acknowledged.
    pub async fn inflight_len(&self, queue: &str) -> usize {
        self.state.lock().await.inflight.get(queue).map_or(0, Vec::len)
    }

    pub async fn delayed_len(&self) -> usize {
        self.state.lock().await.delayed.len()
    }

    /// When the earliest delayed job becomes due.
    pub async fn next_due(&self) -> Option<Instant> {
        self.state.lock().await.delayed.peek().map(|d| d.run_at)
    }

    pub async fn is_idle(&self) -> bool {
        let state = self.state.lock().await;
        state.delayed.is_empty()
            && state.ready.values().all(VecDeque::is_empty)
            && state.inflight.values().all(Vec::is_empty)
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn enqueue(&self, queue: &str, job: Job) -> Result<(), QueueError> {
        debug!(queue, job_id = job.id(), "enqueued");
        self.state
            .lock()
            .await
            .ready
            .entry(queue.to_string())
            .or_default()
            .push_back(job);
        Ok(())
    }

    async fn enqueue_in(&self, queue: &str, job: Job, delay: Duration) -> Result<(), QueueError> {
        debug!(queue, job_id = job.id(), delay_ms = delay.as_millis() as u64, "delayed");
        let mut state = self.state.lock().await;
        state.seq += 1;
        let seq = state.seq;
        state.delayed.push(Delayed {
            run_at: Instant::now() + delay,
            seq,
            queue: queue.to_string(),
            job,
        });
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<Job>, QueueError> {
        let mut state = self.state.lock().await;
        let job = state.ready.get_mut(queue).and_then(VecDeque::pop_front);
        if let Some(job) = &job {
            state
                .inflight
                .entry(queue.to_string())
                .or_default()
                .push(job.clone());
        }
        Ok(job)
    }

    async fn ack(&self, queue: &str, job: &Job) -> Result<(), QueueError> {
        if let Some(inflight) = self.state.lock().await.inflight.get_mut(queue) {
            inflight.retain(|held| held.id() != job.id());
        }
        Ok(())
    }

    async fn requeue_unacked(&self, queue: &str) -> Result<usize, QueueError> {
        let mut state = self.state.lock().await;
        let unacked = state.inflight.remove(queue).unwrap_or_default();
        let count = unacked.len();
        let ready = state.ready.entry(queue.to_string()).or_default();
        for job in unacked.into_iter().rev() {
            ready.push_front(job);
        }
        Ok(count)
    }

    async fn promote_due(&self) -> Result<usize, QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let mut moved = 0;
        while state.delayed.peek().is_some_and(|d| d.run_at <= now) {
            let Some(due) = state.delayed.pop() else {
                break;
            };
            state.ready.entry(due.queue).or_default().push_back(due.job);
            moved += 1;
        }
        Ok(moved)
    }
}

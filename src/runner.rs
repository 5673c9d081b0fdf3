// src/runner.rs
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::error::WorkerError;
use crate::job::Job;
use crate::queue::Submitter;
use crate::retry::Decision;
use crate::store::RecordId;

/// Where a job ended up after one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Succeeded,
    Rejected,
    RetryScheduled { delay: Duration },
    /// Out of retries, or the retry could not be scheduled. `record` is set
    /// when the lineage recorded the job for relay.
    Exhausted { record: Option<RecordId> },
}

/// Runs one attempt of a job and acts on the retry policy's decision.
#[derive(Clone)]
pub struct Worker {
    submitter: Submitter,
}

impl Worker {
    pub fn new(submitter: Submitter) -> Self {
        Self { submitter }
    }

    pub fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    /// Handles a job popped from `queue` and acknowledges it. A job whose
    /// handling failed stays unacknowledged so the broker can hand it out
    /// again after a restart.
    pub async fn process(&self, queue: &str, job: Job) -> Result<Disposition, WorkerError> {
        let result = self.handle(job.clone()).await;
        let acknowledge = match &result {
            Ok(_) => true,
            Err(WorkerError::UnknownLineage(lineage)) => {
                error!(queue, job_id = job.id(), %lineage, "no route for job, dropped");
                true
            }
            Err(err) => {
                error!(queue, job_id = job.id(), error = %err, "job left unacknowledged");
                false
            }
        };
        if !acknowledge {
            return result;
        }
        if let Err(err) = self.submitter.queue().ack(queue, &job).await {
            error!(queue, job_id = job.id(), error = %err, "failed to acknowledge job");
            return Err(err.into());
        }
        result
    }

    pub async fn handle(&self, job: Job) -> Result<Disposition, WorkerError> {
        let route = self
            .submitter
            .registry()
            .route(job.lineage())
            .ok_or(WorkerError::UnknownLineage(job.lineage()))?;

        info!(
            job_id = job.id(),
            lineage = %job.lineage(),
            recipient = job.recipient(),
            attempt = job.attempt_count(),
            "transmitting"
        );
        let outcome = route.transmitter.attempt(&job).await;

        match route.policy.decide(job.attempt_count(), &outcome) {
            Decision::Succeeded => {
                if let Some(hook) = &route.on_success {
                    hook.on_success(&job).await.map_err(WorkerError::SuccessLog)?;
                }
                info!(job_id = job.id(), recipient = job.recipient(), "transmitted");
                Ok(Disposition::Succeeded)
            }
            Decision::Rejected(reason) => {
                warn!(job_id = job.id(), recipient = job.recipient(), %reason, "rejected");
                Ok(Disposition::Rejected)
            }
            Decision::Retry {
                delay,
                next_attempt,
            } => {
                info!(
                    job_id = job.id(),
                    recipient = job.recipient(),
                    next_attempt,
                    delay_secs = delay.as_secs_f64(),
                    "transmission failed, retrying"
                );
                if let Err(err) = self.submitter.submit_in(job.next_attempt(), delay).await {
                    let Some(hook) = &route.on_exhausted else {
                        return Err(err.into());
                    };
                    error!(job_id = job.id(), error = %err, "retry could not be scheduled, recording for relay");
                    let record = hook.on_exhausted(&job).await?;
                    info!(job_id = job.id(), %record, "recorded for relay");
                    return Ok(Disposition::Exhausted {
                        record: Some(record),
                    });
                }
                Ok(Disposition::RetryScheduled { delay })
            }
            Decision::Exhausted => {
                warn!(
                    job_id = job.id(),
                    recipient = job.recipient(),
                    attempts = job.attempt_count() + 1,
                    "retries exhausted"
                );
                let record = match &route.on_exhausted {
                    Some(hook) => Some(hook.on_exhausted(&job).await?),
                    None => None,
                };
                if let Some(record) = &record {
                    info!(job_id = job.id(), %record, "recorded for relay");
                }
                Ok(Disposition::Exhausted { record })
            }
        }
    }
}

/// Worker tasks and the delayed-job promoter, stopped together.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    /// Starts `concurrency` workers per queue, highest priority queue first,
    /// plus one promoter for delayed jobs. Jobs a previous run popped and
    /// never acknowledged go back to their queue first.
    pub async fn start(
        worker: Worker,
        queues: &[QueueConfig],
        poll_interval: Duration,
        promote_interval: Duration,
    ) -> Self {
        let (shutdown, signal) = watch::channel(false);

        let mut ordered: Vec<&QueueConfig> = queues.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

        for queue in &ordered {
            match worker.submitter().queue().requeue_unacked(&queue.name).await {
                Ok(0) => {}
                Ok(moved) => info!(queue = %queue.name, moved, "recovered unacknowledged jobs"),
                Err(err) => {
                    error!(queue = %queue.name, error = %err, "failed to recover unacknowledged jobs")
                }
            }
        }

        let mut handles = Vec::new();
        for queue in ordered {
            info!(queue = %queue.name, concurrency = queue.concurrency, "worker pool started");
            handles.extend(start_worker_pool(
                &worker,
                &queue.name,
                queue.concurrency,
                poll_interval,
                signal.clone(),
            ));
        }
        handles.push(start_delayed_worker_pool(&worker, promote_interval, signal));

        Self { handles, shutdown }
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Stops polling and waits for in-flight attempts to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        join_all(self.handles).await;
        info!("worker pool stopped");
    }
}

pub fn start_worker_pool(
    worker: &Worker,
    queue: &str,
    concurrency: usize,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..concurrency)
        .map(|i| {
            let worker = worker.clone();
            let queue = queue.to_string();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                debug!(queue = %queue, worker = i, "worker started");
                while !*shutdown.borrow() {
                    match worker.submitter().queue().pop(&queue).await {
                        Ok(Some(job)) => {
                            // Failures are logged by `process`.
                            let _ = worker.process(&queue, job).await;
                            continue;
                        }
                        Ok(None) => {}
                        Err(err) => {
                            error!(queue = %queue, error = %err, "failed to pop job");
                        }
                    }

                    tokio::select! {
                        _ = sleep(poll_interval) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            })
        })
        .collect()
}

pub fn start_delayed_worker_pool(
    worker: &Worker,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let queue = Arc::clone(worker.submitter().queue());
    tokio::spawn(async move {
        while !*shutdown.borrow() {
            match queue.promote_due().await {
                Ok(0) => {}
                Ok(moved) => debug!(moved, "promoted delayed jobs"),
                Err(err) => error!(error = %err, "failed to promote delayed jobs"),
            }

            tokio::select! {
                _ = sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{QueueError, StoreError};
    use crate::job::Lineage;
    use crate::queue::{MemoryQueue, Queue};
    use crate::registry::{Registry, Route};
    use crate::retry::RetryPolicy;
    use crate::store::FailureStore;
    use crate::transmit::{Outcome, ScriptedTransmitter};
    use crate::utils::constants::RELAY_QUEUE;

    /// A broker that takes ready jobs but cannot hold delayed ones.
    struct NoDelays(MemoryQueue);

    #[async_trait]
    impl Queue for NoDelays {
        async fn enqueue(&self, queue: &str, job: Job) -> Result<(), QueueError> {
            self.0.enqueue(queue, job).await
        }

        async fn enqueue_in(&self, _: &str, _: Job, _: Duration) -> Result<(), QueueError> {
            Err(redis::RedisError::from((redis::ErrorKind::IoError, "broker down")).into())
        }

        async fn pop(&self, queue: &str) -> Result<Option<Job>, QueueError> {
            self.0.pop(queue).await
        }

        async fn ack(&self, queue: &str, job: &Job) -> Result<(), QueueError> {
            self.0.ack(queue, job).await
        }

        async fn requeue_unacked(&self, queue: &str) -> Result<usize, QueueError> {
            self.0.requeue_unacked(queue).await
        }

        async fn promote_due(&self) -> Result<usize, QueueError> {
            self.0.promote_due().await
        }
    }

    fn relay_worker(
        queue: Arc<dyn Queue>,
        outcome: Outcome,
        max_retries: u32,
        store: Option<&FailureStore>,
    ) -> Worker {
        let policy = RetryPolicy::new(max_retries, Duration::from_secs(5));
        let transmitter = Arc::new(ScriptedTransmitter::new(outcome));
        let mut route = Route::new(RELAY_QUEUE, policy, transmitter);
        if let Some(store) = store {
            route = route.on_exhausted(Arc::new(store.clone()));
        }
        let registry = Registry::new().register(Lineage::Relay, route);
        Worker::new(Submitter::new(queue, Arc::new(registry)))
    }

    fn relay_job() -> Job {
        Job::new(Lineage::Relay, "padme", "naboo", 3, "0110")
    }

    async fn store_in(dir: &Path) -> FailureStore {
        let store = FailureStore::new(dir.join("fails"));
        store.init().await.expect("init store");
        store
    }

    #[tokio::test]
    async fn success_is_acknowledged() {
        let queue = Arc::new(MemoryQueue::new());
        let worker = relay_worker(queue.clone(), Outcome::Success, 5, None);
        worker.submitter().submit(relay_job()).await.expect("submit");

        let job = queue.pop(RELAY_QUEUE).await.expect("pop").expect("job");
        assert_eq!(queue.inflight_len(RELAY_QUEUE).await, 1);
        let disposition = worker.process(RELAY_QUEUE, job).await.expect("process");
        assert_eq!(disposition, Disposition::Succeeded);
        assert!(queue.is_idle().await);
    }

    #[tokio::test]
    async fn unpersistable_exhaustion_is_a_store_error_and_stays_unacknowledged() {
        let tmp = tempfile::tempdir().expect("create tempdir");
        let store = store_in(tmp.path()).await;
        std::fs::remove_dir_all(store.dir()).expect("remove fails dir");

        let queue = Arc::new(MemoryQueue::new());
        let worker = relay_worker(queue.clone(), Outcome::transient("down"), 0, Some(&store));
        worker.submitter().submit(relay_job()).await.expect("submit");
        let job = queue.pop(RELAY_QUEUE).await.expect("pop").expect("job");

        let err = worker.process(RELAY_QUEUE, job.clone()).await.expect_err("persist fails");
        assert!(matches!(err, WorkerError::Store(StoreError::Io(_))));
        assert_eq!(queue.inflight_len(RELAY_QUEUE).await, 1);

        assert_eq!(queue.requeue_unacked(RELAY_QUEUE).await.expect("requeue"), 1);
        assert_eq!(queue.pop(RELAY_QUEUE).await.expect("pop"), Some(job));
    }

    #[tokio::test]
    async fn unschedulable_retry_is_recorded_for_relay() {
        let tmp = tempfile::tempdir().expect("create tempdir");
        let store = store_in(tmp.path()).await;
        let queue = Arc::new(NoDelays(MemoryQueue::new()));
        let worker = relay_worker(queue.clone(), Outcome::transient("down"), 5, Some(&store));
        worker.submitter().submit(relay_job()).await.expect("submit");

        let job = queue.pop(RELAY_QUEUE).await.expect("pop").expect("job");
        let disposition = worker.process(RELAY_QUEUE, job).await.expect("process");

        let Disposition::Exhausted { record: Some(record) } = disposition else {
            panic!("expected a record, got {disposition:?}");
        };
        let stored = store.read(&record).await.expect("read record");
        assert_eq!(stored.recipient, "naboo");
        assert_eq!(stored.sequence_index, 3);
        assert!(queue.0.is_idle().await);
    }

    #[tokio::test]
    async fn unschedulable_retry_without_a_hook_is_a_queue_error() {
        let queue = Arc::new(NoDelays(MemoryQueue::new()));
        let worker = relay_worker(queue.clone(), Outcome::transient("down"), 5, None);
        worker.submitter().submit(relay_job()).await.expect("submit");

        let job = queue.pop(RELAY_QUEUE).await.expect("pop").expect("job");
        let err = worker.process(RELAY_QUEUE, job).await.expect_err("no fallback");
        assert!(matches!(err, WorkerError::Queue(_)));
        assert_eq!(queue.0.inflight_len(RELAY_QUEUE).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pool_start_recovers_unacknowledged_jobs() {
        let queue = Arc::new(MemoryQueue::new());
        let worker = relay_worker(queue.clone(), Outcome::Success, 5, None);
        worker.submitter().submit(relay_job()).await.expect("submit");
        queue.pop(RELAY_QUEUE).await.expect("pop").expect("job");

        let pool = WorkerPool::start(
            worker,
            &[QueueConfig::new(RELAY_QUEUE, 1, 0)],
            Duration::from_millis(100),
            Duration::from_millis(100),
        )
        .await;
        sleep(Duration::from_secs(1)).await;
        pool.shutdown().await;

        assert!(queue.is_idle().await);
    }
}

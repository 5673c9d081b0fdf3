// src/app.rs
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::cron::spawn_relay_schedule;
use crate::dispatcher::Dispatcher;
use crate::job::Lineage;
use crate::queue::{MemoryQueue, Queue, Submitter};
use crate::redis_queue::RedisQueue;
use crate::registry::{Registry, Route};
use crate::relay::RelaySweeper;
use crate::runner::{Worker, WorkerPool};
use crate::store::FailureStore;
use crate::success_log::SuccessLog;
use crate::transmit::{SimulatedTransmitter, TransmissionAttempt};
use crate::utils::constants::{BROADCAST_QUEUE, RELAY_QUEUE};

/// The wired pipeline: broker, lineage routes, store, dispatcher and sweeper.
pub struct Pipeline {
    config: Config,
    store: FailureStore,
    success_log: SuccessLog,
    submitter: Submitter,
    dispatcher: Dispatcher,
    worker: Worker,
    sweeper: Arc<RelaySweeper>,
}

impl Pipeline {
    /// Wires both lineages to simulated transmitters built from the config.
    /// Only broadcasts are subject to blocking.
    pub fn new(config: Config, queue: Arc<dyn Queue>) -> Self {
        let sim = &config.simulation;
        let broadcast = SimulatedTransmitter::new(sim.latency(), sim.success_ratio)
            .with_block_ratio(sim.block_ratio)
            .with_blocked(sim.blocked.iter().cloned());
        let relay = SimulatedTransmitter::new(sim.latency(), sim.success_ratio);
        Self::with_transmitters(config, queue, Arc::new(broadcast), Arc::new(relay))
    }

    pub fn with_transmitters(
        config: Config,
        queue: Arc<dyn Queue>,
        broadcast: Arc<dyn TransmissionAttempt>,
        relay: Arc<dyn TransmissionAttempt>,
    ) -> Self {
        let store = FailureStore::new(&config.storage.fails_dir);
        let success_log = SuccessLog::new(&config.storage.success_dir);
        let policy = config.retry.policy();

        let registry = Registry::new()
            .register(
                Lineage::Broadcast,
                Route::new(BROADCAST_QUEUE, policy, broadcast),
            )
            .register(
                Lineage::Relay,
                Route::new(RELAY_QUEUE, policy, relay)
                    .on_success(Arc::new(success_log.clone()))
                    .on_exhausted(Arc::new(store.clone())),
            );

        let submitter = Submitter::new(queue, Arc::new(registry));
        Self {
            dispatcher: Dispatcher::new(submitter.clone()),
            worker: Worker::new(submitter.clone()),
            sweeper: Arc::new(RelaySweeper::new(store.clone(), submitter.clone())),
            config,
            store,
            success_log,
            submitter,
        }
    }

    /// Redis broker when a URL is configured, in-process otherwise.
    pub async fn connect(config: Config) -> Result<Self> {
        let queue: Arc<dyn Queue> = match config.redis_url() {
            Some(url) => {
                let queue = RedisQueue::connect(&url)
                    .await
                    .with_context(|| format!("failed to connect to broker at {url}"))?;
                info!("using redis broker");
                Arc::new(queue)
            }
            None => {
                info!("no redis url configured, using in-memory broker");
                Arc::new(MemoryQueue::new())
            }
        };
        Ok(Self::new(config, queue))
    }

    /// Creates the storage directories.
    pub async fn init(&self) -> Result<()> {
        self.store
            .init()
            .await
            .with_context(|| format!("failed to prepare {}", self.store.dir().display()))?;
        self.success_log
            .init()
            .await
            .with_context(|| format!("failed to prepare {}", self.success_log.dir().display()))?;
        Ok(())
    }

    /// Starts the worker pool and the relay schedule.
    pub async fn start(&self) -> Result<Running> {
        let period = self.config.relay_period()?;

        for queue in self.submitter.registry().queues() {
            if !self.config.queues.iter().any(|q| q.name == queue) {
                warn!(queue, "no workers configured for routed queue");
            }
        }

        let pool = WorkerPool::start(
            self.worker.clone(),
            &self.config.queues,
            self.config.poll_interval(),
            self.config.promote_interval(),
        )
        .await;
        let schedule = spawn_relay_schedule(self.sweeper.clone(), period, pool.shutdown_signal());
        Ok(Running { pool, schedule })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &FailureStore {
        &self.store
    }

    pub fn success_log(&self) -> &SuccessLog {
        &self.success_log
    }

    pub fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    pub fn sweeper(&self) -> &Arc<RelaySweeper> {
        &self.sweeper
    }
}

/// Background tasks of a started pipeline.
pub struct Running {
    pool: WorkerPool,
    schedule: JoinHandle<()>,
}

impl Running {
    pub async fn shutdown(self) {
        self.pool.shutdown().await;
        if let Err(err) = self.schedule.await {
            warn!(error = %err, "relay schedule ended abnormally");
        }
    }
}

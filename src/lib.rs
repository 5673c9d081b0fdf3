// src/lib.rs
// Transmission job pipeline: fan-out dispatch, retries with linear backoff,
// durable failure records for relayed batches and periodic relay sweeps.

pub mod app;
pub mod config;
pub mod cron;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod logging;
pub mod queue;
pub mod record;
pub mod redis_queue;
pub mod registry;
pub mod relay;
pub mod retry;
pub mod routes;
pub mod runner;
pub mod services;
pub mod store;
pub mod success_log;
pub mod transmit;
pub mod utils;

pub use app::{Pipeline, Running};
pub use config::{Config, QueueConfig};
pub use dispatcher::{BatchReceipt, Dispatcher, Target};
pub use job::{Job, Lineage};
pub use queue::{MemoryQueue, Queue, Submitter};
pub use relay::{RelaySweeper, SweepReport};
pub use retry::{Decision, RetryPolicy};
pub use runner::{Disposition, Worker, WorkerPool};
pub use store::{FailureStore, RecordId};
pub use transmit::{Outcome, TransmissionAttempt};

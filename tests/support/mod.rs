#![allow(dead_code)]

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::time::Instant;

use qrelay::transmit::ScriptedTransmitter;
use qrelay::utils::constants::{BROADCAST_QUEUE, RELAY_QUEUE};
use qrelay::{Config, Disposition, Job, MemoryQueue, Outcome, Pipeline, Queue, TransmissionAttempt};

/// Scripted outcomes plus the virtual time of every attempt.
pub struct Clocked {
    pub script: ScriptedTransmitter,
    attempts: Mutex<Vec<(String, u32, Instant)>>,
}

impl Clocked {
    pub fn new(script: ScriptedTransmitter) -> Arc<Self> {
        Arc::new(Self {
            script,
            attempts: Mutex::new(Vec::new()),
        })
    }

    /// Gaps between consecutive attempts at one recipient.
    pub fn gaps(&self, recipient: &str) -> Vec<Duration> {
        let attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        let times: Vec<Instant> = attempts
            .iter()
            .filter(|(r, _, _)| r == recipient)
            .map(|(_, _, at)| *at)
            .collect();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn attempt_counts(&self, recipient: &str) -> Vec<u32> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(r, _, _)| r == recipient)
            .map(|(_, n, _)| *n)
            .collect()
    }
}

#[async_trait]
impl TransmissionAttempt for Clocked {
    async fn attempt(&self, job: &Job) -> Outcome {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((job.recipient().to_string(), job.attempt_count(), Instant::now()));
        self.script.attempt(job).await
    }
}

pub struct Harness {
    pub queue: Arc<MemoryQueue>,
    pub pipeline: Pipeline,
    pub broadcast: Arc<Clocked>,
    pub relay: Arc<Clocked>,
    pub tmp: TempDir,
}

impl Harness {
    pub async fn new(broadcast: ScriptedTransmitter, relay: ScriptedTransmitter) -> Self {
        let tmp = tempfile::tempdir().expect("create tempdir");
        let mut config = Config::default();
        config.storage.fails_dir = tmp.path().join("fails");
        config.storage.success_dir = tmp.path().join("success");

        let queue = Arc::new(MemoryQueue::new());
        let broadcast = Clocked::new(broadcast);
        let relay = Clocked::new(relay);
        let pipeline = Pipeline::with_transmitters(
            config,
            queue.clone(),
            broadcast.clone(),
            relay.clone(),
        );
        pipeline.init().await.expect("init pipeline");

        Self {
            queue,
            pipeline,
            broadcast,
            relay,
            tmp,
        }
    }

    /// Runs jobs until nothing is ready or delayed, sleeping on the virtual
    /// clock until the next delayed job is due.
    pub async fn drain(&self) -> Vec<Disposition> {
        let mut dispositions = Vec::new();
        loop {
            self.queue.promote_due().await.expect("promote");

            let mut progressed = false;
            for name in [RELAY_QUEUE, BROADCAST_QUEUE] {
                while let Some(job) = self.queue.pop(name).await.expect("pop") {
                    let disposition = self
                        .pipeline
                        .worker()
                        .process(name, job)
                        .await
                        .expect("process");
                    dispositions.push(disposition);
                    progressed = true;
                }
            }
            if progressed {
                continue;
            }

            match self.queue.next_due().await {
                Some(due) => tokio::time::sleep_until(due).await,
                None => break,
            }
        }
        dispositions
    }

    pub fn success_lines(&self, batch_name: &str) -> Vec<String> {
        let path = self
            .pipeline
            .success_log()
            .path_for(batch_name)
            .expect("success log path");
        match std::fs::read_to_string(path) {
            Ok(body) => body.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }
}

pub fn failing() -> ScriptedTransmitter {
    ScriptedTransmitter::new(Outcome::transient("link down"))
}

pub fn succeeding() -> ScriptedTransmitter {
    ScriptedTransmitter::new(Outcome::Success)
}

// src/transmit.rs
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::job::Job;

/// Result of a single transmission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Expected and recoverable; the retry policy decides what happens next.
    TransientFailure(String),
    /// Refused by policy (e.g. a blocked recipient). Never retried.
    PermanentReject(String),
}

impl Outcome {
    pub fn transient(reason: impl Into<String>) -> Self {
        Outcome::TransientFailure(reason.into())
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Outcome::PermanentReject(reason.into())
    }
}

/// Sends one unit of content to one recipient.
#[async_trait]
pub trait TransmissionAttempt: Send + Sync {
    async fn attempt(&self, job: &Job) -> Outcome;
}

/// Random outcomes behind a fixed latency.
#[derive(Debug, Clone)]
pub struct SimulatedTransmitter {
    latency: Duration,
    success_ratio: f64,
    block_ratio: f64,
    blocked: HashSet<String>,
}

impl Default for SimulatedTransmitter {
    fn default() -> Self {
        Self {
            latency: Duration::from_secs(2),
            success_ratio: 0.5,
            block_ratio: 0.0,
            blocked: HashSet::new(),
        }
    }
}

impl SimulatedTransmitter {
    pub fn new(latency: Duration, success_ratio: f64) -> Self {
        Self {
            latency,
            success_ratio: success_ratio.clamp(0.0, 1.0),
            ..Self::default()
        }
    }

    /// Chance that any recipient is treated as blocked on a given attempt.
    pub fn with_block_ratio(mut self, ratio: f64) -> Self {
        self.block_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Recipients that are always rejected.
    pub fn with_blocked<I, S>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocked.extend(recipients.into_iter().map(Into::into));
        self
    }

    fn roll(&self, recipient: &str) -> Outcome {
        if self.blocked.contains(recipient) {
            return Outcome::reject(format!("recipient {recipient} is blocked"));
        }

        let mut rng = rand::thread_rng();
        if self.block_ratio > 0.0 && rng.gen_bool(self.block_ratio) {
            return Outcome::reject(format!("this person {recipient} is banned"));
        }
        if rng.gen_bool(self.success_ratio) {
            Outcome::Success
        } else {
            Outcome::transient("transmission fail")
        }
    }
}

#[async_trait]
impl TransmissionAttempt for SimulatedTransmitter {
    async fn attempt(&self, job: &Job) -> Outcome {
        tokio::time::sleep(self.latency).await;
        self.roll(job.recipient())
    }
}

/// Deterministic outcomes per recipient, consumed in order.
///
/// Once a recipient's script runs out, the fallback outcome is returned.
#[derive(Debug)]
pub struct ScriptedTransmitter {
    scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
    attempts: Mutex<HashMap<String, usize>>,
    fallback: Outcome,
}

impl Default for ScriptedTransmitter {
    fn default() -> Self {
        Self::new(Outcome::Success)
    }
}

impl ScriptedTransmitter {
    pub fn new(fallback: Outcome) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
            fallback,
        }
    }

    pub fn script<I>(self, recipient: impl Into<String>, outcomes: I) -> Self
    where
        I: IntoIterator<Item = Outcome>,
    {
        self.push(recipient, outcomes);
        self
    }

    /// Appends outcomes to a recipient's script.
    pub fn push<I>(&self, recipient: impl Into<String>, outcomes: I)
    where
        I: IntoIterator<Item = Outcome>,
    {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(recipient.into())
            .or_default()
            .extend(outcomes);
    }

    /// Attempts made so far for a recipient.
    pub fn attempts(&self, recipient: &str) -> usize {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(recipient)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_attempts(&self) -> usize {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }
}

#[async_trait]
impl TransmissionAttempt for ScriptedTransmitter {
    async fn attempt(&self, job: &Job) -> Outcome {
        *self
            .attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(job.recipient().to_string())
            .or_default() += 1;

        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(job.recipient())
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.fallback.clone())
    }
}

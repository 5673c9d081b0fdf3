// src/job.rs
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::ids;

/// The job types the worker pool knows how to run.
///
/// Each lineage gets its own route in the [`crate::registry::Registry`]:
/// queue, retry policy, transmitter and hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lineage {
    /// One message fanned out to many recipients. Subject to the block
    /// policy; exhausted jobs are dropped.
    Broadcast,
    /// Indexed chunks for one recipient. Successes are logged per batch and
    /// exhausted jobs are recorded for the relay sweep.
    Relay,
}

impl Lineage {
    pub const ALL: [Lineage; 2] = [Lineage::Broadcast, Lineage::Relay];

    /// Whether exhausted jobs of this lineage are recorded for the relay
    /// sweep.
    pub const fn is_relayed(self) -> bool {
        matches!(self, Lineage::Relay)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Lineage::Broadcast => "broadcast",
            Lineage::Relay => "relay",
        }
    }
}

impl fmt::Display for Lineage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One transmission of one payload to one recipient.
///
/// Content fields are fixed at construction; only the attempt counter moves,
/// and only through [`Job::next_attempt`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    id: String,
    lineage: Lineage,
    batch_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sender: Option<String>,
    recipient: String,
    sequence_index: u64,
    payload: String,
    #[serde(default)]
    attempt_count: u32,
}

impl Job {
    pub fn new(
        lineage: Lineage,
        batch_name: impl Into<String>,
        recipient: impl Into<String>,
        sequence_index: u64,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: ids::job_id(),
            lineage,
            batch_name: batch_name.into(),
            sender: None,
            recipient: recipient.into(),
            sequence_index,
            payload: payload.into(),
            attempt_count: 0,
        }
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// The same job, scheduled for its next attempt.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt_count: self.attempt_count + 1,
            ..self.clone()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn lineage(&self) -> Lineage {
        self.lineage
    }

    pub fn batch_name(&self) -> &str {
        &self.batch_name
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn sequence_index(&self) -> u64 {
        self.sequence_index
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Retries already performed for this job.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }
}

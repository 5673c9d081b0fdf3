// src/dispatcher.rs
use serde::Serialize;
use tracing::{error, info};

use crate::job::{Job, Lineage};
use crate::queue::Submitter;
use crate::record::FailureRecord;
use crate::utils::ids;

/// One recipient and what to send them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub recipient: String,
    pub payload: String,
}

impl Target {
    pub fn new(recipient: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReceipt {
    pub batch_name: String,
    pub submitted: usize,
    /// Targets refused, either by the broker or because a relayed job could
    /// not be recorded on exhaustion. Each was logged with its index.
    pub failed: usize,
}

/// Fans a batch out into independent jobs. Does not wait for any of them to
/// run, and does not throttle.
#[derive(Clone)]
pub struct Dispatcher {
    submitter: Submitter,
}

impl Dispatcher {
    pub fn new(submitter: Submitter) -> Self {
        Self { submitter }
    }

    /// Submits one job per target under a fresh batch name. The sequence
    /// index of each job is its target's position.
    pub async fn dispatch<I>(&self, lineage: Lineage, sender: Option<&str>, targets: I) -> BatchReceipt
    where
        I: IntoIterator<Item = Target>,
    {
        let batch_name = ids::transmission_name();
        info!(batch = %batch_name, %lineage, "starting message transmission");

        let mut receipt = BatchReceipt {
            batch_name: batch_name.clone(),
            submitted: 0,
            failed: 0,
        };
        for (index, target) in targets.into_iter().enumerate() {
            let mut job = Job::new(
                lineage,
                batch_name.as_str(),
                target.recipient,
                index as u64,
                target.payload,
            );
            if let Some(sender) = sender {
                job = job.with_sender(sender);
            }

            let recipient = job.recipient().to_string();
            // A relayed job must survive exhaustion as a record.
            if lineage.is_relayed() {
                if let Err(err) = FailureRecord::from_job(&job).validate() {
                    error!(batch = %batch_name, recipient = %recipient, index, error = %err, "target cannot be recorded for relay, refused");
                    receipt.failed += 1;
                    continue;
                }
            }

            match self.submitter.submit(job).await {
                Ok(()) => receipt.submitted += 1,
                Err(err) => {
                    error!(batch = %batch_name, recipient = %recipient, index, error = %err, "failed to submit job");
                    receipt.failed += 1;
                }
            }
        }

        info!(
            batch = %receipt.batch_name,
            submitted = receipt.submitted,
            failed = receipt.failed,
            "batch dispatched"
        );
        receipt
    }

    /// Same payload from one sender to every recipient.
    pub async fn broadcast<S>(&self, sender: &str, recipients: &[S], payload: &str) -> BatchReceipt
    where
        S: AsRef<str>,
    {
        let targets = recipients
            .iter()
            .map(|recipient| Target::new(recipient.as_ref(), payload));
        self.dispatch(Lineage::Broadcast, Some(sender), targets).await
    }

    /// Indexed chunks to a single recipient, relayed on exhaustion.
    pub async fn sequence<S>(&self, recipient: &str, chunks: &[S]) -> BatchReceipt
    where
        S: AsRef<str>,
    {
        let targets = chunks
            .iter()
            .map(|chunk| Target::new(recipient, chunk.as_ref()));
        self.dispatch(Lineage::Relay, None, targets).await
    }
}

// src/relay.rs
// Relay sweep: resubmits recorded failures into the worker pool.
//
// A record is deleted as soon as the broker accepts its job, not when the
// job succeeds. A crash between the two repeats the job on the next sweep,
// so delivery is at-least-once.

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::{StoreError, SweepError};
use crate::queue::Submitter;
use crate::store::{FailureStore, RecordId};

/// A record the sweep left in place, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub record: RecordId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records resubmitted and deleted.
    pub relayed: usize,
    /// Records that could not be parsed. Kept for inspection.
    pub corrupt: Vec<SkippedRecord>,
    /// Records that could not be read, resubmitted or deleted. Kept, or in the
    /// case of a failed delete, possibly relayed twice.
    pub failed: Vec<SkippedRecord>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.corrupt.is_empty() && self.failed.is_empty()
    }
}

pub struct RelaySweeper {
    store: FailureStore,
    submitter: Submitter,
    running: Mutex<()>,
}

impl RelaySweeper {
    pub fn new(store: FailureStore, submitter: Submitter) -> Self {
        Self {
            store,
            submitter,
            running: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &FailureStore {
        &self.store
    }

    /// One pass over the store. Refuses to overlap with a pass already in
    /// progress on this sweeper.
    pub async fn sweep(&self) -> Result<SweepReport, SweepError> {
        let _running = self
            .running
            .try_lock()
            .map_err(|_| SweepError::AlreadyRunning)?;

        info!(dir = %self.store.dir().display(), "starting relay messages");
        let mut report = SweepReport::default();

        for id in self.store.list().await? {
            let record = match self.store.read(&id).await {
                Ok(record) => record,
                Err(StoreError::Corrupt { source, .. }) => {
                    error!(record = %id, error = %source, "corrupt failure record, skipping");
                    report.corrupt.push(SkippedRecord {
                        record: id,
                        reason: source.to_string(),
                    });
                    continue;
                }
                Err(err) => {
                    warn!(record = %id, error = %err, "failure record unreadable, skipping");
                    report.failed.push(SkippedRecord {
                        record: id,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let job = record.into_job();
            let job_id = job.id().to_string();
            if let Err(err) = self.submitter.submit(job).await {
                error!(record = %id, error = %err, "relay resubmission refused, keeping record");
                report.failed.push(SkippedRecord {
                    record: id,
                    reason: err.to_string(),
                });
                continue;
            }

            if let Err(err) = self.store.remove(&id).await {
                error!(record = %id, job_id = %job_id, error = %err, "relayed record could not be deleted");
                report.failed.push(SkippedRecord {
                    record: id,
                    reason: err.to_string(),
                });
                continue;
            }

            info!(record = %id, job_id = %job_id, "record relayed");
            report.relayed += 1;
        }

        info!(
            relayed = report.relayed,
            corrupt = report.corrupt.len(),
            failed = report.failed.len(),
            "relay sweep finished"
        );
        Ok(report)
    }
}

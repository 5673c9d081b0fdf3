// src/error.rs
// Error types for the transmission pipeline.
//
// Transmission outcomes (transient failure, permanent rejection) are not
// errors; they are values of `crate::transmit::Outcome`. The types here
// cover the places where the pipeline itself can break: the durable store,
// the broker and the relay sweep.

use std::io;

use thiserror::Error;

use crate::job::Lineage;

/// A failure record body that cannot be encoded or decoded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Splitting the body on the delimiter did not give four fields.
    #[error("expected 4 fields, found {found}")]
    FieldCount { found: usize },

    /// The sequence index field is not an unsigned integer.
    #[error("invalid sequence index: {0:?}")]
    InvalidSequenceIndex(String),

    /// A required field is empty.
    #[error("field `{0}` is empty")]
    EmptyField(&'static str),

    /// A field contains the delimiter or the record terminator.
    #[error("field `{field}` contains reserved character {ch:?}")]
    ReservedCharacter { field: &'static str, ch: char },

    /// The record file is not valid UTF-8.
    #[error("record is not valid UTF-8")]
    Encoding,
}

/// Errors from the failure record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be read or written (disk full, permission denied).
    #[error("storage failure: {0}")]
    Io(#[from] io::Error),

    /// A freshly generated identifier collided with an existing record.
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// The job cannot be represented in the record format.
    #[error("job cannot be recorded: {0}")]
    InvalidField(RecordError),

    /// A stored record could not be parsed.
    #[error("corrupt record {record}: {source}")]
    Corrupt {
        record: String,
        #[source]
        source: RecordError,
    },
}

/// Errors from the broker.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A queued job id without a stored payload.
    #[error("payload missing for job {0}")]
    MissingPayload(String),

    /// No queue is routed for the lineage.
    #[error("no queue routed for lineage {0}")]
    Unrouted(Lineage),
}

/// Errors from a relay sweep as a whole. Per-record problems are reported in
/// the [`crate::relay::SweepReport`] instead.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("a relay sweep is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised while a worker handles one job.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("no route registered for lineage {0}")]
    UnknownLineage(Lineage),

    #[error(transparent)]
    Queue(#[from] QueueError),

    /// An exhausted job could not be persisted. The job is left
    /// unacknowledged on the broker.
    #[error("failed to persist exhausted job: {0}")]
    Store(#[from] StoreError),

    #[error("failed to append success log: {0}")]
    SuccessLog(#[source] io::Error),
}

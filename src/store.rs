// src/store.rs
// File-backed store of failure records.
//
// One record per file, named `transmission_<timestamp>_<suffix>.log`. Files
// are written as `.<name>.tmp`, synced, then renamed into place, so a listing
// never sees a half-written record. Records are never rewritten; the relay
// sweep deletes them wholesale.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::error::{RecordError, StoreError};
use crate::job::Job;
use crate::record::FailureRecord;
use crate::registry::ExhaustionHook;
use crate::utils::constants::{RECORD_PREFIX, RECORD_SUFFIX};
use crate::utils::ids;

const TMP_SUFFIX: &str = ".tmp";

/// File name of a record inside the store directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn generate() -> Self {
        Self(ids::transmission_name())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Only plain `transmission_*.log` names are records; anything that could
    /// escape the directory is not.
    pub fn parse(name: &str) -> Option<Self> {
        let plain = !name.contains(['/', '\\']) && !name.starts_with('.');
        (plain && name.starts_with(RECORD_PREFIX) && name.ends_with(RECORD_SUFFIX))
            .then(|| Self(name.to_string()))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct FailureStore {
    dir: PathBuf,
}

impl FailureStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the directory and removes temp files left by a crash mid-write.
    pub async fn init(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).await?;

        let mut entries = fs::read_dir(&self.dir).await?;
        let mut cleaned = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') && name.ends_with(TMP_SUFFIX) {
                fs::remove_file(entry.path()).await?;
                cleaned += 1;
            }
        }
        if cleaned > 0 {
            info!(dir = %self.dir.display(), cleaned, "removed partial failure records");
        }
        Ok(())
    }

    /// Writes one new record for `job` and returns its identifier once the
    /// record is synced to disk.
    pub async fn persist(&self, job: &Job) -> Result<RecordId, StoreError> {
        let body = FailureRecord::from_job(job)
            .encode()
            .map_err(StoreError::InvalidField)?;

        let id = RecordId::generate();
        let path = self.dir.join(id.as_str());
        let tmp = self.dir.join(format!(".{id}{TMP_SUFFIX}"));

        if fs::try_exists(&path).await? {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .await?;
        let written = async {
            file.write_all(body.as_bytes()).await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        let placed = match written {
            Ok(()) => fs::rename(&tmp, &path).await,
            Err(err) => Err(err),
        };
        if let Err(err) = placed {
            let _ = fs::remove_file(&tmp).await;
            return Err(err.into());
        }

        debug!(record = %id, job_id = job.id(), "failure record written");
        Ok(id)
    }

    /// Records currently in the store, oldest name first.
    pub async fn list(&self) -> Result<Vec<RecordId>, StoreError> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(id) = entry.file_name().to_str().and_then(RecordId::parse) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub async fn read(&self, id: &RecordId) -> Result<FailureRecord, StoreError> {
        let bytes = fs::read(self.dir.join(id.as_str())).await?;
        let corrupt = |source: RecordError| StoreError::Corrupt {
            record: id.to_string(),
            source,
        };
        let body = String::from_utf8(bytes).map_err(|_| corrupt(RecordError::Encoding))?;
        FailureRecord::decode(&body).map_err(corrupt)
    }

    pub async fn remove(&self, id: &RecordId) -> Result<(), StoreError> {
        fs::remove_file(self.dir.join(id.as_str())).await?;
        Ok(())
    }
}

#[async_trait]
impl ExhaustionHook for FailureStore {
    async fn on_exhausted(&self, job: &Job) -> Result<RecordId, StoreError> {
        self.persist(job).await.map_err(|err| {
            error!(
                job_id = job.id(),
                batch = job.batch_name(),
                recipient = job.recipient(),
                sequence_index = job.sequence_index(),
                payload = job.payload(),
                dir = %self.dir.display(),
                error = %err,
                "exhausted job could not be recorded"
            );
            err
        })
    }
}

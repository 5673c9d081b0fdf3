// src/success_log.rs
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::job::Job;
use crate::record::{FIELD_DELIMITER, RECORD_TERMINATOR};
use crate::registry::SuccessHook;

/// One file per batch, one `recipient-sequence_index-payload` line per
/// confirmed transmission.
#[derive(Debug, Clone)]
pub struct SuccessLog {
    dir: PathBuf,
}

impl SuccessLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn init(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir).await
    }

    pub fn path_for(&self, batch_name: &str) -> io::Result<PathBuf> {
        let plain = !batch_name.is_empty()
            && !batch_name.contains(['/', '\\'])
            && !batch_name.starts_with('.');
        if !plain {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("batch name {batch_name:?} is not a plain file name"),
            ));
        }
        Ok(self.dir.join(batch_name))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn append(&self, job: &Job) -> io::Result<()> {
        let line = format!(
            "{}{d}{}{d}{}{RECORD_TERMINATOR}",
            job.recipient(),
            job.sequence_index(),
            job.payload(),
            d = FIELD_DELIMITER,
        );

        // Single write per line so concurrent appenders don't interleave.
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(job.batch_name())?)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

#[async_trait]
impl SuccessHook for SuccessLog {
    async fn on_success(&self, job: &Job) -> io::Result<()> {
        self.append(job).await
    }
}

use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::error::{StoreError, SweepError};
use crate::record::FailureRecord;
use crate::relay::RelaySweeper;
use crate::store::{FailureStore, RecordId};

/// One record in the failure store, parsed if possible.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FailureEntry {
    Ok {
        record: RecordId,
        failure: FailureRecord,
    },
    Corrupt {
        record: RecordId,
        reason: String,
    },
}

/// Every record in the store, corrupt ones included.
pub async fn inspect(store: &FailureStore) -> Result<Vec<FailureEntry>, StoreError> {
    let mut entries = Vec::new();
    for record in store.list().await? {
        let entry = match store.read(&record).await {
            Ok(failure) => FailureEntry::Ok { record, failure },
            Err(StoreError::Corrupt { source, .. }) => FailureEntry::Corrupt {
                record,
                reason: source.to_string(),
            },
            // Deleted by a concurrent sweep.
            Err(StoreError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        };
        entries.push(entry);
    }
    Ok(entries)
}

pub async fn list_failures(sweeper: web::Data<RelaySweeper>) -> impl Responder {
    match inspect(sweeper.store()).await {
        Ok(failures) => HttpResponse::Ok().json(json!({ "failures": failures })),
        Err(err) => {
            error!(error = %err, "failed to list failure records");
            HttpResponse::InternalServerError().json(json!({ "error": err.to_string() }))
        }
    }
}

pub async fn relay_now(sweeper: web::Data<RelaySweeper>) -> impl Responder {
    match sweeper.sweep().await {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(SweepError::AlreadyRunning) => {
            HttpResponse::Conflict().json(json!({ "error": SweepError::AlreadyRunning.to_string() }))
        }
        Err(err) => {
            error!(error = %err, "relay sweep failed");
            HttpResponse::InternalServerError().json(json!({ "error": err.to_string() }))
        }
    }
}

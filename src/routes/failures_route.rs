use actix_web::web;

use crate::services::failures_service::{list_failures, relay_now};

/// Expects a `web::Data<RelaySweeper>` in the app data.
pub fn qrelay_admin_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("")
            .route("/failures", web::get().to(list_failures))
            .route("/relay", web::post().to(relay_now)),
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{http::StatusCode, test, App};
    use serde_json::Value;

    use super::*;
    use crate::job::{Job, Lineage};
    use crate::queue::{MemoryQueue, Submitter};
    use crate::registry::{Registry, Route};
    use crate::relay::RelaySweeper;
    use crate::retry::RetryPolicy;
    use crate::store::FailureStore;
    use crate::transmit::ScriptedTransmitter;

    fn sweeper(store: FailureStore) -> web::Data<RelaySweeper> {
        let registry = Registry::new().register(
            Lineage::Relay,
            Route::new("relay", RetryPolicy::default(), Arc::new(ScriptedTransmitter::default())),
        );
        let submitter = Submitter::new(Arc::new(MemoryQueue::new()), Arc::new(registry));
        web::Data::new(RelaySweeper::new(store, submitter))
    }

    #[actix_web::test]
    async fn lists_records_with_their_status() {
        let tmp = tempfile::tempdir().expect("create tempdir");
        let store = FailureStore::new(tmp.path());
        store.init().await.expect("init");
        store
            .persist(&Job::new(Lineage::Relay, "batch", "earth", 3, "01"))
            .await
            .expect("persist");
        std::fs::write(tmp.path().join("transmission_broken.log"), "only-three-fields\n")
            .expect("write corrupt record");

        let app = test::init_service(
            App::new()
                .app_data(sweeper(store))
                .configure(qrelay_admin_routes),
        )
        .await;
        let body: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/failures").to_request(),
        )
        .await;

        let failures = body["failures"].as_array().expect("failures array");
        assert_eq!(failures.len(), 2);
        let statuses: Vec<&str> = failures
            .iter()
            .filter_map(|entry| entry["status"].as_str())
            .collect();
        assert!(statuses.contains(&"ok"));
        assert!(statuses.contains(&"corrupt"));
        let ok = failures
            .iter()
            .find(|entry| entry["status"] == "ok")
            .expect("ok entry");
        assert_eq!(ok["failure"]["recipient"], "earth");
        assert_eq!(ok["failure"]["sequence_index"], 3);
    }

    #[actix_web::test]
    async fn relay_returns_the_sweep_report() {
        let tmp = tempfile::tempdir().expect("create tempdir");
        let store = FailureStore::new(tmp.path());
        store.init().await.expect("init");
        store
            .persist(&Job::new(Lineage::Relay, "batch", "earth", 0, "x"))
            .await
            .expect("persist");

        let app = test::init_service(
            App::new()
                .app_data(sweeper(store.clone()))
                .configure(qrelay_admin_routes),
        )
        .await;
        let body: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::post().uri("/relay").to_request(),
        )
        .await;

        assert_eq!(body["relayed"], 1);
        assert!(store.list().await.expect("list").is_empty());
    }

    #[actix_web::test]
    async fn missing_store_is_a_server_error() {
        let tmp = tempfile::tempdir().expect("create tempdir");
        let app = test::init_service(
            App::new()
                .app_data(sweeper(FailureStore::new(tmp.path().join("absent"))))
                .configure(qrelay_admin_routes),
        )
        .await;
        let resp = test::call_service(&app, test::TestRequest::post().uri("/relay").to_request()).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

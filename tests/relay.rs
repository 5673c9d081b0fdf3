mod support;

use qrelay::record::FailureRecord;
use qrelay::{Job, Lineage, Queue};
use support::{succeeding, Harness};

#[tokio::test(start_paused = true)]
async fn sweep_resubmits_identical_fields() {
    let h = Harness::new(succeeding(), succeeding()).await;
    let store = h.pipeline.store();
    let original = Job::new(Lineage::Relay, "transmission_batch.log", "earth", 4, "0110")
        .with_sender("leia");
    let id = store.persist(&original).await.expect("persist");
    assert_eq!(
        store.read(&id).await.expect("read"),
        FailureRecord::from_job(&original)
    );

    let report = h.pipeline.sweeper().sweep().await.expect("sweep");
    assert_eq!(report.relayed, 1);

    let relayed = h.queue.pop("relay").await.expect("pop").expect("job");
    assert_eq!(relayed.lineage(), Lineage::Relay);
    assert_eq!(relayed.batch_name(), original.batch_name());
    assert_eq!(relayed.recipient(), original.recipient());
    assert_eq!(relayed.sequence_index(), original.sequence_index());
    assert_eq!(relayed.payload(), original.payload());
    assert_eq!(relayed.attempt_count(), 0);
    assert_ne!(relayed.id(), original.id());
}

#[tokio::test(start_paused = true)]
async fn second_sweep_relays_nothing() {
    let h = Harness::new(succeeding(), succeeding()).await;
    for index in 0..3 {
        h.pipeline
            .store()
            .persist(&Job::new(Lineage::Relay, "batch", "earth", index, "x"))
            .await
            .expect("persist");
    }

    let first = h.pipeline.sweeper().sweep().await.expect("first sweep");
    let second = h.pipeline.sweeper().sweep().await.expect("second sweep");
    assert_eq!(first.relayed, 3);
    assert_eq!(second.relayed, 0);
    assert_eq!(h.queue.len("relay").await, 3);
}

#[tokio::test(start_paused = true)]
async fn corrupt_record_does_not_block_the_others() {
    let h = Harness::new(succeeding(), succeeding()).await;
    let store = h.pipeline.store();
    let good = store
        .persist(&Job::new(Lineage::Relay, "batch", "earth", 0, "x"))
        .await
        .expect("persist");
    let bad = store.dir().join("transmission_00000000000000000000_broken.log");
    std::fs::write(&bad, "batch-earth-not_a_number-x\n").expect("write corrupt record");

    let report = h.pipeline.sweeper().sweep().await.expect("sweep");
    assert_eq!(report.relayed, 1);
    assert_eq!(report.corrupt.len(), 1);
    assert_eq!(
        report.corrupt[0].record.as_str(),
        "transmission_00000000000000000000_broken.log"
    );

    let remaining = store.list().await.expect("list");
    assert_eq!(remaining.len(), 1);
    assert_ne!(remaining[0], good);
    assert!(bad.exists());

    // Still there on the next pass, still reported.
    let again = h.pipeline.sweeper().sweep().await.expect("sweep");
    assert_eq!((again.relayed, again.corrupt.len()), (0, 1));
}

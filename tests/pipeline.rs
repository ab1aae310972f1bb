//! End-to-end tests driving the full pipeline through the `Platform`
//! composition root: submission, queueing, worker processing, and the Event
//! Bus, all in-process against the filesystem Document Store and the memory
//! Queue (no external services required).

use std::time::Duration;

use docbench::config::Config;
use docbench::document::{ListFilter, ProcessingStage};
use docbench::events::{Filter, Topic};
use docbench::platform::Platform;
use docbench::submission::Input;

async fn build_platform(tmp: &std::path::Path) -> Platform {
    let mut config = Config::default();
    config.store.path = tmp.join("docs");
    Platform::build(config, vec![]).await.expect("platform builds")
}

/// Polls the store until `id` reaches `stage` or the timeout elapses.
async fn wait_for_stage(platform: &Platform, id: &str, stage: ProcessingStage) -> docbench::document::Document {
    for _ in 0..100 {
        if let Some(doc) = platform.get(id).await.unwrap() {
            if doc.stage == stage {
                return doc;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("document {id} did not reach {stage:?} in time");
}

#[tokio::test]
async fn s1_text_upload_completes_through_the_worker_pool() {
    let tmp = tempfile::TempDir::new().unwrap();
    let platform = build_platform(tmp.path()).await;

    let pool = platform.worker_pool.clone();
    let pool_handle = tokio::spawn(pool.run());

    let outcome = platform
        .submission
        .submit(None, "note.txt", Input::Bytes(b"hello from the pipeline".to_vec()), "u1")
        .await
        .unwrap();
    assert!(outcome.queued);

    let doc = wait_for_stage(&platform, &outcome.document_id, ProcessingStage::Completed).await;
    assert_eq!(doc.raw_text.as_deref(), Some("hello from the pipeline"));
    assert!(doc.language.is_none(), "no gateway configured, enrichment should be skipped");

    platform.worker_pool.shutdown();
    pool_handle.await.unwrap();
}

#[tokio::test]
async fn s2_inline_json_completes_synchronously_without_the_worker_pool() {
    let tmp = tempfile::TempDir::new().unwrap();
    let platform = build_platform(tmp.path()).await;

    // Deliberately never start the worker pool: a direct-content submission
    // must not depend on it.
    let outcome = platform
        .submission
        .submit(None, "data.json", Input::Bytes(br#"{"x":1,"y":2}"#.to_vec()), "u1")
        .await
        .unwrap();

    assert!(!outcome.queued);
    let doc = platform.get(&outcome.document_id).await.unwrap().unwrap();
    assert_eq!(doc.stage, ProcessingStage::Completed);
    assert!(doc.formatted_content.unwrap().contains("JSON object with 2 root keys"));
}

#[tokio::test]
async fn job_status_reports_pending_before_a_worker_picks_it_up() {
    let tmp = tempfile::TempDir::new().unwrap();
    let platform = build_platform(tmp.path()).await;

    let outcome = platform
        .submission
        .submit(None, "note.txt", Input::Bytes(b"queued but untouched".to_vec()), "u1")
        .await
        .unwrap();

    let status = platform.job_status(&outcome.document_id).await.unwrap();
    assert_eq!(status.stage, ProcessingStage::Pending);
    assert_eq!(status.queue.pending_len, 1);
}

#[tokio::test]
async fn cancel_is_rejected_once_a_document_is_no_longer_pending() {
    let tmp = tempfile::TempDir::new().unwrap();
    let platform = build_platform(tmp.path()).await;

    let outcome = platform
        .submission
        .submit(None, "data.json", Input::Bytes(br#"{"a":1}"#.to_vec()), "u1")
        .await
        .unwrap();

    // Direct-content documents complete synchronously, so they are never
    // PENDING by the time a caller could try to cancel them.
    let result = platform.cancel(&outcome.document_id, "u1").await;
    assert!(matches!(result, Err(docbench::platform::PlatformError::NotCancellable(_, ProcessingStage::Completed))));
}

#[tokio::test]
async fn cancel_soft_deletes_a_pending_document_and_the_worker_skips_it() {
    let tmp = tempfile::TempDir::new().unwrap();
    let platform = build_platform(tmp.path()).await;

    let outcome = platform
        .submission
        .submit(None, "note.txt", Input::Bytes(b"never gets processed".to_vec()), "u1")
        .await
        .unwrap();

    platform.cancel(&outcome.document_id, "u1").await.unwrap();

    let pool = platform.worker_pool.clone();
    let pool_handle = tokio::spawn(pool.run());

    // Give the worker pool a few idle-poll cycles to reach and discard it.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let doc = platform.get(&outcome.document_id).await.unwrap().unwrap();
    assert!(doc.deleted);
    assert_eq!(doc.stage, ProcessingStage::Pending, "a cancelled job is discarded, not processed");

    platform.worker_pool.shutdown();
    pool_handle.await.unwrap();
}

#[tokio::test]
async fn s3_two_concurrent_workers_process_every_document_exactly_once() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut config = Config::default();
    config.store.path = tmp.path().join("docs");
    config.queue.max_concurrent_workers = 2;
    let platform = Platform::build(config, vec![]).await.unwrap();

    let pool = platform.worker_pool.clone();
    let pool_handle = tokio::spawn(pool.run());

    let mut ids = Vec::new();
    for n in 0..6 {
        let outcome = platform
            .submission
            .submit(None, &format!("note-{n}.txt"), Input::Bytes(format!("document {n}").into_bytes()), "u1")
            .await
            .unwrap();
        ids.push(outcome.document_id);
    }

    for id in &ids {
        wait_for_stage(&platform, id, ProcessingStage::Completed).await;
    }

    let all = platform.list(ListFilter { limit: 0, ..Default::default() }).await.unwrap();
    assert_eq!(all.len(), 6);
    assert!(all.iter().all(|p| p.stage == ProcessingStage::Completed));

    platform.worker_pool.shutdown();
    pool_handle.await.unwrap();
}

#[tokio::test]
async fn s6_progress_events_for_a_document_arrive_in_monotonic_order() {
    let tmp = tempfile::TempDir::new().unwrap();
    let platform = build_platform(tmp.path()).await;

    let outcome = platform
        .submission
        .submit(None, "note.txt", Input::Bytes(b"track my progress".to_vec()), "u1")
        .await
        .unwrap();

    let mut subscription = platform
        .subscribe(Filter {
            topics: Some(vec![Topic::ProcessingProgress, Topic::DocumentUpdated]),
            document_id: Some(outcome.document_id.clone()),
        })
        .await;

    let pool = platform.worker_pool.clone();
    let pool_handle = tokio::spawn(pool.run());

    let mut sequences = Vec::new();
    let mut saw_completion = false;
    let collected = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = subscription.receiver.recv().await {
            sequences.push(event.sequence);
            if event.topic == Topic::DocumentUpdated {
                saw_completion = true;
                break;
            }
        }
    })
    .await;
    assert!(collected.is_ok(), "timed out waiting for the completion event");
    assert!(saw_completion);

    let mut sorted = sequences.clone();
    sorted.sort_unstable();
    assert_eq!(sequences, sorted, "events for one document must arrive in sequence order");

    platform.worker_pool.shutdown();
    pool_handle.await.unwrap();
}

#[tokio::test]
async fn update_bumps_the_version_and_is_visible_to_a_subsequent_get() {
    let tmp = tempfile::TempDir::new().unwrap();
    let platform = build_platform(tmp.path()).await;

    let outcome = platform
        .submission
        .submit(None, "data.json", Input::Bytes(br#"{"a":1}"#.to_vec()), "u1")
        .await
        .unwrap();

    let mut doc = platform.get(&outcome.document_id).await.unwrap().unwrap();
    doc.tags.push("reviewed".to_string());
    let updated = platform.update(doc, "u1", "tagged as reviewed").await.unwrap();
    assert_eq!(updated.version, 2);

    let reloaded = platform.get(&outcome.document_id).await.unwrap().unwrap();
    assert_eq!(reloaded.version, 2);
    assert_eq!(reloaded.tags, vec!["reviewed".to_string()]);
}

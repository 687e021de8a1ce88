//! End-to-end queue scenarios: enqueue through completion, retries,
//! dead-lettering, lease recovery, dedup, and claim races.

mod common;

use common::{artifact, build_queue, hash, request};
use futures::future::join_all;
use server_core::domains::thumbnails::RecordStatus;
use server_core::kernel::jobs::{EnqueueRequest, JobStatus};

#[tokio::test]
async fn happy_path_renders_and_publishes_once() {
    let t = build_queue();

    let outcome = t
        .queue
        .enqueue(request(42, 7, 'a').with_max_attempts(3).with_lock_timeout_minutes(10))
        .await
        .unwrap();
    assert!(outcome.is_created());
    let job = outcome.into_job();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempt_count, 0);

    let claimed = t.queue.dequeue("w1").await.unwrap().unwrap();
    assert_eq!(claimed.id, job.id);
    assert_eq!(claimed.status, JobStatus::Processing);
    assert_eq!(claimed.attempt_count, 1);
    assert_eq!(claimed.claimed_by.as_deref(), Some("w1"));

    let completed = t.queue.mark_completed(claimed.id, artifact()).await.unwrap();
    assert_eq!(completed.status, JobStatus::Completed);
    assert!(completed.completed_at.is_some());
    assert!(completed.claimed_by.is_none());

    let record = t.queue.records().get(7).await.unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Ready);
    assert_eq!(record.file_ref.as_deref(), Some("blob/abc"));
    assert_eq!(record.width, Some(256));
    assert_eq!(record.height, Some(256));
    assert_eq!(record.size_bytes, Some(12345));
    assert!(record.processed_at.is_some());

    // Exactly one thumbnail-status-changed for version 7, from completion.
    assert_eq!(t.notifier.record_events_for_version(7).len(), 1);
}

#[tokio::test]
async fn retry_then_success_counts_both_attempts() {
    let t = build_queue();
    t.queue
        .enqueue(request(1, 1, 'b').with_max_attempts(3))
        .await
        .unwrap();

    let first = t.queue.dequeue("w1").await.unwrap().unwrap();
    let failed = t
        .queue
        .mark_failed(first.id, "render timeout")
        .await
        .unwrap();
    assert_eq!(failed.status, JobStatus::Pending);
    assert_eq!(failed.attempt_count, 1);
    assert_eq!(failed.error_message.as_deref(), Some("render timeout"));

    let second = t.queue.dequeue("w2").await.unwrap().unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.attempt_count, 2);
    assert_eq!(second.claimed_by.as_deref(), Some("w2"));

    let completed = t.queue.mark_completed(second.id, artifact()).await.unwrap();
    assert_eq!(completed.status, JobStatus::Completed);
    assert_eq!(completed.attempt_count, 2);
}

#[tokio::test]
async fn exhausted_attempts_dead_letter_the_job() {
    let t = build_queue();
    t.queue
        .enqueue(request(5, 9, 'd').with_max_attempts(2))
        .await
        .unwrap();

    let first = t.queue.dequeue("w1").await.unwrap().unwrap();
    let after_first = t.queue.mark_failed(first.id, "no frame").await.unwrap();
    assert_eq!(after_first.status, JobStatus::Pending);

    let second = t.queue.dequeue("w1").await.unwrap().unwrap();
    assert_eq!(second.attempt_count, 2);
    let after_second = t.queue.mark_failed(second.id, "no frame").await.unwrap();
    assert_eq!(after_second.status, JobStatus::Dead);
    assert_eq!(after_second.attempt_count, 2);

    let record = t.queue.records().get(9).await.unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("no frame"));

    // Dead is terminal; nothing left to claim.
    assert!(t.queue.dequeue("w2").await.unwrap().is_none());
}

#[tokio::test]
async fn expired_lease_returns_job_to_pending_without_refunding_the_attempt() {
    let t = build_queue();
    let job = t
        .queue
        .enqueue(request(3, 4, 'e'))
        .await
        .unwrap()
        .into_job();

    let claimed = t.queue.dequeue("w1").await.unwrap().unwrap();
    assert_eq!(claimed.attempt_count, 1);

    // Worker w1 vanished; push the claim past its 10 minute lease.
    t.jobs.backdate_claim(job.id, 11);
    assert_eq!(t.queue.sweep_once().await.unwrap(), 1);

    let recovered = t.queue.get(job.id).await.unwrap();
    assert_eq!(recovered.status, JobStatus::Pending);
    assert!(recovered.claimed_by.is_none());
    assert!(recovered.claimed_at.is_none());
    assert_eq!(recovered.attempt_count, 1);

    let reclaimed = t.queue.dequeue("w2").await.unwrap().unwrap();
    assert_eq!(reclaimed.attempt_count, 2);
    assert_eq!(reclaimed.claimed_by.as_deref(), Some("w2"));
}

#[tokio::test]
async fn parallel_enqueues_of_identical_content_collapse_to_one_job() {
    let t = build_queue();

    let results = join_all((0..3).map(|_| {
        let queue = t.queue.clone();
        async move { queue.enqueue(request(10, 20, 'c')).await.unwrap() }
    }))
    .await;

    let created: Vec<_> = results.iter().filter(|o| o.is_created()).collect();
    assert_eq!(created.len(), 1);

    let ids: Vec<_> = results.iter().map(|o| o.job().id).collect();
    assert!(ids.iter().all(|id| *id == ids[0]));

    let with_hash = t
        .jobs
        .jobs()
        .into_iter()
        .filter(|j| j.model_hash == hash('c'))
        .count();
    assert_eq!(with_hash, 1);
}

#[tokio::test]
async fn racing_workers_each_win_at_most_one_job() {
    let t = build_queue();

    for i in 1..=5 {
        let c = char::from_digit(i as u32, 10).unwrap();
        t.queue
            .enqueue(EnqueueRequest::new(100 + i, 200 + i, hash(c)))
            .await
            .unwrap();
    }

    let claims = join_all((0..10).map(|i| {
        let queue = t.queue.clone();
        tokio::spawn(async move { queue.dequeue(&format!("worker-{i}")).await.unwrap() })
    }))
    .await;

    let claimed: Vec<_> = claims
        .into_iter()
        .map(|r| r.unwrap())
        .flatten()
        .collect();
    assert_eq!(claimed.len(), 5);

    let mut ids: Vec<_> = claimed.iter().map(|j| j.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 5);

    for job in &claimed {
        assert_eq!(job.status, JobStatus::Processing);
    }
    assert!(t.queue.dequeue("late-worker").await.unwrap().is_none());
}

//! State machine properties: invariants, idempotence, and boundary
//! behaviors of the queue service.

mod common;

use common::{artifact, build_queue, request};
use server_core::domains::thumbnails::RecordStatus;
use server_core::kernel::jobs::{JobStatus, QueueError, MAX_ERROR_MESSAGE_LEN};

// ============================================================================
// Invariants
// ============================================================================

#[tokio::test]
async fn processing_jobs_always_carry_a_lease() {
    let t = build_queue();
    t.queue.enqueue(request(1, 1, 'a')).await.unwrap();

    let claimed = t.queue.dequeue("w1").await.unwrap().unwrap();
    assert_eq!(claimed.status, JobStatus::Processing);
    assert!(claimed.claimed_by.is_some());
    assert!(claimed.claimed_at.is_some());
    assert!(claimed.attempt_count >= 1);
}

#[tokio::test]
async fn attempt_count_never_exceeds_max_attempts() {
    let t = build_queue();
    let job = t
        .queue
        .enqueue(request(1, 1, 'a').with_max_attempts(3))
        .await
        .unwrap()
        .into_job();

    for _ in 0..3 {
        let claimed = t.queue.dequeue("w1").await.unwrap().unwrap();
        assert!(claimed.attempt_count <= claimed.max_attempts);
        t.queue.mark_failed(claimed.id, "boom").await.unwrap();
    }

    let dead = t.queue.get(job.id).await.unwrap();
    assert_eq!(dead.status, JobStatus::Dead);
    assert_eq!(dead.attempt_count, dead.max_attempts);

    // Extra failure reports cannot push the counter past the budget.
    let still_dead = t.queue.mark_failed(job.id, "again").await.unwrap();
    assert_eq!(still_dead.attempt_count, still_dead.max_attempts);
}

#[tokio::test]
async fn pending_jobs_never_carry_a_lease() {
    let t = build_queue();
    t.queue.enqueue(request(1, 1, 'a')).await.unwrap();

    let claimed = t.queue.dequeue("w1").await.unwrap().unwrap();
    let requeued = t.queue.mark_failed(claimed.id, "boom").await.unwrap();

    assert_eq!(requeued.status, JobStatus::Pending);
    assert!(requeued.claimed_by.is_none());
    assert!(requeued.claimed_at.is_none());
}

#[tokio::test]
async fn ready_records_always_have_artifact_fields() {
    let t = build_queue();
    t.queue.enqueue(request(1, 1, 'a')).await.unwrap();
    let claimed = t.queue.dequeue("w1").await.unwrap().unwrap();
    t.queue.mark_completed(claimed.id, artifact()).await.unwrap();

    for record in t.records.records() {
        if record.status == RecordStatus::Ready {
            assert!(record.file_ref.is_some());
            assert!(record.width.unwrap() > 0);
            assert!(record.height.unwrap() > 0);
            assert!(record.size_bytes.unwrap() > 0);
        }
    }
}

// ============================================================================
// Idempotence
// ============================================================================

#[tokio::test]
async fn double_completion_is_a_noop() {
    let t = build_queue();
    t.queue.enqueue(request(1, 7, 'a')).await.unwrap();
    let claimed = t.queue.dequeue("w1").await.unwrap().unwrap();

    let first = t.queue.mark_completed(claimed.id, artifact()).await.unwrap();
    let second = t.queue.mark_completed(claimed.id, artifact()).await.unwrap();

    assert_eq!(first.status, JobStatus::Completed);
    assert_eq!(second.status, JobStatus::Completed);
    assert_eq!(first.completed_at, second.completed_at);

    // The record event fired once, not twice.
    assert_eq!(t.notifier.record_events_for_version(7).len(), 1);
}

#[tokio::test]
async fn duplicate_enqueue_returns_the_same_job() {
    let t = build_queue();
    let first = t.queue.enqueue(request(1, 1, 'a')).await.unwrap();
    let second = t.queue.enqueue(request(1, 1, 'a')).await.unwrap();

    assert!(first.is_created());
    assert!(!second.is_created());
    assert_eq!(first.job().id, second.job().id);
}

#[tokio::test]
async fn completion_report_for_unclaimed_job_is_ignored() {
    let t = build_queue();
    let job = t.queue.enqueue(request(1, 1, 'a')).await.unwrap().into_job();

    let result = t.queue.mark_completed(job.id, artifact()).await.unwrap();
    assert_eq!(result.status, JobStatus::Pending);

    let record = t.queue.records().get(1).await.unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Pending);
}

#[tokio::test]
async fn failure_report_for_dead_job_is_ignored() {
    let t = build_queue();
    t.queue
        .enqueue(request(1, 1, 'a').with_max_attempts(1))
        .await
        .unwrap();
    let claimed = t.queue.dequeue("w1").await.unwrap().unwrap();
    let dead = t.queue.mark_failed(claimed.id, "first").await.unwrap();
    assert_eq!(dead.status, JobStatus::Dead);

    let still_dead = t.queue.mark_failed(claimed.id, "second").await.unwrap();
    assert_eq!(still_dead.status, JobStatus::Dead);
    assert_eq!(still_dead.error_message.as_deref(), Some("first"));
}

// ============================================================================
// Boundary behaviors
// ============================================================================

#[tokio::test]
async fn single_attempt_budget_dead_letters_on_first_failure() {
    let t = build_queue();
    t.queue
        .enqueue(request(1, 1, 'a').with_max_attempts(1))
        .await
        .unwrap();

    let claimed = t.queue.dequeue("w1").await.unwrap().unwrap();
    let failed = t.queue.mark_failed(claimed.id, "boom").await.unwrap();

    assert_eq!(failed.status, JobStatus::Dead);
    assert_eq!(failed.attempt_count, 1);
    assert_eq!(
        t.queue.records().get(1).await.unwrap().unwrap().status,
        RecordStatus::Failed
    );
}

#[tokio::test]
async fn zero_lock_timeout_still_lets_a_fast_worker_complete() {
    let t = build_queue();
    t.queue
        .enqueue(request(1, 1, 'a').with_lock_timeout_minutes(0))
        .await
        .unwrap();

    // The lease is expired the moment it is taken, but completion checks
    // status, not lease freshness, so the worker still wins if it reports
    // before the sweeper runs.
    let claimed = t.queue.dequeue("w1").await.unwrap().unwrap();
    let completed = t.queue.mark_completed(claimed.id, artifact()).await.unwrap();
    assert_eq!(completed.status, JobStatus::Completed);

    // And the sweep afterwards has nothing to reclaim.
    assert_eq!(t.queue.sweep_once().await.unwrap(), 0);
}

#[tokio::test]
async fn zero_lock_timeout_sweep_requeues_without_touching_the_counter() {
    let t = build_queue();
    t.queue
        .enqueue(request(1, 1, 'a').with_lock_timeout_minutes(0))
        .await
        .unwrap();

    let claimed = t.queue.dequeue("w1").await.unwrap().unwrap();
    assert_eq!(claimed.attempt_count, 1);

    assert_eq!(t.queue.sweep_once().await.unwrap(), 1);
    let recovered = t.queue.get(claimed.id).await.unwrap();
    assert_eq!(recovered.status, JobStatus::Pending);
    assert_eq!(recovered.attempt_count, 1);
}

#[tokio::test]
async fn sweep_dead_letters_an_expired_final_attempt() {
    let t = build_queue();
    t.queue
        .enqueue(
            request(1, 6, 'a')
                .with_max_attempts(1)
                .with_lock_timeout_minutes(0),
        )
        .await
        .unwrap();

    let claimed = t.queue.dequeue("w1").await.unwrap().unwrap();
    assert_eq!(t.queue.sweep_once().await.unwrap(), 1);

    let dead = t.queue.get(claimed.id).await.unwrap();
    assert_eq!(dead.status, JobStatus::Dead);
    assert_eq!(dead.attempt_count, dead.max_attempts);
    assert_eq!(
        t.queue.records().get(6).await.unwrap().unwrap().status,
        RecordStatus::Failed
    );
    assert_eq!(t.notifier.record_events_for_version(6).len(), 1);
}

#[tokio::test]
async fn two_workers_racing_one_job_produce_one_winner() {
    let t = build_queue();
    t.queue.enqueue(request(1, 1, 'a')).await.unwrap();

    let (a, b) = tokio::join!(t.queue.dequeue("w1"), t.queue.dequeue("w2"));
    let a = a.unwrap();
    let b = b.unwrap();

    assert!(a.is_some() != b.is_some());
}

// ============================================================================
// Validation and admin paths
// ============================================================================

#[tokio::test]
async fn malformed_hash_is_rejected_before_storage() {
    let t = build_queue();
    t.queue
        .enqueue(request(1, 1, 'a').with_max_attempts(3).with_lock_timeout_minutes(10))
        .await
        .unwrap();

    let mut bad = request(1, 2, 'b');
    bad.model_hash = "not-a-hash".into();
    assert!(matches!(
        t.queue.enqueue(bad).await,
        Err(QueueError::Validation(_))
    ));
    assert_eq!(t.jobs.jobs().len(), 1);
}

#[tokio::test]
async fn unknown_job_reports_not_found() {
    let t = build_queue();
    assert!(matches!(
        t.queue.mark_completed(999, artifact()).await,
        Err(QueueError::JobNotFound(999))
    ));
    assert!(matches!(
        t.queue.mark_failed(999, "boom").await,
        Err(QueueError::JobNotFound(999))
    ));
    assert!(matches!(
        t.queue.retry(999).await,
        Err(QueueError::JobNotFound(999))
    ));
}

#[tokio::test]
async fn retry_revives_a_dead_job_with_a_fresh_budget() {
    let t = build_queue();
    t.queue
        .enqueue(request(1, 1, 'a').with_max_attempts(1))
        .await
        .unwrap();
    let claimed = t.queue.dequeue("w1").await.unwrap().unwrap();
    t.queue.mark_failed(claimed.id, "boom").await.unwrap();

    let revived = t.queue.retry(claimed.id).await.unwrap();
    assert_eq!(revived.status, JobStatus::Pending);
    assert_eq!(revived.attempt_count, 0);
    assert!(revived.error_message.is_none());
    assert_eq!(revived.max_attempts, 1);

    let reclaimed = t.queue.dequeue("w2").await.unwrap().unwrap();
    assert_eq!(reclaimed.id, claimed.id);
}

#[tokio::test]
async fn retry_refuses_to_duplicate_an_active_hash() {
    let t = build_queue();
    t.queue
        .enqueue(request(1, 1, 'a').with_max_attempts(1))
        .await
        .unwrap();
    let claimed = t.queue.dequeue("w1").await.unwrap().unwrap();
    t.queue.mark_failed(claimed.id, "boom").await.unwrap();

    // Regeneration already produced a fresh in-flight job for the same bytes.
    let fresh = t.queue.enqueue(request(1, 1, 'a')).await.unwrap();
    assert!(fresh.is_created());

    assert!(matches!(
        t.queue.retry(claimed.id).await,
        Err(QueueError::Validation(_))
    ));
}

#[tokio::test]
async fn terminal_jobs_do_not_block_regeneration_enqueues() {
    let t = build_queue();
    t.queue.enqueue(request(1, 1, 'a')).await.unwrap();
    let claimed = t.queue.dequeue("w1").await.unwrap().unwrap();
    t.queue.mark_completed(claimed.id, artifact()).await.unwrap();

    let again = t.queue.enqueue(request(1, 1, 'a')).await.unwrap();
    assert!(again.is_created());
    assert_ne!(again.job().id, claimed.id);
}

#[tokio::test]
async fn cancel_sweeps_every_active_job_for_the_model() {
    let t = build_queue();
    t.queue.enqueue(request(9, 1, 'a')).await.unwrap();
    t.queue.enqueue(request(9, 2, 'b')).await.unwrap();
    t.queue.enqueue(request(8, 3, 'c')).await.unwrap();
    t.queue.dequeue("w1").await.unwrap().unwrap();

    let cancelled = t.queue.cancel_active_for_model(9).await.unwrap();
    assert_eq!(cancelled, 2);

    for job in t.jobs.jobs() {
        if job.model_id == 9 {
            assert_eq!(job.status, JobStatus::Cancelled);
        } else {
            assert_ne!(job.status, JobStatus::Cancelled);
        }
    }

    // Cancelling again finds nothing active.
    assert_eq!(t.queue.cancel_active_for_model(9).await.unwrap(), 0);
}

#[tokio::test]
async fn regenerate_cancels_resets_and_enqueues_fresh() {
    let t = build_queue();
    t.queue.enqueue(request(4, 44, 'a')).await.unwrap();
    let claimed = t.queue.dequeue("w1").await.unwrap().unwrap();
    t.queue.mark_completed(claimed.id, artifact()).await.unwrap();

    let fresh = t.queue.regenerate(4).await.unwrap();
    assert_ne!(fresh.id, claimed.id);
    assert_eq!(fresh.status, JobStatus::Pending);
    assert_eq!(fresh.model_version_id, 44);

    let record = t.queue.records().get(44).await.unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Pending);
    assert!(record.file_ref.is_none());
}

#[tokio::test]
async fn regenerate_unknown_model_is_not_found() {
    let t = build_queue();
    assert!(matches!(
        t.queue.regenerate(123).await,
        Err(QueueError::ModelNotFound(123))
    ));
}

#[tokio::test]
async fn oldest_pending_job_is_claimed_first() {
    let t = build_queue();
    let first = t.queue.enqueue(request(1, 1, 'a')).await.unwrap().into_job();
    let _second = t.queue.enqueue(request(2, 2, 'b')).await.unwrap().into_job();

    let claimed = t.queue.dequeue("w1").await.unwrap().unwrap();
    assert_eq!(claimed.id, first.id);
}

#[tokio::test]
async fn long_error_messages_are_truncated() {
    let t = build_queue();
    t.queue.enqueue(request(1, 1, 'a')).await.unwrap();
    let claimed = t.queue.dequeue("w1").await.unwrap().unwrap();

    let huge = "x".repeat(MAX_ERROR_MESSAGE_LEN * 2);
    let failed = t.queue.mark_failed(claimed.id, &huge).await.unwrap();
    assert_eq!(
        failed.error_message.unwrap().chars().count(),
        MAX_ERROR_MESSAGE_LEN
    );
}

#[tokio::test]
async fn empty_worker_id_is_rejected() {
    let t = build_queue();
    assert!(matches!(
        t.queue.dequeue("  ").await,
        Err(QueueError::Validation(_))
    ));
}

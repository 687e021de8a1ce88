//! Worker runtime tests against mock collaborators.

use std::sync::Arc;

use render_worker::api::ControlPlane;
use render_worker::config::WorkerConfig;
use render_worker::runtime::{PollOutcome, WorkerRuntime};
use render_worker::testing::{claimed_job, MockBlobClient, MockControlPlane, MockRenderer};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

struct TestWorker {
    runtime: WorkerRuntime,
    api: Arc<MockControlPlane>,
    blobs: Arc<MockBlobClient>,
    renderer: Arc<MockRenderer>,
}

fn build_worker() -> TestWorker {
    let api = Arc::new(MockControlPlane::new());
    let blobs = Arc::new(MockBlobClient::new());
    let renderer = Arc::new(MockRenderer::new());

    let runtime = WorkerRuntime::new(
        api.clone(),
        blobs.clone(),
        renderer.clone(),
        WorkerConfig::new("http://localhost:8080"),
    );

    TestWorker {
        runtime,
        api,
        blobs,
        renderer,
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Queue a job whose fingerprint matches the staged source bytes.
fn seed_job(w: &TestWorker, job_id: i64, version_id: i64, source: &[u8]) {
    w.blobs.put_source(version_id, source.to_vec());
    w.api
        .push_job(claimed_job(job_id, 42, version_id, &hex_digest(source)));
}

#[tokio::test]
async fn happy_path_reports_the_rendered_artifact() {
    let w = build_worker();
    seed_job(&w, 7, 9, b"mesh bytes");

    let outcome = w
        .runtime
        .poll_once(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, PollOutcome::Completed(7));

    let completions = w.api.completions();
    assert_eq!(completions.len(), 1);
    let (job_id, artifact) = &completions[0];
    assert_eq!(*job_id, 7);
    assert_eq!(artifact.width, 256);
    assert_eq!(artifact.height, 256);
    assert_eq!(artifact.size_bytes, 128);
    assert!(artifact.file_ref.starts_with("blob/"));

    assert_eq!(w.blobs.uploads().len(), 1);
    assert!(w.api.failures().is_empty());
    assert_eq!(w.renderer.clears(), 1);
}

#[tokio::test]
async fn empty_queue_is_idle() {
    let w = build_worker();
    let outcome = w
        .runtime
        .poll_once(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, PollOutcome::Idle);
    assert_eq!(w.renderer.loads(), 0);
}

#[tokio::test]
async fn render_crash_reports_failure_and_keeps_polling_possible() {
    let w = build_worker();
    seed_job(&w, 7, 9, b"mesh bytes");
    w.renderer.set_fail_render(true);

    let outcome = w
        .runtime
        .poll_once(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, PollOutcome::Failed(7));

    let failures = w.api.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].1.contains("render failed"));

    // Scene still torn down after the crash.
    assert_eq!(w.renderer.clears(), 1);
}

#[tokio::test]
async fn corrupted_source_fails_before_rendering() {
    let w = build_worker();
    w.blobs.put_source(9, b"actual bytes".to_vec());
    // Fingerprint of different bytes.
    w.api
        .push_job(claimed_job(7, 42, 9, &hex_digest(b"expected bytes")));

    let outcome = w
        .runtime
        .poll_once(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, PollOutcome::Failed(7));
    assert!(w.api.failures()[0].1.contains("enqueued for"));
    assert_eq!(w.renderer.loads(), 0);
}

#[tokio::test]
async fn missing_source_fails_the_job() {
    let w = build_worker();
    w.api.push_job(claimed_job(7, 42, 9, &hex_digest(b"x")));

    let outcome = w
        .runtime
        .poll_once(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, PollOutcome::Failed(7));
    assert!(w.api.failures()[0].1.contains("no source stored"));
}

#[tokio::test]
async fn undersized_frame_is_rejected() {
    let w = build_worker();
    seed_job(&w, 7, 9, b"mesh bytes");
    w.renderer.set_frame(vec![0u8; 8]);

    let outcome = w
        .runtime
        .poll_once(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, PollOutcome::Failed(7));
    assert!(w.api.failures()[0].1.contains("too small"));
    assert!(w.blobs.uploads().is_empty());
}

#[tokio::test]
async fn unreachable_control_plane_report_is_swallowed() {
    let w = build_worker();
    seed_job(&w, 7, 9, b"mesh bytes");
    w.api.set_report_errors(true);

    // The render succeeded; the lost report is the queue's problem now and
    // the worker moves on without erroring out.
    let outcome = w
        .runtime
        .poll_once(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, PollOutcome::Completed(7));
    assert!(w.api.completions().is_empty());
}

#[tokio::test]
async fn scene_is_cleared_between_jobs() {
    let w = build_worker();
    seed_job(&w, 1, 10, b"first mesh");
    seed_job(&w, 2, 11, b"second mesh");

    let cancel = CancellationToken::new();
    w.runtime.poll_once(&cancel).await.unwrap();
    w.runtime.poll_once(&cancel).await.unwrap();

    assert_eq!(w.renderer.loads(), 2);
    assert_eq!(w.renderer.clears(), 2);
    // Never more than one model staged at a time; leftovers would render
    // into the next thumbnail.
    assert_eq!(w.renderer.max_staged(), 1);
}

#[tokio::test]
async fn cancellation_stops_work_at_the_next_phase() {
    let w = build_worker();
    seed_job(&w, 7, 9, b"mesh bytes");

    let cancel = CancellationToken::new();
    cancel.cancel();

    // The claim already happened, so the job is reported failed and the
    // queue will retry it elsewhere.
    let outcome = w.runtime.poll_once(&cancel).await.unwrap();
    assert_eq!(outcome, PollOutcome::Failed(7));
    assert!(w.api.failures()[0].1.contains("cancelled"));
    assert_eq!(w.renderer.loads(), 0);
}

#[tokio::test]
async fn sequential_jobs_drain_in_order() {
    let w = build_worker();
    seed_job(&w, 1, 10, b"first mesh");
    seed_job(&w, 2, 11, b"second mesh");

    let cancel = CancellationToken::new();
    assert_eq!(
        w.runtime.poll_once(&cancel).await.unwrap(),
        PollOutcome::Completed(1)
    );
    assert_eq!(
        w.runtime.poll_once(&cancel).await.unwrap(),
        PollOutcome::Completed(2)
    );
    assert_eq!(
        w.runtime.poll_once(&cancel).await.unwrap(),
        PollOutcome::Idle
    );

    let ids: Vec<i64> = w.api.completions().iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn orbit_frames_are_uploaded_alongside_the_still() {
    let api = Arc::new(MockControlPlane::new());
    let blobs = Arc::new(MockBlobClient::new());
    let renderer = Arc::new(MockRenderer::new());

    let mut config = WorkerConfig::new("http://localhost:8080");
    config.orbit_frames = 4;
    let runtime = WorkerRuntime::new(api.clone(), blobs.clone(), renderer.clone(), config);

    blobs.put_source(9, b"mesh bytes".to_vec());
    api.push_job(claimed_job(7, 42, 9, &hex_digest(b"mesh bytes")));

    let outcome = runtime.poll_once(&CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, PollOutcome::Completed(7));

    // Four orbit frames plus the still.
    assert_eq!(blobs.uploads().len(), 5);
    assert_eq!(api.completions().len(), 1);
}

#[tokio::test]
async fn mock_control_plane_hands_jobs_out_once() {
    let api = MockControlPlane::new();
    api.push_job(claimed_job(1, 1, 1, &hex_digest(b"m")));

    assert!(api.dequeue("w1").await.unwrap().is_some());
    assert!(api.dequeue("w1").await.unwrap().is_none());
}

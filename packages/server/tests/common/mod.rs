//! Shared fixtures for queue tests.
//!
//! Everything runs against the in-memory doubles; no database or network.

#![allow(dead_code)]

use std::sync::Arc;

use server_core::domains::thumbnails::{ArtifactMeta, ThumbnailRecordService};
use server_core::kernel::jobs::testing::{
    InMemoryJobStore, InMemoryRecordStore, RecordingNotifier,
};
use server_core::kernel::jobs::{EnqueueRequest, ThumbnailQueue};

pub struct TestQueue {
    pub queue: Arc<ThumbnailQueue>,
    pub jobs: Arc<InMemoryJobStore>,
    pub records: Arc<InMemoryRecordStore>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn build_queue() -> TestQueue {
    let jobs = Arc::new(InMemoryJobStore::new());
    let records = Arc::new(InMemoryRecordStore::new());
    let notifier = Arc::new(RecordingNotifier::new());

    let service = Arc::new(ThumbnailRecordService::new(records.clone()));
    let queue = Arc::new(ThumbnailQueue::new(
        jobs.clone(),
        service,
        notifier.clone(),
    ));

    TestQueue {
        queue,
        jobs,
        records,
        notifier,
    }
}

/// A well-formed hash made of one repeated hex digit.
pub fn hash(c: char) -> String {
    c.to_string().repeat(64)
}

pub fn request(model_id: i64, model_version_id: i64, c: char) -> EnqueueRequest {
    EnqueueRequest::new(model_id, model_version_id, hash(c))
}

pub fn artifact() -> ArtifactMeta {
    ArtifactMeta {
        file_ref: "blob/abc".into(),
        size_bytes: 12345,
        width: 256,
        height: 256,
    }
}

//! Change notifications for thumbnail state.
//!
//! Events are hints, not truth: the record row stays canonical, delivery is
//! best-effort, and receivers must tolerate duplicates and reordering. Each
//! payload carries `timestampMs` so a receiver can discard stale events.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domains::thumbnails::{RecordStatus, ThumbnailRecord};
use crate::kernel::jobs::{JobStatus, ThumbnailJob};
use crate::kernel::stream_hub::StreamHub;

/// Published on job transitions (claimed, re-queued, cancelled, reset).
pub const EVENT_JOB_STATUS_CHANGED: &str = "thumbnail-job-status-changed";
/// Published on record transitions (ready, failed, regeneration reset).
pub const EVENT_THUMBNAIL_STATUS_CHANGED: &str = "thumbnail-status-changed";

pub mod topics {
    /// Status changes for one version's thumbnail.
    pub fn model_version_thumbnail(model_version_id: i64) -> String {
        format!("model_version_thumbnail:{model_version_id}")
    }

    /// The active version of a model changed.
    pub fn model_active_version(model_id: i64) -> String {
        format!("model_active_version:{model_id}")
    }

    /// Broadcast group for list views.
    pub const ALL_MODELS: &str = "all_models";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub model_id: i64,
    pub model_version_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_status: Option<RecordStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Wall-clock milliseconds; receivers may drop events older than the
    /// last one they applied.
    pub timestamp_ms: i64,
}

impl ThumbnailEvent {
    /// Event for a job state transition.
    pub fn job_changed(job: &ThumbnailJob) -> Self {
        Self {
            kind: EVENT_JOB_STATUS_CHANGED.to_string(),
            model_id: job.model_id,
            model_version_id: job.model_version_id,
            job_id: Some(job.id),
            job_status: Some(job.status),
            record_status: None,
            file_ref: None,
            error_message: job.error_message.clone(),
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }

    /// Event for a record state transition.
    pub fn record_changed(record: &ThumbnailRecord) -> Self {
        Self {
            kind: EVENT_THUMBNAIL_STATUS_CHANGED.to_string(),
            model_id: record.model_id,
            model_version_id: record.model_version_id,
            job_id: None,
            job_status: None,
            record_status: Some(record.status),
            file_ref: record.file_ref.clone(),
            error_message: record.error_message.clone(),
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }

    /// Attach the job that drove a record transition.
    pub fn with_job(mut self, job: &ThumbnailJob) -> Self {
        self.job_id = Some(job.id);
        self.job_status = Some(job.status);
        self
    }
}

/// Fan-out seam. Injected into the queue service; swapping in the no-op
/// implementation turns the deployment into poll-only.
#[async_trait]
pub trait ThumbnailNotifier: Send + Sync {
    async fn publish(&self, event: &ThumbnailEvent);
}

/// Pushes events onto the in-process stream hub, where SSE subscribers pick
/// them up.
pub struct StreamHubNotifier {
    hub: StreamHub,
}

impl StreamHubNotifier {
    pub fn new(hub: StreamHub) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl ThumbnailNotifier for StreamHubNotifier {
    async fn publish(&self, event: &ThumbnailEvent) {
        let value = match serde_json::to_value(event) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "failed to serialize thumbnail event");
                return;
            }
        };

        self.hub
            .publish(
                &topics::model_version_thumbnail(event.model_version_id),
                value.clone(),
            )
            .await;
        self.hub
            .publish(&topics::model_active_version(event.model_id), value.clone())
            .await;
        self.hub.publish(topics::ALL_MODELS, value).await;
    }
}

/// Drops every event. Used where clients poll the record endpoints directly.
pub struct NoopNotifier;

#[async_trait]
impl ThumbnailNotifier for NoopNotifier {
    async fn publish(&self, _event: &ThumbnailEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_names() {
        assert_eq!(
            topics::model_version_thumbnail(7),
            "model_version_thumbnail:7"
        );
        assert_eq!(topics::model_active_version(42), "model_active_version:42");
        assert_eq!(topics::ALL_MODELS, "all_models");
    }

    #[test]
    fn event_serializes_camel_case_with_type_tag() {
        let record = ThumbnailRecord {
            model_version_id: 7,
            model_id: 42,
            status: RecordStatus::Ready,
            file_ref: Some("blob/abc".into()),
            width: Some(256),
            height: Some(256),
            size_bytes: Some(12345),
            error_message: None,
            created_at: Utc::now(),
            processed_at: Some(Utc::now()),
        };

        let json = serde_json::to_value(ThumbnailEvent::record_changed(&record)).unwrap();
        assert_eq!(json["type"], "thumbnail-status-changed");
        assert_eq!(json["modelVersionId"], 7);
        assert_eq!(json["recordStatus"], "Ready");
        assert_eq!(json["fileRef"], "blob/abc");
        assert!(json["timestampMs"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn stream_hub_notifier_reaches_all_three_topics() {
        let hub = StreamHub::new();
        let mut version_rx = hub.subscribe(&topics::model_version_thumbnail(7)).await;
        let mut model_rx = hub.subscribe(&topics::model_active_version(42)).await;
        let mut all_rx = hub.subscribe(topics::ALL_MODELS).await;

        let record = ThumbnailRecord {
            model_version_id: 7,
            model_id: 42,
            status: RecordStatus::Processing,
            file_ref: None,
            width: None,
            height: None,
            size_bytes: None,
            error_message: None,
            created_at: Utc::now(),
            processed_at: None,
        };
        let notifier = StreamHubNotifier::new(hub);
        notifier
            .publish(&ThumbnailEvent::record_changed(&record))
            .await;

        assert_eq!(version_rx.recv().await.unwrap()["modelVersionId"], 7);
        assert_eq!(model_rx.recv().await.unwrap()["modelId"], 42);
        assert_eq!(all_rx.recv().await.unwrap()["recordStatus"], "Processing");
    }
}

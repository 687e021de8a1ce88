//! Thumbnail artifact records.
//!
//! The record is the client-facing row for one model version's preview
//! image. It is canonical: notifications accelerate awareness of changes
//! but clients can always poll the record directly.

mod record;
mod service;

pub use record::{ArtifactMeta, RecordStatus, ThumbnailRecord};
pub use service::{PostgresRecordStore, RecordStore, ThumbnailRecordService};

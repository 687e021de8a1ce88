//! Kernel-level infrastructure shared across domains.

pub mod blobs;
pub mod jobs;
pub mod notifications;
pub mod stream_hub;

pub use blobs::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use notifications::{NoopNotifier, StreamHubNotifier, ThumbnailEvent, ThumbnailNotifier};
pub use stream_hub::StreamHub;

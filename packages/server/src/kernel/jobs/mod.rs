//! Thumbnail render job infrastructure.
//!
//! - [`ThumbnailJob`] - job model with its atomic SQL transitions
//! - [`JobStore`] - persistence seam ([`PostgresJobStore`] in production,
//!   an in-memory double under [`testing`])
//! - [`ThumbnailQueue`] - the state machine: enqueue with dedup, claim,
//!   complete, fail with retry or dead-letter, admin reset
//! - [`LeaseSweeper`] - recovers claims whose worker silently disappeared
//!
//! Delivery is at-least-once: completion is idempotent and a re-render of
//! identical content is always acceptable.

mod error;
mod job;
mod queue;
mod store;
mod sweeper;
pub mod testing;

pub use error::QueueError;
pub use job::{
    truncate_error_message, EnqueueRequest, JobStatus, ThumbnailJob, MAX_ERROR_MESSAGE_LEN,
};
pub use queue::{EnqueueOutcome, ThumbnailQueue};
pub use store::{JobStore, PostgresJobStore};
pub use sweeper::LeaseSweeper;

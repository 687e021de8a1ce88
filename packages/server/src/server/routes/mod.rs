pub mod blobs;
pub mod health;
pub mod jobs;
pub mod stream;
pub mod thumbnails;

pub use blobs::{blob_upload_handler, model_source_download_handler, model_source_upload_handler};
pub use health::health_handler;
pub use jobs::{
    cancel_model_jobs_handler, complete_job_handler, dequeue_handler, enqueue_handler,
    fail_job_handler, get_job_handler, list_jobs_handler, retry_job_handler,
};
pub use stream::stream_handler;
pub use thumbnails::{regenerate_handler, thumbnail_file_handler, thumbnail_status_handler};

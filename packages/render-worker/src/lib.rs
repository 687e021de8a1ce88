// Render worker for the asset library's thumbnail pipeline.
//
// A worker polls the queue control plane over HTTP, downloads the source
// model, renders preview frames, uploads the artifact, and reports the
// outcome. Workers never talk to each other; the queue is the only
// synchronization point, so running more of them is the whole scaling
// story.

pub mod api;
pub mod blob;
pub mod config;
pub mod render;
pub mod runtime;
pub mod testing;

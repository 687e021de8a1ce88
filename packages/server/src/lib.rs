// Meshfolio - 3D asset library API
//
// This crate provides the backend for the thumbnail rendering pipeline:
// a durable job queue, per-version thumbnail records, and change
// notifications for connected clients. Render workers poll the HTTP
// control plane exposed under server/.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;

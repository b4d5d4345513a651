//! doc-ingest - Document ingestion with staged transfer to durable blob storage
//!
//! Documents move through a fixed lifecycle:
//! - `Uploaded`: the file is staged on local disk and its metadata recorded
//! - `Transferred`: the staged file was copied to the blob store (local or GCS)
//! - `Processed`: a pluggable processor accepted the transferred document
//!
//! Metadata lives in an embedded redb database; each transition is a
//! compare-and-set on the stored status, so a document is transferred once.

pub mod api;
pub mod blob_store;
pub mod config;
pub mod lifecycle;
pub mod providers;
pub mod staging;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use config::Config;
use lifecycle::LifecycleController;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub lifecycle: LifecycleController,
}

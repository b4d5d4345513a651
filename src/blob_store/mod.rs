mod gcs;
mod local;

pub use gcs::GcsBlobStore;
pub use local::LocalBlobStore;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid object name: {0}")]
    InvalidName(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Durable object storage for transferred documents.
///
/// `put` never overwrites on purpose: callers pass a fresh object name per
/// upload, and the returned URL is what gets recorded on the document.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `object_name` and return its durable URL.
    async fn put(&self, object_name: &str, data: Bytes) -> Result<String, BlobStoreError>;
    async fn get(&self, object_name: &str) -> Result<Bytes, BlobStoreError>;
}

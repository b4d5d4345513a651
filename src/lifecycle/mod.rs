//! Document lifecycle: `Uploaded` -> `Transferred` -> `Processed`.
//!
//! Every transition is a compare-and-set on the metadata store. The controller
//! checks the current status up front to fail fast, but correctness rests on
//! `Database::update_status`: of several callers racing on one document, only
//! the first commit wins and the rest get `InvalidState`.

mod processor;

pub use processor::{DocumentProcessor, NoopProcessor};

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::blob_store::{BlobStore, BlobStoreError};
use crate::providers::{IdGenerator, UuidGenerator};
use crate::storage::models::{
    BlobLocation, DocumentRecord, DocumentStatus, NewDocument, StatusCounts,
};
use crate::storage::{Database, DatabaseError, StoreError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Document {id} is {actual}, expected {expected}")]
    InvalidState {
        id: String,
        expected: DocumentStatus,
        actual: DocumentStatus,
    },
    #[error("Transfer failed: {0}")]
    Transfer(String),
    #[error("Blob {name} of document {id} is missing from the blob store")]
    BlobMissing { id: String, name: String },
    #[error("Processing failed: {0}")]
    Processing(String),
    #[error("Persistence error: {0}")]
    Persistence(#[from] DatabaseError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for LifecycleError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => LifecycleError::NotFound(id),
            StoreError::InvalidState {
                id,
                expected,
                actual,
            } => LifecycleError::InvalidState {
                id,
                expected,
                actual,
            },
            StoreError::InvalidTransition { id, reason } => {
                LifecycleError::Internal(format!("document {id}: {reason}"))
            }
            StoreError::InvalidDocument(reason) => LifecycleError::Internal(reason),
            StoreError::Persistence(e) => LifecycleError::Persistence(e),
        }
    }
}

/// Orchestrates document transitions against the metadata store and the blob
/// store.
pub struct LifecycleController {
    db: Database,
    blob_store: Arc<dyn BlobStore>,
    processor: Arc<dyn DocumentProcessor>,
    ids: Arc<dyn IdGenerator>,
    transfer_timeout: Duration,
}

impl LifecycleController {
    pub fn new(db: Database, blob_store: Arc<dyn BlobStore>, transfer_timeout: Duration) -> Self {
        Self {
            db,
            blob_store,
            processor: Arc::new(NoopProcessor),
            ids: Arc::new(UuidGenerator),
            transfer_timeout,
        }
    }

    pub fn with_processor(mut self, processor: Arc<dyn DocumentProcessor>) -> Self {
        self.processor = processor;
        self
    }

    /// Source of the random prefix of blob object names.
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Record a staged file as a new `Uploaded` document.
    pub fn ingest(&self, new: NewDocument) -> Result<DocumentRecord, LifecycleError> {
        let record = self.db.create_document(new)?;
        tracing::info!(
            document_id = %record.id,
            name = %record.name,
            byte_size = record.byte_size,
            "Document ingested"
        );
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<DocumentRecord, LifecycleError> {
        Ok(self.db.get_document(id)?)
    }

    pub fn list(
        &self,
        status: Option<DocumentStatus>,
    ) -> Result<Vec<DocumentRecord>, LifecycleError> {
        Ok(self.db.list_documents(status)?)
    }

    pub fn status_counts(&self) -> Result<StatusCounts, LifecycleError> {
        Ok(self.db.count_by_status()?)
    }

    /// Upload the staged file to the blob store and mark the document
    /// `Transferred`.
    ///
    /// A failed upload leaves the document `Uploaded`. An upload that succeeds
    /// but loses the status race leaves an orphaned object behind; it is not
    /// deleted.
    pub async fn transfer(&self, id: &str) -> Result<DocumentRecord, LifecycleError> {
        let record = self.db.get_document(id)?;
        ensure_status(&record, DocumentStatus::Uploaded)?;

        let data = read_staged(&record).await?;
        let object_name = format!("{}_{}", self.ids.next_id(), record.name);

        let url = match tokio::time::timeout(
            self.transfer_timeout,
            self.blob_store.put(&object_name, data),
        )
        .await
        {
            Ok(Ok(url)) => url,
            Ok(Err(e)) => {
                tracing::warn!(document_id = %id, error = %e, "Blob upload failed");
                return Err(LifecycleError::Transfer(e.to_string()));
            }
            Err(_) => {
                let timeout_ms = self.transfer_timeout.as_millis() as u64;
                tracing::warn!(document_id = %id, timeout_ms, "Blob upload timed out");
                return Err(LifecycleError::Transfer(format!(
                    "blob upload timed out after {:?}",
                    self.transfer_timeout
                )));
            }
        };

        let location = BlobLocation {
            name: object_name,
            url,
        };
        match self.db.update_status(
            id,
            DocumentStatus::Uploaded,
            DocumentStatus::Transferred,
            Some(location.clone()),
        ) {
            Ok(updated) => {
                tracing::info!(
                    document_id = %id,
                    blob_name = %location.name,
                    blob_url = %location.url,
                    "Document transferred"
                );
                Ok(updated)
            }
            Err(e) => {
                tracing::warn!(
                    document_id = %id,
                    blob_name = %location.name,
                    error = %e,
                    "Status update failed after upload; blob is orphaned"
                );
                Err(e.into())
            }
        }
    }

    /// Run the processor on a transferred document, then mark it `Processed`.
    pub async fn process(&self, id: &str) -> Result<DocumentRecord, LifecycleError> {
        let record = self.db.get_document(id)?;
        ensure_status(&record, DocumentStatus::Transferred)?;

        if let Err(e) = self.processor.process(&record).await {
            tracing::warn!(document_id = %id, error = %e, "Document processing failed");
            return Err(LifecycleError::Processing(e.to_string()));
        }

        let updated = self.db.update_status(
            id,
            DocumentStatus::Transferred,
            DocumentStatus::Processed,
            None,
        )?;
        tracing::info!(document_id = %id, "Document processed");
        Ok(updated)
    }

    /// The document's bytes: the staged file until transfer, the blob after.
    pub async fn content(&self, id: &str) -> Result<(DocumentRecord, Bytes), LifecycleError> {
        let record = self.db.get_document(id)?;

        let data = match record.status {
            DocumentStatus::Uploaded => read_staged(&record).await?,
            DocumentStatus::Transferred | DocumentStatus::Processed => {
                let location = record.blob_location().ok_or_else(|| {
                    LifecycleError::Internal(format!(
                        "document {} is {} without a blob location",
                        record.id, record.status
                    ))
                })?;
                match self.blob_store.get(&location.name).await {
                    Ok(data) => data,
                    Err(BlobStoreError::NotFound(name)) => {
                        tracing::error!(
                            document_id = %record.id,
                            blob_name = %name,
                            "Blob missing for transferred document"
                        );
                        return Err(LifecycleError::BlobMissing {
                            id: record.id.clone(),
                            name,
                        });
                    }
                    Err(e) => return Err(LifecycleError::Transfer(e.to_string())),
                }
            }
        };

        Ok((record, data))
    }
}

fn ensure_status(record: &DocumentRecord, expected: DocumentStatus) -> Result<(), LifecycleError> {
    if record.status == expected {
        Ok(())
    } else {
        Err(LifecycleError::InvalidState {
            id: record.id.clone(),
            expected,
            actual: record.status,
        })
    }
}

async fn read_staged(record: &DocumentRecord) -> Result<Bytes, LifecycleError> {
    match tokio::fs::read(&record.local_path).await {
        Ok(data) => Ok(Bytes::from(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(LifecycleError::Transfer(
            format!("staged file not found: {}", record.local_path),
        )),
        Err(e) => Err(LifecycleError::Transfer(format!(
            "failed to read staged file {}: {e}",
            record.local_path
        ))),
    }
}

use async_trait::async_trait;

use crate::storage::models::DocumentRecord;

/// Work performed on a transferred document before it is marked processed.
///
/// The record passed in is in `Transferred` status and carries its blob
/// location. Returning an error leaves the document in `Transferred`, so the
/// process call can be repeated.
#[async_trait]
pub trait DocumentProcessor: Send + Sync {
    async fn process(&self, document: &DocumentRecord) -> Result<(), anyhow::Error>;
}

/// Processor that accepts every document without doing anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProcessor;

#[async_trait]
impl DocumentProcessor for NoopProcessor {
    async fn process(&self, _document: &DocumentRecord) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

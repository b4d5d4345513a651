use redb::ReadableTable;

use super::db::{Database, StoreError};
use super::models::{BlobLocation, DocumentRecord, DocumentStatus, NewDocument, StatusCounts};
use super::tables::*;

impl Database {
    // ========================================================================
    // Document operations
    // ========================================================================

    /// Insert a new record in `Uploaded` status. Either the whole record is
    /// committed or nothing is.
    pub fn create_document(&self, new: NewDocument) -> Result<DocumentRecord, StoreError> {
        if new.local_path.is_empty() {
            return Err(StoreError::InvalidDocument(format!(
                "{} has no staged file path",
                new.name
            )));
        }

        let now = self.clock.now();
        let record = DocumentRecord {
            id: self.ids.next_id(),
            name: new.name,
            author: new.author,
            type_file: new.type_file,
            byte_size: new.byte_size,
            created_at: now,
            modified_at: now,
            status: DocumentStatus::Uploaded,
            local_path: new.local_path,
            blob_url: None,
            blob_name: None,
        };

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(DOCUMENTS)?;
            let data = rmp_serde::to_vec_named(&record)?;
            table.insert(record.id.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(record)
    }

    /// Get a document by its id
    pub fn get_document(&self, id: &str) -> Result<DocumentRecord, StoreError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(DOCUMENTS)?;

        match table.get(id)? {
            Some(data) => Ok(rmp_serde::from_slice(data.value())?),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    /// Advance a document from `expected` to `new` status.
    ///
    /// The read, the comparison and the write share one write transaction, so
    /// two callers expecting the same status cannot both succeed: the second
    /// one observes the first one's commit and gets `InvalidState`. On any
    /// failure the transaction is aborted and the record is left untouched.
    pub fn update_status(
        &self,
        id: &str,
        expected: DocumentStatus,
        new: DocumentStatus,
        blob: Option<BlobLocation>,
    ) -> Result<DocumentRecord, StoreError> {
        if !expected.can_advance_to(new) {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                reason: format!("{expected} cannot advance to {new}"),
            });
        }

        let write_txn = self.begin_write()?;

        let existing: Option<DocumentRecord> = {
            let table = write_txn.open_table(DOCUMENTS)?;
            let result = match table.get(id)? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };
            result
        };

        let mut record = match existing {
            Some(record) => record,
            None => {
                write_txn.abort()?;
                return Err(StoreError::NotFound(id.to_string()));
            }
        };

        if record.status != expected {
            write_txn.abort()?;
            return Err(StoreError::InvalidState {
                id: id.to_string(),
                expected,
                actual: record.status,
            });
        }

        if let Some(location) = blob {
            if new != DocumentStatus::Transferred {
                write_txn.abort()?;
                return Err(StoreError::InvalidTransition {
                    id: id.to_string(),
                    reason: format!("a blob location cannot be set when moving to {new}"),
                });
            }
            record.blob_name = Some(location.name);
            record.blob_url = Some(location.url);
        }

        if new.requires_blob() && record.blob_url.is_none() {
            write_txn.abort()?;
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                reason: format!("{new} requires a blob location"),
            });
        }

        record.status = new;
        record.modified_at = self.clock.now();

        {
            let serialized = rmp_serde::to_vec_named(&record)?;
            let mut table = write_txn.open_table(DOCUMENTS)?;
            table.insert(id, serialized.as_slice())?;
        }
        write_txn.commit()?;
        Ok(record)
    }

    /// List documents, oldest first, optionally restricted to one status
    pub fn list_documents(
        &self,
        status: Option<DocumentStatus>,
    ) -> Result<Vec<DocumentRecord>, StoreError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(DOCUMENTS)?;

        let mut documents = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let record: DocumentRecord = rmp_serde::from_slice(value.value())?;
            if status.map_or(true, |s| s == record.status) {
                documents.push(record);
            }
        }

        documents.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(documents)
    }

    pub fn count_by_status(&self) -> Result<StatusCounts, StoreError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(DOCUMENTS)?;

        let mut counts = StatusCounts::default();
        for result in table.iter()? {
            let (_, value) = result?;
            let record: DocumentRecord = rmp_serde::from_slice(value.value())?;
            counts.record(record.status);
        }
        Ok(counts)
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a document. Only ever advances forward:
/// `Uploaded` -> `Transferred` -> `Processed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Transferred,
    Processed,
}

impl DocumentStatus {
    /// The single status reachable from this one, if any.
    pub fn next(self) -> Option<DocumentStatus> {
        match self {
            DocumentStatus::Uploaded => Some(DocumentStatus::Transferred),
            DocumentStatus::Transferred => Some(DocumentStatus::Processed),
            DocumentStatus::Processed => None,
        }
    }

    pub fn can_advance_to(self, target: DocumentStatus) -> bool {
        self.next() == Some(target)
    }

    /// Whether a record in this status must carry a blob location.
    pub fn requires_blob(self) -> bool {
        match self {
            DocumentStatus::Uploaded => false,
            DocumentStatus::Transferred | DocumentStatus::Processed => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Transferred => "transferred",
            DocumentStatus::Processed => "processed",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown status '{}' (expected uploaded, transferred or processed)",
            self.0
        )
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for DocumentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uploaded" => Ok(DocumentStatus::Uploaded),
            "transferred" => Ok(DocumentStatus::Transferred),
            "processed" => Ok(DocumentStatus::Processed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// Where a transferred document lives in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobLocation {
    /// Object name inside the store
    pub name: String,
    /// Durable URL returned by the store
    pub url: String,
}

/// A document record stored in redb
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub author: Option<String>,
    pub type_file: String,
    pub byte_size: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub status: DocumentStatus,
    pub local_path: String,
    #[serde(default)]
    pub blob_url: Option<String>,
    #[serde(default)]
    pub blob_name: Option<String>,
}

impl DocumentRecord {
    pub fn blob_location(&self) -> Option<BlobLocation> {
        match (&self.blob_name, &self.blob_url) {
            (Some(name), Some(url)) => Some(BlobLocation {
                name: name.clone(),
                url: url.clone(),
            }),
            _ => None,
        }
    }
}

/// Input to `Database::create_document`.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub name: String,
    pub author: Option<String>,
    pub type_file: String,
    pub local_path: String,
    pub byte_size: u64,
}

/// Number of records in each status.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub uploaded: u64,
    pub transferred: u64,
    pub processed: u64,
}

impl StatusCounts {
    pub fn record(&mut self, status: DocumentStatus) {
        match status {
            DocumentStatus::Uploaded => self.uploaded += 1,
            DocumentStatus::Transferred => self.transferred += 1,
            DocumentStatus::Processed => self.processed += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.uploaded + self.transferred + self.processed
    }
}

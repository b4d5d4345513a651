mod documents;
mod health;

pub use documents::{
    document_content, get_document, list_documents, process_document, transfer_document,
    upload_document,
};
pub use health::health;

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use std::sync::Arc;

use crate::api::response::{ApiError, AppQuery, JSend, JSendPaginated, Pagination};
use crate::providers::UuidGenerator;
use crate::staging;
use crate::storage::models::{DocumentRecord, DocumentStatus, NewDocument};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub author: Option<String>,
    pub blob_url: Option<String>,
    pub byte_size: u64,
    pub created_at: String,
    pub id: String,
    pub local_path: String,
    pub modified_at: String,
    pub name: String,
    pub status: DocumentStatus,
    pub type_file: String,
}

#[derive(Debug, Deserialize)]
pub struct ListDocumentsParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub status: Option<String>,
}

fn default_limit() -> u32 {
    20
}

// ============================================================================
// Handlers
// ============================================================================

/// Receive a multipart upload (`file`, optional `author`), stage it and record
/// it as `Uploaded`.
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<JSend<DocumentResponse>>), ApiError> {
    let mut file_data: Option<Bytes> = None;
    let mut file_name: Option<String> = None;
    let mut file_content_type: Option<String> = None;
    let mut author: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, "Invalid multipart data"))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                file_content_type = field.content_type().map(|s| s.to_string());

                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, "Failed to read file"))?;

                if data.len() as u64 > state.config.ingest.max_upload_size {
                    return Err(ApiError::payload_too_large(format!(
                        "File exceeds maximum upload size of {} bytes",
                        state.config.ingest.max_upload_size
                    )));
                }
                file_data = Some(data);
            }
            "author" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, "Invalid author"))?;
                author = Some(text.trim().to_string()).filter(|a| !a.is_empty());
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let file_data = file_data.ok_or_else(|| ApiError::bad_request("No file part"))?;

    let name = staging::sanitize_filename(file_name.as_deref().unwrap_or(""));
    if name.is_empty() {
        return Err(ApiError::bad_request("No selected file"));
    }

    let extension = staging::extension_of(&name).unwrap_or_default();
    if !state.config.extension_allowed(&extension) {
        return Err(ApiError::unsupported_media_type(format!(
            "Unsupported file format '.{extension}'"
        )));
    }

    // Multipart Content-Type first, then a guess from the filename
    let type_file = file_content_type
        .filter(|ct| ct != "application/octet-stream")
        .or_else(|| mime_guess::from_path(&name).first().map(|m| m.to_string()))
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let staged = staging::stage(
        FsPath::new(&state.config.ingest.upload_dir),
        &UuidGenerator,
        &name,
        &file_data,
    )
    .await
    .map_err(|e| ApiError::internal(format!("Failed to stage file: {e}")))?;

    let new = NewDocument {
        name,
        author,
        type_file,
        local_path: staged.path_string(),
        byte_size: staged.byte_size,
    };

    match state.lifecycle.ingest(new) {
        Ok(record) => Ok((
            StatusCode::CREATED,
            JSend::success(document_to_response(&record)),
        )),
        Err(e) => {
            staged.discard().await;
            Err(e.into())
        }
    }
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<DocumentResponse>>, ApiError> {
    let record = state.lifecycle.get(&id)?;
    Ok(JSend::success(document_to_response(&record)))
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<ListDocumentsParams>,
) -> Result<Json<JSendPaginated<DocumentResponse>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let status = params
        .status
        .as_deref()
        .map(str::parse::<DocumentStatus>)
        .transpose()
        .map_err(|e| ApiError::bad_request(format!("Invalid query parameter: {e}")))?;

    let documents = state.lifecycle.list(status)?;
    let total = documents.len() as u64;
    let items: Vec<DocumentResponse> = documents
        .iter()
        .skip(params.offset as usize)
        .take(params.limit as usize)
        .map(document_to_response)
        .collect();

    Ok(JSendPaginated::success(
        items,
        Pagination {
            limit: params.limit,
            offset: params.offset,
            total,
        },
    ))
}

pub async fn transfer_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<DocumentResponse>>, ApiError> {
    let record = state.lifecycle.transfer(&id).await?;
    Ok(JSend::success(document_to_response(&record)))
}

pub async fn process_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<DocumentResponse>>, ApiError> {
    let record = state.lifecycle.process(&id).await?;
    Ok(JSend::success(document_to_response(&record)))
}

/// Stream the document's bytes, wherever they currently live.
pub async fn document_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let (record, data) = state.lifecycle.content(&id).await?;

    let mut response = (StatusCode::OK, data).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        record
            .type_file
            .parse()
            .unwrap_or(header::HeaderValue::from_static("application/octet-stream")),
    );

    if let Ok(value) = format!("attachment; filename=\"{}\"", record.name).parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok(response)
}

// ============================================================================
// Helpers
// ============================================================================

/// A body cut off by the upload limit surfaces as a multipart error carrying
/// 413; everything else is a malformed request.
fn multipart_error(e: MultipartError, context: &str) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large(format!("{context}: {}", e.body_text()))
    } else {
        ApiError::bad_request(format!("{context}: {e}"))
    }
}

fn document_to_response(record: &DocumentRecord) -> DocumentResponse {
    DocumentResponse {
        author: record.author.clone(),
        blob_url: record.blob_url.clone(),
        byte_size: record.byte_size,
        created_at: record.created_at.to_rfc3339(),
        id: record.id.clone(),
        local_path: record.local_path.clone(),
        modified_at: record.modified_at.to_rfc3339(),
        name: record.name.clone(),
        status: record.status,
        type_file: record.type_file.clone(),
    }
}

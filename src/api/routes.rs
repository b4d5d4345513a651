use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

/// Headroom for multipart framing and the `author` field on top of the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.ingest.max_upload_size as usize + MULTIPART_OVERHEAD;

    Router::new()
        // Documents
        .route("/documents", get(handlers::list_documents))
        .route(
            "/documents",
            post(handlers::upload_document).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/documents/:id", get(handlers::get_document))
        .route("/documents/:id/content", get(handlers::document_content))
        .route("/documents/:id/transfer", post(handlers::transfer_document))
        .route("/documents/:id/process", post(handlers::process_document))
        // Internal
        .route("/_internal/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

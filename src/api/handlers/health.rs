use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::{ApiError, JSend};
use crate::storage::models::StatusCounts;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub documents: StatusCounts,
    pub status: String,
    pub version: String,
}

pub async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<HealthResponse>>, ApiError> {
    let documents = state.lifecycle.status_counts()?;

    Ok(JSend::success(HealthResponse {
        documents,
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

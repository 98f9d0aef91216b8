//! Record management API handlers
//!
//! Contains HTTP request handlers for the CSV record store endpoints.
//! Validation mirrors the store contract: required fields are checked for
//! presence and non-emptiness here, everything else is delegated to the
//! service layer.

use crate::error::AppError;
use crate::services::RecordStore;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Add record request
#[derive(Deserialize)]
pub struct AddRecordRequest {
    /// Payload to store; required and non-empty
    pub data: Option<String>,
}

/// Add record response
#[derive(Debug, Serialize)]
pub struct AddRecordResponse {
    /// Human-readable message
    pub message: String,
    /// Generated record ID
    pub id: String,
}

/// Modify record request
#[derive(Deserialize)]
pub struct ModifyRecordRequest {
    /// ID of the record to modify; required
    pub id: Option<String>,
    /// Replacement payload; required
    #[serde(rename = "newData")]
    pub new_data: Option<String>,
}

/// Message-only response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Human-readable message
    pub message: String,
}

/// POST /add-data - Append a new record with a generated ID
pub async fn add_record(
    State(store): State<Arc<RecordStore>>,
    Json(request): Json<AddRecordRequest>,
) -> Result<Json<AddRecordResponse>, AppError> {
    let data = match request.data {
        Some(data) if !data.is_empty() => data,
        _ => return Err(AppError::Validation("No data provided".to_string())),
    };

    let id = store.add(&data).await?;
    tracing::info!(id = %id, "Record added");

    Ok(Json(AddRecordResponse {
        message: "Data added successfully".to_string(),
        id,
    }))
}

/// PUT /modify-data - Replace the data of every record matching an ID
pub async fn modify_record(
    State(store): State<Arc<RecordStore>>,
    Json(request): Json<ModifyRecordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let (id, new_data) = match (request.id, request.new_data) {
        (Some(id), Some(new_data)) if !id.is_empty() && !new_data.is_empty() => (id, new_data),
        _ => {
            return Err(AppError::Validation(
                "ID and new data are required".to_string(),
            ))
        }
    };

    if !store.modify(&id, &new_data).await? {
        return Err(AppError::RecordNotFound(id));
    }
    tracing::info!(id = %id, "Record modified");

    Ok(Json(MessageResponse {
        message: "Data modified successfully".to_string(),
    }))
}

/// DELETE /delete-data/:id - Remove every record matching an ID
pub async fn delete_record(
    State(store): State<Arc<RecordStore>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    // Unreachable through the router, kept for parity with the body checks.
    if id.is_empty() {
        return Err(AppError::Validation("ID is required".to_string()));
    }

    let removed = store.delete(&id).await?;
    if removed == 0 {
        return Err(AppError::RecordNotFound(id));
    }
    tracing::info!(id = %id, removed, "Record deleted");

    Ok(Json(MessageResponse {
        message: "Data deleted successfully".to_string(),
    }))
}

/// GET /get-data - List all records in file order
///
/// Returns a JSON array of `{ID, DATA}` objects, or an informational message
/// when the backing file has not been created yet.
pub async fn list_records(
    State(store): State<Arc<RecordStore>>,
) -> Result<Response, AppError> {
    match store.list().await? {
        Some(records) => Ok(Json(records).into_response()),
        None => Ok(Json(MessageResponse {
            message: "No data found.".to_string(),
        })
        .into_response()),
    }
}

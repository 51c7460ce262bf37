//! HTTP handlers for replenishment and disbursement requests
//!
//! Every handler is generic over the workflow variant; the router mounts
//! them once per kind.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::{ApprovalHistoryEntry, RequestDocument, WorkflowAction, WorkflowRequest};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::services::workflow::{
    BulkTransitionReport, CreateRequestInput, RequestQuery, RequestView, UpdateRequestInput,
    WorkflowEngine, WorkflowVariant,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TransitionInput {
    pub action: WorkflowAction,
    pub observations: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkTransitionInput {
    pub request_ids: Vec<Uuid>,
    pub action: WorkflowAction,
    pub observations: Option<String>,
}

/// List requests visible to the user
pub async fn list_requests<V: WorkflowVariant>(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<RequestQuery>,
) -> AppResult<Json<Vec<RequestView>>> {
    let permissions = state.resolve(&current_user);
    let engine = WorkflowEngine::<V>::new(state.ctx);
    Ok(Json(engine.list(&permissions, &query).await?))
}

/// Create a request
pub async fn create_request<V: WorkflowVariant>(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateRequestInput>,
) -> AppResult<(StatusCode, Json<WorkflowRequest>)> {
    let permissions = state.resolve(&current_user);
    let engine = WorkflowEngine::<V>::new(state.ctx);
    let request = engine.create(&permissions, input).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Get a request with the actions available to the user
pub async fn get_request<V: WorkflowVariant>(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<RequestView>> {
    let permissions = state.resolve(&current_user);
    let engine = WorkflowEngine::<V>::new(state.ctx);
    Ok(Json(engine.get(&permissions, request_id).await?))
}

/// Edit a request still open for changes
pub async fn update_request<V: WorkflowVariant>(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(request_id): Path<Uuid>,
    Json(input): Json<UpdateRequestInput>,
) -> AppResult<Json<WorkflowRequest>> {
    let permissions = state.resolve(&current_user);
    let engine = WorkflowEngine::<V>::new(state.ctx);
    Ok(Json(engine.update(&permissions, request_id, input).await?))
}

/// Delete a request
pub async fn delete_request<V: WorkflowVariant>(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(request_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let permissions = state.resolve(&current_user);
    let engine = WorkflowEngine::<V>::new(state.ctx);
    engine.delete(&permissions, request_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Apply an approval action
pub async fn transition_request<V: WorkflowVariant>(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(request_id): Path<Uuid>,
    Json(input): Json<TransitionInput>,
) -> AppResult<Json<WorkflowRequest>> {
    let permissions = state.resolve(&current_user);
    let engine = WorkflowEngine::<V>::new(state.ctx);
    let request = engine
        .transition(&permissions, request_id, input.action, input.observations)
        .await?;
    Ok(Json(request))
}

/// Apply one action to several requests; failures are reported per item
pub async fn bulk_transition<V: WorkflowVariant>(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<BulkTransitionInput>,
) -> AppResult<Json<BulkTransitionReport>> {
    if input.request_ids.is_empty() {
        return Err(AppError::validation(
            "request_ids",
            "At least one request is required",
            "Au moins une demande est requise",
        ));
    }
    let permissions = state.resolve(&current_user);
    let engine = WorkflowEngine::<V>::new(state.ctx);
    let report = engine
        .bulk_transition(&permissions, &input.request_ids, input.action, input.observations)
        .await;
    Ok(Json(report))
}

/// Approval trail of a request
pub async fn get_request_history<V: WorkflowVariant>(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<Vec<ApprovalHistoryEntry>>> {
    let permissions = state.resolve(&current_user);
    let engine = WorkflowEngine::<V>::new(state.ctx);
    Ok(Json(engine.history(&permissions, request_id).await?))
}

/// Documents attached to a request
pub async fn list_request_documents<V: WorkflowVariant>(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<Vec<RequestDocument>>> {
    let permissions = state.resolve(&current_user);
    let engine = WorkflowEngine::<V>::new(state.ctx);
    Ok(Json(engine.list_documents(&permissions, request_id).await?))
}

/// Upload a supporting document (multipart: `document_type`, `file`)
pub async fn upload_request_document<V: WorkflowVariant>(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(request_id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<RequestDocument>)> {
    let mut document_type = None;
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::ValidationError(format!("Invalid multipart body: {}", e)))?
    {
        match field.name() {
            Some("document_type") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::ValidationError(format!("Invalid document type: {}", e)))?;
                document_type = Some(text);
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or("document").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::ValidationError(format!("Invalid file: {}", e)))?;
                file = Some((file_name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let document_type = document_type.ok_or_else(|| {
        AppError::validation(
            "document_type",
            "Document type is required",
            "Le type de document est obligatoire",
        )
    })?;
    let (file_name, content) = file.ok_or_else(|| {
        AppError::validation("file", "File is required", "Le fichier est obligatoire")
    })?;

    let permissions = state.resolve(&current_user);
    let engine = WorkflowEngine::<V>::new(state.ctx);
    let document = engine
        .attach_document(&permissions, request_id, &document_type, &file_name, content)
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

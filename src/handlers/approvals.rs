use super::common::{
    created_response, map_service_error, success_response, validate_input, ReasonRequest,
};
use crate::{
    auth::AuthUser,
    errors::ApiError,
    handlers::AppState,
    models::SubjectType,
    services::{
        approval_workflow::{ActionRequest, WorkflowUpdate},
        procurement::StartWorkflowRequest,
    },
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Deserialize, IntoParams)]
pub struct SubjectQuery {
    pub subject_type: SubjectType,
    pub subject_id: Uuid,
}

/// Open an approval workflow on a subject
#[utoipa::path(
    post,
    path = "/api/v1/approval-workflows",
    request_body = StartWorkflowRequest,
    responses(
        (status = 201, description = "Workflow started", body = crate::ApiResponse<serde_json::Value>),
        (status = 409, description = "Subject already has an open workflow", body = crate::errors::ErrorResponse),
        (status = 422, description = "Unknown approver", body = crate::errors::ErrorResponse)
    ),
    tag = "approvals"
)]
pub async fn start_workflow(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(payload): Json<StartWorkflowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let view = state
        .procurement
        .start_workflow(&actor, payload)
        .await
        .map_err(map_service_error)?;
    info!(workflow_id = %view.workflow.id, "approval workflow started");
    Ok(created_response(view))
}

/// Workflow history for one subject
#[utoipa::path(
    get,
    path = "/api/v1/approval-workflows",
    params(SubjectQuery),
    responses(
        (status = 200, description = "Workflows on the subject, newest first", body = crate::ApiResponse<serde_json::Value>)
    ),
    tag = "approvals"
)]
pub async fn list_subject_workflows(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Query(query): Query<SubjectQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let workflows = state
        .procurement
        .list_subject_workflows(&actor, query.subject_type, query.subject_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(workflows))
}

/// Get a workflow with its actions and outstanding approvers
#[utoipa::path(
    get,
    path = "/api/v1/approval-workflows/{id}",
    params(("id" = Uuid, Path, description = "Workflow ID")),
    responses(
        (status = 200, description = "Workflow", body = crate::ApiResponse<serde_json::Value>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "approvals"
)]
pub async fn get_workflow(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .procurement
        .get_workflow(&actor, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(view))
}

/// Change priority, due date or conditions of a pending workflow
#[utoipa::path(
    put,
    path = "/api/v1/approval-workflows/{id}",
    params(("id" = Uuid, Path, description = "Workflow ID")),
    request_body = WorkflowUpdate,
    responses(
        (status = 200, description = "Workflow updated", body = crate::ApiResponse<serde_json::Value>),
        (status = 403, description = "Only the creator may update", body = crate::errors::ErrorResponse),
        (status = 409, description = "Workflow already closed", body = crate::errors::ErrorResponse)
    ),
    tag = "approvals"
)]
pub async fn update_workflow(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<WorkflowUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let view = state
        .procurement
        .update_workflow(&actor, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(view))
}

/// Cancel a workflow (creator only)
#[utoipa::path(
    post,
    path = "/api/v1/approval-workflows/{id}/cancel",
    params(("id" = Uuid, Path, description = "Workflow ID")),
    request_body = ReasonRequest,
    responses(
        (status = 200, description = "Workflow cancelled", body = crate::ApiResponse<serde_json::Value>),
        (status = 403, description = "Only the creator may cancel", body = crate::errors::ErrorResponse),
        (status = 409, description = "Workflow already closed", body = crate::errors::ErrorResponse)
    ),
    tag = "approvals"
)]
pub async fn cancel_workflow(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReasonRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let view = state
        .procurement
        .cancel_workflow(&actor, id, payload.reason)
        .await
        .map_err(map_service_error)?;
    info!(workflow_id = %id, "approval workflow cancelled");
    Ok(success_response(view))
}

/// Approve, reject, comment on, delegate or cancel a workflow
#[utoipa::path(
    post,
    path = "/api/v1/approval-workflows/{id}/actions",
    params(("id" = Uuid, Path, description = "Workflow ID")),
    request_body = ActionRequest,
    responses(
        (status = 200, description = "Action recorded", body = crate::ApiResponse<serde_json::Value>),
        (status = 403, description = "Caller may not act on this workflow", body = crate::errors::ErrorResponse),
        (status = 409, description = "Closed, out of sequence or already acted", body = crate::errors::ErrorResponse)
    ),
    tag = "approvals"
)]
pub async fn record_action(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let view = state
        .procurement
        .record_workflow_action(&actor, id, payload)
        .await
        .map_err(map_service_error)?;
    info!(workflow_id = %id, status = %view.workflow.status, "approval action recorded");
    Ok(success_response(view))
}

pub fn approval_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(start_workflow).get(list_subject_workflows))
        .route("/:id", get(get_workflow).put(update_workflow))
        .route("/:id/cancel", post(cancel_workflow))
        .route("/:id/actions", post(record_action))
}

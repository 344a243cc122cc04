use super::common::{
    created_response, map_service_error, success_response, validate_input, PaginatedResponse,
    PaginationParams, ReasonRequest,
};
use crate::{
    auth::AuthUser,
    errors::ApiError,
    handlers::AppState,
    models::{RequestStatus, Urgency},
    services::procurement::{NewPurchaseRequest, PurchaseRequestUpdate, SubmitForApproval},
    store::RequestFilter,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct RequestListQuery {
    pub project_id: Option<Uuid>,
    pub status: Option<RequestStatus>,
    pub urgency: Option<Urgency>,
    /// Earliest required date, inclusive
    pub required_from: Option<NaiveDate>,
    /// Latest required date, inclusive
    pub required_to: Option<NaiveDate>,
}

impl From<RequestListQuery> for RequestFilter {
    fn from(query: RequestListQuery) -> Self {
        RequestFilter {
            visible_projects: None,
            project_id: query.project_id,
            status: query.status,
            urgency: query.urgency,
            required_from: query.required_from,
            required_to: query.required_to,
        }
    }
}

/// Create a draft purchase request
#[utoipa::path(
    post,
    path = "/api/v1/purchase-requests",
    request_body = NewPurchaseRequest,
    responses(
        (status = 201, description = "Purchase request created", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 403, description = "No edit access to the project", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-requests"
)]
pub async fn create_request(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(payload): Json<NewPurchaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let request = state
        .procurement
        .create_request(&actor, payload)
        .await
        .map_err(map_service_error)?;
    info!(request_id = %request.id, "purchase request created");
    Ok(created_response(request))
}

/// List purchase requests visible to the caller
#[utoipa::path(
    get,
    path = "/api/v1/purchase-requests",
    params(RequestListQuery, PaginationParams),
    responses(
        (status = 200, description = "Purchase requests", body = crate::ApiResponse<serde_json::Value>)
    ),
    tag = "purchase-requests"
)]
pub async fn list_requests(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Query(query): Query<RequestListQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    if let (Some(from), Some(to)) = (query.required_from, query.required_to) {
        if from > to {
            return Err(ApiError::BadRequest(
                "required_from must not be after required_to".to_string(),
            ));
        }
    }
    let page = state
        .procurement
        .list_requests(&actor, query.into(), pagination.page_request(&state.config))
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::from(page)))
}

/// Get a purchase request
#[utoipa::path(
    get,
    path = "/api/v1/purchase-requests/{id}",
    params(("id" = Uuid, Path, description = "Purchase request ID")),
    responses(
        (status = 200, description = "Purchase request", body = crate::ApiResponse<serde_json::Value>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-requests"
)]
pub async fn get_request(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .procurement
        .get_request(&actor, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(request))
}

/// Edit a draft or pending purchase request
#[utoipa::path(
    put,
    path = "/api/v1/purchase-requests/{id}",
    params(("id" = Uuid, Path, description = "Purchase request ID")),
    request_body = PurchaseRequestUpdate,
    responses(
        (status = 200, description = "Purchase request updated", body = crate::ApiResponse<serde_json::Value>),
        (status = 409, description = "Request is no longer editable", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-requests"
)]
pub async fn update_request(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<PurchaseRequestUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let request = state
        .procurement
        .update_request(&actor, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(request))
}

/// Submit a purchase request for approval
#[utoipa::path(
    post,
    path = "/api/v1/purchase-requests/{id}/submit",
    params(("id" = Uuid, Path, description = "Purchase request ID")),
    request_body = SubmitForApproval,
    responses(
        (status = 200, description = "Request submitted and workflow started", body = crate::ApiResponse<serde_json::Value>),
        (status = 409, description = "Duplicate workflow or invalid transition", body = crate::errors::ErrorResponse),
        (status = 422, description = "Unknown approver", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-requests"
)]
pub async fn submit_request(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitForApproval>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let submission = state
        .procurement
        .submit_request(&actor, id, payload)
        .await
        .map_err(map_service_error)?;
    info!(request_id = %id, workflow_id = %submission.workflow.id, "purchase request submitted");
    Ok(success_response(submission))
}

/// Cancel a purchase request that has not been decided
#[utoipa::path(
    post,
    path = "/api/v1/purchase-requests/{id}/cancel",
    params(("id" = Uuid, Path, description = "Purchase request ID")),
    request_body = ReasonRequest,
    responses(
        (status = 200, description = "Purchase request cancelled", body = crate::ApiResponse<serde_json::Value>),
        (status = 409, description = "Request already decided", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-requests"
)]
pub async fn cancel_request(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReasonRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let request = state
        .procurement
        .cancel_request(&actor, id, payload.reason)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(request))
}

pub fn purchase_request_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_request).get(list_requests))
        .route("/:id", get(get_request).put(update_request))
        .route("/:id/submit", post(submit_request))
        .route("/:id/cancel", post(cancel_request))
}

use super::common::{
    created_response, map_service_error, success_response, validate_input, PaginatedResponse,
    PaginationParams,
};
use crate::{
    auth::AuthUser,
    errors::ApiError,
    handlers::AppState,
    models::SubmittalStatus,
    services::{
        materials::MaterialEdit,
        procurement::{BulkMaterialReview, BulkMaterialUpdate, MaterialReview, NewMaterialSubmittal},
    },
    store::MaterialFilter,
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

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct MaterialListQuery {
    pub project_id: Option<Uuid>,
    pub status: Option<SubmittalStatus>,
}

impl From<MaterialListQuery> for MaterialFilter {
    fn from(query: MaterialListQuery) -> Self {
        MaterialFilter {
            visible_projects: None,
            project_id: query.project_id,
            status: query.status,
        }
    }
}

/// Submit a material for review
#[utoipa::path(
    post,
    path = "/api/v1/materials",
    request_body = NewMaterialSubmittal,
    responses(
        (status = 201, description = "Material submitted", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    tag = "materials"
)]
pub async fn submit_material(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(payload): Json<NewMaterialSubmittal>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let material = state
        .procurement
        .submit_material(&actor, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(material))
}

#[utoipa::path(
    get,
    path = "/api/v1/materials",
    params(MaterialListQuery, PaginationParams),
    responses(
        (status = 200, description = "Material submittals", body = crate::ApiResponse<serde_json::Value>)
    ),
    tag = "materials"
)]
pub async fn list_materials(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Query(query): Query<MaterialListQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .procurement
        .list_materials(&actor, query.into(), pagination.page_request(&state.config))
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::from(page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/materials/{id}",
    params(("id" = Uuid, Path, description = "Material submittal ID")),
    responses(
        (status = 200, description = "Material submittal", body = crate::ApiResponse<serde_json::Value>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "materials"
)]
pub async fn get_material(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let material = state
        .procurement
        .get_material(&actor, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(material))
}

/// Approve, reject or send back a material submittal
#[utoipa::path(
    post,
    path = "/api/v1/materials/{id}/review",
    params(("id" = Uuid, Path, description = "Material submittal ID")),
    request_body = MaterialReview,
    responses(
        (status = 200, description = "Review recorded", body = crate::ApiResponse<serde_json::Value>),
        (status = 403, description = "Caller lacks approve permission", body = crate::errors::ErrorResponse),
        (status = 409, description = "Submittal already decided", body = crate::errors::ErrorResponse)
    ),
    tag = "materials"
)]
pub async fn review_material(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<MaterialReview>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let material = state
        .procurement
        .review_material(&actor, id, payload)
        .await
        .map_err(map_service_error)?;
    info!(submittal_id = %id, status = %material.status, "material reviewed");
    Ok(success_response(material))
}

/// Resubmit a submittal that was sent back for revision
#[utoipa::path(
    post,
    path = "/api/v1/materials/{id}/resubmit",
    params(("id" = Uuid, Path, description = "Material submittal ID")),
    request_body = MaterialEdit,
    responses(
        (status = 200, description = "Submittal back in review", body = crate::ApiResponse<serde_json::Value>),
        (status = 409, description = "Submittal is not awaiting revision", body = crate::errors::ErrorResponse)
    ),
    tag = "materials"
)]
pub async fn resubmit_material(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<MaterialEdit>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let material = state
        .procurement
        .resubmit_material(&actor, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(material))
}

#[utoipa::path(
    post,
    path = "/api/v1/materials/bulk-approve",
    request_body = BulkMaterialReview,
    responses(
        (status = 200, description = "Per-item outcome", body = crate::ApiResponse<serde_json::Value>)
    ),
    tag = "materials"
)]
pub async fn bulk_approve(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(payload): Json<BulkMaterialReview>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let outcome = state
        .procurement
        .bulk_approve_materials(&actor, payload)
        .await
        .map_err(map_service_error)?;
    info!(
        succeeded = outcome.succeeded.len(),
        failed = outcome.failed.len(),
        "bulk material approval"
    );
    Ok(success_response(outcome))
}

#[utoipa::path(
    post,
    path = "/api/v1/materials/bulk-reject",
    request_body = BulkMaterialReview,
    responses(
        (status = 200, description = "Per-item outcome", body = crate::ApiResponse<serde_json::Value>)
    ),
    tag = "materials"
)]
pub async fn bulk_reject(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(payload): Json<BulkMaterialReview>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let outcome = state
        .procurement
        .bulk_reject_materials(&actor, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(outcome))
}

#[utoipa::path(
    post,
    path = "/api/v1/materials/bulk-update",
    request_body = BulkMaterialUpdate,
    responses(
        (status = 200, description = "Per-item outcome", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "No fields to update", body = crate::errors::ErrorResponse)
    ),
    tag = "materials"
)]
pub async fn bulk_update(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(payload): Json<BulkMaterialUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let outcome = state
        .procurement
        .bulk_update_materials(&actor, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(outcome))
}

pub fn material_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(submit_material).get(list_materials))
        .route("/bulk-approve", post(bulk_approve))
        .route("/bulk-reject", post(bulk_reject))
        .route("/bulk-update", post(bulk_update))
        .route("/:id", get(get_material))
        .route("/:id/review", post(review_material))
        .route("/:id/resubmit", post(resubmit_material))
}

use super::common::{created_response, map_service_error, success_response, validate_input};
use crate::{
    auth::AuthUser, errors::ApiError, handlers::AppState, services::procurement::NewVendor,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tracing::info;
use uuid::Uuid;

/// Register a vendor (purchase department only)
#[utoipa::path(
    post,
    path = "/api/v1/vendors",
    request_body = NewVendor,
    responses(
        (status = 201, description = "Vendor created", body = crate::ApiResponse<serde_json::Value>),
        (status = 403, description = "Purchase department only", body = crate::errors::ErrorResponse)
    ),
    tag = "vendors"
)]
pub async fn create_vendor(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(payload): Json<NewVendor>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let vendor = state
        .procurement
        .create_vendor(&actor, payload)
        .await
        .map_err(map_service_error)?;
    info!(vendor_id = %vendor.id, "vendor created");
    Ok(created_response(vendor))
}

#[utoipa::path(
    get,
    path = "/api/v1/vendors/{id}",
    params(("id" = Uuid, Path, description = "Vendor ID")),
    responses(
        (status = 200, description = "Vendor", body = crate::ApiResponse<serde_json::Value>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "vendors"
)]
pub async fn get_vendor(
    State(state): State<AppState>,
    AuthUser(_actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let vendor = state
        .procurement
        .get_vendor(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(vendor))
}

#[utoipa::path(
    post,
    path = "/api/v1/vendors/{id}/activate",
    params(("id" = Uuid, Path, description = "Vendor ID")),
    responses(
        (status = 200, description = "Vendor active", body = crate::ApiResponse<serde_json::Value>)
    ),
    tag = "vendors"
)]
pub async fn activate_vendor(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let vendor = state
        .procurement
        .set_vendor_active(&actor, id, true)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(vendor))
}

/// Stop new orders going to a vendor
#[utoipa::path(
    post,
    path = "/api/v1/vendors/{id}/deactivate",
    params(("id" = Uuid, Path, description = "Vendor ID")),
    responses(
        (status = 200, description = "Vendor inactive", body = crate::ApiResponse<serde_json::Value>)
    ),
    tag = "vendors"
)]
pub async fn deactivate_vendor(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let vendor = state
        .procurement
        .set_vendor_active(&actor, id, false)
        .await
        .map_err(map_service_error)?;
    info!(vendor_id = %id, "vendor deactivated");
    Ok(success_response(vendor))
}

pub fn vendor_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_vendor))
        .route("/:id", get(get_vendor))
        .route("/:id/activate", post(activate_vendor))
        .route("/:id/deactivate", post(deactivate_vendor))
}

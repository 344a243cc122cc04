use super::common::{
    created_response, map_service_error, success_response, validate_input, PaginatedResponse,
    PaginationParams,
};
use crate::{
    auth::AuthUser,
    errors::ApiError,
    handlers::AppState,
    services::procurement::{ConfirmDeliveryRequest, PendingDeliveryQuery, UpdateDeliveryRequest},
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PendingDeliveryParams {
    pub project_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    /// Only orders past their expected delivery date
    #[serde(default)]
    pub overdue_only: bool,
}

/// Record a delivery against a purchase order
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/deliveries",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    request_body = ConfirmDeliveryRequest,
    responses(
        (status = 201, description = "Delivery recorded", body = crate::ApiResponse<serde_json::Value>),
        (status = 409, description = "Order does not accept deliveries", body = crate::errors::ErrorResponse),
        (status = 422, description = "Delivery exceeds the ordered quantity", body = crate::errors::ErrorResponse)
    ),
    tag = "deliveries"
)]
pub async fn confirm_delivery(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<ConfirmDeliveryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let result = state
        .procurement
        .confirm_delivery(&actor, order_id, payload)
        .await
        .map_err(map_service_error)?;
    info!(
        %order_id,
        received = %result.order.delivery.received_quantity,
        status = %result.order.order.status,
        "delivery recorded"
    );
    Ok(created_response(result))
}

/// List the confirmations recorded against a purchase order
#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders/{id}/deliveries",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Delivery confirmations with timing", body = crate::ApiResponse<serde_json::Value>)
    ),
    tag = "deliveries"
)]
pub async fn list_order_deliveries(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let deliveries = state
        .procurement
        .list_order_deliveries(&actor, order_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(deliveries))
}

/// Edit a delivery confirmation
#[utoipa::path(
    put,
    path = "/api/v1/purchase-orders/{id}/deliveries/{delivery_id}",
    params(
        ("id" = Uuid, Path, description = "Purchase order ID"),
        ("delivery_id" = Uuid, Path, description = "Delivery confirmation ID")
    ),
    request_body = UpdateDeliveryRequest,
    responses(
        (status = 200, description = "Delivery updated", body = crate::ApiResponse<serde_json::Value>),
        (status = 422, description = "Delivery exceeds the ordered quantity", body = crate::errors::ErrorResponse)
    ),
    tag = "deliveries"
)]
pub async fn update_delivery(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path((order_id, delivery_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateDeliveryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let result = state
        .procurement
        .update_delivery(&actor, order_id, delivery_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(result))
}

/// Remove a delivery confirmation
#[utoipa::path(
    delete,
    path = "/api/v1/purchase-orders/{id}/deliveries/{delivery_id}",
    params(
        ("id" = Uuid, Path, description = "Purchase order ID"),
        ("delivery_id" = Uuid, Path, description = "Delivery confirmation ID")
    ),
    responses(
        (status = 200, description = "Delivery removed", body = crate::ApiResponse<serde_json::Value>),
        (status = 403, description = "Caller lacks delete permission", body = crate::errors::ErrorResponse)
    ),
    tag = "deliveries"
)]
pub async fn delete_delivery(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path((order_id, delivery_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .procurement
        .delete_delivery(&actor, order_id, delivery_id)
        .await
        .map_err(map_service_error)?;
    info!(%order_id, %delivery_id, "delivery removed");
    Ok(success_response(result))
}

/// Orders still waiting on goods
#[utoipa::path(
    get,
    path = "/api/v1/deliveries/pending",
    params(PendingDeliveryParams, PaginationParams),
    responses(
        (status = 200, description = "Orders with outstanding quantity", body = crate::ApiResponse<serde_json::Value>)
    ),
    tag = "deliveries"
)]
pub async fn list_pending_deliveries(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Query(params): Query<PendingDeliveryParams>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = PendingDeliveryQuery {
        project_id: params.project_id,
        vendor_id: params.vendor_id,
        overdue_only: params.overdue_only,
    };
    let page = state
        .procurement
        .list_pending_deliveries(&actor, query, pagination.page_request(&state.config))
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::from(page)))
}

pub fn delivery_routes() -> Router<AppState> {
    Router::new().route("/pending", get(list_pending_deliveries))
}

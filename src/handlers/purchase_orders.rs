use super::{
    common::{
        created_response, map_service_error, success_response, validate_input,
        PaginatedResponse, PaginationParams,
    },
    deliveries,
};
use crate::{
    auth::AuthUser,
    errors::ApiError,
    handlers::AppState,
    models::PurchaseOrderStatus,
    services::procurement::{NewPurchaseOrder, PurchaseOrderUpdate},
    store::OrderFilter,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct OrderListQuery {
    pub project_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub status: Option<PurchaseOrderStatus>,
}

impl From<OrderListQuery> for OrderFilter {
    fn from(query: OrderListQuery) -> Self {
        OrderFilter {
            visible_projects: None,
            project_id: query.project_id,
            vendor_id: query.vendor_id,
            statuses: query.status.into_iter().collect(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct TransitionOrderRequest {
    pub status: PurchaseOrderStatus,
}

/// Convert an approved purchase request into a purchase order
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders",
    request_body = NewPurchaseOrder,
    responses(
        (status = 201, description = "Purchase order created", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Invalid request or inactive vendor", body = crate::errors::ErrorResponse),
        (status = 409, description = "Request not approved or already converted", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(payload): Json<NewPurchaseOrder>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let view = state
        .procurement
        .create_order(&actor, payload)
        .await
        .map_err(map_service_error)?;
    info!(order_id = %view.order.id, po_number = %view.order.po_number, "purchase order created");
    Ok(created_response(view))
}

/// List purchase orders visible to the caller
#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders",
    params(OrderListQuery, PaginationParams),
    responses(
        (status = 200, description = "Purchase orders with delivery metadata", body = crate::ApiResponse<serde_json::Value>)
    ),
    tag = "purchase-orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Query(query): Query<OrderListQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .procurement
        .list_orders(&actor, query.into(), pagination.page_request(&state.config))
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::from(page)))
}

/// Get a purchase order with delivery metadata
#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders/{id}",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Purchase order", body = crate::ApiResponse<serde_json::Value>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .procurement
        .get_order(&actor, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(view))
}

/// Edit order fields and optionally move its status
#[utoipa::path(
    put,
    path = "/api/v1/purchase-orders/{id}",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    request_body = PurchaseOrderUpdate,
    responses(
        (status = 200, description = "Purchase order updated", body = crate::ApiResponse<serde_json::Value>),
        (status = 403, description = "Caller may not modify this order", body = crate::errors::ErrorResponse),
        (status = 409, description = "Illegal status transition", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn update_order(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<PurchaseOrderUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let view = state
        .procurement
        .update_order(&actor, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(view))
}

/// Move a purchase order to another status
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/status",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    request_body = TransitionOrderRequest,
    responses(
        (status = 200, description = "Purchase order transitioned", body = crate::ApiResponse<serde_json::Value>),
        (status = 409, description = "Illegal status transition", body = crate::errors::ErrorResponse),
        (status = 422, description = "Guard failed (vendor contact, deliveries, quantity)", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn transition_order(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .procurement
        .transition_order(&actor, id, payload.status)
        .await
        .map_err(map_service_error)?;
    info!(order_id = %id, status = %view.order.status, "purchase order transitioned");
    Ok(success_response(view))
}

pub fn purchase_order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order).put(update_order))
        .route("/:id/status", post(transition_order))
        .route(
            "/:id/deliveries",
            get(deliveries::list_order_deliveries).post(deliveries::confirm_delivery),
        )
        .route(
            "/:id/deliveries/:delivery_id",
            put(deliveries::update_delivery).delete(deliveries::delete_delivery),
        )
}

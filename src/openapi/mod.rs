use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "SiteFlow API",
        version = "0.3.0",
        description = r#"
# SiteFlow Procurement API

Procurement lifecycle and approval workflows for construction projects.

## Features

- **Purchase Requests**: Draft, edit, submit for approval and cancel
- **Purchase Orders**: Convert approved requests and drive the order lifecycle
- **Deliveries**: Record partial and full deliveries with quantity reconciliation
- **Approval Workflows**: Sequential, parallel and conditional multi-approver routing
- **Material Submittals**: Review, revision cycles and bulk decisions
- **Vendors**: Registration and activation

## Authentication

Callers identify themselves with the `X-User-Id` and `X-User-Role` headers.

## Error Handling

Errors carry a stable machine-readable `error` kind alongside the message:

```json
{
  "error": "over_delivery",
  "message": "Delivery would exceed ordered quantity",
  "status": 422
}
```

## Pagination

List endpoints accept `page` (default 1) and `per_page` (default 20, max 100).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "purchase-requests", description = "Purchase request endpoints"),
        (name = "purchase-orders", description = "Purchase order endpoints"),
        (name = "deliveries", description = "Delivery confirmation endpoints"),
        (name = "approvals", description = "Approval workflow endpoints"),
        (name = "materials", description = "Material submittal endpoints"),
        (name = "vendors", description = "Vendor endpoints")
    ),
    paths(
        // Purchase requests
        crate::handlers::purchase_requests::create_request,
        crate::handlers::purchase_requests::list_requests,
        crate::handlers::purchase_requests::get_request,
        crate::handlers::purchase_requests::update_request,
        crate::handlers::purchase_requests::submit_request,
        crate::handlers::purchase_requests::cancel_request,

        // Purchase orders
        crate::handlers::purchase_orders::create_order,
        crate::handlers::purchase_orders::list_orders,
        crate::handlers::purchase_orders::get_order,
        crate::handlers::purchase_orders::update_order,
        crate::handlers::purchase_orders::transition_order,

        // Deliveries
        crate::handlers::deliveries::confirm_delivery,
        crate::handlers::deliveries::list_order_deliveries,
        crate::handlers::deliveries::update_delivery,
        crate::handlers::deliveries::delete_delivery,
        crate::handlers::deliveries::list_pending_deliveries,

        // Approval workflows
        crate::handlers::approvals::start_workflow,
        crate::handlers::approvals::list_subject_workflows,
        crate::handlers::approvals::get_workflow,
        crate::handlers::approvals::update_workflow,
        crate::handlers::approvals::cancel_workflow,
        crate::handlers::approvals::record_action,

        // Materials
        crate::handlers::materials::submit_material,
        crate::handlers::materials::list_materials,
        crate::handlers::materials::get_material,
        crate::handlers::materials::review_material,
        crate::handlers::materials::resubmit_material,
        crate::handlers::materials::bulk_approve,
        crate::handlers::materials::bulk_reject,
        crate::handlers::materials::bulk_update,

        // Vendors
        crate::handlers::vendors::create_vendor,
        crate::handlers::vendors::get_vendor,
        crate::handlers::vendors::activate_vendor,
        crate::handlers::vendors::deactivate_vendor,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::handlers::common::PaginationMeta,
            crate::handlers::common::ReasonRequest,

            // Domain enums
            crate::models::RequestStatus,
            crate::models::Urgency,
            crate::models::PurchaseOrderStatus,
            crate::models::ConfirmationStatus,
            crate::models::SubmittalStatus,
            crate::models::ActionType,
            crate::models::SubjectType,
            crate::models::WorkflowType,
            crate::models::WorkflowStatus,

            // Request bodies
            crate::services::procurement::NewPurchaseRequest,
            crate::services::procurement::PurchaseRequestUpdate,
            crate::services::procurement::SubmitForApproval,
            crate::services::procurement::NewPurchaseOrder,
            crate::services::procurement::PurchaseOrderUpdate,
            crate::handlers::purchase_orders::TransitionOrderRequest,
            crate::services::procurement::ConfirmDeliveryRequest,
            crate::services::procurement::UpdateDeliveryRequest,
            crate::services::procurement::StartWorkflowRequest,
            crate::services::approval_workflow::ActionRequest,
            crate::services::approval_workflow::WorkflowUpdate,
            crate::services::procurement::NewMaterialSubmittal,
            crate::services::procurement::MaterialReview,
            crate::services::procurement::BulkMaterialReview,
            crate::services::procurement::BulkMaterialUpdate,
            crate::services::materials::MaterialEdit,
            crate::services::materials::MaterialDecision,
            crate::services::procurement::NewVendor,

            // Read models
            crate::services::delivery_reconciler::DeliveryMetadata,
            crate::services::delivery_reconciler::DeliveryTiming,
            crate::services::materials::BulkOutcome,
            crate::services::materials::BulkFailure,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDocV1::openapi())
}

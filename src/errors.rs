use crate::middleware_helpers::retry::{DbRetryPolicy, RetryPolicy};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Conflict",
    "kind": "over_delivery",
    "message": "Over-delivery: ordered 100, already received 60, attempted 50",
    "details": { "ordered": "100", "already_received": "60", "attempted": "50" },
    "request_id": "req-abc123xyz",
    "timestamp": "2025-03-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    #[schema(example = "Conflict")]
    pub error: String,
    /// Stable machine-readable error kind
    #[schema(example = "over_delivery")]
    pub kind: String,
    /// Human-readable error description
    pub message: String,
    /// Structured diagnostics (field errors, quantities)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub details: Option<serde_json::Value>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "req-abc123xyz")]
    pub request_id: Option<String>,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Ordered list of field errors carried by [`ServiceError::ValidationError`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(pub Vec<FieldError>);

impl FieldErrors {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self(vec![FieldError::new(field, message)])
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|e| e.field.as_str())
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Workflow {workflow_id} is closed ({status})")]
    WorkflowClosed { workflow_id: Uuid, status: String },

    #[error("Approver {actor_id} is out of sequence")]
    OutOfSequence {
        actor_id: Uuid,
        expected: Option<Uuid>,
    },

    #[error("Over-delivery: ordered {ordered}, already received {already_received}, attempted {attempted}")]
    OverDelivery {
        ordered: Decimal,
        already_received: Decimal,
        attempted: Decimal,
    },

    #[error("Incomplete delivery: ordered {ordered}, received {received}")]
    IncompleteDelivery { ordered: Decimal, received: Decimal },

    #[error("Order {0} has no delivery confirmation")]
    DeliveryConfirmationRequired(Uuid),

    #[error("An active approval workflow already exists for {0}")]
    DuplicateWorkflow(String),

    #[error("Principal {0} cannot approve their own submission")]
    SelfApprovalForbidden(Uuid),

    #[error("Unknown approver: {0}")]
    UnknownApprover(Uuid),

    #[error("Principal {0} has already acted on this workflow")]
    AlreadyActed(Uuid),

    #[error("Vendor {0} has no contact email")]
    MissingVendorContact(Uuid),

    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("Concurrent modification: {0}")]
    StoreConflict(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(DbErr),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<DbErr> for ServiceError {
    fn from(err: DbErr) -> Self {
        if DbRetryPolicy.is_retryable(&err) {
            ServiceError::UpstreamUnavailable(err.to_string())
        } else {
            ServiceError::DatabaseError(err)
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut list: Vec<FieldError> = err
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    FieldError::new(field.to_string(), message)
                })
            })
            .collect();
        list.sort_by(|a, b| a.field.cmp(&b.field));
        ServiceError::ValidationError(FieldErrors(list))
    }
}

impl ServiceError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::ValidationError(FieldErrors::single(field, message))
    }

    pub fn invalid_transition(from: impl fmt::Display, to: impl fmt::Display) -> Self {
        ServiceError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Stable snake_case identifier used in error bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::WorkflowClosed { .. } => "workflow_closed",
            Self::OutOfSequence { .. } => "out_of_sequence",
            Self::OverDelivery { .. } => "over_delivery",
            Self::IncompleteDelivery { .. } => "incomplete_delivery",
            Self::DeliveryConfirmationRequired(_) => "delivery_confirmation_required",
            Self::DuplicateWorkflow(_) => "duplicate_workflow",
            Self::SelfApprovalForbidden(_) => "self_approval_forbidden",
            Self::UnknownApprover(_) => "unknown_approver",
            Self::AlreadyActed(_) => "already_acted",
            Self::MissingVendorContact(_) => "missing_vendor_contact",
            Self::ValidationError(_) => "validation_error",
            Self::StoreConflict(_) => "store_conflict",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::DatabaseError(_) => "database_error",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Structured diagnostics for the error body, when the variant has any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::OverDelivery {
                ordered,
                already_received,
                attempted,
            } => Some(json!({
                "ordered": ordered,
                "already_received": already_received,
                "attempted": attempted,
            })),
            Self::IncompleteDelivery { ordered, received } => Some(json!({
                "ordered": ordered,
                "received": received,
            })),
            Self::InvalidTransition { from, to } => Some(json!({ "from": from, "to": to })),
            Self::OutOfSequence { actor_id, expected } => Some(json!({
                "actor_id": actor_id,
                "expected": expected,
            })),
            Self::ValidationError(errors) => serde_json::to_value(errors).ok(),
            _ => None,
        }
    }

    /// Whether the service layer may transparently re-run the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreConflict(_))
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Forbidden(_) | Self::SelfApprovalForbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTransition { .. }
            | Self::WorkflowClosed { .. }
            | Self::OutOfSequence { .. }
            | Self::DuplicateWorkflow(_)
            | Self::AlreadyActed(_)
            | Self::StoreConflict(_) => StatusCode::CONFLICT,
            Self::OverDelivery { .. }
            | Self::IncompleteDelivery { .. }
            | Self::DeliveryConfirmationRequired(_)
            | Self::UnknownApprover(_)
            | Self::MissingVendorContact(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::UpstreamUnavailable(_) => "Service temporarily unavailable".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            kind: self.kind().to_string(),
            message: self.response_message(),
            details: self.details(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

/// API Error type for HTTP responses
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Service error: {0}")]
    ServiceError(#[from] ServiceError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::ServiceError(service_error) => return service_error.into_response(),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
        };

        let error_response = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            kind: kind.to_string(),
            message,
            details: None,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(error_response)).into_response()
    }
}

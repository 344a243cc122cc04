/*!
 * # Procurement Service
 *
 * Entry point for the request-handling layer. Every operation gates on the
 * [`AccessResolver`] first, then runs a load-validate-save cycle against the
 * store through the state machine, the delivery reconciler or the approval
 * engine. Cycles that lose an optimistic-concurrency race are re-run up to
 * the configured number of attempts; every other failure is returned as is.
 */

use crate::{
    auth::{AccessResolver, Capability, Principal, PrincipalDirectory, ProjectScope},
    errors::ServiceError,
    events::EventSender,
    middleware_helpers::RetryConfig,
    models::{
        ApprovalAction, ApprovalWorkflow, DeliveryConfirmation, PurchaseOrder, PurchaseRequest,
    },
    notifications::NotificationService,
    services::{
        approval_workflow::{ApprovalWorkflowEngine, ConditionalRoute},
        delivery_reconciler::{self, DeliveryMetadata, DeliveryReconciler, DeliveryTiming},
        state_machine::ProcurementStateMachine,
        vendors::VendorDirectory,
    },
    store::{ProcurementStore, ProjectRestriction},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use slog::Logger;
use std::sync::Arc;
use uuid::Uuid;
use validator::ValidationError;

mod approvals;
mod deliveries;
mod materials;
mod orders;
mod requests;
mod vendors;

pub use approvals::StartWorkflowRequest;
pub use deliveries::{ConfirmDeliveryRequest, PendingDeliveryQuery, UpdateDeliveryRequest};
pub use materials::{BulkMaterialReview, BulkMaterialUpdate, MaterialReview, NewMaterialSubmittal};
pub use orders::{NewPurchaseOrder, PurchaseOrderUpdate};
pub use requests::{NewPurchaseRequest, PurchaseRequestUpdate, SubmitForApproval};
pub use vendors::NewVendor;

/// Collaborators the service is assembled from.
#[derive(Clone)]
pub struct ProcurementDeps {
    pub store: Arc<dyn ProcurementStore>,
    pub access: Arc<dyn AccessResolver>,
    pub vendors: Arc<dyn VendorDirectory>,
    pub principals: Arc<dyn PrincipalDirectory>,
    pub notifier: Arc<dyn NotificationService>,
    pub events: EventSender,
    pub retry: RetryConfig,
    pub logger: Logger,
}

#[derive(Clone)]
pub struct ProcurementService {
    store: Arc<dyn ProcurementStore>,
    access: Arc<dyn AccessResolver>,
    vendors: Arc<dyn VendorDirectory>,
    state_machine: ProcurementStateMachine,
    reconciler: DeliveryReconciler,
    approvals: ApprovalWorkflowEngine,
    notifier: Arc<dyn NotificationService>,
    events: EventSender,
    retry: RetryConfig,
    audit: Logger,
}

/// An order together with its derived delivery accounting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: PurchaseOrder,
    pub delivery: DeliveryMetadata,
}

/// A confirmation with its timing against the order's expected date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryView {
    #[serde(flatten)]
    pub confirmation: DeliveryConfirmation,
    pub timing: Option<DeliveryTiming>,
}

impl DeliveryView {
    pub fn new(confirmation: DeliveryConfirmation, order: &PurchaseOrder) -> Self {
        let timing = delivery_reconciler::delivery_timing(
            confirmation.delivery_date,
            order.expected_delivery_date,
        );
        Self {
            confirmation,
            timing,
        }
    }
}

/// Result of a delivery write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryResult {
    pub order: OrderView,
    pub confirmation: Option<DeliveryView>,
}

/// A workflow with its audit trail and who may act next.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowView {
    #[serde(flatten)]
    pub workflow: ApprovalWorkflow,
    pub outstanding_approvers: Vec<Uuid>,
    pub next_approver: Option<Uuid>,
    pub actions: Vec<ApprovalAction>,
}

impl WorkflowView {
    pub fn new(workflow: ApprovalWorkflow, actions: Vec<ApprovalAction>) -> Self {
        let next_approver = if workflow.is_open() {
            workflow.next_in_sequence()
        } else {
            None
        };
        Self {
            outstanding_approvers: workflow.outstanding_approvers(),
            next_approver,
            actions,
            workflow,
        }
    }
}

/// A request after submission, with the workflow that now governs it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSubmission {
    pub request: PurchaseRequest,
    pub workflow: ApprovalWorkflow,
}

impl ProcurementService {
    pub fn new(deps: ProcurementDeps) -> Self {
        let state_machine = ProcurementStateMachine::new(
            deps.store.clone(),
            deps.vendors.clone(),
            deps.notifier.clone(),
        );
        let reconciler = DeliveryReconciler::new(deps.store.clone());
        let approvals = ApprovalWorkflowEngine::new(
            deps.store.clone(),
            deps.principals.clone(),
            deps.notifier.clone(),
        );
        Self {
            store: deps.store,
            access: deps.access,
            vendors: deps.vendors,
            state_machine,
            reconciler,
            approvals,
            notifier: deps.notifier,
            events: deps.events,
            retry: deps.retry,
            audit: crate::logging::component_logger(&deps.logger, "procurement_service"),
        }
    }

    /// Installs the branching policy used by conditional workflows.
    pub fn with_conditional_route(mut self, route: Arc<dyn ConditionalRoute>) -> Self {
        self.approvals = self.approvals.with_conditional_route(route);
        self
    }

    pub fn approvals(&self) -> &ApprovalWorkflowEngine {
        &self.approvals
    }

    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }

    async fn authorize(
        &self,
        actor: &Principal,
        project_id: Uuid,
        capability: Capability,
    ) -> Result<(), ServiceError> {
        self.access.authorize(actor, project_id, capability).await
    }

    fn require_purchase_department(&self, actor: &Principal) -> Result<(), ServiceError> {
        if actor.role.is_purchase_department() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "role {} is not part of the purchase department",
                actor.role
            )))
        }
    }

    async fn restriction(&self, actor: &Principal) -> Result<ProjectRestriction, ServiceError> {
        Ok(match self.access.visible_projects(actor).await? {
            ProjectScope::All => None,
            ProjectScope::Only(ids) => Some(ids),
        })
    }

    async fn load_request(&self, id: Uuid) -> Result<PurchaseRequest, ServiceError> {
        self.store
            .get_request(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase request {}", id)))
    }

    async fn load_order(&self, id: Uuid) -> Result<PurchaseOrder, ServiceError> {
        self.store
            .get_order(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase order {}", id)))
    }

    /// Builds the read model of an order.
    pub async fn order_view(&self, order: PurchaseOrder) -> Result<OrderView, ServiceError> {
        let ordered = delivery_reconciler::ordered_quantity(self.store.as_ref(), &order).await?;
        let deliveries = self.store.list_deliveries(order.id).await?;
        let delivery = DeliveryMetadata::compute(&order, ordered, &deliveries, self.today());
        Ok(OrderView { order, delivery })
    }
}

pub(crate) fn positive_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        let mut err = ValidationError::new("positive");
        err.message = Some("must be greater than zero".into());
        Err(err)
    }
}

pub(crate) fn non_negative_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if *value >= Decimal::ZERO {
        Ok(())
    } else {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("must not be negative".into());
        Err(err)
    }
}

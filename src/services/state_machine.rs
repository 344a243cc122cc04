/*!
 * # Procurement State Machine
 *
 * Legal status transitions for purchase requests and purchase orders, plus
 * the guards each order transition must pass before it is persisted.
 *
 * ```text
 * request: draft -> pending_approval -> {approved, rejected}
 *          draft | pending_approval -> cancelled
 *
 * order:   draft -> {sent, cancelled}
 *          sent -> {confirmed, cancelled}
 *          confirmed -> {delivered, cancelled}
 *          delivered -> completed
 * ```
 */

use crate::{
    auth::Principal,
    errors::ServiceError,
    metrics,
    models::{PurchaseOrder, PurchaseOrderStatus, PurchaseRequest, RequestStatus},
    notifications::{notify_best_effort, Notification, NotificationService, NotificationType},
    services::{delivery_reconciler, vendors::VendorDirectory},
    store::ProcurementStore,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Direct successors of a request status.
pub fn request_successors(status: RequestStatus) -> &'static [RequestStatus] {
    use RequestStatus::*;
    match status {
        Draft => &[PendingApproval, Cancelled],
        PendingApproval => &[Approved, Rejected, Cancelled],
        Approved | Rejected | Cancelled => &[],
    }
}

/// Direct successors of an order status. No skipping.
pub fn order_successors(status: PurchaseOrderStatus) -> &'static [PurchaseOrderStatus] {
    use PurchaseOrderStatus::*;
    match status {
        Draft => &[Sent, Cancelled],
        Sent => &[Confirmed, Cancelled],
        Confirmed => &[Delivered, Cancelled],
        Delivered => &[Completed],
        Completed | Cancelled => &[],
    }
}

pub fn can_transition_request(from: RequestStatus, to: RequestStatus) -> bool {
    request_successors(from).contains(&to)
}

pub fn can_transition_order(from: PurchaseOrderStatus, to: PurchaseOrderStatus) -> bool {
    order_successors(from).contains(&to)
}

/// Purchase-department roles may edit any order; the creator may edit their
/// own order until it has been delivered.
pub fn check_order_edit_permission(
    order: &PurchaseOrder,
    actor: &Principal,
) -> Result<(), ServiceError> {
    if actor.role.is_purchase_department() {
        return Ok(());
    }
    let creator_may_edit = order.created_by == actor.id
        && !matches!(
            order.status,
            PurchaseOrderStatus::Delivered | PurchaseOrderStatus::Completed
        );
    if creator_may_edit {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "principal {} may not modify purchase order {}",
            actor.id, order.po_number
        )))
    }
}

/// Applies status changes to requests and orders.
#[derive(Clone)]
pub struct ProcurementStateMachine {
    store: Arc<dyn ProcurementStore>,
    vendors: Arc<dyn VendorDirectory>,
    notifier: Arc<dyn NotificationService>,
}

impl ProcurementStateMachine {
    pub fn new(
        store: Arc<dyn ProcurementStore>,
        vendors: Arc<dyn VendorDirectory>,
        notifier: Arc<dyn NotificationService>,
    ) -> Self {
        Self {
            store,
            vendors,
            notifier,
        }
    }

    /// Moves a request to `target` if the table allows it.
    #[instrument(skip(self, request), fields(request_id = %request.id, from = %request.status, to = %target))]
    pub async fn transition_request(
        &self,
        mut request: PurchaseRequest,
        target: RequestStatus,
    ) -> Result<PurchaseRequest, ServiceError> {
        if !can_transition_request(request.status, target) {
            return Err(ServiceError::invalid_transition(request.status, target));
        }
        let expected = request.version;
        request.status = target;
        self.store.update_request(request, expected).await
    }

    /// Validates and persists an order status change.
    ///
    /// Guards run in order: edit permission, transition table, vendor contact
    /// for `sent`, at least one confirmation for `delivered`, full quantity
    /// for `completed`. A vendor notification is attempted after a successful
    /// move to `sent`; its failure does not undo the transition.
    #[instrument(skip(self, order, actor), fields(order_id = %order.id, actor_id = %actor.id, to = %target))]
    pub async fn transition_order(
        &self,
        order: PurchaseOrder,
        target: PurchaseOrderStatus,
        actor: &Principal,
    ) -> Result<PurchaseOrder, ServiceError> {
        let from = order.status;
        match self.apply_order_transition(order, target, actor).await {
            Ok(updated) => {
                let (from_label, to_label) = (from.to_string(), target.to_string());
                metrics::ORDER_TRANSITIONS
                    .with_label_values(&[from_label.as_str(), to_label.as_str()])
                    .inc();
                info!(%from, to = %target, "purchase order transitioned");
                if target == PurchaseOrderStatus::Sent {
                    self.notify_vendor(&updated).await;
                }
                Ok(updated)
            }
            Err(err) => {
                metrics::ORDER_TRANSITION_FAILURES
                    .with_label_values(&[err.kind()])
                    .inc();
                Err(err)
            }
        }
    }

    async fn apply_order_transition(
        &self,
        mut order: PurchaseOrder,
        target: PurchaseOrderStatus,
        actor: &Principal,
    ) -> Result<PurchaseOrder, ServiceError> {
        check_order_edit_permission(&order, actor)?;

        if !can_transition_order(order.status, target) {
            return Err(ServiceError::invalid_transition(order.status, target));
        }

        match target {
            PurchaseOrderStatus::Sent => {
                if self.vendors.contact_email(order.vendor_id).await?.is_none() {
                    return Err(ServiceError::MissingVendorContact(order.vendor_id));
                }
            }
            PurchaseOrderStatus::Delivered => {
                if self.store.list_deliveries(order.id).await?.is_empty() {
                    return Err(ServiceError::DeliveryConfirmationRequired(order.id));
                }
            }
            PurchaseOrderStatus::Completed => {
                let ordered = self.ordered_quantity(&order).await?;
                let deliveries = self.store.list_deliveries(order.id).await?;
                let received = delivery_reconciler::received_total(&deliveries, None);
                if received != ordered {
                    return Err(ServiceError::IncompleteDelivery { ordered, received });
                }
            }
            _ => {}
        }

        let expected = order.version;
        order.status = target;
        order.status_changed_at = Utc::now();
        self.store.update_order(order, expected).await
    }

    /// Quantity ordered, taken from the source request.
    pub async fn ordered_quantity(&self, order: &PurchaseOrder) -> Result<Decimal, ServiceError> {
        delivery_reconciler::ordered_quantity(self.store.as_ref(), order).await
    }

    async fn notify_vendor(&self, order: &PurchaseOrder) {
        let address = match self.vendors.contact_email(order.vendor_id).await {
            Ok(Some(address)) => address,
            Ok(None) => return,
            Err(err) => {
                warn!(order_id = %order.id, error = %err, "vendor lookup for notification failed");
                return;
            }
        };
        let notification = Notification::new(
            NotificationType::PurchaseOrderSent,
            order.id,
            format!("Purchase order {} has been issued", order.po_number),
        )
        .with_address(address);
        notify_best_effort(self.notifier.as_ref(), order.vendor_id, notification).await;
    }
}

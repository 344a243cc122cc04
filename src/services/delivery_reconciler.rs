/*!
 * # Delivery Reconciler
 *
 * Keeps an order's received quantity consistent with its confirmations.
 * The sum of `quantity_received` over an order's confirmations never exceeds
 * the quantity on the source request. Every write goes through
 * [`ProcurementStore::apply_delivery_change`], which bumps the order version
 * in the same unit, so two concurrent partial deliveries cannot both pass
 * the over-delivery check.
 */

use crate::{
    auth::Principal,
    errors::ServiceError,
    metrics,
    models::{
        ConfirmationStatus, DeliveryConfirmation, PhotoRefs, PurchaseOrder, PurchaseOrderStatus,
    },
    store::{DeliveryChange, ProcurementStore},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Timing of a confirmation against the order's expected delivery date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryTiming {
    OnTime,
    Early,
    Late,
}

/// Derived quantity accounting for one order. Computed on read, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeliveryMetadata {
    #[schema(value_type = String)]
    pub ordered_quantity: Decimal,
    #[schema(value_type = String)]
    pub received_quantity: Decimal,
    #[schema(value_type = String)]
    pub remaining_quantity: Decimal,
    #[schema(value_type = String)]
    pub completion_percentage: Decimal,
    pub confirmation_count: usize,
    pub is_overdue: bool,
    pub days_overdue: i64,
}

impl DeliveryMetadata {
    pub fn compute(
        order: &PurchaseOrder,
        ordered: Decimal,
        deliveries: &[DeliveryConfirmation],
        today: NaiveDate,
    ) -> Self {
        let received = received_total(deliveries, None);
        let overdue = days_overdue(order.expected_delivery_date, ordered, received, today);
        Self {
            ordered_quantity: ordered,
            received_quantity: received,
            remaining_quantity: (ordered - received).max(Decimal::ZERO),
            completion_percentage: completion_percentage(ordered, received),
            confirmation_count: deliveries.len(),
            is_overdue: overdue > 0,
            days_overdue: overdue,
        }
    }
}

/// Fields of a new confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDelivery {
    pub delivery_date: NaiveDate,
    pub quantity_received: Decimal,
    pub condition_notes: Option<String>,
    pub photo_refs: Vec<String>,
    pub status: ConfirmationStatus,
}

/// Partial edit of an existing confirmation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryEdit {
    pub delivery_date: Option<NaiveDate>,
    pub quantity_received: Option<Decimal>,
    pub condition_notes: Option<String>,
    pub photo_refs: Option<Vec<String>>,
    pub status: Option<ConfirmationStatus>,
}

/// Result of a delivery write: the order as persisted plus the new total.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledDelivery {
    pub order: PurchaseOrder,
    pub confirmation: Option<DeliveryConfirmation>,
    pub total_received: Decimal,
}

/// Sum of received quantities, skipping `excluding` when set.
pub fn received_total(deliveries: &[DeliveryConfirmation], excluding: Option<Uuid>) -> Decimal {
    deliveries
        .iter()
        .filter(|d| Some(d.id) != excluding)
        .map(|d| d.quantity_received)
        .sum()
}

/// `received / ordered * 100`, rounded to two places; zero when nothing was ordered.
pub fn completion_percentage(ordered: Decimal, received: Decimal) -> Decimal {
    if ordered.is_zero() {
        return Decimal::ZERO;
    }
    (received / ordered * Decimal::ONE_HUNDRED).round_dp(2)
}

pub fn delivery_timing(
    delivery_date: NaiveDate,
    expected: Option<NaiveDate>,
) -> Option<DeliveryTiming> {
    let expected = expected?;
    Some(match delivery_date.cmp(&expected) {
        std::cmp::Ordering::Less => DeliveryTiming::Early,
        std::cmp::Ordering::Equal => DeliveryTiming::OnTime,
        std::cmp::Ordering::Greater => DeliveryTiming::Late,
    })
}

/// Whole days past the expected date while quantity is still outstanding.
pub fn days_overdue(
    expected: Option<NaiveDate>,
    ordered: Decimal,
    received: Decimal,
    today: NaiveDate,
) -> i64 {
    match expected {
        Some(expected) if expected < today && received < ordered => (today - expected).num_days(),
        _ => 0,
    }
}

/// Status the order should hold after its received total moves from
/// `before` to `after`.
///
/// Reaching the full quantity advances `confirmed` to `delivered`. Only a
/// change that lowers the total (a removal, or an edit downwards) reverts a
/// short `delivered` order to `confirmed`; a manual `delivered` with a partial
/// quantity survives further confirmations.
pub fn reconciled_status(
    current: PurchaseOrderStatus,
    ordered: Decimal,
    before: Decimal,
    after: Decimal,
) -> Option<PurchaseOrderStatus> {
    match current {
        PurchaseOrderStatus::Confirmed if after == ordered => Some(PurchaseOrderStatus::Delivered),
        PurchaseOrderStatus::Delivered if after < ordered && after < before => {
            Some(PurchaseOrderStatus::Confirmed)
        }
        _ => None,
    }
}

/// Quantity ordered, taken from the order's source request.
pub async fn ordered_quantity(
    store: &dyn ProcurementStore,
    order: &PurchaseOrder,
) -> Result<Decimal, ServiceError> {
    store
        .get_request(order.request_id)
        .await?
        .map(|r| r.quantity)
        .ok_or_else(|| {
            ServiceError::InternalError(format!(
                "source request {} of order {} is missing",
                order.request_id, order.id
            ))
        })
}

fn ensure_accepts_deliveries(order: &PurchaseOrder) -> Result<(), ServiceError> {
    if order.status.accepts_deliveries() {
        Ok(())
    } else {
        Err(ServiceError::invalid_transition(order.status, "delivery"))
    }
}

fn validate_quantity(quantity: Decimal) -> Result<(), ServiceError> {
    if quantity.is_sign_negative() {
        return Err(ServiceError::validation(
            "quantity_received",
            "must not be negative",
        ));
    }
    Ok(())
}

fn validate_date(date: NaiveDate, today: NaiveDate) -> Result<(), ServiceError> {
    if date > today {
        return Err(ServiceError::validation(
            "delivery_date",
            "must not be in the future",
        ));
    }
    Ok(())
}

fn check_over_delivery(
    ordered: Decimal,
    already_received: Decimal,
    attempted: Decimal,
) -> Result<(), ServiceError> {
    if already_received + attempted > ordered {
        metrics::OVER_DELIVERY_REJECTIONS.inc();
        warn!(%ordered, %already_received, %attempted, "over-delivery rejected");
        return Err(ServiceError::OverDelivery {
            ordered,
            already_received,
            attempted,
        });
    }
    Ok(())
}

#[derive(Clone)]
pub struct DeliveryReconciler {
    store: Arc<dyn ProcurementStore>,
}

impl DeliveryReconciler {
    pub fn new(store: Arc<dyn ProcurementStore>) -> Self {
        Self { store }
    }

    /// Records a confirmation against `order`, read at its current version.
    #[instrument(skip(self, order, input, actor), fields(order_id = %order.id, actor_id = %actor.id))]
    pub async fn confirm_delivery(
        &self,
        order: &PurchaseOrder,
        input: NewDelivery,
        actor: &Principal,
        today: NaiveDate,
    ) -> Result<ReconciledDelivery, ServiceError> {
        ensure_accepts_deliveries(order)?;
        validate_quantity(input.quantity_received)?;
        validate_date(input.delivery_date, today)?;

        let ordered = ordered_quantity(self.store.as_ref(), order).await?;
        let existing = self.store.list_deliveries(order.id).await?;
        let other_received = received_total(&existing, None);
        check_over_delivery(ordered, other_received, input.quantity_received)?;

        let now = Utc::now();
        let confirmation = DeliveryConfirmation {
            id: Uuid::new_v4(),
            purchase_order_id: order.id,
            delivery_date: input.delivery_date,
            quantity_received: input.quantity_received,
            confirmed_by: actor.id,
            condition_notes: input.condition_notes,
            photo_refs: PhotoRefs(input.photo_refs),
            status: input.status,
            created_at: now,
            updated_at: now,
        };

        let total = other_received + confirmation.quantity_received;
        let updated = self
            .store
            .apply_delivery_change(
                order.id,
                order.version,
                DeliveryChange::Insert(confirmation.clone()),
                reconciled_status(order.status, ordered, other_received, total),
            )
            .await?;

        metrics::DELIVERY_CONFIRMATIONS
            .with_label_values(&["confirm"])
            .inc();
        info!(%total, %ordered, status = %updated.status, "delivery confirmed");

        Ok(ReconciledDelivery {
            order: updated,
            confirmation: Some(confirmation),
            total_received: total,
        })
    }

    /// Edits a confirmation; the over-delivery check excludes the row being edited.
    #[instrument(skip(self, order, edit), fields(order_id = %order.id, %delivery_id))]
    pub async fn update_delivery(
        &self,
        order: &PurchaseOrder,
        delivery_id: Uuid,
        edit: DeliveryEdit,
        today: NaiveDate,
    ) -> Result<ReconciledDelivery, ServiceError> {
        ensure_accepts_deliveries(order)?;

        let existing = self.store.list_deliveries(order.id).await?;
        let mut confirmation = existing
            .iter()
            .find(|d| d.id == delivery_id)
            .cloned()
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Delivery confirmation {}", delivery_id))
            })?;

        if let Some(quantity) = edit.quantity_received {
            validate_quantity(quantity)?;
            confirmation.quantity_received = quantity;
        }
        if let Some(date) = edit.delivery_date {
            validate_date(date, today)?;
            confirmation.delivery_date = date;
        }
        if let Some(notes) = edit.condition_notes {
            confirmation.condition_notes = Some(notes);
        }
        if let Some(photos) = edit.photo_refs {
            confirmation.photo_refs = PhotoRefs(photos);
        }
        if let Some(status) = edit.status {
            confirmation.status = status;
        }
        confirmation.updated_at = Utc::now();

        let ordered = ordered_quantity(self.store.as_ref(), order).await?;
        let previous = received_total(&existing, None);
        let other_received = received_total(&existing, Some(delivery_id));
        check_over_delivery(ordered, other_received, confirmation.quantity_received)?;

        let total = other_received + confirmation.quantity_received;
        let updated = self
            .store
            .apply_delivery_change(
                order.id,
                order.version,
                DeliveryChange::Update(confirmation.clone()),
                reconciled_status(order.status, ordered, previous, total),
            )
            .await?;

        metrics::DELIVERY_CONFIRMATIONS
            .with_label_values(&["update"])
            .inc();

        Ok(ReconciledDelivery {
            order: updated,
            confirmation: Some(confirmation),
            total_received: total,
        })
    }

    /// Removes a confirmation, reverting a delivered order that is no longer full.
    #[instrument(skip(self, order), fields(order_id = %order.id, %delivery_id))]
    pub async fn remove_delivery(
        &self,
        order: &PurchaseOrder,
        delivery_id: Uuid,
    ) -> Result<ReconciledDelivery, ServiceError> {
        ensure_accepts_deliveries(order)?;

        let existing = self.store.list_deliveries(order.id).await?;
        if !existing.iter().any(|d| d.id == delivery_id) {
            return Err(ServiceError::NotFound(format!(
                "Delivery confirmation {}",
                delivery_id
            )));
        }

        let ordered = ordered_quantity(self.store.as_ref(), order).await?;
        let previous = received_total(&existing, None);
        let remaining = received_total(&existing, Some(delivery_id));
        let updated = self
            .store
            .apply_delivery_change(
                order.id,
                order.version,
                DeliveryChange::Delete(delivery_id),
                reconciled_status(order.status, ordered, previous, remaining),
            )
            .await?;

        metrics::DELIVERY_CONFIRMATIONS
            .with_label_values(&["delete"])
            .inc();
        info!(%remaining, status = %updated.status, "delivery removed");

        Ok(ReconciledDelivery {
            order: updated,
            confirmation: None,
            total_received: remaining,
        })
    }
}

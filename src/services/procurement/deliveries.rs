use super::{
    non_negative_decimal, DeliveryResult, DeliveryView, OrderView, ProcurementService,
};
use crate::{
    auth::{Capability, Principal},
    errors::ServiceError,
    events::Event,
    middleware_helpers::{with_retry, ConflictRetryPolicy},
    models::{ConfirmationStatus, PurchaseOrderStatus},
    services::delivery_reconciler::{DeliveryEdit, NewDelivery, ReconciledDelivery},
    store::{OrderFilter, Page, PageRequest},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct ConfirmDeliveryRequest {
    pub delivery_date: NaiveDate,
    #[validate(custom = "non_negative_decimal")]
    #[schema(value_type = String)]
    pub quantity_received: Decimal,
    #[validate(length(max = 2000))]
    pub condition_notes: Option<String>,
    #[serde(default)]
    pub photo_refs: Vec<String>,
    #[serde(default)]
    pub status: Option<ConfirmationStatus>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateDeliveryRequest {
    pub delivery_date: Option<NaiveDate>,
    #[validate(custom = "non_negative_decimal")]
    #[schema(value_type = Option<String>)]
    pub quantity_received: Option<Decimal>,
    #[validate(length(max = 2000))]
    pub condition_notes: Option<String>,
    pub photo_refs: Option<Vec<String>>,
    pub status: Option<ConfirmationStatus>,
}

/// Filters for orders still waiting on goods.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct PendingDeliveryQuery {
    pub project_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    #[serde(default)]
    pub overdue_only: bool,
}

impl From<ConfirmDeliveryRequest> for NewDelivery {
    fn from(input: ConfirmDeliveryRequest) -> Self {
        NewDelivery {
            delivery_date: input.delivery_date,
            quantity_received: input.quantity_received,
            condition_notes: input.condition_notes,
            photo_refs: input.photo_refs,
            status: input.status.unwrap_or(ConfirmationStatus::Received),
        }
    }
}

impl From<UpdateDeliveryRequest> for DeliveryEdit {
    fn from(input: UpdateDeliveryRequest) -> Self {
        DeliveryEdit {
            delivery_date: input.delivery_date,
            quantity_received: input.quantity_received,
            condition_notes: input.condition_notes,
            photo_refs: input.photo_refs,
            status: input.status,
        }
    }
}

impl ProcurementService {
    /// Records a (possibly partial) delivery against an order.
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.id, %order_id))]
    pub async fn confirm_delivery(
        &self,
        actor: &Principal,
        order_id: Uuid,
        input: ConfirmDeliveryRequest,
    ) -> Result<DeliveryResult, ServiceError> {
        input.validate()?;
        let today = self.today();
        let (outcome, previous) = with_retry(&self.retry, ConflictRetryPolicy, || {
            let input = input.clone();
            async move {
                let order = self.load_order(order_id).await?;
                self.authorize(actor, order.project_id, Capability::Edit)
                    .await?;
                let previous = order.status;
                let outcome = self
                    .reconciler
                    .confirm_delivery(&order, input.into(), actor, today)
                    .await?;
                Ok::<_, ServiceError>((outcome, previous))
            }
        })
        .await?;

        if let Some(confirmation) = &outcome.confirmation {
            slog::info!(self.audit, "delivery confirmed";
                "order_id" => %order_id, "confirmation_id" => %confirmation.id,
                "quantity" => %confirmation.quantity_received, "total" => %outcome.total_received,
                "actor_id" => %actor.id);
            self.events
                .send_or_log(Event::DeliveryRecorded {
                    order_id,
                    confirmation_id: confirmation.id,
                    quantity_received: confirmation.quantity_received,
                    total_received: outcome.total_received,
                })
                .await;
        }
        self.finish_delivery_write(outcome, previous).await
    }

    #[instrument(skip(self, actor, input), fields(actor_id = %actor.id, %order_id, %delivery_id))]
    pub async fn update_delivery(
        &self,
        actor: &Principal,
        order_id: Uuid,
        delivery_id: Uuid,
        input: UpdateDeliveryRequest,
    ) -> Result<DeliveryResult, ServiceError> {
        input.validate()?;
        let today = self.today();
        let (outcome, previous) = with_retry(&self.retry, ConflictRetryPolicy, || {
            let input = input.clone();
            async move {
                let order = self.load_order(order_id).await?;
                self.authorize(actor, order.project_id, Capability::Edit)
                    .await?;
                let previous = order.status;
                let outcome = self
                    .reconciler
                    .update_delivery(&order, delivery_id, input.into(), today)
                    .await?;
                Ok::<_, ServiceError>((outcome, previous))
            }
        })
        .await?;

        if let Some(confirmation) = &outcome.confirmation {
            slog::info!(self.audit, "delivery updated";
                "order_id" => %order_id, "confirmation_id" => %confirmation.id,
                "total" => %outcome.total_received, "actor_id" => %actor.id);
            self.events
                .send_or_log(Event::DeliveryRecorded {
                    order_id,
                    confirmation_id: confirmation.id,
                    quantity_received: confirmation.quantity_received,
                    total_received: outcome.total_received,
                })
                .await;
        }
        self.finish_delivery_write(outcome, previous).await
    }

    #[instrument(skip(self, actor), fields(actor_id = %actor.id, %order_id, %delivery_id))]
    pub async fn delete_delivery(
        &self,
        actor: &Principal,
        order_id: Uuid,
        delivery_id: Uuid,
    ) -> Result<DeliveryResult, ServiceError> {
        let (outcome, previous) = with_retry(&self.retry, ConflictRetryPolicy, || async move {
            let order = self.load_order(order_id).await?;
            self.authorize(actor, order.project_id, Capability::Delete)
                .await?;
            let previous = order.status;
            let outcome = self.reconciler.remove_delivery(&order, delivery_id).await?;
            Ok::<_, ServiceError>((outcome, previous))
        })
        .await?;

        slog::info!(self.audit, "delivery removed";
            "order_id" => %order_id, "confirmation_id" => %delivery_id,
            "total" => %outcome.total_received, "actor_id" => %actor.id);
        self.events
            .send_or_log(Event::DeliveryRemoved {
                order_id,
                confirmation_id: delivery_id,
                total_received: outcome.total_received,
            })
            .await;
        self.finish_delivery_write(outcome, previous).await
    }

    /// Confirmations of one order, oldest delivery first.
    pub async fn list_order_deliveries(
        &self,
        actor: &Principal,
        order_id: Uuid,
    ) -> Result<Vec<DeliveryView>, ServiceError> {
        let order = self.load_order(order_id).await?;
        self.authorize(actor, order.project_id, Capability::View)
            .await?;
        Ok(self
            .store
            .list_deliveries(order.id)
            .await?
            .into_iter()
            .map(|d| DeliveryView::new(d, &order))
            .collect())
    }

    /// Orders in `sent`, `confirmed` or `delivered` that still have quantity
    /// outstanding, newest first.
    pub async fn list_pending_deliveries(
        &self,
        actor: &Principal,
        query: PendingDeliveryQuery,
        page: PageRequest,
    ) -> Result<Page<OrderView>, ServiceError> {
        let filter = OrderFilter {
            visible_projects: self.restriction(actor).await?,
            project_id: query.project_id,
            vendor_id: query.vendor_id,
            statuses: vec![
                PurchaseOrderStatus::Sent,
                PurchaseOrderStatus::Confirmed,
                PurchaseOrderStatus::Delivered,
            ],
        };
        let candidates = self.store.list_orders(&filter, PageRequest::all()).await?;

        let mut pending = Vec::new();
        for order in candidates.items {
            let view = self.order_view(order).await?;
            if view.delivery.remaining_quantity <= Decimal::ZERO {
                continue;
            }
            if query.overdue_only && !view.delivery.is_overdue {
                continue;
            }
            pending.push(view);
        }
        Ok(page.apply(pending))
    }

    async fn finish_delivery_write(
        &self,
        outcome: ReconciledDelivery,
        previous: PurchaseOrderStatus,
    ) -> Result<DeliveryResult, ServiceError> {
        self.emit_order_status(outcome.order.id, previous, outcome.order.status)
            .await;
        let confirmation = outcome
            .confirmation
            .map(|c| DeliveryView::new(c, &outcome.order));
        let order = self.order_view(outcome.order).await?;
        Ok(DeliveryResult {
            order,
            confirmation,
        })
    }
}

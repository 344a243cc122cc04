use super::{non_negative_decimal, OrderView, ProcurementService};
use crate::{
    auth::{Capability, Principal},
    errors::ServiceError,
    events::Event,
    middleware_helpers::{with_retry, ConflictRetryPolicy},
    models::{PurchaseOrder, PurchaseOrderStatus, RequestStatus},
    services::state_machine::check_order_edit_permission,
    store::{OrderFilter, Page, PageRequest},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct NewPurchaseOrder {
    pub request_id: Uuid,
    pub vendor_id: Uuid,
    /// Defaults to the request's estimated cost.
    #[validate(custom = "non_negative_decimal")]
    #[schema(value_type = Option<String>)]
    pub total_amount: Option<Decimal>,
    /// Defaults to today.
    pub po_date: Option<NaiveDate>,
    pub expected_delivery_date: Option<NaiveDate>,
    #[validate(length(max = 2000))]
    pub terms: Option<String>,
}

/// Field edits and an optional status move, applied in that order.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct PurchaseOrderUpdate {
    /// Only while the order is still a draft.
    pub vendor_id: Option<Uuid>,
    #[validate(custom = "non_negative_decimal")]
    #[schema(value_type = Option<String>)]
    pub total_amount: Option<Decimal>,
    pub expected_delivery_date: Option<NaiveDate>,
    #[validate(length(max = 2000))]
    pub terms: Option<String>,
    pub status: Option<PurchaseOrderStatus>,
}

impl PurchaseOrderUpdate {
    fn has_field_edits(&self) -> bool {
        self.vendor_id.is_some()
            || self.total_amount.is_some()
            || self.expected_delivery_date.is_some()
            || self.terms.is_some()
    }
}

/// `PO-YYYYMMDD-xxxxxx`, unique per order id.
pub fn generate_po_number(date: NaiveDate, order_id: Uuid) -> String {
    let suffix: String = order_id.simple().to_string().chars().take(6).collect();
    format!("PO-{}-{}", date.format("%Y%m%d"), suffix.to_uppercase())
}

impl ProcurementService {
    /// Converts an approved request into a draft purchase order.
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.id, request_id = %input.request_id))]
    pub async fn create_order(
        &self,
        actor: &Principal,
        input: NewPurchaseOrder,
    ) -> Result<OrderView, ServiceError> {
        input.validate()?;
        self.require_purchase_department(actor)?;
        let order = with_retry(&self.retry, ConflictRetryPolicy, || {
            self.create_order_once(actor, input.clone())
        })
        .await?;

        slog::info!(self.audit, "purchase order created";
            "order_id" => %order.id, "po_number" => &order.po_number,
            "request_id" => %order.request_id, "actor_id" => %actor.id);
        self.events
            .send_or_log(Event::PurchaseOrderCreated {
                order_id: order.id,
                request_id: order.request_id,
                po_number: order.po_number.clone(),
            })
            .await;
        self.order_view(order).await
    }

    async fn create_order_once(
        &self,
        actor: &Principal,
        input: NewPurchaseOrder,
    ) -> Result<PurchaseOrder, ServiceError> {
        let request = self.load_request(input.request_id).await?;
        self.authorize(actor, request.project_id, Capability::Edit)
            .await?;
        let request = self.settle_request(request).await?;

        if self.store.find_order_by_request(request.id).await?.is_some() {
            return Err(ServiceError::invalid_transition("converted", "purchase_order"));
        }
        if request.status != RequestStatus::Approved {
            return Err(ServiceError::invalid_transition(
                request.status,
                "purchase_order",
            ));
        }
        if !self.vendors.is_active(input.vendor_id).await? {
            return Err(ServiceError::validation(
                "vendor_id",
                "vendor is not active",
            ));
        }
        let total_amount = input
            .total_amount
            .or(request.estimated_cost)
            .ok_or_else(|| {
                ServiceError::validation(
                    "total_amount",
                    "required when the request has no estimate",
                )
            })?;

        let now = Utc::now();
        let po_date = input.po_date.unwrap_or_else(|| self.today());
        let id = Uuid::new_v4();
        let order = PurchaseOrder {
            id,
            po_number: generate_po_number(po_date, id),
            request_id: request.id,
            project_id: request.project_id,
            vendor_id: input.vendor_id,
            total_amount,
            po_date,
            expected_delivery_date: input.expected_delivery_date,
            terms: input.terms,
            status: PurchaseOrderStatus::Draft,
            created_by: actor.id,
            version: 1,
            status_changed_at: now,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_order(order).await
    }

    pub async fn get_order(&self, actor: &Principal, id: Uuid) -> Result<OrderView, ServiceError> {
        let order = self.load_order(id).await?;
        self.authorize(actor, order.project_id, Capability::View)
            .await?;
        self.order_view(order).await
    }

    pub async fn list_orders(
        &self,
        actor: &Principal,
        mut filter: OrderFilter,
        page: PageRequest,
    ) -> Result<Page<OrderView>, ServiceError> {
        filter.visible_projects = self.restriction(actor).await?;
        let page = self.store.list_orders(&filter, page).await?;
        let mut views = Vec::with_capacity(page.items.len());
        for order in page.items {
            views.push(self.order_view(order).await?);
        }
        Ok(Page {
            items: views,
            total: page.total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    /// Applies field edits, then the requested status move if any.
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.id, order_id = %id))]
    pub async fn update_order(
        &self,
        actor: &Principal,
        id: Uuid,
        input: PurchaseOrderUpdate,
    ) -> Result<OrderView, ServiceError> {
        input.validate()?;
        let mut order = if input.has_field_edits() {
            with_retry(&self.retry, ConflictRetryPolicy, || {
                self.edit_order_once(actor, id, input.clone())
            })
            .await?
        } else {
            self.load_order(id).await?
        };

        if let Some(target) = input.status {
            order = self.transition_order_retrying(actor, id, target).await?;
        } else {
            self.authorize(actor, order.project_id, Capability::View)
                .await?;
        }
        self.order_view(order).await
    }

    async fn edit_order_once(
        &self,
        actor: &Principal,
        id: Uuid,
        input: PurchaseOrderUpdate,
    ) -> Result<PurchaseOrder, ServiceError> {
        let mut order = self.load_order(id).await?;
        self.authorize(actor, order.project_id, Capability::Edit)
            .await?;
        check_order_edit_permission(&order, actor)?;
        if matches!(
            order.status,
            PurchaseOrderStatus::Completed | PurchaseOrderStatus::Cancelled
        ) {
            return Err(ServiceError::invalid_transition(order.status, "edited"));
        }

        let expected = order.version;
        if let Some(vendor_id) = input.vendor_id {
            if order.status != PurchaseOrderStatus::Draft {
                return Err(ServiceError::validation(
                    "vendor_id",
                    "vendor can only change while the order is a draft",
                ));
            }
            if !self.vendors.is_active(vendor_id).await? {
                return Err(ServiceError::validation("vendor_id", "vendor is not active"));
            }
            order.vendor_id = vendor_id;
        }
        if let Some(total) = input.total_amount {
            order.total_amount = total;
        }
        if let Some(date) = input.expected_delivery_date {
            order.expected_delivery_date = Some(date);
        }
        if let Some(terms) = input.terms {
            order.terms = Some(terms);
        }
        let order = self.store.update_order(order, expected).await?;
        slog::info!(self.audit, "purchase order updated";
            "order_id" => %order.id, "actor_id" => %actor.id, "version" => order.version);
        Ok(order)
    }

    /// Moves an order to `target` through the transition table and guards.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id, order_id = %id, to = %target))]
    pub async fn transition_order(
        &self,
        actor: &Principal,
        id: Uuid,
        target: PurchaseOrderStatus,
    ) -> Result<OrderView, ServiceError> {
        let order = self.transition_order_retrying(actor, id, target).await?;
        self.order_view(order).await
    }

    async fn transition_order_retrying(
        &self,
        actor: &Principal,
        id: Uuid,
        target: PurchaseOrderStatus,
    ) -> Result<PurchaseOrder, ServiceError> {
        let (order, from) = with_retry(&self.retry, ConflictRetryPolicy, || async move {
            let order = self.load_order(id).await?;
            self.authorize(actor, order.project_id, Capability::Edit)
                .await?;
            let from = order.status;
            let order = self
                .state_machine
                .transition_order(order, target, actor)
                .await?;
            Ok::<_, ServiceError>((order, from))
        })
        .await?;

        slog::info!(self.audit, "purchase order transitioned";
            "order_id" => %order.id, "from" => %from, "to" => %order.status, "actor_id" => %actor.id);
        self.emit_order_status(order.id, from, order.status).await;
        Ok(order)
    }

    pub(super) async fn emit_order_status(
        &self,
        order_id: Uuid,
        old: PurchaseOrderStatus,
        new: PurchaseOrderStatus,
    ) {
        if old == new {
            return;
        }
        self.events
            .send_or_log(Event::PurchaseOrderStatusChanged {
                order_id,
                old_status: old.to_string(),
                new_status: new.to_string(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn po_number_carries_date_and_id_prefix() {
        let id = Uuid::parse_str("3f2a9c10-0000-4000-8000-000000000000").unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(generate_po_number(date, id), "PO-20260309-3F2A9C");
    }
}

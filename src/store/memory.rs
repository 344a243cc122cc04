use super::{
    DeliveryChange, MaterialFilter, OrderFilter, Page, PageRequest, ProcurementStore,
    RequestFilter,
};
use crate::errors::ServiceError;
use crate::models::{
    ApprovalAction, ApprovalWorkflow, DeliveryConfirmation, MaterialSubmittal, PurchaseOrder,
    PurchaseOrderStatus, PurchaseRequest, SubjectType, Vendor,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    vendors: HashMap<Uuid, Vendor>,
    requests: HashMap<Uuid, PurchaseRequest>,
    orders: HashMap<Uuid, PurchaseOrder>,
    deliveries: HashMap<Uuid, DeliveryConfirmation>,
    workflows: HashMap<Uuid, ApprovalWorkflow>,
    actions: Vec<ApprovalAction>,
    materials: HashMap<Uuid, MaterialSubmittal>,
}

/// Store backed by process memory. All tables sit behind one lock, so every
/// write is atomic with respect to every other.
#[derive(Default)]
pub struct InMemoryProcurementStore {
    tables: RwLock<Tables>,
    injected_conflicts: AtomicU32,
    injected_request_conflicts: AtomicU32,
}

impl InMemoryProcurementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` versioned writes fail with `StoreConflict`.
    pub fn inject_conflicts(&self, count: u32) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` purchase-request writes fail with `StoreConflict`,
    /// leaving every other table writable.
    pub fn inject_request_conflicts(&self, count: u32) {
        self.injected_request_conflicts.store(count, Ordering::SeqCst);
    }

    fn take_injected_conflict(&self, entity: &str) -> Result<(), ServiceError> {
        take_one(&self.injected_conflicts, entity)
    }
}

fn take_one(counter: &AtomicU32, entity: &str) -> Result<(), ServiceError> {
    let taken = counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if taken {
        Err(ServiceError::StoreConflict(format!("{} was modified concurrently", entity)))
    } else {
        Ok(())
    }
}

fn check_version(entity: &str, id: Uuid, stored: i32, expected: i32) -> Result<(), ServiceError> {
    if stored != expected {
        return Err(ServiceError::StoreConflict(format!(
            "{} {} is at version {}, expected {}",
            entity, id, stored, expected
        )));
    }
    Ok(())
}

fn not_found(entity: &str, id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("{} {}", entity, id))
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (chrono::DateTime<Utc>, Uuid)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl ProcurementStore for InMemoryProcurementStore {
    async fn get_vendor(&self, id: Uuid) -> Result<Option<Vendor>, ServiceError> {
        Ok(self.tables.read().await.vendors.get(&id).cloned())
    }

    async fn insert_vendor(&self, vendor: Vendor) -> Result<Vendor, ServiceError> {
        let mut tables = self.tables.write().await;
        tables.vendors.insert(vendor.id, vendor.clone());
        Ok(vendor)
    }

    async fn update_vendor(&self, mut vendor: Vendor) -> Result<Vendor, ServiceError> {
        let mut tables = self.tables.write().await;
        if !tables.vendors.contains_key(&vendor.id) {
            return Err(not_found("Vendor", vendor.id));
        }
        vendor.updated_at = Utc::now();
        tables.vendors.insert(vendor.id, vendor.clone());
        Ok(vendor)
    }

    async fn get_request(&self, id: Uuid) -> Result<Option<PurchaseRequest>, ServiceError> {
        Ok(self.tables.read().await.requests.get(&id).cloned())
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
        page: PageRequest,
    ) -> Result<Page<PurchaseRequest>, ServiceError> {
        let tables = self.tables.read().await;
        let mut items: Vec<PurchaseRequest> = tables
            .requests
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        newest_first(&mut items, |r| (r.created_at, r.id));
        Ok(page.apply(items))
    }

    async fn insert_request(
        &self,
        request: PurchaseRequest,
    ) -> Result<PurchaseRequest, ServiceError> {
        let mut tables = self.tables.write().await;
        tables.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn update_request(
        &self,
        mut request: PurchaseRequest,
        expected_version: i32,
    ) -> Result<PurchaseRequest, ServiceError> {
        take_one(&self.injected_request_conflicts, "Purchase request")?;
        self.take_injected_conflict("Purchase request")?;
        let mut tables = self.tables.write().await;
        let stored = tables
            .requests
            .get(&request.id)
            .ok_or_else(|| not_found("Purchase request", request.id))?;
        check_version("Purchase request", request.id, stored.version, expected_version)?;
        request.version = expected_version + 1;
        request.updated_at = Utc::now();
        tables.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<PurchaseOrder>, ServiceError> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn find_order_by_request(
        &self,
        request_id: Uuid,
    ) -> Result<Option<PurchaseOrder>, ServiceError> {
        Ok(self
            .tables
            .read()
            .await
            .orders
            .values()
            .find(|o| o.request_id == request_id)
            .cloned())
    }

    async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: PageRequest,
    ) -> Result<Page<PurchaseOrder>, ServiceError> {
        let tables = self.tables.read().await;
        let mut items: Vec<PurchaseOrder> = tables
            .orders
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        newest_first(&mut items, |o| (o.created_at, o.id));
        Ok(page.apply(items))
    }

    async fn insert_order(&self, order: PurchaseOrder) -> Result<PurchaseOrder, ServiceError> {
        let mut tables = self.tables.write().await;
        if tables.orders.values().any(|o| o.request_id == order.request_id) {
            return Err(ServiceError::StoreConflict(format!(
                "purchase request {} already has an order",
                order.request_id
            )));
        }
        if tables.orders.values().any(|o| o.po_number == order.po_number) {
            return Err(ServiceError::StoreConflict(format!(
                "PO number {} already in use",
                order.po_number
            )));
        }
        tables.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn update_order(
        &self,
        mut order: PurchaseOrder,
        expected_version: i32,
    ) -> Result<PurchaseOrder, ServiceError> {
        self.take_injected_conflict("Purchase order")?;
        let mut tables = self.tables.write().await;
        let stored = tables
            .orders
            .get(&order.id)
            .ok_or_else(|| not_found("Purchase order", order.id))?;
        check_version("Purchase order", order.id, stored.version, expected_version)?;
        order.version = expected_version + 1;
        order.updated_at = Utc::now();
        tables.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_delivery(&self, id: Uuid) -> Result<Option<DeliveryConfirmation>, ServiceError> {
        Ok(self.tables.read().await.deliveries.get(&id).cloned())
    }

    async fn list_deliveries(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<DeliveryConfirmation>, ServiceError> {
        let tables = self.tables.read().await;
        let mut items: Vec<DeliveryConfirmation> = tables
            .deliveries
            .values()
            .filter(|d| d.purchase_order_id == order_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| (a.delivery_date, a.created_at).cmp(&(b.delivery_date, b.created_at)));
        Ok(items)
    }

    async fn apply_delivery_change(
        &self,
        order_id: Uuid,
        expected_order_version: i32,
        change: DeliveryChange,
        new_status: Option<PurchaseOrderStatus>,
    ) -> Result<PurchaseOrder, ServiceError> {
        self.take_injected_conflict("Purchase order")?;
        let mut tables = self.tables.write().await;
        let mut order = tables
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| not_found("Purchase order", order_id))?;
        check_version("Purchase order", order_id, order.version, expected_order_version)?;

        match change {
            DeliveryChange::Insert(delivery) => {
                tables.deliveries.insert(delivery.id, delivery);
            }
            DeliveryChange::Update(delivery) => {
                match tables.deliveries.get(&delivery.id) {
                    Some(existing) if existing.purchase_order_id == order_id => {}
                    _ => return Err(not_found("Delivery confirmation", delivery.id)),
                }
                tables.deliveries.insert(delivery.id, delivery);
            }
            DeliveryChange::Delete(id) => {
                match tables.deliveries.get(&id) {
                    Some(existing) if existing.purchase_order_id == order_id => {}
                    _ => return Err(not_found("Delivery confirmation", id)),
                }
                tables.deliveries.remove(&id);
            }
        }

        let now = Utc::now();
        if let Some(status) = new_status {
            if status != order.status {
                order.status = status;
                order.status_changed_at = now;
            }
        }
        order.version = expected_order_version + 1;
        order.updated_at = now;
        tables.orders.insert(order_id, order.clone());
        Ok(order)
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Option<ApprovalWorkflow>, ServiceError> {
        Ok(self.tables.read().await.workflows.get(&id).cloned())
    }

    async fn find_active_workflow(
        &self,
        subject_type: SubjectType,
        subject_id: Uuid,
    ) -> Result<Option<ApprovalWorkflow>, ServiceError> {
        Ok(self
            .tables
            .read()
            .await
            .workflows
            .values()
            .find(|w| w.subject_type == subject_type && w.subject_id == subject_id && w.is_open())
            .cloned())
    }

    async fn list_workflows_for_subject(
        &self,
        subject_type: SubjectType,
        subject_id: Uuid,
    ) -> Result<Vec<ApprovalWorkflow>, ServiceError> {
        let tables = self.tables.read().await;
        let mut items: Vec<ApprovalWorkflow> = tables
            .workflows
            .values()
            .filter(|w| w.subject_type == subject_type && w.subject_id == subject_id)
            .cloned()
            .collect();
        newest_first(&mut items, |w| (w.created_at, w.id));
        Ok(items)
    }

    async fn insert_workflow(
        &self,
        workflow: ApprovalWorkflow,
        initial_actions: Vec<ApprovalAction>,
    ) -> Result<ApprovalWorkflow, ServiceError> {
        let mut tables = self.tables.write().await;
        let duplicate = tables.workflows.values().any(|w| {
            w.subject_type == workflow.subject_type
                && w.subject_id == workflow.subject_id
                && w.is_open()
        });
        if duplicate {
            return Err(ServiceError::DuplicateWorkflow(workflow.subject_key()));
        }
        tables.workflows.insert(workflow.id, workflow.clone());
        tables.actions.extend(initial_actions);
        Ok(workflow)
    }

    async fn commit_workflow(
        &self,
        mut workflow: ApprovalWorkflow,
        expected_version: i32,
        actions: Vec<ApprovalAction>,
    ) -> Result<ApprovalWorkflow, ServiceError> {
        self.take_injected_conflict("Approval workflow")?;
        let mut tables = self.tables.write().await;
        let stored = tables
            .workflows
            .get(&workflow.id)
            .ok_or_else(|| not_found("Approval workflow", workflow.id))?;
        check_version("Approval workflow", workflow.id, stored.version, expected_version)?;
        workflow.version = expected_version + 1;
        workflow.updated_at = Utc::now();
        tables.workflows.insert(workflow.id, workflow.clone());
        tables.actions.extend(actions);
        Ok(workflow)
    }

    async fn list_actions(&self, workflow_id: Uuid) -> Result<Vec<ApprovalAction>, ServiceError> {
        Ok(self
            .tables
            .read()
            .await
            .actions
            .iter()
            .filter(|a| a.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    async fn get_material(&self, id: Uuid) -> Result<Option<MaterialSubmittal>, ServiceError> {
        Ok(self.tables.read().await.materials.get(&id).cloned())
    }

    async fn list_materials(
        &self,
        filter: &MaterialFilter,
        page: PageRequest,
    ) -> Result<Page<MaterialSubmittal>, ServiceError> {
        let tables = self.tables.read().await;
        let mut items: Vec<MaterialSubmittal> = tables
            .materials
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        newest_first(&mut items, |m| (m.created_at, m.id));
        Ok(page.apply(items))
    }

    async fn insert_material(
        &self,
        material: MaterialSubmittal,
    ) -> Result<MaterialSubmittal, ServiceError> {
        let mut tables = self.tables.write().await;
        tables.materials.insert(material.id, material.clone());
        Ok(material)
    }

    async fn update_material(
        &self,
        mut material: MaterialSubmittal,
        expected_version: i32,
    ) -> Result<MaterialSubmittal, ServiceError> {
        self.take_injected_conflict("Material submittal")?;
        let mut tables = self.tables.write().await;
        let stored = tables
            .materials
            .get(&material.id)
            .ok_or_else(|| not_found("Material submittal", material.id))?;
        check_version("Material submittal", material.id, stored.version, expected_version)?;
        material.version = expected_version + 1;
        material.updated_at = Utc::now();
        tables.materials.insert(material.id, material.clone());
        Ok(material)
    }
}

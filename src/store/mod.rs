//! Persistence contract for procurement and approval records.
//!
//! Every mutable row carries a `version`. Versioned writes take the version
//! the caller read and fail with [`ServiceError::StoreConflict`] when another
//! writer got there first, so load-validate-save cycles fail closed.

use crate::errors::ServiceError;
use crate::models::{
    ApprovalAction, ApprovalWorkflow, DeliveryConfirmation, MaterialSubmittal, PurchaseOrder,
    PurchaseOrderStatus, PurchaseRequest, RequestStatus, SubjectType, SubmittalStatus, Urgency,
    Vendor,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

pub mod memory;
pub mod sea_orm_store;

pub use memory::InMemoryProcurementStore;
pub use sea_orm_store::SeaOrmProcurementStore;

/// 1-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub per_page: u64,
}

impl PageRequest {
    pub fn new(page: u64, per_page: u64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    /// Everything on one page.
    pub fn all() -> Self {
        Self {
            page: 1,
            per_page: u64::MAX,
        }
    }

    pub fn offset(&self) -> usize {
        usize::try_from((self.page - 1).saturating_mul(self.per_page)).unwrap_or(usize::MAX)
    }

    pub fn limit(&self) -> usize {
        usize::try_from(self.per_page).unwrap_or(usize::MAX)
    }

    /// Slices an already filtered and ordered list.
    pub fn apply<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len() as u64;
        let items = items
            .into_iter()
            .skip(self.offset())
            .take(self.limit())
            .collect();
        Page {
            items,
            total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// `None` means every project; otherwise rows outside the set are hidden.
pub type ProjectRestriction = Option<HashSet<Uuid>>;

fn project_allowed(restriction: &ProjectRestriction, project_id: &Uuid) -> bool {
    restriction
        .as_ref()
        .map(|ids| ids.contains(project_id))
        .unwrap_or(true)
}

#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub visible_projects: ProjectRestriction,
    pub project_id: Option<Uuid>,
    pub status: Option<RequestStatus>,
    pub urgency: Option<Urgency>,
    pub required_from: Option<NaiveDate>,
    pub required_to: Option<NaiveDate>,
}

impl RequestFilter {
    pub fn matches(&self, request: &PurchaseRequest) -> bool {
        project_allowed(&self.visible_projects, &request.project_id)
            && self.project_id.map_or(true, |p| p == request.project_id)
            && self.status.map_or(true, |s| s == request.status)
            && self.urgency.map_or(true, |u| u == request.urgency)
            && self.required_from.map_or(true, |d| request.required_date >= d)
            && self.required_to.map_or(true, |d| request.required_date <= d)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub visible_projects: ProjectRestriction,
    pub project_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    /// Empty means any status.
    pub statuses: Vec<PurchaseOrderStatus>,
}

impl OrderFilter {
    pub fn matches(&self, order: &PurchaseOrder) -> bool {
        project_allowed(&self.visible_projects, &order.project_id)
            && self.project_id.map_or(true, |p| p == order.project_id)
            && self.vendor_id.map_or(true, |v| v == order.vendor_id)
            && (self.statuses.is_empty() || self.statuses.contains(&order.status))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MaterialFilter {
    pub visible_projects: ProjectRestriction,
    pub project_id: Option<Uuid>,
    pub status: Option<SubmittalStatus>,
}

impl MaterialFilter {
    pub fn matches(&self, material: &MaterialSubmittal) -> bool {
        project_allowed(&self.visible_projects, &material.project_id)
            && self.project_id.map_or(true, |p| p == material.project_id)
            && self.status.map_or(true, |s| s == material.status)
    }
}

/// A single delivery write, applied together with the parent order's version bump.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryChange {
    Insert(DeliveryConfirmation),
    Update(DeliveryConfirmation),
    Delete(Uuid),
}

/// Transactional CRUD over procurement and approval rows.
#[async_trait]
pub trait ProcurementStore: Send + Sync {
    async fn get_vendor(&self, id: Uuid) -> Result<Option<Vendor>, ServiceError>;
    async fn insert_vendor(&self, vendor: Vendor) -> Result<Vendor, ServiceError>;
    async fn update_vendor(&self, vendor: Vendor) -> Result<Vendor, ServiceError>;

    async fn get_request(&self, id: Uuid) -> Result<Option<PurchaseRequest>, ServiceError>;
    async fn list_requests(
        &self,
        filter: &RequestFilter,
        page: PageRequest,
    ) -> Result<Page<PurchaseRequest>, ServiceError>;
    async fn insert_request(&self, request: PurchaseRequest)
        -> Result<PurchaseRequest, ServiceError>;
    /// Persists `request` if the stored version equals `expected_version`.
    async fn update_request(
        &self,
        request: PurchaseRequest,
        expected_version: i32,
    ) -> Result<PurchaseRequest, ServiceError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<PurchaseOrder>, ServiceError>;
    async fn find_order_by_request(
        &self,
        request_id: Uuid,
    ) -> Result<Option<PurchaseOrder>, ServiceError>;
    async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: PageRequest,
    ) -> Result<Page<PurchaseOrder>, ServiceError>;
    /// Fails with `StoreConflict` when the source request already has an order.
    async fn insert_order(&self, order: PurchaseOrder) -> Result<PurchaseOrder, ServiceError>;
    async fn update_order(
        &self,
        order: PurchaseOrder,
        expected_version: i32,
    ) -> Result<PurchaseOrder, ServiceError>;

    async fn get_delivery(&self, id: Uuid) -> Result<Option<DeliveryConfirmation>, ServiceError>;
    async fn list_deliveries(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<DeliveryConfirmation>, ServiceError>;
    /// Applies `change` and bumps the order version (optionally moving it to
    /// `new_status`) in one atomic unit, conditional on `expected_order_version`.
    async fn apply_delivery_change(
        &self,
        order_id: Uuid,
        expected_order_version: i32,
        change: DeliveryChange,
        new_status: Option<PurchaseOrderStatus>,
    ) -> Result<PurchaseOrder, ServiceError>;

    async fn get_workflow(&self, id: Uuid) -> Result<Option<ApprovalWorkflow>, ServiceError>;
    async fn find_active_workflow(
        &self,
        subject_type: SubjectType,
        subject_id: Uuid,
    ) -> Result<Option<ApprovalWorkflow>, ServiceError>;
    async fn list_workflows_for_subject(
        &self,
        subject_type: SubjectType,
        subject_id: Uuid,
    ) -> Result<Vec<ApprovalWorkflow>, ServiceError>;
    /// Inserts a pending workflow plus its initial actions. Fails with
    /// `DuplicateWorkflow` when the subject already has a pending workflow.
    async fn insert_workflow(
        &self,
        workflow: ApprovalWorkflow,
        initial_actions: Vec<ApprovalAction>,
    ) -> Result<ApprovalWorkflow, ServiceError>;
    /// Persists the workflow and appends `actions` atomically, conditional on
    /// `expected_version`.
    async fn commit_workflow(
        &self,
        workflow: ApprovalWorkflow,
        expected_version: i32,
        actions: Vec<ApprovalAction>,
    ) -> Result<ApprovalWorkflow, ServiceError>;
    async fn list_actions(&self, workflow_id: Uuid) -> Result<Vec<ApprovalAction>, ServiceError>;

    async fn get_material(&self, id: Uuid) -> Result<Option<MaterialSubmittal>, ServiceError>;
    async fn list_materials(
        &self,
        filter: &MaterialFilter,
        page: PageRequest,
    ) -> Result<Page<MaterialSubmittal>, ServiceError>;
    async fn insert_material(
        &self,
        material: MaterialSubmittal,
    ) -> Result<MaterialSubmittal, ServiceError>;
    async fn update_material(
        &self,
        material: MaterialSubmittal,
        expected_version: i32,
    ) -> Result<MaterialSubmittal, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_slices_items() {
        let page = PageRequest::new(2, 3).apply((1..=8).collect::<Vec<_>>());
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.total, 8);
    }

    #[test]
    fn page_all_keeps_everything() {
        let page = PageRequest::all().apply(vec!['a', 'b']);
        assert_eq!(page.items.len(), 2);
    }

    #[test]
    fn zero_page_is_normalised() {
        assert_eq!(PageRequest::new(0, 0), PageRequest::new(1, 1));
    }
}

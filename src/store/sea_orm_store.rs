use super::{
    DeliveryChange, MaterialFilter, OrderFilter, Page, PageRequest, ProcurementStore,
    RequestFilter,
};
use crate::errors::ServiceError;
use crate::models::{
    approval_action, approval_workflow, delivery_confirmation, material_submittal, purchase_order,
    purchase_request, vendor, ApprovalAction, ApprovalWorkflow, DeliveryConfirmation,
    MaterialSubmittal, PurchaseOrder, PurchaseOrderStatus, PurchaseRequest, SubjectType, Vendor,
    WorkflowStatus,
};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select,
    SqlErr, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

/// Relational store over any sea-orm backend.
#[derive(Debug, Clone)]
pub struct SeaOrmProcurementStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmProcurementStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }
}

/// Runs an `UPDATE ... WHERE <condition>` with every column of `model` and
/// returns the number of rows touched.
async fn guarded_update<A, C>(conn: &C, model: A, condition: Condition) -> Result<u64, DbErr>
where
    A: ActiveModelTrait + Send,
    C: ConnectionTrait,
{
    let result = <A::Entity as EntityTrait>::update_many()
        .set(model)
        .filter(condition)
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

fn stale_write(entity: &str, id: Uuid, exists: bool) -> ServiceError {
    if exists {
        ServiceError::StoreConflict(format!("{} {} was modified concurrently", entity, id))
    } else {
        ServiceError::NotFound(format!("{} {}", entity, id))
    }
}

/// Maps a unique-constraint violation to `on_violation`; any other failure
/// goes through the usual `DbErr` classification.
fn unique_violation(err: DbErr, on_violation: impl FnOnce() -> ServiceError) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => on_violation(),
        _ => ServiceError::from(err),
    }
}

async fn fetch_page<E>(
    conn: &DatabaseConnection,
    select: Select<E>,
    page: PageRequest,
) -> Result<Page<E::Model>, ServiceError>
where
    E: EntityTrait,
    E::Model: Send + Sync + 'static,
{
    if page.per_page >= i64::MAX as u64 {
        let items = select.all(conn).await?;
        return Ok(page.apply(items));
    }

    let paginator = select.paginate(conn, page.per_page);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page.page - 1).await?;
    Ok(Page {
        items,
        total,
        page: page.page,
        per_page: page.per_page,
    })
}

fn request_condition(filter: &RequestFilter) -> Condition {
    use purchase_request::Column;
    let mut cond = Condition::all();
    if let Some(ids) = &filter.visible_projects {
        cond = cond.add(Column::ProjectId.is_in(ids.iter().copied()));
    }
    if let Some(project_id) = filter.project_id {
        cond = cond.add(Column::ProjectId.eq(project_id));
    }
    if let Some(status) = filter.status {
        cond = cond.add(Column::Status.eq(status));
    }
    if let Some(urgency) = filter.urgency {
        cond = cond.add(Column::Urgency.eq(urgency));
    }
    if let Some(from) = filter.required_from {
        cond = cond.add(Column::RequiredDate.gte(from));
    }
    if let Some(to) = filter.required_to {
        cond = cond.add(Column::RequiredDate.lte(to));
    }
    cond
}

fn order_condition(filter: &OrderFilter) -> Condition {
    use purchase_order::Column;
    let mut cond = Condition::all();
    if let Some(ids) = &filter.visible_projects {
        cond = cond.add(Column::ProjectId.is_in(ids.iter().copied()));
    }
    if let Some(project_id) = filter.project_id {
        cond = cond.add(Column::ProjectId.eq(project_id));
    }
    if let Some(vendor_id) = filter.vendor_id {
        cond = cond.add(Column::VendorId.eq(vendor_id));
    }
    if !filter.statuses.is_empty() {
        cond = cond.add(Column::Status.is_in(filter.statuses.iter().copied()));
    }
    cond
}

fn material_condition(filter: &MaterialFilter) -> Condition {
    use material_submittal::Column;
    let mut cond = Condition::all();
    if let Some(ids) = &filter.visible_projects {
        cond = cond.add(Column::ProjectId.is_in(ids.iter().copied()));
    }
    if let Some(project_id) = filter.project_id {
        cond = cond.add(Column::ProjectId.eq(project_id));
    }
    if let Some(status) = filter.status {
        cond = cond.add(Column::Status.eq(status));
    }
    cond
}

/// Takes a row lock on the subject so concurrent workflow starts serialize.
/// Documents live outside this store and have no row to lock; for them the
/// partial unique index on pending workflows rejects the second insert.
async fn lock_subject<C: ConnectionTrait>(
    conn: &C,
    subject_type: SubjectType,
    subject_id: Uuid,
) -> Result<(), DbErr> {
    match subject_type {
        SubjectType::PurchaseRequest => {
            purchase_request::Entity::find_by_id(subject_id)
                .lock_exclusive()
                .one(conn)
                .await?;
        }
        SubjectType::PurchaseOrder => {
            purchase_order::Entity::find_by_id(subject_id)
                .lock_exclusive()
                .one(conn)
                .await?;
        }
        SubjectType::MaterialSubmittal => {
            material_submittal::Entity::find_by_id(subject_id)
                .lock_exclusive()
                .one(conn)
                .await?;
        }
        SubjectType::Document => {}
    }
    Ok(())
}

#[async_trait]
impl ProcurementStore for SeaOrmProcurementStore {
    async fn get_vendor(&self, id: Uuid) -> Result<Option<Vendor>, ServiceError> {
        Ok(vendor::Entity::find_by_id(id).one(self.conn()).await?)
    }

    async fn insert_vendor(&self, vendor: Vendor) -> Result<Vendor, ServiceError> {
        vendor::Entity::insert(vendor.clone().into_active_model().reset_all())
            .exec_without_returning(self.conn())
            .await?;
        Ok(vendor)
    }

    async fn update_vendor(&self, mut vendor: Vendor) -> Result<Vendor, ServiceError> {
        vendor.updated_at = Utc::now();
        let rows = guarded_update(
            self.conn(),
            vendor.clone().into_active_model().reset_all(),
            Condition::all().add(vendor::Column::Id.eq(vendor.id)),
        )
        .await?;
        if rows == 0 {
            return Err(ServiceError::NotFound(format!("Vendor {}", vendor.id)));
        }
        Ok(vendor)
    }

    async fn get_request(&self, id: Uuid) -> Result<Option<PurchaseRequest>, ServiceError> {
        Ok(purchase_request::Entity::find_by_id(id)
            .one(self.conn())
            .await?)
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
        page: PageRequest,
    ) -> Result<Page<PurchaseRequest>, ServiceError> {
        let select = purchase_request::Entity::find()
            .filter(request_condition(filter))
            .order_by_desc(purchase_request::Column::CreatedAt)
            .order_by_desc(purchase_request::Column::Id);
        fetch_page(self.conn(), select, page).await
    }

    async fn insert_request(
        &self,
        request: PurchaseRequest,
    ) -> Result<PurchaseRequest, ServiceError> {
        purchase_request::Entity::insert(request.clone().into_active_model().reset_all())
            .exec_without_returning(self.conn())
            .await?;
        Ok(request)
    }

    async fn update_request(
        &self,
        mut request: PurchaseRequest,
        expected_version: i32,
    ) -> Result<PurchaseRequest, ServiceError> {
        use purchase_request::Column;
        request.version = expected_version + 1;
        request.updated_at = Utc::now();
        let rows = guarded_update(
            self.conn(),
            request.clone().into_active_model().reset_all(),
            Condition::all()
                .add(Column::Id.eq(request.id))
                .add(Column::Version.eq(expected_version)),
        )
        .await?;
        if rows == 0 {
            let exists = self.get_request(request.id).await?.is_some();
            return Err(stale_write("Purchase request", request.id, exists));
        }
        Ok(request)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<PurchaseOrder>, ServiceError> {
        Ok(purchase_order::Entity::find_by_id(id).one(self.conn()).await?)
    }

    async fn find_order_by_request(
        &self,
        request_id: Uuid,
    ) -> Result<Option<PurchaseOrder>, ServiceError> {
        Ok(purchase_order::Entity::find()
            .filter(purchase_order::Column::RequestId.eq(request_id))
            .one(self.conn())
            .await?)
    }

    async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: PageRequest,
    ) -> Result<Page<PurchaseOrder>, ServiceError> {
        let select = purchase_order::Entity::find()
            .filter(order_condition(filter))
            .order_by_desc(purchase_order::Column::CreatedAt)
            .order_by_desc(purchase_order::Column::Id);
        fetch_page(self.conn(), select, page).await
    }

    async fn insert_order(&self, order: PurchaseOrder) -> Result<PurchaseOrder, ServiceError> {
        purchase_order::Entity::insert(order.clone().into_active_model().reset_all())
            .exec_without_returning(self.conn())
            .await
            .map_err(|e| {
                unique_violation(e, || {
                    ServiceError::StoreConflict(format!(
                        "purchase request {} already has an order or PO number {} is taken",
                        order.request_id, order.po_number
                    ))
                })
            })?;
        Ok(order)
    }

    async fn update_order(
        &self,
        mut order: PurchaseOrder,
        expected_version: i32,
    ) -> Result<PurchaseOrder, ServiceError> {
        use purchase_order::Column;
        order.version = expected_version + 1;
        order.updated_at = Utc::now();
        let rows = guarded_update(
            self.conn(),
            order.clone().into_active_model().reset_all(),
            Condition::all()
                .add(Column::Id.eq(order.id))
                .add(Column::Version.eq(expected_version)),
        )
        .await?;
        if rows == 0 {
            let exists = self.get_order(order.id).await?.is_some();
            return Err(stale_write("Purchase order", order.id, exists));
        }
        Ok(order)
    }

    async fn get_delivery(&self, id: Uuid) -> Result<Option<DeliveryConfirmation>, ServiceError> {
        Ok(delivery_confirmation::Entity::find_by_id(id)
            .one(self.conn())
            .await?)
    }

    async fn list_deliveries(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<DeliveryConfirmation>, ServiceError> {
        use delivery_confirmation::Column;
        Ok(delivery_confirmation::Entity::find()
            .filter(Column::PurchaseOrderId.eq(order_id))
            .order_by_asc(Column::DeliveryDate)
            .order_by_asc(Column::CreatedAt)
            .all(self.conn())
            .await?)
    }

    async fn apply_delivery_change(
        &self,
        order_id: Uuid,
        expected_order_version: i32,
        change: DeliveryChange,
        new_status: Option<PurchaseOrderStatus>,
    ) -> Result<PurchaseOrder, ServiceError> {
        use delivery_confirmation::Column as DeliveryColumn;
        use purchase_order::Column as OrderColumn;

        let txn = self.conn().begin().await?;

        let mut order = purchase_order::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase order {}", order_id)))?;

        let now = Utc::now();
        if let Some(status) = new_status {
            if status != order.status {
                order.status = status;
                order.status_changed_at = now;
            }
        }
        order.version = expected_order_version + 1;
        order.updated_at = now;

        // Bumping the order first takes its row lock, so delivery writers on
        // the same order queue behind each other.
        let rows = guarded_update(
            &txn,
            order.clone().into_active_model().reset_all(),
            Condition::all()
                .add(OrderColumn::Id.eq(order_id))
                .add(OrderColumn::Version.eq(expected_order_version)),
        )
        .await?;
        if rows == 0 {
            txn.rollback().await?;
            return Err(stale_write("Purchase order", order_id, true));
        }

        match change {
            DeliveryChange::Insert(delivery) => {
                delivery_confirmation::Entity::insert(delivery.into_active_model().reset_all())
                    .exec_without_returning(&txn)
                    .await?;
            }
            DeliveryChange::Update(delivery) => {
                let id = delivery.id;
                let rows = guarded_update(
                    &txn,
                    delivery.into_active_model().reset_all(),
                    Condition::all()
                        .add(DeliveryColumn::Id.eq(id))
                        .add(DeliveryColumn::PurchaseOrderId.eq(order_id)),
                )
                .await?;
                if rows == 0 {
                    txn.rollback().await?;
                    return Err(ServiceError::NotFound(format!("Delivery confirmation {}", id)));
                }
            }
            DeliveryChange::Delete(id) => {
                let result = delivery_confirmation::Entity::delete_many()
                    .filter(DeliveryColumn::Id.eq(id))
                    .filter(DeliveryColumn::PurchaseOrderId.eq(order_id))
                    .exec(&txn)
                    .await?;
                if result.rows_affected == 0 {
                    txn.rollback().await?;
                    return Err(ServiceError::NotFound(format!("Delivery confirmation {}", id)));
                }
            }
        }

        txn.commit().await?;
        Ok(order)
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Option<ApprovalWorkflow>, ServiceError> {
        Ok(approval_workflow::Entity::find_by_id(id)
            .one(self.conn())
            .await?)
    }

    async fn find_active_workflow(
        &self,
        subject_type: SubjectType,
        subject_id: Uuid,
    ) -> Result<Option<ApprovalWorkflow>, ServiceError> {
        use approval_workflow::Column;
        Ok(approval_workflow::Entity::find()
            .filter(Column::SubjectType.eq(subject_type))
            .filter(Column::SubjectId.eq(subject_id))
            .filter(Column::Status.eq(WorkflowStatus::Pending))
            .one(self.conn())
            .await?)
    }

    async fn list_workflows_for_subject(
        &self,
        subject_type: SubjectType,
        subject_id: Uuid,
    ) -> Result<Vec<ApprovalWorkflow>, ServiceError> {
        use approval_workflow::Column;
        Ok(approval_workflow::Entity::find()
            .filter(Column::SubjectType.eq(subject_type))
            .filter(Column::SubjectId.eq(subject_id))
            .order_by_desc(Column::CreatedAt)
            .all(self.conn())
            .await?)
    }

    async fn insert_workflow(
        &self,
        workflow: ApprovalWorkflow,
        initial_actions: Vec<ApprovalAction>,
    ) -> Result<ApprovalWorkflow, ServiceError> {
        use approval_workflow::Column;

        let txn = self.conn().begin().await?;
        lock_subject(&txn, workflow.subject_type, workflow.subject_id).await?;

        let existing = approval_workflow::Entity::find()
            .filter(Column::SubjectType.eq(workflow.subject_type))
            .filter(Column::SubjectId.eq(workflow.subject_id))
            .filter(Column::Status.eq(WorkflowStatus::Pending))
            .one(&txn)
            .await?;
        if existing.is_some() {
            txn.rollback().await?;
            return Err(ServiceError::DuplicateWorkflow(workflow.subject_key()));
        }

        approval_workflow::Entity::insert(workflow.clone().into_active_model().reset_all())
            .exec_without_returning(&txn)
            .await
            .map_err(|e| {
                unique_violation(e, || ServiceError::DuplicateWorkflow(workflow.subject_key()))
            })?;
        insert_actions(&txn, initial_actions).await?;

        txn.commit().await?;
        Ok(workflow)
    }

    async fn commit_workflow(
        &self,
        mut workflow: ApprovalWorkflow,
        expected_version: i32,
        actions: Vec<ApprovalAction>,
    ) -> Result<ApprovalWorkflow, ServiceError> {
        use approval_workflow::Column;

        workflow.version = expected_version + 1;
        workflow.updated_at = Utc::now();

        let txn = self.conn().begin().await?;
        let rows = guarded_update(
            &txn,
            workflow.clone().into_active_model().reset_all(),
            Condition::all()
                .add(Column::Id.eq(workflow.id))
                .add(Column::Version.eq(expected_version)),
        )
        .await?;
        if rows == 0 {
            let exists = approval_workflow::Entity::find_by_id(workflow.id)
                .one(&txn)
                .await?
                .is_some();
            txn.rollback().await?;
            return Err(stale_write("Approval workflow", workflow.id, exists));
        }
        insert_actions(&txn, actions).await?;

        txn.commit().await?;
        Ok(workflow)
    }

    async fn list_actions(&self, workflow_id: Uuid) -> Result<Vec<ApprovalAction>, ServiceError> {
        use approval_action::Column;
        Ok(approval_action::Entity::find()
            .filter(Column::WorkflowId.eq(workflow_id))
            .order_by_asc(Column::CreatedAt)
            .all(self.conn())
            .await?)
    }

    async fn get_material(&self, id: Uuid) -> Result<Option<MaterialSubmittal>, ServiceError> {
        Ok(material_submittal::Entity::find_by_id(id)
            .one(self.conn())
            .await?)
    }

    async fn list_materials(
        &self,
        filter: &MaterialFilter,
        page: PageRequest,
    ) -> Result<Page<MaterialSubmittal>, ServiceError> {
        let select = material_submittal::Entity::find()
            .filter(material_condition(filter))
            .order_by_desc(material_submittal::Column::CreatedAt)
            .order_by_desc(material_submittal::Column::Id);
        fetch_page(self.conn(), select, page).await
    }

    async fn insert_material(
        &self,
        material: MaterialSubmittal,
    ) -> Result<MaterialSubmittal, ServiceError> {
        material_submittal::Entity::insert(material.clone().into_active_model().reset_all())
            .exec_without_returning(self.conn())
            .await?;
        Ok(material)
    }

    async fn update_material(
        &self,
        mut material: MaterialSubmittal,
        expected_version: i32,
    ) -> Result<MaterialSubmittal, ServiceError> {
        use material_submittal::Column;
        material.version = expected_version + 1;
        material.updated_at = Utc::now();
        let rows = guarded_update(
            self.conn(),
            material.clone().into_active_model().reset_all(),
            Condition::all()
                .add(Column::Id.eq(material.id))
                .add(Column::Version.eq(expected_version)),
        )
        .await?;
        if rows == 0 {
            let exists = self.get_material(material.id).await?.is_some();
            return Err(stale_write("Material submittal", material.id, exists));
        }
        Ok(material)
    }
}

async fn insert_actions<C: ConnectionTrait>(
    conn: &C,
    actions: Vec<ApprovalAction>,
) -> Result<(), DbErr> {
    if actions.is_empty() {
        return Ok(());
    }
    approval_action::Entity::insert_many(
        actions
            .into_iter()
            .map(|action| action.into_active_model().reset_all()),
    )
    .exec_without_returning(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApproverList, WorkflowType};
    use assert_matches::assert_matches;
    use migrations::{Migrator, MigratorTrait};
    use sea_orm::{ConnectOptions, Database};

    async fn store() -> (SeaOrmProcurementStore, Arc<DatabaseConnection>) {
        // One connection so every query sees the same in-memory database.
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let db = Arc::new(db);
        (SeaOrmProcurementStore::new(db.clone()), db)
    }

    fn document_workflow(subject_id: Uuid, status: WorkflowStatus) -> ApprovalWorkflow {
        let now = Utc::now();
        ApprovalWorkflow {
            id: Uuid::new_v4(),
            subject_type: SubjectType::Document,
            subject_id,
            subject_owner_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            workflow_type: WorkflowType::Parallel,
            required_approvers: ApproverList(vec![Uuid::new_v4()]),
            completed_approvers: ApproverList::default(),
            approval_sequence: ApproverList::default(),
            status,
            priority_level: 2,
            estimated_completion_date: None,
            conditions: serde_json::json!({}),
            revision_cycle: false,
            created_by: Uuid::new_v4(),
            version: 1,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn second_pending_document_workflow_is_a_duplicate() {
        let (store, _) = store().await;
        let document = Uuid::new_v4();

        store
            .insert_workflow(document_workflow(document, WorkflowStatus::Pending), vec![])
            .await
            .unwrap();
        assert_matches!(
            store
                .insert_workflow(document_workflow(document, WorkflowStatus::Pending), vec![])
                .await,
            Err(ServiceError::DuplicateWorkflow(_))
        );
    }

    #[tokio::test]
    async fn pending_index_rejects_writers_that_skip_the_check() {
        let (store, db) = store().await;
        let document = Uuid::new_v4();
        store
            .insert_workflow(document_workflow(document, WorkflowStatus::Pending), vec![])
            .await
            .unwrap();

        // Closed workflows for the same subject are outside the index.
        approval_workflow::Entity::insert(
            document_workflow(document, WorkflowStatus::Cancelled)
                .into_active_model()
                .reset_all(),
        )
        .exec_without_returning(db.as_ref())
        .await
        .unwrap();

        let racing = document_workflow(document, WorkflowStatus::Pending);
        let err = approval_workflow::Entity::insert(racing.clone().into_active_model().reset_all())
            .exec_without_returning(db.as_ref())
            .await
            .unwrap_err();
        assert_matches!(
            unique_violation(err, || ServiceError::DuplicateWorkflow(racing.subject_key())),
            ServiceError::DuplicateWorkflow(_)
        );
    }
}

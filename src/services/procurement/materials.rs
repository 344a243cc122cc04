use super::{positive_decimal, ProcurementService};
use crate::{
    auth::{Capability, Principal},
    errors::ServiceError,
    events::Event,
    middleware_helpers::{with_retry, ConflictRetryPolicy},
    models::{MaterialSubmittal, SubmittalStatus},
    notifications::{notify_best_effort, Notification, NotificationType},
    services::materials::{
        apply_resubmission, apply_review, dedup_ids, BulkOutcome, MaterialDecision, MaterialEdit,
    },
    store::{MaterialFilter, Page, PageRequest},
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct NewMaterialSubmittal {
    pub project_id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub specification: Option<String>,
    #[validate(custom = "positive_decimal")]
    #[schema(value_type = String)]
    pub quantity: Decimal,
    #[validate(length(min = 1, max = 32))]
    pub unit_of_measure: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct MaterialReview {
    pub decision: MaterialDecision,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct BulkMaterialReview {
    #[validate(length(min = 1, max = 200))]
    pub ids: Vec<Uuid>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct BulkMaterialUpdate {
    #[validate(length(min = 1, max = 200))]
    pub ids: Vec<Uuid>,
    #[validate]
    pub changes: MaterialEdit,
}

impl ProcurementService {
    async fn load_material_for(
        &self,
        actor: &Principal,
        id: Uuid,
        capability: Capability,
    ) -> Result<MaterialSubmittal, ServiceError> {
        let material = self.load_material(id).await?;
        self.authorize(actor, material.project_id, capability)
            .await?;
        Ok(material)
    }

    pub(super) async fn load_material(&self, id: Uuid) -> Result<MaterialSubmittal, ServiceError> {
        self.store
            .get_material(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Material submittal {}", id)))
    }

    #[instrument(skip(self, actor, input), fields(actor_id = %actor.id, project_id = %input.project_id))]
    pub async fn submit_material(
        &self,
        actor: &Principal,
        input: NewMaterialSubmittal,
    ) -> Result<MaterialSubmittal, ServiceError> {
        input.validate()?;
        self.authorize(actor, input.project_id, Capability::Edit)
            .await?;
        let now = Utc::now();
        let material = MaterialSubmittal {
            id: Uuid::new_v4(),
            project_id: input.project_id,
            submitted_by: actor.id,
            name: input.name,
            specification: input.specification,
            quantity: input.quantity,
            unit_of_measure: input.unit_of_measure,
            status: SubmittalStatus::Pending,
            reviewed_by: None,
            review_notes: None,
            reviewed_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        let material = self.store.insert_material(material).await?;
        slog::info!(self.audit, "material submitted";
            "submittal_id" => %material.id, "actor_id" => %actor.id);
        Ok(material)
    }

    pub async fn get_material(
        &self,
        actor: &Principal,
        id: Uuid,
    ) -> Result<MaterialSubmittal, ServiceError> {
        self.load_material_for(actor, id, Capability::View).await
    }

    pub async fn list_materials(
        &self,
        actor: &Principal,
        mut filter: MaterialFilter,
        page: PageRequest,
    ) -> Result<Page<MaterialSubmittal>, ServiceError> {
        filter.visible_projects = self.restriction(actor).await?;
        self.store.list_materials(&filter, page).await
    }

    /// Approves, rejects or sends back a single submittal.
    #[instrument(skip(self, actor, review), fields(actor_id = %actor.id, submittal_id = %id, decision = %review.decision))]
    pub async fn review_material(
        &self,
        actor: &Principal,
        id: Uuid,
        review: MaterialReview,
    ) -> Result<MaterialSubmittal, ServiceError> {
        review.validate()?;
        let material = with_retry(&self.retry, ConflictRetryPolicy, || {
            self.review_material_once(actor, id, review.decision, review.notes.clone())
        })
        .await?;
        self.after_review(actor, &material).await;
        Ok(material)
    }

    async fn review_material_once(
        &self,
        actor: &Principal,
        id: Uuid,
        decision: MaterialDecision,
        notes: Option<String>,
    ) -> Result<MaterialSubmittal, ServiceError> {
        let mut material = self.load_material_for(actor, id, Capability::Approve).await?;
        let expected = material.version;
        apply_review(&mut material, decision, actor.id, notes)?;
        self.store.update_material(material, expected).await
    }

    async fn after_review(&self, actor: &Principal, material: &MaterialSubmittal) {
        slog::info!(self.audit, "material reviewed";
            "submittal_id" => %material.id, "status" => %material.status, "actor_id" => %actor.id);
        self.events
            .send_or_log(Event::MaterialSubmittalReviewed {
                submittal_id: material.id,
                reviewer_id: actor.id,
                status: material.status.to_string(),
            })
            .await;
        if material.submitted_by != actor.id {
            let notification = Notification::new(
                NotificationType::MaterialReviewed,
                material.id,
                format!("Material submittal '{}' is {}", material.name, material.status),
            );
            notify_best_effort(self.notifier.as_ref(), material.submitted_by, notification).await;
        }
    }

    /// Submitter-only: applies edits and returns the item to `pending`.
    #[instrument(skip(self, actor, edit), fields(actor_id = %actor.id, submittal_id = %id))]
    pub async fn resubmit_material(
        &self,
        actor: &Principal,
        id: Uuid,
        edit: MaterialEdit,
    ) -> Result<MaterialSubmittal, ServiceError> {
        edit.validate()?;
        let material = with_retry(&self.retry, ConflictRetryPolicy, || {
            let edit = edit.clone();
            async move {
                let mut material = self.load_material_for(actor, id, Capability::Edit).await?;
                let expected = material.version;
                apply_resubmission(&mut material, actor.id, edit)?;
                self.store.update_material(material, expected).await
            }
        })
        .await?;
        slog::info!(self.audit, "material resubmitted";
            "submittal_id" => %material.id, "actor_id" => %actor.id);
        Ok(material)
    }

    pub async fn bulk_approve_materials(
        &self,
        actor: &Principal,
        input: BulkMaterialReview,
    ) -> Result<BulkOutcome, ServiceError> {
        self.bulk_review(actor, input, MaterialDecision::Approve).await
    }

    pub async fn bulk_reject_materials(
        &self,
        actor: &Principal,
        input: BulkMaterialReview,
    ) -> Result<BulkOutcome, ServiceError> {
        self.bulk_review(actor, input, MaterialDecision::Reject).await
    }

    /// Runs the single-item review path per id. One failing item never
    /// aborts the rest.
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.id, items = input.ids.len(), %decision))]
    async fn bulk_review(
        &self,
        actor: &Principal,
        input: BulkMaterialReview,
        decision: MaterialDecision,
    ) -> Result<BulkOutcome, ServiceError> {
        input.validate()?;
        let mut outcome = BulkOutcome::default();
        for id in dedup_ids(&input.ids) {
            let result = with_retry(&self.retry, ConflictRetryPolicy, || {
                self.review_material_once(actor, id, decision, input.notes.clone())
            })
            .await;
            let result = match result {
                Ok(material) => {
                    self.after_review(actor, &material).await;
                    Ok(())
                }
                Err(err) => Err(err),
            };
            outcome.record(id, result);
        }
        slog::info!(self.audit, "bulk material review";
            "decision" => %decision, "succeeded" => outcome.succeeded.len(),
            "failed" => outcome.failed.len(), "actor_id" => %actor.id);
        Ok(outcome)
    }

    /// Applies the same field edits to every listed item that is still open.
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.id, items = input.ids.len()))]
    pub async fn bulk_update_materials(
        &self,
        actor: &Principal,
        input: BulkMaterialUpdate,
    ) -> Result<BulkOutcome, ServiceError> {
        input.validate()?;
        if input.changes.is_empty() {
            return Err(ServiceError::validation("changes", "no fields to update"));
        }
        let mut outcome = BulkOutcome::default();
        for id in dedup_ids(&input.ids) {
            let result = with_retry(&self.retry, ConflictRetryPolicy, || {
                let changes = input.changes.clone();
                async move {
                    let mut material =
                        self.load_material_for(actor, id, Capability::Edit).await?;
                    if !matches!(
                        material.status,
                        SubmittalStatus::Pending | SubmittalStatus::RevisionRequested
                    ) {
                        return Err(ServiceError::invalid_transition(material.status, "edited"));
                    }
                    let expected = material.version;
                    changes.apply(&mut material)?;
                    self.store.update_material(material, expected).await
                }
            })
            .await;
            outcome.record(id, result.map(|_| ()));
        }
        slog::info!(self.audit, "bulk material update";
            "succeeded" => outcome.succeeded.len(), "failed" => outcome.failed.len(),
            "actor_id" => %actor.id);
        Ok(outcome)
    }
}

//! Review rules for material submittals and the partitioned result of batch
//! operations.

use crate::{
    errors::ServiceError,
    models::{MaterialSubmittal, SubmittalStatus},
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Reviewer decision on a submittal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MaterialDecision {
    Approve,
    Reject,
    RequestRevision,
}

impl MaterialDecision {
    pub fn target_status(self) -> SubmittalStatus {
        match self {
            MaterialDecision::Approve => SubmittalStatus::Approved,
            MaterialDecision::Reject => SubmittalStatus::Rejected,
            MaterialDecision::RequestRevision => SubmittalStatus::RevisionRequested,
        }
    }
}

pub fn submittal_successors(status: SubmittalStatus) -> &'static [SubmittalStatus] {
    use SubmittalStatus::*;
    match status {
        Pending => &[Approved, Rejected, RevisionRequested],
        RevisionRequested => &[Pending, Rejected],
        Approved | Rejected => &[],
    }
}

/// Field edits accepted while a submittal is still open.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, Validate, ToSchema)]
pub struct MaterialEdit {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub specification: Option<String>,
    #[schema(value_type = Option<String>)]
    pub quantity: Option<Decimal>,
    #[validate(length(min = 1, max = 32))]
    pub unit_of_measure: Option<String>,
}

impl MaterialEdit {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.specification.is_none()
            && self.quantity.is_none()
            && self.unit_of_measure.is_none()
    }

    pub fn apply(self, material: &mut MaterialSubmittal) -> Result<(), ServiceError> {
        if let Some(quantity) = self.quantity {
            if quantity <= Decimal::ZERO {
                return Err(ServiceError::validation("quantity", "must be positive"));
            }
            material.quantity = quantity;
        }
        if let Some(name) = self.name {
            material.name = name;
        }
        if let Some(specification) = self.specification {
            material.specification = Some(specification);
        }
        if let Some(unit) = self.unit_of_measure {
            material.unit_of_measure = unit;
        }
        Ok(())
    }
}

/// Applies a review decision in memory.
///
/// The submitter may never approve (or request revision on) their own
/// submittal. They may reject it only once it is in `revision_requested`.
pub fn apply_review(
    material: &mut MaterialSubmittal,
    decision: MaterialDecision,
    reviewer_id: Uuid,
    notes: Option<String>,
) -> Result<(), ServiceError> {
    let target = decision.target_status();
    if !submittal_successors(material.status).contains(&target) {
        return Err(ServiceError::invalid_transition(material.status, target));
    }
    if reviewer_id == material.submitted_by {
        let self_reject_allowed = decision == MaterialDecision::Reject
            && material.status == SubmittalStatus::RevisionRequested;
        if !self_reject_allowed {
            return Err(ServiceError::SelfApprovalForbidden(reviewer_id));
        }
    }

    material.status = target;
    material.reviewed_by = Some(reviewer_id);
    material.reviewed_at = Some(Utc::now());
    if notes.is_some() {
        material.review_notes = notes;
    }
    Ok(())
}

/// Moves a submittal back to `pending` after the requested revision.
pub fn apply_resubmission(
    material: &mut MaterialSubmittal,
    actor_id: Uuid,
    edit: MaterialEdit,
) -> Result<(), ServiceError> {
    if actor_id != material.submitted_by {
        return Err(ServiceError::Forbidden(
            "only the submitter may resubmit".to_string(),
        ));
    }
    if material.status != SubmittalStatus::RevisionRequested {
        return Err(ServiceError::invalid_transition(
            material.status,
            SubmittalStatus::Pending,
        ));
    }
    edit.apply(material)?;
    material.status = SubmittalStatus::Pending;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BulkFailure {
    pub id: Uuid,
    pub kind: String,
    pub message: String,
}

/// Per-item result of a batch: one bad item never aborts its siblings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BulkOutcome {
    pub succeeded: Vec<Uuid>,
    pub failed: Vec<BulkFailure>,
}

impl BulkOutcome {
    pub fn record(&mut self, id: Uuid, result: Result<(), ServiceError>) {
        match result {
            Ok(()) => self.succeeded.push(id),
            Err(err) => self.failed.push(BulkFailure {
                id,
                kind: err.kind().to_string(),
                message: err.response_message(),
            }),
        }
    }
}

/// Ids in first-seen order without repeats.
pub fn dedup_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubjectType {
    #[sea_orm(string_value = "document")]
    Document,
    #[sea_orm(string_value = "purchase_request")]
    PurchaseRequest,
    #[sea_orm(string_value = "purchase_order")]
    PurchaseOrder,
    #[sea_orm(string_value = "material_submittal")]
    MaterialSubmittal,
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowType {
    #[sea_orm(string_value = "sequential")]
    Sequential,
    #[sea_orm(string_value = "parallel")]
    Parallel,
    #[sea_orm(string_value = "conditional")]
    Conditional,
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, WorkflowStatus::Pending)
    }
}

/// Ordered list of principal ids stored as a JSON array.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct ApproverList(pub Vec<Uuid>);

impl ApproverList {
    pub fn contains(&self, id: &Uuid) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Uuid> {
        self.0.iter()
    }

    /// Every id in `other` is present in `self`.
    pub fn is_superset_of(&self, other: &ApproverList) -> bool {
        other.iter().all(|id| self.contains(id))
    }

    /// Replaces `from` with `to` in place, keeping the position.
    pub fn replace(&mut self, from: Uuid, to: Uuid) {
        for id in self.0.iter_mut() {
            if *id == from {
                *id = to;
            }
        }
    }
}

impl From<Vec<Uuid>> for ApproverList {
    fn from(ids: Vec<Uuid>) -> Self {
        ApproverList(ids)
    }
}

/// The `approval_workflows` table.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "approval_workflows")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub subject_type: SubjectType,
    pub subject_id: Uuid,
    /// Creator of the subject; barred from approving it.
    pub subject_owner_id: Uuid,
    pub project_id: Uuid,
    pub workflow_type: WorkflowType,
    #[sea_orm(column_type = "Json")]
    pub required_approvers: ApproverList,
    #[sea_orm(column_type = "Json")]
    pub completed_approvers: ApproverList,
    #[sea_orm(column_type = "Json")]
    pub approval_sequence: ApproverList,
    pub status: WorkflowStatus,
    pub priority_level: i32,
    pub estimated_completion_date: Option<NaiveDate>,
    /// Metadata consulted by conditional routing.
    #[sea_orm(column_type = "Json")]
    pub conditions: Json,
    /// Set for revision-request cycles, where the subject owner may reject.
    pub revision_cycle: bool,
    pub created_by: Uuid,
    pub version: i32,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::approval_action::Entity")]
    ApprovalActions,
}

impl Related<super::approval_action::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApprovalActions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_open(&self) -> bool {
        self.status == WorkflowStatus::Pending
    }

    pub fn has_quorum(&self) -> bool {
        self.completed_approvers
            .is_superset_of(&self.required_approvers)
    }

    /// Required approvers who have not approved yet, in required order.
    pub fn outstanding_approvers(&self) -> Vec<Uuid> {
        self.required_approvers
            .iter()
            .filter(|id| !self.completed_approvers.contains(id))
            .copied()
            .collect()
    }

    /// First approver in `approval_sequence` who has not approved yet.
    pub fn next_in_sequence(&self) -> Option<Uuid> {
        self.approval_sequence
            .iter()
            .find(|id| !self.completed_approvers.contains(id))
            .copied()
    }

    pub fn subject_key(&self) -> String {
        format!("{}:{}", self.subject_type, self.subject_id)
    }
}
